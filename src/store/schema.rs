use rusqlite::{Connection, Result};
use tracing::{debug, info};

/// SQLite schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    debug!("Initializing codeatlas schema v{}", SCHEMA_VERSION);

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < SCHEMA_VERSION {
        info!(
            "Upgrading schema from v{} to v{}",
            current_version, SCHEMA_VERSION
        );
        apply_migrations(conn, current_version)?;
    }

    Ok(())
}

/// Apply migrations from current version to latest
fn apply_migrations(conn: &Connection, from_version: i32) -> Result<()> {
    for version in (from_version + 1)..=SCHEMA_VERSION {
        debug!("Applying migration v{}", version);
        match version {
            1 => create_v1_schema(conn)?,
            _ => unreachable!("Unknown schema version: {}", version),
        }

        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}

/// Create v1 schema (initial schema)
fn create_v1_schema(conn: &Connection) -> Result<()> {
    // Files table - one row per (repository, path); re-indexing upserts in place
    conn.execute(
        "CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id TEXT NOT NULL,
            path TEXT NOT NULL,
            content TEXT NOT NULL,
            language TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            indexed_at INTEGER NOT NULL,
            metadata TEXT,
            UNIQUE (repository_id, path)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_files_repository
         ON files(repository_id)",
        [],
    )?;

    // Symbols table - owned by their file, replaced wholesale on re-index
    conn.execute(
        "CREATE TABLE IF NOT EXISTS symbols (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            line_start INTEGER NOT NULL,
            line_end INTEGER NOT NULL,
            column_start INTEGER NOT NULL,
            column_end INTEGER NOT NULL,
            signature TEXT,
            documentation TEXT,
            is_exported INTEGER NOT NULL DEFAULT 0,
            is_async INTEGER,
            access_modifier TEXT,
            FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_symbols_file
         ON symbols(file_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_symbols_name
         ON symbols(name)",
        [],
    )?;

    // References table. The metadata hash keys the dedup rule: the same
    // physical reference re-submitted from a retried chunk must not create
    // a duplicate row.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS refs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id INTEGER NOT NULL,
            target_name TEXT NOT NULL,
            reference_type TEXT NOT NULL,
            line_number INTEGER NOT NULL,
            column_number INTEGER NOT NULL,
            metadata TEXT,
            metadata_hash TEXT NOT NULL,
            target_symbol_id INTEGER,
            target_file_path TEXT,
            FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE,
            UNIQUE (file_id, line_number, reference_type, metadata_hash)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_refs_file
         ON refs(file_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_refs_target
         ON refs(target_name, reference_type)",
        [],
    )?;

    // Dependency edges - derived data, at file and symbol granularity.
    // NULL sides make a plain UNIQUE constraint ineffective in SQLite, so
    // idempotency is enforced through a COALESCE expression index.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS dependency_edges (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id TEXT NOT NULL,
            from_file_id INTEGER,
            to_file_id INTEGER,
            from_symbol_id INTEGER,
            to_symbol_id INTEGER,
            dependency_type TEXT NOT NULL,
            metadata TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_edges_identity
         ON dependency_edges(
            repository_id,
            dependency_type,
            COALESCE(from_file_id, -1),
            COALESCE(to_file_id, -1),
            COALESCE(from_symbol_id, -1),
            COALESCE(to_symbol_id, -1)
         )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_edges_from_file
         ON dependency_edges(from_file_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_edges_to_file
         ON dependency_edges(to_file_id)",
        [],
    )?;

    // Index jobs - audit rows, mutated in place, never deleted
    conn.execute(
        "CREATE TABLE IF NOT EXISTS index_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repository_id TEXT NOT NULL,
            git_ref TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            started_at INTEGER,
            completed_at INTEGER,
            error_message TEXT,
            stats TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            commit_sha TEXT,
            created_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_jobs_repository_status
         ON index_jobs(repository_id, status)",
        [],
    )?;

    // Full-text search over file content
    conn.execute(
        "CREATE VIRTUAL TABLE IF NOT EXISTS files_fts USING fts5(
            path,
            content,
            content='files',
            content_rowid='id'
        )",
        [],
    )?;

    // Triggers to keep the FTS table in sync. files_fts is an external
    // content table, so deletions go through the special 'delete' command.
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS files_fts_insert AFTER INSERT ON files
         BEGIN
             INSERT INTO files_fts(rowid, path, content)
             VALUES (new.id, new.path, new.content);
         END",
        [],
    )?;

    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS files_fts_delete AFTER DELETE ON files
         BEGIN
             INSERT INTO files_fts(files_fts, rowid, path, content)
             VALUES ('delete', old.id, old.path, old.content);
         END",
        [],
    )?;

    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS files_fts_update AFTER UPDATE ON files
         BEGIN
             INSERT INTO files_fts(files_fts, rowid, path, content)
             VALUES ('delete', old.id, old.path, old.content);
             INSERT INTO files_fts(rowid, path, content)
             VALUES (new.id, new.path, new.content);
         END",
        [],
    )?;

    debug!("v1 schema created");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();

        assert!(tables.contains(&"files".to_string()));
        assert!(tables.contains(&"symbols".to_string()));
        assert!(tables.contains(&"refs".to_string()));
        assert!(tables.contains(&"dependency_edges".to_string()));
        assert!(tables.contains(&"index_jobs".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));
    }

    #[test]
    fn test_schema_version() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let version: i32 = conn
            .query_row(
                "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_idempotent_init() {
        let conn = Connection::open_in_memory().unwrap();

        // Init twice should not error
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let count: i32 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();

        assert_eq!(count, 1);
    }

    #[test]
    fn test_fts_triggers_track_file_rows() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO files (repository_id, path, content, language, size_bytes, indexed_at)
             VALUES ('r', 'src/a.ts', 'function greet() {}', 'typescript', 19, 0)",
            [],
        )
        .unwrap();

        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM files_fts WHERE files_fts MATCH 'greet'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);

        conn.execute("DELETE FROM files WHERE path = 'src/a.ts'", [])
            .unwrap();

        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM files_fts WHERE files_fts MATCH 'greet'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(hits, 0);
    }
}
