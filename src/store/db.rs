use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row, Transaction};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::schema::init_schema;
use super::{
    AccessModifier, DependencyLink, DependencyType, EdgeRecord, FileEntry, FileRecord, IndexCounts,
    IndexJob, IndexStats, JobStatus, Reference, Symbol, SymbolKey, SymbolKind, SymbolRecord,
};

/// Type alias for connection pool
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Id maps for one indexing run, passed explicitly through every storage
/// call of that run. A fresh `RunMaps` per run keeps chunked imports
/// consistent without any ambient state.
#[derive(Debug, Default)]
pub struct RunMaps {
    pub file_ids: HashMap<String, i64>,
    pub symbol_ids: HashMap<SymbolKey, i64>,
    /// First symbol seen per name; used to resolve reference targets.
    pub symbol_ids_by_name: HashMap<String, i64>,
}

/// A full-text search hit over file content.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub file_path: String,
    pub snippet: String,
    pub indexed_at: i64,
    pub language: String,
    pub repository_id: String,
}

/// Aggregate row counts across the whole store.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct StoreTotals {
    pub files: usize,
    pub symbols: usize,
    pub references: usize,
    pub dependency_edges: usize,
    pub jobs: usize,
}

/// Outcome of the atomic pending/failed -> processing transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    Started,
    /// Another job for the same repository is already processing.
    Busy,
    NotFound,
    /// The job itself is not in a startable state.
    InvalidState(JobStatus),
}

/// Database-backed index store
#[derive(Clone)]
pub struct IndexStore {
    pool: ConnectionPool,
    db_path: PathBuf,
}

impl IndexStore {
    /// Create or open a store
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        info!("Opening index store at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let manager = SqliteConnectionManager::file(&db_path).with_init(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")
        });

        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .context("Failed to create connection pool")?;

        {
            let conn = pool.get().context("Failed to get connection")?;
            init_schema(&conn).context("Failed to initialize schema")?;
        }

        Ok(Self { pool, db_path })
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().context("Failed to get connection from pool")
    }

    /// Persist one chunk of indexed data for a repository.
    ///
    /// Runs as a single transaction. Unless `skip_delete` is set, all prior
    /// data for the repository is cleared first (edges, refs, symbols, files,
    /// in that order). Files are upserted by `(repository_id, path)`; each
    /// upserted file's old symbols and refs are replaced wholesale, so a file
    /// never carries rows from two different parses. References dedup on
    /// `(file_id, line_number, reference_type, metadata_hash)` and edges on
    /// their identity index, which keeps retried chunks idempotent.
    pub fn store_indexed_data(
        &self,
        repository_id: &str,
        files: &[FileEntry],
        symbols: &[Symbol],
        references: &[Reference],
        links: &[DependencyLink],
        skip_delete: bool,
        maps: &mut RunMaps,
    ) -> Result<IndexCounts> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let now = now();

        if !skip_delete {
            debug!("Clearing previous index data for {}", repository_id);
            tx.execute(
                "DELETE FROM dependency_edges WHERE repository_id = ?1",
                [repository_id],
            )?;
            tx.execute(
                "DELETE FROM refs WHERE file_id IN
                    (SELECT id FROM files WHERE repository_id = ?1)",
                [repository_id],
            )?;
            tx.execute(
                "DELETE FROM symbols WHERE file_id IN
                    (SELECT id FROM files WHERE repository_id = ?1)",
                [repository_id],
            )?;
            tx.execute("DELETE FROM files WHERE repository_id = ?1", [repository_id])?;
        }

        let mut counts = IndexCounts::default();

        counts.files_indexed = upsert_files(&tx, repository_id, files, now, maps)?;
        counts.symbols_extracted = insert_symbols(&tx, symbols, maps)?;
        counts.references_found = insert_references(&tx, references, maps)?;
        counts.dependencies_extracted = insert_edges(&tx, repository_id, links, maps)?;

        tx.commit()?;

        debug!(
            "Stored chunk for {}: {} files, {} symbols, {} refs, {} edges",
            repository_id,
            counts.files_indexed,
            counts.symbols_extracted,
            counts.references_found,
            counts.dependencies_extracted
        );

        Ok(counts)
    }

    /// Full-text search over file content, optionally scoped to a repository.
    pub fn search(
        &self,
        term: &str,
        repository_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let expr = fts_match_expr(term);
        if expr.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT f.path, snippet(files_fts, 1, '[', ']', '…', 12),
                    f.indexed_at, f.language, f.repository_id
             FROM files_fts
             JOIN files f ON f.id = files_fts.rowid
             WHERE files_fts MATCH ?1
               AND (?2 IS NULL OR f.repository_id = ?2)
             ORDER BY rank
             LIMIT ?3",
        )?;

        let hits = stmt
            .query_map(params![expr, repository_id, limit as i64], |row| {
                Ok(SearchHit {
                    file_path: row.get(0)?,
                    snippet: row.get(1)?,
                    indexed_at: row.get(2)?,
                    language: row.get(3)?,
                    repository_id: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(hits)
    }

    /// Most recently indexed files across all repositories.
    pub fn list_recent_files(&self, limit: usize) -> Result<Vec<FileRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, repository_id, path, content, language, size_bytes, indexed_at, metadata
             FROM files ORDER BY indexed_at DESC, id DESC LIMIT ?1",
        )?;

        let files = stmt
            .query_map([limit as i64], |row| Ok(row_to_file(row)?))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(files)
    }

    pub fn file_id(&self, repository_id: &str, path: &str) -> Result<Option<i64>> {
        let conn = self.get_conn()?;
        let id = conn
            .query_row(
                "SELECT id FROM files WHERE repository_id = ?1 AND path = ?2",
                params![repository_id, path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Symbols stored for one file, ordered by position.
    pub fn symbols_by_file(&self, repository_id: &str, path: &str) -> Result<Vec<SymbolRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.file_id, s.name, s.kind, s.line_start, s.line_end,
                    s.column_start, s.column_end, s.signature, s.documentation,
                    s.is_exported, s.is_async, s.access_modifier
             FROM symbols s
             JOIN files f ON f.id = s.file_id
             WHERE f.repository_id = ?1 AND f.path = ?2
             ORDER BY s.line_start, s.column_start",
        )?;

        let symbols = stmt
            .query_map(params![repository_id, path], |row| Ok(row_to_symbol(row)?))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(symbols)
    }

    /// All dependency edges for a repository.
    pub fn edges_for_repository(&self, repository_id: &str) -> Result<Vec<EdgeRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, from_file_id, to_file_id, from_symbol_id, to_symbol_id,
                    dependency_type, metadata
             FROM dependency_edges WHERE repository_id = ?1",
        )?;

        let edges = stmt
            .query_map([repository_id], |row| {
                let type_str: String = row.get(5)?;
                Ok(EdgeRecord {
                    id: row.get(0)?,
                    from_file_id: row.get(1)?,
                    to_file_id: row.get(2)?,
                    from_symbol_id: row.get(3)?,
                    to_symbol_id: row.get(4)?,
                    dependency_type: DependencyType::parse(&type_str).unwrap(),
                    metadata: parse_metadata(row.get(6)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(edges)
    }

    pub fn file_paths_by_id(&self, repository_id: &str) -> Result<HashMap<i64, String>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT id, path FROM files WHERE repository_id = ?1")?;
        let map = stmt
            .query_map([repository_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;
        Ok(map)
    }

    pub fn symbol_names_by_id(&self, repository_id: &str) -> Result<HashMap<i64, String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.name FROM symbols s
             JOIN files f ON f.id = s.file_id
             WHERE f.repository_id = ?1",
        )?;
        let map = stmt
            .query_map([repository_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;
        Ok(map)
    }

    /// Aggregate row counts
    pub fn totals(&self) -> Result<StoreTotals> {
        let conn = self.get_conn()?;
        let count = |table: &str| -> Result<usize> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(StoreTotals {
            files: count("files")?,
            symbols: count("symbols")?,
            references: count("refs")?,
            dependency_edges: count("dependency_edges")?,
            jobs: count("index_jobs")?,
        })
    }

    // === Index jobs ===

    /// Create a new pending job. Rows are audit records and are never deleted.
    pub fn create_job(
        &self,
        repository_id: &str,
        git_ref: &str,
        commit_sha: Option<&str>,
    ) -> Result<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO index_jobs (repository_id, git_ref, status, retry_count, commit_sha, created_at)
             VALUES (?1, ?2, 'pending', 0, ?3, ?4)",
            params![repository_id, git_ref, commit_sha, now()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Atomically move a job into `processing`.
    ///
    /// The single conditional UPDATE enforces both legs of the state machine:
    /// only `pending` or `failed` jobs may start (a retry from `failed`
    /// increments `retry_count`), and a repository with another job already
    /// in `processing` rejects the transition without touching any row.
    pub fn try_begin(&self, job_id: i64) -> Result<BeginOutcome> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            "UPDATE index_jobs SET
                status = 'processing',
                started_at = ?2,
                completed_at = NULL,
                error_message = NULL,
                retry_count = CASE WHEN status = 'failed'
                                   THEN retry_count + 1 ELSE retry_count END
             WHERE id = ?1
               AND status IN ('pending', 'failed')
               AND NOT EXISTS (
                   SELECT 1 FROM index_jobs other
                   WHERE other.repository_id = index_jobs.repository_id
                     AND other.status = 'processing'
                     AND other.id != index_jobs.id)",
            params![job_id, now()],
        )?;

        if changed == 1 {
            return Ok(BeginOutcome::Started);
        }

        match self.get_job(job_id)? {
            None => Ok(BeginOutcome::NotFound),
            Some(job) if job.status == JobStatus::Pending || job.status == JobStatus::Failed => {
                Ok(BeginOutcome::Busy)
            }
            Some(job) => Ok(BeginOutcome::InvalidState(job.status)),
        }
    }

    /// Mark a processing job completed, attaching its stats.
    pub fn complete_job(&self, job_id: i64, stats: &IndexStats) -> Result<()> {
        let conn = self.get_conn()?;
        let stats_json = serde_json::to_string(stats)?;
        let changed = conn.execute(
            "UPDATE index_jobs SET status = 'completed', completed_at = ?2, stats = ?3
             WHERE id = ?1 AND status = 'processing'",
            params![job_id, now(), stats_json],
        )?;
        anyhow::ensure!(changed == 1, "Job {} is not processing", job_id);
        Ok(())
    }

    /// Mark a job failed with a descriptive error. Pending jobs may fail
    /// directly (precondition failures never enter `processing`).
    pub fn fail_job(&self, job_id: i64, error: &str) -> Result<()> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            "UPDATE index_jobs SET status = 'failed', completed_at = ?2, error_message = ?3
             WHERE id = ?1 AND status IN ('pending', 'processing')",
            params![job_id, now(), error],
        )?;
        if changed != 1 {
            warn!("fail_job: job {} was not pending/processing", job_id);
        }
        Ok(())
    }

    pub fn get_job(&self, job_id: i64) -> Result<Option<IndexJob>> {
        let conn = self.get_conn()?;
        let job = conn
            .query_row(
                "SELECT id, repository_id, git_ref, status, started_at, completed_at,
                        error_message, stats, retry_count, commit_sha, created_at
                 FROM index_jobs WHERE id = ?1",
                [job_id],
                |row| Ok(row_to_job(row)?),
            )
            .optional()?;
        Ok(job)
    }

    /// Pending jobs in creation order, for queue pickup.
    pub fn pending_jobs(&self) -> Result<Vec<IndexJob>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, repository_id, git_ref, status, started_at, completed_at,
                    error_message, stats, retry_count, commit_sha, created_at
             FROM index_jobs WHERE status = 'pending' ORDER BY created_at, id",
        )?;
        let jobs = stmt
            .query_map([], |row| Ok(row_to_job(row)?))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(jobs)
    }
}

fn upsert_files(
    tx: &Transaction,
    repository_id: &str,
    files: &[FileEntry],
    now: i64,
    maps: &mut RunMaps,
) -> Result<usize> {
    let mut upsert = tx.prepare(
        "INSERT INTO files (repository_id, path, content, language, size_bytes, indexed_at, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(repository_id, path) DO UPDATE SET
             content = excluded.content,
             language = excluded.language,
             size_bytes = excluded.size_bytes,
             indexed_at = excluded.indexed_at,
             metadata = excluded.metadata",
    )?;
    let mut select_id = tx.prepare("SELECT id FROM files WHERE repository_id = ?1 AND path = ?2")?;
    let mut clear_symbols = tx.prepare("DELETE FROM symbols WHERE file_id = ?1")?;
    let mut clear_refs = tx.prepare("DELETE FROM refs WHERE file_id = ?1")?;

    let mut indexed = 0usize;
    for file in files {
        upsert.execute(params![
            repository_id,
            file.path,
            file.content,
            file.language,
            file.content.len() as i64,
            now,
            file.metadata.to_string(),
        ])?;

        let file_id: i64 =
            select_id.query_row(params![repository_id, file.path], |row| row.get(0))?;

        // Per-file replacement: a file's symbol/ref set always reflects
        // exactly one parse of its content.
        clear_symbols.execute([file_id])?;
        clear_refs.execute([file_id])?;

        maps.file_ids.insert(file.path.clone(), file_id);
        indexed += 1;
    }

    Ok(indexed)
}

fn insert_symbols(tx: &Transaction, symbols: &[Symbol], maps: &mut RunMaps) -> Result<usize> {
    let mut insert = tx.prepare(
        "INSERT INTO symbols (file_id, name, kind, line_start, line_end, column_start,
                              column_end, signature, documentation, is_exported, is_async,
                              access_modifier)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )?;

    let mut inserted = 0usize;
    for symbol in symbols {
        let Some(&file_id) = maps.file_ids.get(&symbol.file_path) else {
            warn!("Symbol {} references unknown file {}", symbol.name, symbol.file_path);
            continue;
        };

        insert.execute(params![
            file_id,
            symbol.name,
            symbol.kind.as_str(),
            symbol.line_start,
            symbol.line_end,
            symbol.column_start,
            symbol.column_end,
            symbol.signature,
            symbol.documentation,
            symbol.is_exported,
            symbol.is_async,
            symbol.access_modifier.map(|m| m.as_str()),
        ])?;

        let id = tx.last_insert_rowid();
        maps.symbol_ids.insert(SymbolKey::of(symbol), id);
        maps.symbol_ids_by_name
            .entry(symbol.name.clone())
            .or_insert(id);
        inserted += 1;
    }

    Ok(inserted)
}

fn insert_references(
    tx: &Transaction,
    references: &[Reference],
    maps: &mut RunMaps,
) -> Result<usize> {
    let mut insert = tx.prepare(
        "INSERT INTO refs (file_id, target_name, reference_type, line_number, column_number,
                           metadata, metadata_hash, target_symbol_id, target_file_path)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(file_id, line_number, reference_type, metadata_hash) DO NOTHING",
    )?;

    let mut inserted = 0usize;
    for reference in references {
        let Some(&file_id) = maps.file_ids.get(&reference.file_path) else {
            warn!(
                "Reference to {} comes from unknown file {}",
                reference.target_name, reference.file_path
            );
            continue;
        };

        let target_symbol_id = maps.symbol_ids_by_name.get(&reference.target_name).copied();

        inserted += insert.execute(params![
            file_id,
            reference.target_name,
            reference.kind.as_str(),
            reference.line_number,
            reference.column_number,
            reference.metadata.to_string(),
            metadata_hash(&reference.metadata),
            target_symbol_id,
            reference.target_file_path,
        ])?;
    }

    Ok(inserted)
}

fn insert_edges(
    tx: &Transaction,
    repository_id: &str,
    links: &[DependencyLink],
    maps: &RunMaps,
) -> Result<usize> {
    let mut insert = tx.prepare(
        "INSERT OR IGNORE INTO dependency_edges
             (repository_id, from_file_id, to_file_id, from_symbol_id, to_symbol_id,
              dependency_type, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;

    let mut inserted = 0usize;
    for link in links {
        let from_file_id = link.from_file.as_ref().and_then(|p| maps.file_ids.get(p)).copied();
        let to_file_id = link.to_file.as_ref().and_then(|p| maps.file_ids.get(p)).copied();
        let from_symbol_id = link
            .from_symbol
            .as_ref()
            .and_then(|k| maps.symbol_ids.get(k))
            .copied();
        let to_symbol_id = link
            .to_symbol
            .as_ref()
            .and_then(|k| maps.symbol_ids.get(k))
            .copied();

        let file_pair = from_file_id.is_some() && to_file_id.is_some();
        let symbol_pair = from_symbol_id.is_some() && to_symbol_id.is_some();
        if !file_pair && !symbol_pair {
            continue;
        }

        inserted += insert.execute(params![
            repository_id,
            from_file_id,
            to_file_id,
            from_symbol_id,
            to_symbol_id,
            link.dependency_type.as_str(),
            link.metadata.to_string(),
        ])?;
    }

    Ok(inserted)
}

/// Hash of a canonical metadata rendering, used in the reference dedup key.
///
/// Canonical form: JSON with object keys emitted in sorted order at every
/// nesting level, so the hash is stable across submissions regardless of how
/// the metadata map was built.
pub fn metadata_hash(metadata: &Value) -> String {
    let mut out = String::new();
    write_canonical(metadata, &mut out);
    blake3::hash(out.as_bytes()).to_hex().to_string()
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Quote a search term for FTS5 MATCH: each whitespace token becomes a
/// quoted string so user input is never parsed as query syntax.
fn fts_match_expr(term: &str) -> String {
    term.split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_metadata(raw: Option<String>) -> Value {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(Value::Null)
}

fn row_to_file(row: &Row) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        path: row.get(2)?,
        content: row.get(3)?,
        language: row.get(4)?,
        size_bytes: row.get(5)?,
        indexed_at: row.get(6)?,
        metadata: parse_metadata(row.get(7)?),
    })
}

fn row_to_symbol(row: &Row) -> rusqlite::Result<SymbolRecord> {
    let kind_str: String = row.get(3)?;
    let modifier: Option<String> = row.get(12)?;

    Ok(SymbolRecord {
        id: row.get(0)?,
        file_id: row.get(1)?,
        name: row.get(2)?,
        kind: SymbolKind::parse(&kind_str).unwrap(),
        line_start: row.get(4)?,
        line_end: row.get(5)?,
        column_start: row.get(6)?,
        column_end: row.get(7)?,
        signature: row.get(8)?,
        documentation: row.get(9)?,
        is_exported: row.get(10)?,
        is_async: row.get(11)?,
        access_modifier: modifier.map(|m| AccessModifier::parse(&m).unwrap()),
    })
}

fn row_to_job(row: &Row) -> rusqlite::Result<IndexJob> {
    let status_str: String = row.get(3)?;
    let stats_raw: Option<String> = row.get(7)?;

    Ok(IndexJob {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        git_ref: row.get(2)?,
        status: JobStatus::parse(&status_str).unwrap(),
        started_at: row.get(4)?,
        completed_at: row.get(5)?,
        error_message: row.get(6)?,
        stats: stats_raw.and_then(|s| serde_json::from_str(&s).ok()),
        retry_count: row.get(8)?,
        commit_sha: row.get(9)?,
        created_at: row.get(10)?,
    })
}

/// Current timestamp in unix seconds
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
