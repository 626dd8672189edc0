// Storage engine: data model, schema and SQLite access

pub mod db;
pub mod schema;

use serde::{Deserialize, Serialize};

/// A source file submitted for indexing, before row ids are assigned.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: String,
    pub content: String,
    pub language: String,
    pub metadata: serde_json::Value,
}

/// A named entity extracted from one file.
///
/// Lines are 1-indexed, columns 0-indexed. `file_path` keys the symbol to its
/// owning file until the store assigns row ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub file_path: String,
    pub name: String,
    pub kind: SymbolKind,
    pub line_start: u32,
    pub line_end: u32,
    pub column_start: u32,
    pub column_end: u32,
    pub signature: Option<String>,
    pub documentation: Option<String>,
    pub is_exported: bool,
    pub is_async: Option<bool>,
    pub access_modifier: Option<AccessModifier>,
}

/// Symbol kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    TypeAlias,
    Variable,
    Constant,
    Method,
    Property,
    Enum,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::TypeAlias => "type",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Method => "method",
            SymbolKind::Property => "property",
            SymbolKind::Enum => "enum",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "function" => Ok(SymbolKind::Function),
            "class" => Ok(SymbolKind::Class),
            "interface" => Ok(SymbolKind::Interface),
            "type" => Ok(SymbolKind::TypeAlias),
            "variable" => Ok(SymbolKind::Variable),
            "constant" => Ok(SymbolKind::Constant),
            "method" => Ok(SymbolKind::Method),
            "property" => Ok(SymbolKind::Property),
            "enum" => Ok(SymbolKind::Enum),
            _ => anyhow::bail!("Unknown symbol kind: {}", s),
        }
    }
}

/// Class member visibility
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccessModifier {
    Public,
    Private,
    Protected,
}

impl AccessModifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessModifier::Public => "public",
            AccessModifier::Private => "private",
            AccessModifier::Protected => "protected",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "public" => Ok(AccessModifier::Public),
            "private" => Ok(AccessModifier::Private),
            "protected" => Ok(AccessModifier::Protected),
            _ => anyhow::bail!("Unknown access modifier: {}", s),
        }
    }
}

/// A located usage of a name within a file.
///
/// `target_file_path` is filled in by the dependency graph builder when an
/// import resolves to a repository file; `target_symbol_id` resolution
/// happens at storage time through the run-scoped name map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub file_path: String,
    pub target_name: String,
    pub kind: ReferenceType,
    pub line_number: u32,
    pub column_number: u32,
    pub metadata: serde_json::Value,
    pub target_file_path: Option<String>,
}

/// Reference kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Import,
    Call,
    PropertyAccess,
    TypeReference,
    Extends,
    Implements,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Import => "import",
            ReferenceType::Call => "call",
            ReferenceType::PropertyAccess => "property_access",
            ReferenceType::TypeReference => "type_reference",
            ReferenceType::Extends => "extends",
            ReferenceType::Implements => "implements",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "import" => Ok(ReferenceType::Import),
            "call" => Ok(ReferenceType::Call),
            "property_access" => Ok(ReferenceType::PropertyAccess),
            "type_reference" => Ok(ReferenceType::TypeReference),
            "extends" => Ok(ReferenceType::Extends),
            "implements" => Ok(ReferenceType::Implements),
            _ => anyhow::bail!("Unknown reference type: {}", s),
        }
    }
}

/// Dependency edge granularity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    FileImport,
    SymbolUsage,
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyType::FileImport => "file_import",
            DependencyType::SymbolUsage => "symbol_usage",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "file_import" => Ok(DependencyType::FileImport),
            "symbol_usage" => Ok(DependencyType::SymbolUsage),
            _ => anyhow::bail!("Unknown dependency type: {}", s),
        }
    }
}

/// Identifies one extracted symbol within an indexing run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolKey {
    pub file_path: String,
    pub name: String,
    pub line_start: u32,
}

impl SymbolKey {
    pub fn of(symbol: &Symbol) -> Self {
        Self {
            file_path: symbol.file_path.clone(),
            name: symbol.name.clone(),
            line_start: symbol.line_start,
        }
    }
}

/// A dependency edge before row ids are assigned. The store resolves the
/// path / symbol-key sides to row ids through the run-scoped maps; a link
/// where neither pair resolves is dropped.
#[derive(Debug, Clone)]
pub struct DependencyLink {
    pub from_file: Option<String>,
    pub to_file: Option<String>,
    pub from_symbol: Option<SymbolKey>,
    pub to_symbol: Option<SymbolKey>,
    pub dependency_type: DependencyType,
    pub metadata: serde_json::Value,
}

/// A stored file row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub repository_id: String,
    pub path: String,
    pub content: String,
    pub language: String,
    pub size_bytes: i64,
    pub indexed_at: i64,
    pub metadata: serde_json::Value,
}

/// A stored symbol row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub id: i64,
    pub file_id: i64,
    pub name: String,
    pub kind: SymbolKind,
    pub line_start: u32,
    pub line_end: u32,
    pub column_start: u32,
    pub column_end: u32,
    pub signature: Option<String>,
    pub documentation: Option<String>,
    pub is_exported: bool,
    pub is_async: Option<bool>,
    pub access_modifier: Option<AccessModifier>,
}

/// A stored dependency edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: i64,
    pub from_file_id: Option<i64>,
    pub to_file_id: Option<i64>,
    pub from_symbol_id: Option<i64>,
    pub to_symbol_id: Option<i64>,
    pub dependency_type: DependencyType,
    pub metadata: serde_json::Value,
}

/// Job lifecycle states
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => anyhow::bail!("Unknown job status: {}", s),
        }
    }
}

/// One attempt to (re)index a repository at a given ref. Rows are mutated in
/// place as the job progresses and are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexJob {
    pub id: i64,
    pub repository_id: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub status: JobStatus,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub error_message: Option<String>,
    pub stats: Option<IndexStats>,
    pub retry_count: i64,
    pub commit_sha: Option<String>,
    pub created_at: i64,
}

/// Row counts written by one `store_indexed_data` call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexCounts {
    pub files_indexed: usize,
    pub symbols_extracted: usize,
    pub references_found: usize,
    pub dependencies_extracted: usize,
}

impl IndexCounts {
    pub fn merge(&mut self, other: IndexCounts) {
        self.files_indexed += other.files_indexed;
        self.symbols_extracted += other.symbols_extracted;
        self.references_found += other.references_found;
        self.dependencies_extracted += other.dependencies_extracted;
    }
}

/// A per-file parse failure absorbed into job stats.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParseFailure {
    pub path: String,
    pub message: String,
}

/// Aggregate outcome of one indexing run, persisted on completed jobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub files_indexed: usize,
    pub symbols_extracted: usize,
    pub references_found: usize,
    pub dependencies_extracted: usize,
    pub files_skipped: usize,
    pub parse_errors: Vec<ParseFailure>,
}

impl IndexStats {
    pub fn from_counts(counts: IndexCounts) -> Self {
        Self {
            files_indexed: counts.files_indexed,
            symbols_extracted: counts.symbols_extracted,
            references_found: counts.references_found,
            dependencies_extracted: counts.dependencies_extracted,
            ..Default::default()
        }
    }
}
