// CLI command implementations

pub mod cycles;
pub mod deps;
pub mod index;
pub mod jobs;
pub mod queue;
pub mod search;
pub mod stats;

use std::path::Path;

use crate::config::Config;
use crate::store::db::IndexStore;

pub(crate) fn open_store(project: &str, config: &Config) -> anyhow::Result<IndexStore> {
    IndexStore::new(Path::new(project).join(&config.storage.db_path))
}

/// Repository id: explicit flag, or the project directory name.
pub(crate) fn repository_id(project: &str, explicit: Option<String>) -> String {
    explicit.unwrap_or_else(|| {
        Path::new(project)
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .unwrap_or_else(|| "default".to_string())
    })
}
