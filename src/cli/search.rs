use anyhow::Result;
use chrono::DateTime;

use crate::config::Config;
use crate::query::engine::QueryEngine;

use super::open_store;

pub async fn search_index(
    term: String,
    project: String,
    repository: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    let config = Config::from_project_dir(&project);
    let store = open_store(&project, &config)?;
    let engine = QueryEngine::new(store, config.query.max_limit);

    let limit = limit.unwrap_or(config.query.default_limit);
    let hits = engine.search(&term, repository.as_deref(), limit)?;

    if hits.is_empty() {
        println!("No matches for '{}'", term);
        return Ok(());
    }

    println!("{} match(es) for '{}':", hits.len(), term);
    for hit in hits {
        let indexed = DateTime::from_timestamp(hit.indexed_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| hit.indexed_at.to_string());
        println!("  {} [{}] (indexed {})", hit.file_path, hit.language, indexed);
        println!("    {}", hit.snippet.replace('\n', " "));
    }

    Ok(())
}
