use anyhow::Result;
use chrono::DateTime;

use crate::config::Config;

use super::open_store;

pub async fn show_stats(project: String, verbose: bool) -> Result<()> {
    let config = Config::from_project_dir(&project);
    let store = open_store(&project, &config)?;
    let totals = store.totals()?;

    println!("codeatlas index statistics");
    println!("Files: {}", totals.files);
    println!("Symbols: {}", totals.symbols);
    println!("References: {}", totals.references);
    println!("Dependency edges: {}", totals.dependency_edges);
    println!("Index jobs: {}", totals.jobs);

    if verbose {
        let recent = store.list_recent_files(10)?;
        if !recent.is_empty() {
            println!("\nRecently indexed:");
            for file in recent {
                let indexed = DateTime::from_timestamp(file.indexed_at, 0)
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| file.indexed_at.to_string());
                println!(
                    "  {} [{}] {} bytes (indexed {})",
                    file.path, file.language, file.size_bytes, indexed
                );
            }
        }
    }

    Ok(())
}
