use anyhow::Result;

use crate::config::Config;
use crate::query::engine::QueryEngine;
use crate::store::DependencyType;

use super::{open_store, repository_id};

pub async fn show_cycles(project: String, repository: Option<String>) -> Result<()> {
    let config = Config::from_project_dir(&project);
    let repository = repository_id(&project, repository);

    let store = open_store(&project, &config)?;
    let engine = QueryEngine::new(store, config.query.max_limit);
    let chains = engine.repository_cycles(&repository)?;

    if chains.is_empty() {
        println!("No circular dependencies in {}", repository);
        return Ok(());
    }

    let file_cycles: Vec<_> = chains
        .iter()
        .filter(|c| c.dependency_type == DependencyType::FileImport)
        .collect();
    let symbol_cycles: Vec<_> = chains
        .iter()
        .filter(|c| c.dependency_type == DependencyType::SymbolUsage)
        .collect();

    println!("{} circular dependency chain(s) in {}:", chains.len(), repository);
    if !file_cycles.is_empty() {
        println!("File imports ({}):", file_cycles.len());
        for cycle in file_cycles {
            println!("  {}", cycle.description);
        }
    }
    if !symbol_cycles.is_empty() {
        println!("Symbol usage ({}):", symbol_cycles.len());
        for cycle in symbol_cycles {
            println!("  {}", cycle.description);
        }
    }

    Ok(())
}
