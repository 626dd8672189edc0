use anyhow::Result;

use crate::config::Config;
use crate::query::engine::{Direction, QueryEngine};

use super::{open_store, repository_id};

pub async fn show_dependencies(
    file: String,
    project: String,
    repository: Option<String>,
    direction: String,
    depth: Option<usize>,
    include_cycles: bool,
) -> Result<()> {
    let config = Config::from_project_dir(&project);
    let repository = repository_id(&project, repository);
    let direction = Direction::parse(&direction)?;
    let depth = depth.unwrap_or(config.query.max_depth);

    let store = open_store(&project, &config)?;
    let engine = QueryEngine::new(store, config.query.max_limit);
    let report = engine.file_dependencies(&repository, &file, direction, depth, include_cycles)?;

    println!("Dependencies of {} (depth {}):", file, depth);
    println!("Direct ({}):", report.direct.len());
    for path in &report.direct {
        println!("  {}", path);
    }
    println!("Indirect ({}):", report.indirect.len());
    for path in &report.indirect {
        println!("  {}", path);
    }
    if include_cycles {
        println!("Cycles ({}):", report.cycles.len());
        for cycle in &report.cycles {
            println!("  {}", cycle.description);
        }
    }
    println!("Total: {}", report.count);

    Ok(())
}
