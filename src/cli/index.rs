use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::config::Config;
use crate::pipeline::{CancelFlag, FsFileSource, IndexingPipeline};

use super::{open_store, repository_id};

/// Single-shot indexing run: create a job and drive it to completion.
pub async fn index_project(
    project: String,
    repository: Option<String>,
    git_ref: String,
    commit: Option<String>,
    chunk_size: Option<usize>,
) -> Result<()> {
    let config = Config::from_project_dir(&project);
    let repository = repository_id(&project, repository);
    let chunk_size = chunk_size.unwrap_or(config.indexing.chunk_size);

    println!("codeatlas indexer");
    println!("Project: {}", project);
    println!("Repository: {}", repository);
    println!("Chunk size: {}", chunk_size);

    let store = open_store(&project, &config)?;
    let pipeline = IndexingPipeline::new(store.clone(), chunk_size);
    let source = FsFileSource::new(&project, config.indexing.exclude.clone());

    let job_id = store.create_job(&repository, &git_ref, commit.as_deref())?;
    info!("Created index job {}", job_id);

    // Ctrl+C cancels between files/chunks and leaves the job failed
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message(format!("Indexing {repository}..."));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = tokio::task::spawn_blocking(move || pipeline.run_job(job_id, &source, &cancel))
        .await?;
    spinner.finish_and_clear();

    let stats = result?;

    println!("\nIndexing complete (job {})", job_id);
    println!("Files indexed: {}", stats.files_indexed);
    println!("Symbols extracted: {}", stats.symbols_extracted);
    println!("References found: {}", stats.references_found);
    println!("Dependencies extracted: {}", stats.dependencies_extracted);
    if stats.files_skipped > 0 {
        println!("Files skipped: {}", stats.files_skipped);
    }
    if !stats.parse_errors.is_empty() {
        println!("Parse errors: {}", stats.parse_errors.len());
        for failure in &stats.parse_errors {
            println!("  - {}: {}", failure.path, failure.message);
        }
    }

    Ok(())
}
