use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::config::Config;
use crate::pipeline::queue::{JobQueue, QueueConfig};
use crate::pipeline::{FsSourceProvider, IndexingPipeline};

use super::{open_store, repository_id};

/// Run the background job queue until interrupted. Jobs created by other
/// processes (or a previous `index` run left pending) are picked up from
/// the store.
pub async fn run_queue(project: String, repository: Option<String>) -> Result<()> {
    let config = Config::from_project_dir(&project);
    let repository = repository_id(&project, repository);

    let store = open_store(&project, &config)?;
    let pipeline = IndexingPipeline::new(store.clone(), config.indexing.chunk_size);
    let provider =
        FsSourceProvider::single(&repository, &project, config.indexing.exclude.clone());

    let queue_config = QueueConfig {
        concurrency: config.queue.concurrency,
        max_attempts: config.queue.max_attempts,
        retry_delay: Duration::from_secs(config.queue.retry_delay_secs),
        poll_interval: Duration::from_millis(config.queue.poll_interval_ms),
        expiry: Duration::from_secs(config.queue.expiry_hours * 3600),
        archive_after: Duration::from_secs(config.queue.archive_after_secs),
    };

    println!("codeatlas queue");
    println!("Repository: {}", repository);
    println!("Workers: {}", queue_config.concurrency);
    println!("Press Ctrl+C to stop.");

    let queue = Arc::new(JobQueue::new(store, pipeline, Box::new(provider), queue_config));
    let runner = tokio::spawn(Arc::clone(&queue).run());

    tokio::signal::ctrl_c().await?;
    queue.shutdown();
    runner.await??;

    println!("Queue stopped.");
    Ok(())
}
