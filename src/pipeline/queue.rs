// Background job queue with retry and backoff

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::{CancelFlag, IndexingPipeline, PipelineError, SourceProvider};
use crate::store::db::{now, IndexStore};

/// Queue tuning knobs. Defaults follow the production policy: three
/// workers, three total attempts with 60s/120s backoff steps, a 24h expiry
/// window, and archival of completed entries after one hour.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub poll_interval: Duration,
    pub expiry: Duration,
    pub archive_after: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_attempts: 3,
            retry_delay: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
            expiry: Duration::from_secs(24 * 60 * 60),
            archive_after: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug)]
struct QueueEntry {
    repository_id: String,
    /// Unix seconds from the job row, for expiry checks
    created_at: i64,
    attempts: u32,
    next_attempt_at: Instant,
    running: bool,
    done_at: Option<Instant>,
}

#[derive(Default)]
struct QueueState {
    entries: HashMap<i64, QueueEntry>,
    running: usize,
}

/// Bounded-worker job queue driving the indexing pipeline.
///
/// Pending jobs are picked up from the store, each claimed by exactly one
/// worker through the store's atomic status transition. Failed jobs retry
/// with linear-multiple backoff (delay x attempt number) up to the attempt
/// cap; jobs past the expiry window are abandoned as failed; completed
/// entries are archived out of the active set after a grace period, with
/// their rows preserved.
pub struct JobQueue {
    store: IndexStore,
    pipeline: IndexingPipeline,
    provider: Box<dyn SourceProvider>,
    config: QueueConfig,
    cancel: CancelFlag,
    state: Mutex<QueueState>,
}

impl JobQueue {
    pub fn new(
        store: IndexStore,
        pipeline: IndexingPipeline,
        provider: Box<dyn SourceProvider>,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            pipeline,
            provider,
            config,
            cancel: CancelFlag::new(),
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Signal shutdown: running pipelines observe the flag between files
    /// and chunks, and the run loop drains before returning.
    pub fn shutdown(&self) {
        info!("Job queue shutdown requested");
        self.cancel.cancel();
    }

    /// Add a job to the active set immediately, ahead of the next poll.
    pub fn enqueue(&self, job_id: i64) -> Result<()> {
        let job = self
            .store
            .get_job(job_id)?
            .ok_or_else(|| anyhow::anyhow!("Index job {} not found", job_id))?;
        self.state.lock().entries.entry(job_id).or_insert(QueueEntry {
            repository_id: job.repository_id,
            created_at: job.created_at,
            attempts: 0,
            next_attempt_at: Instant::now(),
            running: false,
            done_at: None,
        });
        Ok(())
    }

    /// Run until shutdown. Spawns at most `concurrency` concurrent job
    /// executions; each runs the (blocking) pipeline on a worker thread.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        info!(
            "Job queue started with {} workers",
            self.config.concurrency
        );

        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut tick = tokio::time::interval(self.config.poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;
            if self.cancel.is_cancelled() {
                break;
            }

            if let Err(e) = self.sync_pending() {
                warn!("Failed to poll pending jobs: {e:#}");
            }
            self.sweep();

            while let Some(job_id) = self.claim_due() {
                let queue = Arc::clone(&self);
                tasks.spawn(async move { queue.execute(job_id).await });
            }

            // Reap finished executions without blocking the tick
            while tasks.try_join_next().is_some() {}
        }

        info!("Job queue draining {} in-flight jobs", tasks.len());
        while tasks.join_next().await.is_some() {}
        Ok(())
    }

    fn sync_pending(&self) -> Result<()> {
        let pending = self.store.pending_jobs()?;
        let mut state = self.state.lock();
        for job in pending {
            state.entries.entry(job.id).or_insert_with(|| {
                debug!("Queue picked up pending job {}", job.id);
                QueueEntry {
                    repository_id: job.repository_id,
                    created_at: job.created_at,
                    attempts: 0,
                    next_attempt_at: Instant::now(),
                    running: false,
                    done_at: None,
                }
            });
        }
        Ok(())
    }

    /// Expire stale entries and archive completed ones.
    fn sweep(&self) {
        let expiry_secs = self.config.expiry.as_secs() as i64;
        let mut expired = Vec::new();
        {
            let mut state = self.state.lock();
            let now_instant = Instant::now();
            state.entries.retain(|&job_id, entry| {
                if let Some(done_at) = entry.done_at {
                    if now_instant.duration_since(done_at) >= self.config.archive_after {
                        debug!("Archiving completed job {}", job_id);
                        return false;
                    }
                    return true;
                }
                if !entry.running && now() - entry.created_at >= expiry_secs {
                    expired.push(job_id);
                    return false;
                }
                true
            });
        }

        for job_id in expired {
            warn!("Job {} expired without completing; abandoning", job_id);
            if let Err(e) = self
                .store
                .fail_job(job_id, "Expired: not completed within the retry window")
            {
                warn!("Failed to mark job {} expired: {e:#}", job_id);
            }
        }
    }

    fn claim_due(&self) -> Option<i64> {
        let mut state = self.state.lock();
        if state.running >= self.config.concurrency {
            return None;
        }
        let now = Instant::now();
        let job_id = state
            .entries
            .iter()
            .filter(|(_, e)| !e.running && e.done_at.is_none() && e.next_attempt_at <= now)
            .map(|(&id, _)| id)
            .min()?;

        if let Some(entry) = state.entries.get_mut(&job_id) {
            entry.running = true;
        }
        state.running += 1;
        Some(job_id)
    }

    async fn execute(self: Arc<Self>, job_id: i64) {
        let repository_id = {
            let state = self.state.lock();
            state.entries.get(&job_id).map(|e| e.repository_id.clone())
        };
        let Some(repository_id) = repository_id else {
            let mut state = self.state.lock();
            state.running = state.running.saturating_sub(1);
            return;
        };

        let result = match self.provider.source_for(&repository_id) {
            Ok(source) => {
                let pipeline = self.pipeline.clone();
                let cancel = self.cancel.clone();
                tokio::task::spawn_blocking(move || {
                    pipeline.run_job(job_id, source.as_ref(), &cancel)
                })
                .await
            }
            Err(e) => {
                let message = format!("Repository unavailable: {e:#}");
                if let Err(fail_err) = self.store.fail_job(job_id, &message) {
                    warn!("Failed to record job failure: {fail_err:#}");
                }
                Ok(Err(PipelineError::Repository(message)))
            }
        };

        let mut state = self.state.lock();
        state.running = state.running.saturating_sub(1);
        let Some(entry) = state.entries.get_mut(&job_id) else {
            return;
        };
        entry.running = false;

        let mut remove = false;
        match result {
            Ok(Ok(stats)) => {
                info!(
                    "Job {} finished: {} files indexed",
                    job_id, stats.files_indexed
                );
                entry.done_at = Some(Instant::now());
            }
            Ok(Err(PipelineError::RepositoryBusy(repo))) => {
                // Another worker holds the repository; retry later without
                // consuming an attempt
                debug!("Job {} deferred, repository {} busy", job_id, repo);
                entry.next_attempt_at = Instant::now() + self.config.poll_interval * 4;
            }
            Ok(Err(err)) => {
                entry.attempts += 1;
                if entry.attempts >= self.config.max_attempts {
                    error!(
                        "Job {} failed permanently after {} attempts: {err}",
                        job_id, entry.attempts
                    );
                    remove = true;
                } else {
                    let delay = self.config.retry_delay * entry.attempts;
                    warn!(
                        "Job {} failed (attempt {}), retrying in {:?}: {err}",
                        job_id, entry.attempts, delay
                    );
                    entry.next_attempt_at = Instant::now() + delay;
                }
            }
            Err(join_err) => {
                entry.attempts += 1;
                error!("Job {} worker panicked: {join_err}", job_id);
                if entry.attempts >= self.config.max_attempts {
                    remove = true;
                } else {
                    let delay = self.config.retry_delay * entry.attempts;
                    entry.next_attempt_at = Instant::now() + delay;
                }
            }
        }

        if remove {
            state.entries.remove(&job_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::FsSourceProvider;
    use crate::store::JobStatus;
    use std::path::Path;
    use tempfile::tempdir;

    fn fast_config() -> QueueConfig {
        QueueConfig {
            concurrency: 2,
            max_attempts: 3,
            retry_delay: Duration::from_millis(20),
            poll_interval: Duration::from_millis(10),
            expiry: Duration::from_secs(3600),
            archive_after: Duration::from_secs(3600),
        }
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    async fn run_until<F: Fn() -> bool>(queue: &Arc<JobQueue>, done: F) {
        let handle = tokio::spawn(Arc::clone(queue).run());
        for _ in 0..300 {
            if done() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        queue.shutdown();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_queue_processes_pending_job() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        write(&repo, "src/a.ts", "export function a() {}\n");

        let store = IndexStore::new(dir.path().join("index.db")).unwrap();
        let pipeline = IndexingPipeline::new(store.clone(), 100);
        let provider = FsSourceProvider::single("repo", &repo, Vec::new());
        let queue = Arc::new(JobQueue::new(
            store.clone(),
            pipeline,
            Box::new(provider),
            fast_config(),
        ));

        let job_id = store.create_job("repo", "main", None).unwrap();

        let check_store = store.clone();
        run_until(&queue, move || {
            matches!(
                check_store.get_job(job_id).unwrap().unwrap().status,
                JobStatus::Completed
            )
        })
        .await;

        let job = store.get_job(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.stats.unwrap().files_indexed, 1);
    }

    #[tokio::test]
    async fn test_failing_job_retries_then_stays_failed() {
        let dir = tempdir().unwrap();
        // No repository checkout: every attempt is a precondition failure
        let store = IndexStore::new(dir.path().join("index.db")).unwrap();
        let pipeline = IndexingPipeline::new(store.clone(), 100);
        let provider =
            FsSourceProvider::single("repo", dir.path().join("missing"), Vec::new());
        let queue = Arc::new(JobQueue::new(
            store.clone(),
            pipeline,
            Box::new(provider),
            fast_config(),
        ));

        let job_id = store.create_job("repo", "main", None).unwrap();

        let check = Arc::clone(&queue);
        run_until(&queue, move || {
            // Permanently failed: the job reached a terminal Failed state and
            // its entry has been evicted from the active set. Requiring the
            // terminal status avoids matching the window before the queue has
            // picked the job up (when the entry is likewise absent).
            check.store.get_job(job_id).ok().flatten().map(|j| j.status)
                == Some(JobStatus::Failed)
                && !check.state.lock().entries.contains_key(&job_id)
        })
        .await;

        let job = store.get_job(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().contains("Repository unavailable"));
        assert!(!queue.state.lock().entries.contains_key(&job_id));
    }

    #[tokio::test]
    async fn test_expired_job_is_abandoned() {
        let dir = tempdir().unwrap();
        let store = IndexStore::new(dir.path().join("index.db")).unwrap();
        let pipeline = IndexingPipeline::new(store.clone(), 100);
        let provider = FsSourceProvider::single("repo", dir.path(), Vec::new());

        let mut config = fast_config();
        config.expiry = Duration::from_secs(0);
        let queue = Arc::new(JobQueue::new(
            store.clone(),
            pipeline,
            Box::new(provider),
            config,
        ));

        let job_id = store.create_job("repo", "main", None).unwrap();

        let check_store = store.clone();
        run_until(&queue, move || {
            matches!(
                check_store.get_job(job_id).unwrap().unwrap().status,
                JobStatus::Failed
            )
        })
        .await;

        let job = store.get_job(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().contains("Expired"));
    }
}
