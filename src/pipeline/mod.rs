// Indexing pipeline and job queue

pub mod queue;
pub mod source;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::extract::references::extract_references;
use crate::extract::symbols::extract_symbols;
use crate::graph::build_dependency_graph;
use crate::parser::{ParseOutcome, SourceParser};
use crate::store::db::{BeginOutcome, IndexStore, RunMaps};
use crate::store::{FileEntry, IndexCounts, IndexStats, JobStatus, ParseFailure};
pub use self::source::{FileSource, FsFileSource, FsSourceProvider, SourceFile, SourceProvider};

/// Job-level failure taxonomy. Per-file problems are absorbed into stats;
/// only these propagate to job status.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Index job {0} not found")]
    JobNotFound(i64),
    #[error("Repository {0} already has a job in progress")]
    RepositoryBusy(String),
    #[error("Job {job_id} cannot start from status {status:?}")]
    InvalidState { job_id: i64, status: JobStatus },
    #[error("{0}")]
    Repository(String),
    #[error("Indexing cancelled")]
    Cancelled,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Shared cancellation signal, observed between files and between chunks.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// End-to-end indexing orchestrator: parse, extract, build the dependency
/// graph, and write storage in chunks.
#[derive(Clone)]
pub struct IndexingPipeline {
    store: IndexStore,
    parser: SourceParser,
    chunk_size: usize,
}

impl IndexingPipeline {
    pub fn new(store: IndexStore, chunk_size: usize) -> Self {
        Self {
            store,
            parser: SourceParser::new(),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Run one index job to completion.
    ///
    /// Precondition failures (missing job, unavailable repository) fail the
    /// job without entering `processing`; a busy repository fails fast
    /// without touching any row. Everything after `try_begin` either
    /// completes the job with stats or fails it with a descriptive error -
    /// a job is never silently abandoned.
    pub fn run_job(
        &self,
        job_id: i64,
        source: &dyn FileSource,
        cancel: &CancelFlag,
    ) -> Result<IndexStats, PipelineError> {
        let job = self
            .store
            .get_job(job_id)
            .map_err(PipelineError::Storage)?
            .ok_or(PipelineError::JobNotFound(job_id))?;
        let repository_id = job.repository_id.clone();

        let source_files = match source.list_files() {
            Ok(files) => files,
            Err(e) => {
                let message = format!("Repository unavailable: {e:#}");
                if let Err(fail_err) = self.store.fail_job(job_id, &message) {
                    warn!("Failed to record job failure: {fail_err:#}");
                }
                return Err(PipelineError::Repository(message));
            }
        };

        match self.store.try_begin(job_id).map_err(PipelineError::Storage)? {
            BeginOutcome::Started => {}
            BeginOutcome::Busy => return Err(PipelineError::RepositoryBusy(repository_id)),
            BeginOutcome::NotFound => return Err(PipelineError::JobNotFound(job_id)),
            BeginOutcome::InvalidState(status) => {
                return Err(PipelineError::InvalidState { job_id, status })
            }
        }

        info!(
            "Indexing {} ({} files) for job {}",
            repository_id,
            source_files.len(),
            job_id
        );

        match self.index_repository(&repository_id, source_files, cancel) {
            Ok(stats) => {
                self.store
                    .complete_job(job_id, &stats)
                    .map_err(PipelineError::Storage)?;
                info!(
                    "Job {} completed: {} files, {} symbols, {} references, {} edges",
                    job_id,
                    stats.files_indexed,
                    stats.symbols_extracted,
                    stats.references_found,
                    stats.dependencies_extracted
                );
                Ok(stats)
            }
            Err(err) => {
                let message = err.to_string();
                if let Err(fail_err) = self.store.fail_job(job_id, &message) {
                    warn!("Failed to record job failure: {fail_err:#}");
                }
                Err(err)
            }
        }
    }

    fn index_repository(
        &self,
        repository_id: &str,
        source_files: Vec<SourceFile>,
        cancel: &CancelFlag,
    ) -> Result<IndexStats, PipelineError> {
        let mut files = Vec::new();
        let mut symbols = Vec::new();
        let mut references = Vec::new();
        let mut parse_errors: Vec<ParseFailure> = Vec::new();
        let mut files_skipped = 0usize;

        for source_file in source_files {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            match self.parser.parse(&source_file.path, &source_file.content) {
                ParseOutcome::Parsed(parsed) => {
                    symbols.extend(extract_symbols(
                        &parsed,
                        &source_file.content,
                        &source_file.path,
                    ));
                    references.extend(extract_references(
                        &parsed,
                        &source_file.content,
                        &source_file.path,
                    ));
                    files.push(FileEntry {
                        path: source_file.path,
                        content: source_file.content,
                        language: parsed.language.as_str().to_string(),
                        metadata: json!({}),
                    });
                }
                ParseOutcome::Failed(error) => {
                    // Parse errors are per-file and non-fatal: the file is
                    // skipped for extraction but still stored for search.
                    warn!("Parse error in {}: {}", source_file.path, error.message);
                    parse_errors.push(ParseFailure {
                        path: source_file.path.clone(),
                        message: error.message,
                    });
                    files.push(FileEntry {
                        path: source_file.path,
                        content: source_file.content,
                        language: source_file
                            .language
                            .unwrap_or_else(|| "unknown".to_string()),
                        metadata: json!({ "parse_error": true }),
                    });
                }
                ParseOutcome::Unsupported => {
                    debug!("Unsupported file stored content-only: {}", source_file.path);
                    files_skipped += 1;
                    files.push(FileEntry {
                        path: source_file.path,
                        content: source_file.content,
                        language: source_file
                            .language
                            .unwrap_or_else(|| "unknown".to_string()),
                        metadata: json!({}),
                    });
                }
            }
        }

        // Barrier: the graph is built once over the complete extraction
        let links = build_dependency_graph(&files, &symbols, &mut references);

        let mut maps = RunMaps::default();
        let mut counts = IndexCounts::default();

        if files.is_empty() {
            // Still clear stale state from any previous run
            self.store
                .store_indexed_data(repository_id, &[], &[], &[], &[], false, &mut maps)
                .map_err(PipelineError::Storage)?;
        }

        let chunk_count = files.len().div_ceil(self.chunk_size);
        for (i, chunk) in files.chunks(self.chunk_size).enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let chunk_paths: HashSet<&str> = chunk.iter().map(|f| f.path.as_str()).collect();
            let chunk_symbols: Vec<_> = symbols
                .iter()
                .filter(|s| chunk_paths.contains(s.file_path.as_str()))
                .cloned()
                .collect();
            let chunk_references: Vec<_> = references
                .iter()
                .filter(|r| chunk_paths.contains(r.file_path.as_str()))
                .cloned()
                .collect();
            // Edges land with the final chunk, once both endpoints have ids
            let chunk_links = if i + 1 == chunk_count { &links[..] } else { &[] };

            let chunk_counts = self
                .store
                .store_indexed_data(
                    repository_id,
                    chunk,
                    &chunk_symbols,
                    &chunk_references,
                    chunk_links,
                    i > 0,
                    &mut maps,
                )
                .map_err(PipelineError::Storage)?;
            counts.merge(chunk_counts);

            debug!(
                "Chunk {}/{} stored for {}",
                i + 1,
                chunk_count,
                repository_id
            );
        }

        let mut stats = IndexStats::from_counts(counts);
        stats.files_skipped = files_skipped;
        stats.parse_errors = parse_errors;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DependencyType;
    use std::path::Path;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn fixture_repo(root: &Path) {
        write(
            root,
            "src/util.ts",
            "export function helper(x: number): number {\n  return x * 2;\n}\n",
        );
        write(
            root,
            "src/main.ts",
            "import { helper } from './util';\n\nexport function run() {\n  return helper(21);\n}\n",
        );
    }

    fn setup(root: &Path, chunk_size: usize) -> (IndexStore, IndexingPipeline) {
        let store = IndexStore::new(root.join("index.db")).unwrap();
        let pipeline = IndexingPipeline::new(store.clone(), chunk_size);
        (store, pipeline)
    }

    #[test]
    fn test_end_to_end_indexing() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        fixture_repo(&repo);

        let (store, pipeline) = setup(dir.path(), 100);
        let job_id = store.create_job("repo", "main", None).unwrap();
        let source = FsFileSource::new(&repo, Vec::new());

        let stats = pipeline
            .run_job(job_id, &source, &CancelFlag::new())
            .unwrap();

        assert_eq!(stats.files_indexed, 2);
        assert!(stats.symbols_extracted >= 2);
        assert!(stats.references_found >= 2);
        assert!(stats.dependencies_extracted >= 1);
        assert!(stats.parse_errors.is_empty());

        let job = store.get_job(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
        assert_eq!(job.stats.unwrap().files_indexed, 2);

        // The import produced a file-level edge
        let edges = store.edges_for_repository("repo").unwrap();
        assert!(edges
            .iter()
            .any(|e| e.dependency_type == DependencyType::FileImport));
        // And the cross-file call produced a symbol-level edge
        assert!(edges
            .iter()
            .any(|e| e.dependency_type == DependencyType::SymbolUsage));
    }

    #[test]
    fn test_parse_failure_isolation() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        for i in 0..9 {
            write(
                &repo,
                &format!("src/mod{i}.ts"),
                &format!("export function fn{i}() {{ return {i}; }}\n"),
            );
        }
        write(&repo, "src/broken.ts", "function ( {{{\n");

        let (store, pipeline) = setup(dir.path(), 100);
        let job_id = store.create_job("repo", "main", None).unwrap();
        let source = FsFileSource::new(&repo, Vec::new());

        let stats = pipeline
            .run_job(job_id, &source, &CancelFlag::new())
            .unwrap();

        assert_eq!(stats.files_indexed, 10);
        assert_eq!(stats.parse_errors.len(), 1);
        assert_eq!(stats.parse_errors[0].path, "src/broken.ts");

        let job = store.get_job(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);

        // The broken file contributed no symbols but is searchable
        assert!(store.symbols_by_file("repo", "src/broken.ts").unwrap().is_empty());
        assert_eq!(store.symbols_by_file("repo", "src/mod3.ts").unwrap().len(), 1);
        assert!(!store.search("function", Some("repo"), 20).unwrap().is_empty());
    }

    #[test]
    fn test_chunked_indexing_matches_single_shot() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        let repo_a = dir_a.path().join("repo");
        let repo_b = dir_b.path().join("repo");
        for root in [&repo_a, &repo_b] {
            fixture_repo(root);
            write(
                root,
                "src/extra.ts",
                "import { helper } from './util';\nexport const twice = (n: number) => helper(n);\n",
            );
        }

        let (store_a, pipeline_a) = setup(dir_a.path(), 100);
        let (store_b, pipeline_b) = setup(dir_b.path(), 1);

        let job_a = store_a.create_job("repo", "main", None).unwrap();
        let job_b = store_b.create_job("repo", "main", None).unwrap();

        let stats_a = pipeline_a
            .run_job(job_a, &FsFileSource::new(&repo_a, Vec::new()), &CancelFlag::new())
            .unwrap();
        let stats_b = pipeline_b
            .run_job(job_b, &FsFileSource::new(&repo_b, Vec::new()), &CancelFlag::new())
            .unwrap();

        assert_eq!(stats_a.files_indexed, stats_b.files_indexed);
        assert_eq!(stats_a.symbols_extracted, stats_b.symbols_extracted);
        assert_eq!(stats_a.references_found, stats_b.references_found);
        assert_eq!(stats_a.dependencies_extracted, stats_b.dependencies_extracted);

        // Same dependency graph, compared by path pairs
        let edge_paths = |store: &IndexStore| -> Vec<(String, String, String)> {
            let paths = store.file_paths_by_id("repo").unwrap();
            let mut out: Vec<_> = store
                .edges_for_repository("repo")
                .unwrap()
                .into_iter()
                .filter_map(|e| {
                    Some((
                        e.dependency_type.as_str().to_string(),
                        paths.get(&e.from_file_id?)?.clone(),
                        paths.get(&e.to_file_id?)?.clone(),
                    ))
                })
                .collect();
            out.sort();
            out
        };
        assert_eq!(edge_paths(&store_a), edge_paths(&store_b));
    }

    #[test]
    fn test_reindex_is_idempotent_end_to_end() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        fixture_repo(&repo);

        let (store, pipeline) = setup(dir.path(), 100);
        let source = FsFileSource::new(&repo, Vec::new());

        let job_1 = store.create_job("repo", "main", None).unwrap();
        let stats_1 = pipeline.run_job(job_1, &source, &CancelFlag::new()).unwrap();

        let job_2 = store.create_job("repo", "main", None).unwrap();
        let stats_2 = pipeline.run_job(job_2, &source, &CancelFlag::new()).unwrap();

        assert_eq!(stats_1.files_indexed, stats_2.files_indexed);
        assert_eq!(stats_1.symbols_extracted, stats_2.symbols_extracted);
        assert_eq!(stats_1.references_found, stats_2.references_found);
        assert_eq!(stats_1.dependencies_extracted, stats_2.dependencies_extracted);

        let totals = store.totals().unwrap();
        assert_eq!(totals.files, 2);
    }

    #[test]
    fn test_import_cycle_round_trip() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        write(&repo, "a.ts", "import './b';\nexport const a = 1;\n");
        write(&repo, "b.ts", "import './c';\nexport const b = 2;\n");
        write(&repo, "c.ts", "import './a';\nexport const c = 3;\n");

        let (store, pipeline) = setup(dir.path(), 100);
        let job_id = store.create_job("repo", "main", None).unwrap();
        pipeline
            .run_job(job_id, &FsFileSource::new(&repo, Vec::new()), &CancelFlag::new())
            .unwrap();

        let engine = crate::query::engine::QueryEngine::new(store, 100);
        let chains: Vec<_> = engine
            .repository_cycles("repo")
            .unwrap()
            .into_iter()
            .filter(|c| c.dependency_type == DependencyType::FileImport)
            .collect();

        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].chain.len(), 4);
        assert_eq!(chains[0].chain.first(), chains[0].chain.last());
        for path in ["a.ts", "b.ts", "c.ts"] {
            assert!(chains[0].description.contains(path));
        }
    }

    #[test]
    fn test_recursive_function_self_loop() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        write(
            &repo,
            "fact.ts",
            "export function fact(n: number): number {\n  return n <= 1 ? 1 : n * fact(n - 1);\n}\n",
        );

        let (store, pipeline) = setup(dir.path(), 100);
        let job_id = store.create_job("repo", "main", None).unwrap();
        pipeline
            .run_job(job_id, &FsFileSource::new(&repo, Vec::new()), &CancelFlag::new())
            .unwrap();

        let engine = crate::query::engine::QueryEngine::new(store, 100);
        let chains: Vec<_> = engine
            .repository_cycles("repo")
            .unwrap()
            .into_iter()
            .filter(|c| c.dependency_type == DependencyType::SymbolUsage)
            .collect();

        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].chain.len(), 2);
        assert_eq!(chains[0].chain[0], chains[0].chain[1]);
        assert_eq!(chains[0].description, "fact -> fact");
    }

    #[test]
    fn test_cancellation_fails_the_job_descriptively() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        fixture_repo(&repo);

        let (store, pipeline) = setup(dir.path(), 100);
        let job_id = store.create_job("repo", "main", None).unwrap();

        let cancel = CancelFlag::new();
        cancel.cancel();
        let result = pipeline.run_job(job_id, &FsFileSource::new(&repo, Vec::new()), &cancel);
        assert!(matches!(result, Err(PipelineError::Cancelled)));

        let job = store.get_job(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().contains("cancelled"));
    }

    #[test]
    fn test_missing_repository_fails_without_processing() {
        let dir = tempdir().unwrap();
        let (store, pipeline) = setup(dir.path(), 100);
        let job_id = store.create_job("repo", "main", None).unwrap();

        let source = FsFileSource::new(dir.path().join("nope"), Vec::new());
        let result = pipeline.run_job(job_id, &source, &CancelFlag::new());
        assert!(matches!(result, Err(PipelineError::Repository(_))));

        let job = store.get_job(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.started_at.is_none());
    }

    #[test]
    fn test_busy_repository_fails_fast() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        fixture_repo(&repo);

        let (store, pipeline) = setup(dir.path(), 100);
        let first = store.create_job("repo", "main", None).unwrap();
        assert_eq!(store.try_begin(first).unwrap(), BeginOutcome::Started);

        let second = store.create_job("repo", "main", None).unwrap();
        let result = pipeline.run_job(second, &FsFileSource::new(&repo, Vec::new()), &CancelFlag::new());
        assert!(matches!(result, Err(PipelineError::RepositoryBusy(_))));

        // The blocked job row is untouched, ready for a later attempt
        let job = store.get_job(second).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
    }
}
