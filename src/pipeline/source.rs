// Repository file listing

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::warn;
use walkdir::WalkDir;

use crate::config::matches_pattern;
use crate::parser::{Language, SUPPORTED_EXTENSIONS};

/// One file supplied for indexing.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
    pub language: Option<String>,
}

/// Supplies a repository's `(path, content, language?)` tuples. The
/// surrounding application decides what a repository is; the pipeline only
/// consumes the listing.
pub trait FileSource: Send + Sync {
    fn list_files(&self) -> Result<Vec<SourceFile>>;
}

/// Maps a repository id to its file source, for queue-driven runs.
pub trait SourceProvider: Send + Sync {
    fn source_for(&self, repository_id: &str) -> Result<Box<dyn FileSource>>;
}

/// Filesystem-backed file source rooted at a repository checkout.
pub struct FsFileSource {
    root: PathBuf,
    excludes: Vec<String>,
}

impl FsFileSource {
    pub fn new(root: impl AsRef<Path>, excludes: Vec<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            excludes,
        }
    }
}

impl FileSource for FsFileSource {
    fn list_files(&self) -> Result<Vec<SourceFile>> {
        anyhow::ensure!(
            self.root.is_dir(),
            "Repository root not found: {}",
            self.root.display()
        );

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let rel = path
                .strip_prefix(&self.root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");

            if self.excludes.iter().any(|p| matches_pattern(&rel, p)) {
                continue;
            }

            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !SUPPORTED_EXTENSIONS.contains(&ext) {
                continue;
            }

            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    warn!("Failed to read {}: {}", path.display(), e);
                    continue;
                }
            };

            let language = Language::from_path(&rel).map(|l| l.as_str().to_string());
            files.push(SourceFile {
                path: rel,
                content,
                language,
            });
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}

/// Filesystem-backed provider over a fixed set of repository roots.
pub struct FsSourceProvider {
    roots: HashMap<String, PathBuf>,
    excludes: Vec<String>,
}

impl FsSourceProvider {
    pub fn new(roots: HashMap<String, PathBuf>, excludes: Vec<String>) -> Self {
        Self { roots, excludes }
    }

    /// Provider for a single repository, the common CLI case.
    pub fn single(repository_id: &str, root: impl AsRef<Path>, excludes: Vec<String>) -> Self {
        let mut roots = HashMap::new();
        roots.insert(repository_id.to_string(), root.as_ref().to_path_buf());
        Self { roots, excludes }
    }
}

impl SourceProvider for FsSourceProvider {
    fn source_for(&self, repository_id: &str) -> Result<Box<dyn FileSource>> {
        let root = self
            .roots
            .get(repository_id)
            .ok_or_else(|| anyhow::anyhow!("Unknown repository: {}", repository_id))?;
        Ok(Box::new(FsFileSource::new(root, self.excludes.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_lists_supported_files_with_relative_paths() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.ts"), "export {};").unwrap();
        std::fs::write(dir.path().join("src/b.js"), "module.exports = {};").unwrap();
        std::fs::write(dir.path().join("README.md"), "# readme").unwrap();

        let source = FsFileSource::new(dir.path(), Vec::new());
        let files = source.list_files().unwrap();

        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/a.ts", "src/b.js"]);
        assert_eq!(files[0].language.as_deref(), Some("typescript"));
    }

    #[test]
    fn test_excludes_are_honored() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        std::fs::write(dir.path().join("node_modules/pkg/index.js"), "x").unwrap();
        std::fs::write(dir.path().join("main.ts"), "export {};").unwrap();

        let source = FsFileSource::new(dir.path(), vec!["node_modules/".to_string()]);
        let files = source.list_files().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "main.ts");
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let source = FsFileSource::new("/definitely/not/here", Vec::new());
        assert!(source.list_files().is_err());
    }

    #[test]
    fn test_provider_rejects_unknown_repository() {
        let provider = FsSourceProvider::single("repo", "/tmp", Vec::new());
        assert!(provider.source_for("repo").is_ok());
        assert!(provider.source_for("other").is_err());
    }
}
