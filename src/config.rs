// Configuration management for codeatlas

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name looked up in the project root
pub const CONFIG_FILE: &str = ".codeatlas.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub indexing: IndexingConfig,
    pub queue: QueueSettings,
    pub query: QuerySettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database path, relative to the project root
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub exclude: Vec<String>,
    /// Files per storage transaction during chunked imports
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub poll_interval_ms: u64,
    pub expiry_hours: u64,
    pub archive_after_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub default_limit: usize,
    pub max_limit: usize,
    pub max_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: ".codeatlas.db".to_string(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            exclude: vec![
                "node_modules/".to_string(),
                ".git/".to_string(),
                "dist/".to_string(),
                "build/".to_string(),
                ".codeatlas.db".to_string(),
            ],
            chunk_size: 200,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_attempts: 3,
            retry_delay_secs: 60,
            poll_interval_ms: 500,
            expiry_hours: 24,
            archive_after_secs: 3600,
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
            max_depth: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory, falling back to the
    /// defaults when no config file is present.
    pub fn from_project_dir<P: AsRef<Path>>(project_dir: P) -> Self {
        let config_path = project_dir.as_ref().join(CONFIG_FILE);

        match Self::from_file(&config_path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", config_path.display());
                config
            }
            Err(e) => {
                tracing::debug!("Could not load config from {}: {}", config_path.display(), e);
                tracing::debug!("Using default configuration");
                Self::default()
            }
        }
    }

    /// Check whether a file path passes the exclude patterns
    pub fn should_index_file(&self, file_path: &str) -> bool {
        !self
            .indexing
            .exclude
            .iter()
            .any(|pattern| matches_pattern(file_path, pattern))
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.db_path.is_empty() {
            anyhow::bail!("Storage db_path cannot be empty");
        }

        if self.indexing.chunk_size == 0 {
            anyhow::bail!("Chunk size must be greater than 0");
        }

        if self.queue.concurrency == 0 {
            anyhow::bail!("Queue concurrency must be greater than 0");
        }
        if self.queue.max_attempts == 0 {
            anyhow::bail!("Queue max attempts must be greater than 0");
        }
        if self.queue.poll_interval_ms == 0 {
            anyhow::bail!("Queue poll interval must be greater than 0");
        }

        if self.query.default_limit == 0 || self.query.max_limit == 0 {
            anyhow::bail!("Query limits must be greater than 0");
        }
        if self.query.default_limit > self.query.max_limit {
            anyhow::bail!("Query default limit cannot exceed the maximum");
        }
        if self.query.max_depth == 0 {
            anyhow::bail!("Query max depth must be greater than 0");
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!("Invalid log level: {}", self.logging.level);
        }
        let valid_formats = ["compact", "pretty", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!("Invalid log format: {}", self.logging.format);
        }

        Ok(())
    }
}

/// Glob-ish pattern matching for exclude rules: trailing `/` matches a
/// directory anywhere in the path, `*.ext` matches a suffix, `**` patterns
/// match their inner segment, anything else matches as a substring.
pub fn matches_pattern(file_path: &str, pattern: &str) -> bool {
    if let Some(dir) = pattern.strip_suffix('/') {
        file_path.starts_with(&format!("{dir}/")) || file_path.contains(&format!("/{dir}/"))
    } else if let Some(suffix) = pattern.strip_prefix("*.") {
        file_path.ends_with(&format!(".{suffix}"))
    } else if pattern.contains("**") {
        let middle = pattern.trim_matches('*').trim_matches('/');
        file_path.starts_with(&format!("{middle}/")) || file_path.contains(&format!("/{middle}/"))
    } else {
        file_path == pattern || file_path.contains(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.db_path, ".codeatlas.db");
        assert_eq!(config.queue.concurrency, 3);
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.query.default_limit, 20);
        assert!(config
            .indexing
            .exclude
            .contains(&"node_modules/".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_should_index_file() {
        let config = Config::default();

        assert!(config.should_index_file("src/main.ts"));
        assert!(config.should_index_file("lib/utils.js"));

        assert!(!config.should_index_file("node_modules/pkg/index.js"));
        assert!(!config.should_index_file("src/node_modules/pkg/index.js"));
        assert!(!config.should_index_file("dist/bundle.js"));
        assert!(!config.should_index_file(".codeatlas.db"));
    }

    #[test]
    fn test_pattern_matching() {
        assert!(matches_pattern("dist/out.js", "dist/"));
        assert!(matches_pattern("packages/a/dist/out.js", "dist/"));
        assert!(!matches_pattern("distant/out.js", "dist/"));

        assert!(matches_pattern("a/b.test.ts", "*.test.ts"));
        assert!(!matches_pattern("a/b.ts", "*.test.ts"));

        assert!(matches_pattern("src/__tests__/x.ts", "**/__tests__/**"));
    }

    #[test]
    fn test_partial_file_overrides_defaults() {
        let config: Config = toml::from_str("[queue]\nconcurrency = 5\n").unwrap();
        assert_eq!(config.queue.concurrency, 5);
        // Untouched sections keep their defaults
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.storage.db_path, ".codeatlas.db");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.indexing.chunk_size = 0;
        assert!(config.validate().is_err());
        config.indexing.chunk_size = 200;

        config.queue.concurrency = 0;
        assert!(config.validate().is_err());
        config.queue.concurrency = 3;

        config.query.default_limit = 500;
        assert!(config.validate().is_err());
        config.query.default_limit = 20;

        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
        config.logging.level = "info".to_string();

        config.logging.format = "fancy".to_string();
        assert!(config.validate().is_err());
    }
}
