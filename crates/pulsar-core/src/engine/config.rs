use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("Failed to read configuration file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 1000;

/// Process-wide settings of a module administrator.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Directories searched, in order, for supermodule manifests.
    pub search_paths: Vec<PathBuf>,
    pub cache_sync_interval: Duration,
    /// Start the cache-sync worker as soon as the manager is built.
    pub auto_start_sync: bool,
    pub checkpoint_dir: Option<PathBuf>,
    pub rank: usize,
    /// Enable the debug output channel of every module instance.
    pub debug_all: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            cache_sync_interval: Duration::from_millis(DEFAULT_SYNC_INTERVAL_MS),
            auto_start_sync: false,
            checkpoint_dir: None,
            rank: 0,
            debug_all: false,
        }
    }
}

impl RuntimeConfig {
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::new()
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: RuntimeConfigFile = toml::from_str(content)?;
        file.into_builder().build()
    }

    /// Loads a kebab-case TOML file. Relative search paths and checkpoint directories
    /// are resolved against the file's directory.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut file: RuntimeConfigFile = toml::from_str(&content)?;
        if let Some(base) = path.parent() {
            for p in file.search_paths.iter_mut() {
                if p.is_relative() {
                    *p = base.join(&*p);
                }
            }
            if let Some(dir) = file.checkpoint_dir.as_mut().filter(|d| d.is_relative()) {
                *dir = base.join(&*dir);
            }
        }
        file.into_builder().build()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RuntimeConfigFile {
    #[serde(default)]
    search_paths: Vec<PathBuf>,
    cache_sync_interval_ms: Option<u64>,
    #[serde(default)]
    auto_start_sync: bool,
    checkpoint_dir: Option<PathBuf>,
    rank: Option<usize>,
    #[serde(default)]
    debug_all: bool,
}

impl RuntimeConfigFile {
    fn into_builder(self) -> RuntimeConfigBuilder {
        let mut builder = RuntimeConfigBuilder::new()
            .search_paths(self.search_paths)
            .auto_start_sync(self.auto_start_sync)
            .debug_all(self.debug_all);
        if let Some(ms) = self.cache_sync_interval_ms {
            builder = builder.cache_sync_interval_ms(ms);
        }
        if let Some(dir) = self.checkpoint_dir {
            builder = builder.checkpoint_dir(dir);
        }
        if let Some(rank) = self.rank {
            builder = builder.rank(rank);
        }
        builder
    }
}

#[derive(Default)]
pub struct RuntimeConfigBuilder {
    search_paths: Vec<PathBuf>,
    cache_sync_interval_ms: Option<u64>,
    auto_start_sync: bool,
    checkpoint_dir: Option<PathBuf>,
    rank: Option<usize>,
    debug_all: bool,
}

impl RuntimeConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }
    pub fn search_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.search_paths.extend(paths);
        self
    }
    pub fn cache_sync_interval_ms(mut self, ms: u64) -> Self {
        self.cache_sync_interval_ms = Some(ms);
        self
    }
    pub fn auto_start_sync(mut self, enabled: bool) -> Self {
        self.auto_start_sync = enabled;
        self
    }
    pub fn checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }
    pub fn rank(mut self, rank: usize) -> Self {
        self.rank = Some(rank);
        self
    }
    pub fn debug_all(mut self, enabled: bool) -> Self {
        self.debug_all = enabled;
        self
    }

    /// Validates the collected settings.
    ///
    /// An explicit sync interval is required when the worker starts automatically.
    pub fn build(self) -> Result<RuntimeConfig, ConfigError> {
        let interval_ms = match (self.auto_start_sync, self.cache_sync_interval_ms) {
            (_, Some(ms)) => ms,
            (true, None) => return Err(ConfigError::MissingParameter("cache_sync_interval_ms")),
            (false, None) => DEFAULT_SYNC_INTERVAL_MS,
        };
        if interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "cache_sync_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(empty) = self.search_paths.iter().find(|p| p.as_os_str().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "search_paths",
                reason: format!("empty path {:?}", empty),
            });
        }
        Ok(RuntimeConfig {
            search_paths: self.search_paths,
            cache_sync_interval: Duration::from_millis(interval_ms),
            auto_start_sync: self.auto_start_sync,
            checkpoint_dir: self.checkpoint_dir,
            rank: self.rank.unwrap_or(0),
            debug_all: self.debug_all,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn builder_applies_defaults() {
        let config = RuntimeConfig::builder().search_path("/opt/modules").build().unwrap();
        assert_eq!(config.search_paths, vec![PathBuf::from("/opt/modules")]);
        assert_eq!(config.cache_sync_interval, Duration::from_millis(DEFAULT_SYNC_INTERVAL_MS));
        assert_eq!(config.rank, 0);
        assert!(!config.auto_start_sync);
    }

    #[test]
    fn auto_sync_requires_an_interval() {
        let err = RuntimeConfig::builder().auto_start_sync(true).build().unwrap_err();
        assert!(matches!(err, ConfigError::MissingParameter("cache_sync_interval_ms")));
        let err = RuntimeConfig::builder().cache_sync_interval_ms(0).build().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "cache_sync_interval_ms", .. }));
    }

    #[test]
    fn toml_uses_kebab_case_and_rejects_unknown_fields() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            search-paths = ["/a", "/b"]
            cache-sync-interval-ms = 250
            auto-start-sync = true
            rank = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.search_paths.len(), 2);
        assert_eq!(config.cache_sync_interval, Duration::from_millis(250));
        assert_eq!(config.rank, 2);
        assert!(RuntimeConfig::from_toml_str("colour = true").is_err());
    }

    #[test]
    fn file_paths_resolve_against_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pulsar.toml");
        std::fs::write(&path, "search-paths = [\"modules\"]\ncheckpoint-dir = \"chk\"\n").unwrap();
        let config = RuntimeConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.search_paths, vec![dir.path().join("modules")]);
        assert_eq!(config.checkpoint_dir, Some(dir.path().join("chk")));
    }
}
