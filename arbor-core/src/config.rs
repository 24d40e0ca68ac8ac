//! Configuration for arbor

use crate::ArborError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration as TOML
pub const DEFAULT_CONFIG: &str = r#"# Arbor Configuration

[indexing]
# Source file extension to index
extension = "py"
# Directory names skipped during walks; dot-prefixed segments are always skipped
ignore = ["__pycache__", ".venv", "node_modules", ".git", ".arbor"]

[watcher]
# Quiet interval (ms) after the last file-system event before re-indexing
debounce_ms = 500

[service]
bind = "127.0.0.1"
port = 5577
"#;

/// Arbor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_extension() -> String {
    "py".to_string()
}
fn default_ignore() -> Vec<String> {
    vec![
        "__pycache__".to_string(),
        ".venv".to_string(),
        "node_modules".to_string(),
        ".git".to_string(),
        ".arbor".to_string(),
    ]
}
fn default_debounce_ms() -> u64 {
    500
}
fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5577
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            ignore: default_ignore(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| ArborError::ConfigParse(e.to_string()))
    }

    /// Debounce delay as a Duration
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.watcher.debounce_ms)
    }

    /// Whether a project-relative path is excluded from indexing and
    /// watching: any dot-prefixed segment or a segment in the ignore list.
    pub fn is_ignored(&self, relative: &Path) -> bool {
        relative.components().any(|c| {
            let segment = c.as_os_str().to_string_lossy();
            segment.starts_with('.') || self.indexing.ignore.iter().any(|i| i == segment.as_ref())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_config_parses() {
        let config = Config::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.indexing.extension, "py");
        assert_eq!(config.watcher.debounce_ms, 500);
        assert_eq!(config.service.port, 5577);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.indexing.extension, "py");
        assert!(config.indexing.ignore.iter().any(|i| i == "__pycache__"));
    }

    #[test]
    fn test_is_ignored() {
        let config = Config::default();
        assert!(config.is_ignored(&PathBuf::from("__pycache__/mod.py")));
        assert!(config.is_ignored(&PathBuf::from("pkg/.venv/lib.py")));
        assert!(config.is_ignored(&PathBuf::from(".hidden/mod.py")));
        assert!(config.is_ignored(&PathBuf::from("node_modules/a/b.py")));
        assert!(!config.is_ignored(&PathBuf::from("pkg/mod.py")));
    }
}
