//! # Runtime Configuration
//!
//! Settings live in `<runtime>/config.json`. The runtime directory defaults
//! to `./.refile` and can be moved with `REFILE_RUNTIME_PATH`.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.json";

/// Get the runtime directory path (.refile)
pub fn runtime_path() -> PathBuf {
    if let Ok(path) = std::env::var("REFILE_RUNTIME_PATH") {
        return PathBuf::from(path);
    }

    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".refile")
}

/// Effective configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RefileConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Upper bound on concurrent file copies in one batch
    pub max_concurrent_copies: usize,
    /// Per-file copy timeout in seconds (0 disables)
    pub copy_timeout_secs: u64,
    /// Catalog insert batch size used by the indexer
    pub index_batch_size: usize,
    /// Address the HTTP server binds to
    pub bind_address: String,
}

impl Default for RefileConfig {
    fn default() -> Self {
        Self {
            database_path: runtime_path().join("refile.db"),
            max_concurrent_copies: 8,
            copy_timeout_secs: 300,
            index_batch_size: 500,
            bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Partial update accepted by `RefileConfig::merge`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_copies: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,
}

impl RefileConfig {
    /// Load from the runtime directory, then apply environment overrides
    pub fn load() -> Self {
        Self::load_from(&runtime_path().join(CONFIG_FILE))
    }

    /// Load from an explicit file (missing or malformed files fall back to defaults)
    pub fn load_from(path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), "Ignoring malformed config: {}", e);
                Self::default()
            }),
            Err(_) => Self::default(),
        };
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("REFILE_DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(n) = std::env::var("REFILE_MAX_CONCURRENT_COPIES")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.max_concurrent_copies = n;
        }
    }

    /// Persist to the runtime directory
    pub async fn save(&self) -> Result<()> {
        self.save_to(&runtime_path().join(CONFIG_FILE)).await
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Apply a partial update
    pub fn merge(&mut self, patch: ConfigPatch) {
        if let Some(n) = patch.max_concurrent_copies {
            self.max_concurrent_copies = n.max(1);
        }
        if let Some(secs) = patch.copy_timeout_secs {
            self.copy_timeout_secs = secs;
        }
        if let Some(n) = patch.index_batch_size {
            self.index_batch_size = n.max(1);
        }
        if let Some(addr) = patch.bind_address {
            self.bind_address = addr;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RefileConfig::default();
        assert_eq!(config.max_concurrent_copies, 8);
        assert_eq!(config.index_batch_size, 500);
        assert!(config.database_path.ends_with("refile.db"));
    }

    #[test]
    fn test_merge_clamps_zero() {
        let mut config = RefileConfig::default();
        config.merge(ConfigPatch {
            max_concurrent_copies: Some(0),
            copy_timeout_secs: Some(5),
            ..Default::default()
        });
        assert_eq!(config.max_concurrent_copies, 1);
        assert_eq!(config.copy_timeout_secs, 5);
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = RefileConfig::default();
        config.copy_timeout_secs = 42;
        config.bind_address = "0.0.0.0:9000".into();
        config.save_to(&path).await.unwrap();

        let loaded = RefileConfig::load_from(&path);
        assert_eq!(loaded.copy_timeout_secs, 42);
        assert_eq!(loaded.bind_address, "0.0.0.0:9000");
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let loaded = RefileConfig::load_from(&path);
        assert_eq!(loaded.copy_timeout_secs, 300);
    }
}
