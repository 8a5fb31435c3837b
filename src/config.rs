//! Storage configuration.
//!
//! Everything here is fixed once [`Storage::open`](crate::Storage::open) has
//! run. The shard count in particular is copied into the lock manager at
//! construction and never changes afterwards.

use crate::error::StorageError;
use crate::storage::{EngineOptions, ExpiryMode, ReaperConfig};
use std::path::PathBuf;

/// Default number of key-lock shards.
pub const DEFAULT_SHARD_COUNT: usize = 64;

/// Configuration for a [`Storage`](crate::Storage) instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory handed to the engine.
    pub data_dir: PathBuf,

    /// Engine block cache size in bytes.
    pub cache_size: usize,

    /// Engine write buffer size in bytes.
    pub write_buffer_size: usize,

    /// Number of key-lock shards.
    pub shard_count: usize,

    /// How relative TTLs are turned into absolute expiry instants.
    pub expiry_mode: ExpiryMode,

    /// Expiration reaper tuning.
    pub reaper: ReaperConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            cache_size: 64 * 1024 * 1024,       // 64 MB
            write_buffer_size: 4 * 1024 * 1024, // 4 MB
            shard_count: DEFAULT_SHARD_COUNT,
            expiry_mode: ExpiryMode::default(),
            reaper: ReaperConfig::default(),
        }
    }
}

impl Config {
    /// Create a new Config with a custom data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }

    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    pub fn with_shard_count(mut self, shards: usize) -> Self {
        self.shard_count = shards;
        self
    }

    pub fn with_expiry_mode(mut self, mode: ExpiryMode) -> Self {
        self.expiry_mode = mode;
        self
    }

    pub fn with_reaper(mut self, reaper: ReaperConfig) -> Self {
        self.reaper = reaper;
        self
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.shard_count == 0 {
            return Err(StorageError::Config("shard_count must be at least 1".into()));
        }
        if self.reaper.batch_limit == 0 {
            return Err(StorageError::Config(
                "reaper batch_limit must be at least 1".into(),
            ));
        }
        if self.reaper.idle_interval.is_zero() {
            return Err(StorageError::Config(
                "reaper idle_interval must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Ensure the data directory exists.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }

    /// Engine parameters derived from this configuration.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            path: self.data_dir.clone(),
            cache_size: self.cache_size,
            write_buffer_size: self.write_buffer_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert_eq!(config.shard_count, 64);
        assert_eq!(config.expiry_mode, ExpiryMode::Absolute);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_shards_rejected() {
        let config = Config::default().with_shard_count(0);
        assert!(matches!(config.validate(), Err(StorageError::Config(_))));
    }

    #[test]
    fn test_zero_reaper_interval_rejected() {
        let config = Config::default().with_reaper(ReaperConfig {
            idle_interval: Duration::ZERO,
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ensure_dirs_creates_nested_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path().join("a").join("b"));
        config.ensure_dirs().unwrap();
        assert!(dir.path().join("a").join("b").is_dir());
    }

    #[test]
    fn test_engine_options_carry_sizes() {
        let config = Config::new("/tmp/x")
            .with_cache_size(1024)
            .with_write_buffer_size(512);
        let opts = config.engine_options();
        assert_eq!(opts.cache_size, 1024);
        assert_eq!(opts.write_buffer_size, 512);
        assert_eq!(opts.path, PathBuf::from("/tmp/x"));
    }
}
