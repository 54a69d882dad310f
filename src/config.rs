//! Configuration for blockpack
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{PackError, Result};

/// Main configuration for a blockpack store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the shard files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── 0.sf
    ///     ├── 1.sf
    ///     └── ...
    pub data_dir: PathBuf,

    /// Number of shard files, ids `0..shard_count`
    pub shard_count: u32,

    /// When shard files are fsynced
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Cache Configuration
    // -------------------------------------------------------------------------
    /// Number of decoded blocks kept in the LRU cache (0 disables it)
    pub cache_capacity: usize,
}

/// Shard file sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every block and header write (safest, slowest)
    EveryWrite,

    /// fsync only when the store is closed
    OnClose,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./blockpack_data"),
            shard_count: 4,
            sync_strategy: SyncStrategy::OnClose,
            cache_capacity: 64,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the values that cannot be expressed in the types
    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 {
            return Err(PackError::Config(
                "shard_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (holds all shard files)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the number of shards
    pub fn shard_count(mut self, count: u32) -> Self {
        self.config.shard_count = count;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the block cache capacity (in blocks, 0 disables caching)
    pub fn cache_capacity(mut self, blocks: usize) -> Self {
        self.config.cache_capacity = blocks;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
