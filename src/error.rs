//! Error types for blockpack
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::shard::ShardId;

/// Result type alias using PackError
pub type Result<T> = std::result::Result<T, PackError>;

/// Unified error type for blockpack operations
#[derive(Debug, Error)]
pub enum PackError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Capacity Errors
    // -------------------------------------------------------------------------
    /// The request cannot fit in any size class
    #[error("Capacity exceeded: {required} bytes required, limit is {limit}")]
    CapacityExceeded { required: usize, limit: usize },

    /// A specific block cannot take one more record
    #[error("Block full: record needs {needed} bytes, {free} free")]
    BlockFull { needed: usize, free: usize },

    // -------------------------------------------------------------------------
    // Corruption Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt block: {0}")]
    CorruptBlock(String),

    #[error("Corrupt shard metadata: {0}")]
    CorruptMetadata(String),

    // -------------------------------------------------------------------------
    // Addressing Errors
    // -------------------------------------------------------------------------
    #[error("Offset {offset} out of range for shard {shard} (cursor {cursor})")]
    OutOfRange {
        shard: ShardId,
        offset: u64,
        cursor: u64,
    },

    #[error("Unknown shard {shard} (store has {shard_count} shards)")]
    UnknownShard { shard: ShardId, shard_count: u32 },

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Empty records cannot be stored")]
    EmptyRecord,

    #[error("Record declared {declared} bytes but serialized to {actual}")]
    RecordLength { declared: usize, actual: usize },

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
