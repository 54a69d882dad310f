//! Shard Module
//!
//! Flat, append-mostly files holding block chains.
//!
//! ## Responsibilities
//! - One append cursor and one block counter per shard
//! - Positional block reads/writes
//! - Fixed header persisted at offset 0 of every shard file
//! - Per-shard locking (no lock is shared across shards)
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Header (12 bytes)                       │
//! │ ┌──────────────────┬──────────────────┐ │
//! │ │ Cursor u64 (8)   │ BlockCount u32(4)│ │
//! │ └──────────────────┴──────────────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Block (capacity of its class)           │
//! ├─────────────────────────────────────────┤
//! │ Block                                   │
//! │ ... consecutive, non-overlapping ...    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Files live in one directory, named `<shard_id>.sf`.

mod header;
mod io;
mod iterator;
mod manager;

pub use header::{ShardHeader, HEADER_SIZE};
pub use iterator::ShardBlocks;
pub use manager::ShardManager;

/// Identifies a shard file within a store
pub type ShardId = u32;

/// Shard file extension
pub const SHARD_FILE_EXTENSION: &str = "sf";
