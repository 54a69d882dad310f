//! # blockpack
//!
//! A small-object storage engine that packs many small records into
//! size-classed blocks inside a few flat shard files:
//! - Eight power-of-two block classes (64 KiB … 8 MiB)
//! - Chains of same-class blocks that grow when a block fills
//! - Per-shard cursor/counter header, positional block I/O
//! - One lock per shard, optional LRU block cache
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Engine                                │
//! │        fill / append / refill / read_chain / iter            │
//! └──────────┬──────────────────────────────┬───────────────────┘
//!            │                              │
//!            ▼                              ▼
//!   ┌─────────────────┐            ┌─────────────────┐
//!   │   BlockCache    │            │  ShardManager   │
//!   │     (LRU)       │            │ cursor · lock   │
//!   └─────────────────┘            └────────┬────────┘
//!                                           │
//!                                           ▼
//!                                  ┌─────────────────┐
//!                                  │  Block codec    │
//!                                  │ <id>.sf files   │
//!                                  └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod block;
pub mod shard;
pub mod cache;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use block::{Block, BlockFull, SizeClass};
pub use cache::{BlockCache, CacheStats, LruBlockCache};
pub use config::{Config, SyncStrategy};
pub use engine::Engine;
pub use error::{PackError, Result};
pub use record::{RawCodec, Record, RecordCodec};
pub use shard::{ShardHeader, ShardId, ShardManager};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of blockpack
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
