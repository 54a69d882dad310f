//! Block cache
//!
//! Optional layer in front of physical block reads. A cache only changes
//! latency: the engine writes through on every block write, so a lookup
//! never returns bytes older than what is on disk.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;

use crate::block::Block;
use crate::shard::ShardId;

/// A cache of decoded blocks keyed by `(shard, offset)`
pub trait BlockCache<R>: Send + Sync {
    /// Cached block at `(shard, offset)`, if present
    fn lookup(&self, shard: ShardId, offset: u64) -> Option<Block<R>>;

    /// Store (or replace) the block at `(shard, offset)`
    fn insert(&self, shard: ShardId, offset: u64, block: Block<R>);

    /// Drop the entry at `(shard, offset)`
    fn invalidate(&self, shard: ShardId, offset: u64);

    /// Drop every entry
    fn clear(&self);
}

/// LRU cache of decoded blocks
pub struct LruBlockCache<R> {
    cache: Mutex<LruCache<(ShardId, u64), Block<R>>>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl<R> LruBlockCache<R> {
    /// Create a cache holding up to `capacity` blocks (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let hits = self.hit_count.load(Ordering::Relaxed);
        let misses = self.miss_count.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        let cache = self.cache.lock();
        CacheStats {
            hits,
            misses,
            hit_rate,
            size: cache.len(),
            capacity: cache.cap().get(),
        }
    }
}

impl<R: Clone + Send + Sync> BlockCache<R> for LruBlockCache<R> {
    fn lookup(&self, shard: ShardId, offset: u64) -> Option<Block<R>> {
        let mut cache = self.cache.lock();
        match cache.get(&(shard, offset)) {
            Some(block) => {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                Some(block.clone())
            }
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn insert(&self, shard: ShardId, offset: u64, block: Block<R>) {
        self.cache.lock().put((shard, offset), block);
    }

    fn invalidate(&self, shard: ShardId, offset: u64) {
        self.cache.lock().pop(&(shard, offset));
    }

    fn clear(&self) {
        self.cache.lock().clear();
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub size: usize,
    pub capacity: usize,
}
