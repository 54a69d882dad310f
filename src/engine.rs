//! Engine Module
//!
//! Chain operations on top of blocks and shards.
//!
//! ## Responsibilities
//! - Create chains (`fill`) and extend them across block boundaries (`append`)
//! - Overwrite a single block in place (`refill`)
//! - Random access (`read_block`, `read_chain`) and shard scans (`iter`)
//! - Keep the optional block cache coherent with disk

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::block::{required_bytes, Block, SizeClass, FIXED_OVERHEAD, OFFSET_ENTRY_SIZE};
use crate::cache::{BlockCache, LruBlockCache};
use crate::config::Config;
use crate::error::{PackError, Result};
use crate::record::{Record, RecordCodec};
use crate::shard::{ShardBlocks, ShardId, ShardManager, HEADER_SIZE};

/// Shared handle to a block cache
pub type SharedCache<R> = Arc<dyn BlockCache<R>>;

/// The storage engine
///
/// ## Concurrency Model: one writer per shard, many readers
///
/// - **Writes** (fill/append/refill): hold the shard's chain lock
///   exclusively for the whole read-modify-write, so appenders on the same
///   chain never interleave
/// - **Reads** (read_block/read_chain/iter): hold the chain lock shared;
///   they run concurrently and never see a half-written block
/// - Locks are per shard: operations on different shards never contend
pub struct Engine<C: RecordCodec> {
    /// Engine configuration
    config: Config,

    /// Shard files, cursors and locks
    shards: ShardManager,

    /// Caller-supplied record decoder
    codec: C,

    /// Decoded blocks, consulted before physical reads
    cache: Option<SharedCache<C::Record>>,
}

impl<C: RecordCodec> Engine<C> {
    /// Open or create a store with the given config
    ///
    /// Builds an LRU block cache when `cache_capacity > 0`.
    pub fn open(config: Config, codec: C) -> Result<Self> {
        let cache = if config.cache_capacity > 0 {
            let lru: SharedCache<C::Record> = Arc::new(LruBlockCache::new(config.cache_capacity));
            Some(lru)
        } else {
            None
        };
        Self::open_with_cache(config, codec, cache)
    }

    /// Open with an explicit cache (or none), ignoring `cache_capacity`
    pub fn open_with_cache(
        config: Config,
        codec: C,
        cache: Option<SharedCache<C::Record>>,
    ) -> Result<Self> {
        config.validate()?;

        let shards =
            ShardManager::open_with(&config.data_dir, config.shard_count, config.sync_strategy)?;

        info!(
            dir = %config.data_dir.display(),
            shards = config.shard_count,
            cached = cache.is_some(),
            "engine opened"
        );

        Ok(Self {
            config,
            shards,
            codec,
            cache,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path, codec: C) -> Result<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::open(config, codec)
    }

    /// Open an existing store without creating or modifying anything
    ///
    /// Only the shard files present in `path` are opened, read-only and
    /// uncached. Mutations fail with an I/O error.
    pub fn open_existing(path: &Path, codec: C) -> Result<Self> {
        let shards = ShardManager::open_existing(path)?;
        let config = Config::builder()
            .data_dir(path)
            .shard_count(shards.shard_count())
            .cache_capacity(0)
            .build();

        Ok(Self {
            config,
            shards,
            codec,
            cache: None,
        })
    }

    // =========================================================================
    // Chain Mutation
    // =========================================================================

    /// Create a new chain holding `records` in a single block
    ///
    /// The block is sized to the smallest class that fits the whole batch.
    /// Returns the chain's head offset.
    pub fn fill(&self, shard: ShardId, records: Vec<C::Record>) -> Result<u64> {
        let block = Block::from_records(records)?;

        let _guard = self.shards.lock_chains(shard)?;
        let offset = self.shards.allocate(shard, block.class())?;
        let count = block.len();
        let class = block.class();
        self.persist(shard, offset, block)?;

        debug!(shard, offset, records = count, %class, "created chain");
        Ok(offset)
    }

    /// Create a new chain from an encoded block image
    ///
    /// The image is decoded with the engine's codec and its records are
    /// stored as by [`fill`](Self::fill); the image's class and next pointer
    /// are not kept.
    pub fn fill_bytes(&self, shard: ShardId, bytes: &[u8]) -> Result<u64> {
        let block = Block::<C::Record>::decode(bytes, &self.codec)?;
        self.fill(shard, block.into_records())
    }

    /// Append `records` to the chain starting at `head`
    ///
    /// Records are added to the tail block in order. When the tail is full a
    /// new block of the same class is allocated, linked, and the record that
    /// did not fit is retried there, so every record lands exactly once.
    ///
    /// Every record is checked up-front to fit an empty block of the tail's
    /// class; nothing is written if one does not. Blocks are persisted
    /// successor-first and the pre-existing tail last, so no on-disk pointer
    /// ever references a block that was not written.
    pub fn append(&self, shard: ShardId, head: u64, records: Vec<C::Record>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let _guard = self.shards.lock_chains(shard)?;
        let (mut tail_offset, mut tail) = self.load_tail(shard, head)?;
        let class = tail.class();

        for record in &records {
            let len = record.byte_length();
            if len == 0 {
                return Err(PackError::EmptyRecord);
            }
            if !Block::<C::Record>::fits_empty(class, len) {
                return Err(PackError::CapacityExceeded {
                    required: FIXED_OVERHEAD + OFFSET_ENTRY_SIZE + len,
                    limit: class.capacity(),
                });
            }
        }

        let total = records.len();
        // Full blocks waiting for their successor to reach disk
        let mut sealed: Vec<(u64, Block<C::Record>)> = Vec::new();

        for record in records {
            if let Err(full) = tail.add_record(record) {
                let next_offset = self.shards.allocate(shard, class)?;
                trace!(shard, from = tail_offset, to = next_offset, "chain crossed block boundary");

                tail.set_next_pointer(next_offset);
                let full_tail = std::mem::replace(&mut tail, Block::new(class));
                sealed.push((tail_offset, full_tail));
                tail_offset = next_offset;

                tail.add_record(full.into_record())?;
            }
        }

        let added = sealed.len();
        self.persist(shard, tail_offset, tail)?;
        for (offset, block) in sealed.into_iter().rev() {
            self.persist(shard, offset, block)?;
        }

        debug!(shard, head, records = total, blocks_added = added, "appended to chain");
        Ok(())
    }

    /// Deserialize one record from `bytes` and append it to the chain
    pub fn append_bytes(&self, shard: ShardId, head: u64, bytes: &[u8]) -> Result<()> {
        let record = self.codec.deserialize(bytes)?;
        self.append(shard, head, vec![record])
    }

    /// Replace the contents of the block at `offset`
    ///
    /// The rest of the chain is untouched: the block keeps its class and its
    /// next pointer. The new records must fit that class; a smaller batch is
    /// padded to it so the shard layout stays intact.
    pub fn refill(&self, shard: ShardId, offset: u64, records: Vec<C::Record>) -> Result<()> {
        let _guard = self.shards.lock_chains(shard)?;
        let (existing, next) = self.shards.read_block_meta(shard, offset)?;

        let needed = SizeClass::for_records(&records)?;
        if needed > existing {
            return Err(PackError::CapacityExceeded {
                required: required_bytes(&records),
                limit: existing.capacity(),
            });
        }

        let mut block = Block::with_class(existing, records)?;
        block.set_next_pointer(next);
        let count = block.len();
        self.persist(shard, offset, block)?;

        debug!(shard, offset, records = count, "refilled block");
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read the block at `offset`
    pub fn read_block(&self, shard: ShardId, offset: u64) -> Result<Block<C::Record>> {
        let _guard = self.shards.share_chains(shard)?;
        self.load_block(shard, offset)
    }

    /// Read every block of the chain starting at `head`, in chain order
    ///
    /// Fails on the first hop that fails; a partial chain is never returned.
    pub fn read_chain(&self, shard: ShardId, head: u64) -> Result<Vec<Block<C::Record>>> {
        let _guard = self.shards.share_chains(shard)?;

        let mut blocks = Vec::new();
        let mut visited = HashSet::new();
        let mut offset = head;
        loop {
            Self::visit(&mut visited, offset)?;
            let block = self.load_block(shard, offset)?;
            let next = block.next_pointer();
            blocks.push(block);
            if next == 0 {
                break;
            }
            offset = next;
        }
        Ok(blocks)
    }

    /// All records of the chain starting at `head`, in submission order
    pub fn records(&self, shard: ShardId, head: u64) -> Result<Vec<C::Record>> {
        Ok(self
            .read_chain(shard, head)?
            .into_iter()
            .flat_map(Block::into_records)
            .collect())
    }

    /// Scan every block of a shard in file order, with its offset
    ///
    /// Reads go straight to disk; the scan does not populate the cache.
    pub fn iter(&self, shard: ShardId) -> Result<ShardBlocks<'_, C>> {
        self.shards.blocks(shard, &self.codec)
    }

    /// Run `f` on every block of every shard
    pub fn for_each_block<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(ShardId, u64, &Block<C::Record>),
    {
        for shard in self.shards.shard_ids() {
            for item in self.iter(shard)? {
                let (offset, block) = item?;
                f(shard, offset, &block);
            }
        }
        Ok(())
    }

    /// Head offsets of all chains in a shard, ascending
    ///
    /// A head is a block no other block in the shard points to. Only block
    /// headers and trailers are read.
    pub fn chain_heads(&self, shard: ShardId) -> Result<Vec<u64>> {
        let _guard = self.shards.share_chains(shard)?;
        let end = self.shards.cursor(shard)?;

        let mut offsets = Vec::new();
        let mut linked = HashSet::new();
        let mut position = HEADER_SIZE;
        while position < end {
            let (class, next) = self.shards.read_block_meta(shard, position)?;
            offsets.push(position);
            if next != 0 {
                linked.insert(next);
            }
            position += class.capacity() as u64;
        }

        Ok(offsets
            .into_iter()
            .filter(|offset| !linked.contains(offset))
            .collect())
    }

    /// Close the engine, syncing all shard files to disk
    pub fn close(self) -> Result<()> {
        self.shards.sync_all()?;
        info!(dir = %self.config.data_dir.display(), "engine closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the shard manager
    pub fn shards(&self) -> &ShardManager {
        &self.shards
    }

    /// Get the record codec
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Number of shards
    pub fn shard_count(&self) -> u32 {
        self.shards.shard_count()
    }

    /// Blocks ever allocated across all shards
    pub fn total_blocks(&self) -> u64 {
        self.shards.total_blocks()
    }

    // =========================================================================
    // Private Helpers (chain lock held by the caller)
    // =========================================================================

    /// Cached or physical read of one block
    fn load_block(&self, shard: ShardId, offset: u64) -> Result<Block<C::Record>> {
        if let Some(cache) = &self.cache {
            if let Some(block) = cache.lookup(shard, offset) {
                trace!(shard, offset, "block cache hit");
                return Ok(block);
            }
        }

        let block = self.shards.read_block(shard, offset, &self.codec)?;
        if let Some(cache) = &self.cache {
            cache.insert(shard, offset, block.clone());
        }
        Ok(block)
    }

    /// Follow next pointers from `head` and decode the last block
    fn load_tail(&self, shard: ShardId, head: u64) -> Result<(u64, Block<C::Record>)> {
        let mut visited = HashSet::new();
        let mut offset = head;
        loop {
            Self::visit(&mut visited, offset)?;
            let next = match self.cache.as_ref().and_then(|c| c.lookup(shard, offset)) {
                Some(block) if !block.has_next() => return Ok((offset, block)),
                Some(block) => block.next_pointer(),
                None => self.shards.read_block_meta(shard, offset)?.1,
            };
            if next == 0 {
                return Ok((offset, self.load_block(shard, offset)?));
            }
            offset = next;
        }
    }

    /// Write a block and refresh its cache entry
    fn persist(&self, shard: ShardId, offset: u64, block: Block<C::Record>) -> Result<()> {
        if let Err(e) = self.shards.write_block(shard, offset, &block) {
            if let Some(cache) = &self.cache {
                cache.invalidate(shard, offset);
            }
            return Err(e);
        }
        if let Some(cache) = &self.cache {
            cache.insert(shard, offset, block);
        }
        Ok(())
    }

    /// Record a hop, failing on a pointer cycle
    fn visit(visited: &mut HashSet<u64>, offset: u64) -> Result<()> {
        if !visited.insert(offset) {
            return Err(PackError::CorruptBlock(format!(
                "chain revisits block at offset {}",
                offset
            )));
        }
        Ok(())
    }
}
