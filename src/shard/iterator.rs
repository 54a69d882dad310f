//! Shard Block Iterator
//!
//! Sequential scan over all blocks of a shard, in file order.

use crate::block::Block;
use crate::error::Result;
use crate::record::RecordCodec;

use super::{ShardId, ShardManager, HEADER_SIZE};

/// Iterator over the blocks of one shard
///
/// Starts right after the shard header and steps by each block's own
/// capacity, so it stays aligned with block boundaries across classes.
/// Stops at the cursor observed when the iterator was created, or after the
/// first error.
pub struct ShardBlocks<'a, C: RecordCodec> {
    manager: &'a ShardManager,
    codec: &'a C,
    shard: ShardId,
    /// Offset of the next block to read
    position: u64,
    /// Stop reading when we reach this offset (cursor snapshot)
    end: u64,
    failed: bool,
}

impl<'a, C: RecordCodec> ShardBlocks<'a, C> {
    pub(super) fn new(manager: &'a ShardManager, codec: &'a C, shard: ShardId, end: u64) -> Self {
        Self {
            manager,
            codec,
            shard,
            position: HEADER_SIZE,
            end,
            failed: false,
        }
    }

    fn read_next(&mut self) -> Result<(u64, Block<C::Record>)> {
        let offset = self.position;
        let block = {
            let _guard = self.manager.share_chains(self.shard)?;
            self.manager.read_block(self.shard, offset, self.codec)?
        };
        self.position = offset + block.capacity() as u64;
        Ok((offset, block))
    }
}

impl<'a, C: RecordCodec> Iterator for ShardBlocks<'a, C> {
    /// (offset, block)
    type Item = Result<(u64, Block<C::Record>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.position >= self.end {
            return None;
        }

        let item = self.read_next();
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}
