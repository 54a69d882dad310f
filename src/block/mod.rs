//! Block Module
//!
//! Fixed-capacity container of records, the unit of storage and I/O.
//!
//! ## Block Format
//! ```text
//! ┌───────┬───────────┬──────────────────────┬─────────┬───────────────┬──────────┐
//! │Class  │ Count     │ Records              │ Padding │ Offset table  │ Next     │
//! │ (1)   │ u16 (2)   │ r0 r1 r2 ...         │ (zero)  │ ... o2 o1 o0  │ u64 (8)  │
//! └───────┴───────────┴──────────────────────┴─────────┴───────────────┴──────────┘
//! 0       1           3                                capacity-8-4n   capacity-8
//! ```
//!
//! - All integers are big-endian.
//! - `o[i]` is the end offset of record `i`, measured from block start. The
//!   table grows backward from the trailer: `o[i]` sits at
//!   `capacity - 8 - 4*i - 4`.
//! - `Next` is the absolute shard offset of the next block in the chain, or 0.
//! - An encoded block is always exactly `capacity` bytes.

mod decode;
mod encode;
mod size_class;

use std::fmt;

use crate::error::{PackError, Result};
use crate::record::Record;

pub use decode::peek_class;
pub use size_class::{
    capacity_for, required_bytes, SizeClass, MAX_BLOCK_CAPACITY, MAX_CLASS, MIN_CLASS, SLOT_SIZE,
};

// =============================================================================
// Shared Constants (used by encode, decode, size_class)
// =============================================================================

/// Class tag (1) + record count (2)
pub const HEADER_SIZE: usize = 3;

/// Next-pointer trailer
pub const TRAILER_SIZE: usize = 8;

/// One cumulative offset in the offset table
pub const OFFSET_ENTRY_SIZE: usize = 4;

/// Header + trailer = 11 bytes
pub const FIXED_OVERHEAD: usize = HEADER_SIZE + TRAILER_SIZE;

/// The record count is stored as a u16
pub const MAX_RECORDS: usize = u16::MAX as usize;

/// `next_pointer` value meaning "end of chain"
pub const NO_NEXT: u64 = 0;

// =============================================================================
// Block
// =============================================================================

/// A block of records with its offset table and chain link
///
/// The class is fixed for the block's lifetime; a full block is never grown,
/// the chain is extended with a new block instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Block<R> {
    class: SizeClass,
    records: Vec<R>,
    /// `offsets[i]` = byte position right after record `i`
    offsets: Vec<u32>,
    next_pointer: u64,
}

impl<R: Record> Block<R> {
    /// Create an empty block of the given class
    pub fn new(class: SizeClass) -> Self {
        Self {
            class,
            records: Vec::new(),
            offsets: Vec::new(),
            next_pointer: NO_NEXT,
        }
    }

    /// Build a block holding all `records`, sized to the smallest class
    /// that fits them
    pub fn from_records(records: Vec<R>) -> Result<Self> {
        let class = SizeClass::for_records(&records)?;
        Self::with_class(class, records)
    }

    /// Build a block of a given class holding all `records`
    ///
    /// Fails with `CapacityExceeded` if they do not fit.
    pub fn with_class(class: SizeClass, records: Vec<R>) -> Result<Self> {
        let required = required_bytes(&records);
        if required > class.capacity() || records.len() > MAX_RECORDS {
            return Err(PackError::CapacityExceeded {
                required,
                limit: class.capacity(),
            });
        }

        let mut offsets = Vec::with_capacity(records.len());
        let mut end = HEADER_SIZE;
        for record in &records {
            let len = record.byte_length();
            if len == 0 {
                return Err(PackError::EmptyRecord);
            }
            end += len;
            offsets.push(end as u32);
        }

        Ok(Self {
            class,
            records,
            offsets,
            next_pointer: NO_NEXT,
        })
    }

    /// Whether a record of `len` bytes fits in an empty block of `class`
    pub fn fits_empty(class: SizeClass, len: usize) -> bool {
        FIXED_OVERHEAD + OFFSET_ENTRY_SIZE + len <= class.capacity()
    }

    /// Bytes still available for payload plus offset entries
    ///
    /// `capacity - last_offset - trailer - 4 * count`
    pub fn free_bytes(&self) -> usize {
        self.capacity() - self.data_end() - TRAILER_SIZE - OFFSET_ENTRY_SIZE * self.len()
    }

    /// Append a record
    ///
    /// A record of `n` bytes needs `n + 4` free bytes (payload plus its
    /// offset entry). On failure the block is unchanged and the record is
    /// handed back inside the error.
    pub fn add_record(&mut self, record: R) -> std::result::Result<(), BlockFull<R>> {
        let len = record.byte_length();
        let needed = len + OFFSET_ENTRY_SIZE;
        let free = self.free_bytes();

        if needed > free || self.len() >= MAX_RECORDS {
            return Err(BlockFull {
                record,
                needed,
                free,
            });
        }

        let end = self.data_end() + len;
        self.records.push(record);
        self.offsets.push(end as u32);
        Ok(())
    }
}

impl<R> Block<R> {
    /// Size class (fixed for the block's lifetime)
    pub fn class(&self) -> SizeClass {
        self.class
    }

    /// On-disk footprint in bytes
    pub fn capacity(&self) -> usize {
        self.class.capacity()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in insertion order
    pub fn records(&self) -> &[R] {
        &self.records
    }

    /// Record at `index`, if any
    pub fn record(&self, index: usize) -> Option<&R> {
        self.records.get(index)
    }

    /// Cumulative end offsets, one per record
    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// Take the records out of the block
    pub fn into_records(self) -> Vec<R> {
        self.records
    }

    /// Absolute offset of the next block, or 0
    pub fn next_pointer(&self) -> u64 {
        self.next_pointer
    }

    /// Link this block to the next one in its chain
    pub fn set_next_pointer(&mut self, offset: u64) {
        self.next_pointer = offset;
    }

    /// Whether this block links to another block
    pub fn has_next(&self) -> bool {
        self.next_pointer != NO_NEXT
    }

    /// End of the record area (3 when empty)
    fn data_end(&self) -> usize {
        self.offsets
            .last()
            .map(|&o| o as usize)
            .unwrap_or(HEADER_SIZE)
    }
}

// =============================================================================
// BlockFull
// =============================================================================

/// A record rejected by [`Block::add_record`]
///
/// Carries the record back so the caller can route it to a new block.
pub struct BlockFull<R> {
    record: R,
    /// Bytes the record needed (payload + offset entry)
    pub needed: usize,
    /// Bytes the block had left
    pub free: usize,
}

impl<R> BlockFull<R> {
    /// Recover the rejected record
    pub fn into_record(self) -> R {
        self.record
    }
}

impl<R> fmt::Debug for BlockFull<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockFull")
            .field("needed", &self.needed)
            .field("free", &self.free)
            .finish_non_exhaustive()
    }
}

impl<R> From<BlockFull<R>> for PackError {
    fn from(full: BlockFull<R>) -> Self {
        PackError::BlockFull {
            needed: full.needed,
            free: full.free,
        }
    }
}
