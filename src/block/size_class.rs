//! Size-class policy
//!
//! Maps a required byte count to one of eight power-of-two capacities:
//!
//! ```text
//! class   1      2       3       4       5      6      7      8
//! bytes   64KiB  128KiB  256KiB  512KiB  1MiB   2MiB   4MiB   8MiB
//! ```

use std::fmt;

use crate::error::{PackError, Result};
use crate::record::Record;

use super::{FIXED_OVERHEAD, OFFSET_ENTRY_SIZE};

/// Allocation granule; class `n` holds `SLOT_SIZE << n` bytes
pub const SLOT_SIZE: usize = 32 * 1024;

/// Smallest valid class tag
pub const MIN_CLASS: u8 = 1;

/// Largest valid class tag
pub const MAX_CLASS: u8 = 8;

/// Capacity of the largest class (8 MiB)
pub const MAX_BLOCK_CAPACITY: usize = SLOT_SIZE << MAX_CLASS;

/// One of the eight block capacities
///
/// Only valid classes can be constructed; tag 0 ("no class fits") never
/// exists as a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SizeClass(u8);

impl SizeClass {
    /// The 64 KiB class
    pub const SMALLEST: SizeClass = SizeClass(MIN_CLASS);

    /// The 8 MiB class
    pub const LARGEST: SizeClass = SizeClass(MAX_CLASS);

    /// Interpret an on-disk class tag
    pub fn from_tag(tag: u8) -> Option<Self> {
        (MIN_CLASS..=MAX_CLASS).contains(&tag).then_some(Self(tag))
    }

    /// Smallest class whose capacity holds `required` bytes
    ///
    /// `slots = max(ceil(required / 32KiB), 2)`, `class = ceil(log2(slots))`.
    pub fn for_required(required: usize) -> Result<Self> {
        let slots = required.div_ceil(SLOT_SIZE).max(2);
        let class = slots.next_power_of_two().trailing_zeros();
        if class > MAX_CLASS as u32 {
            return Err(PackError::CapacityExceeded {
                required,
                limit: MAX_BLOCK_CAPACITY,
            });
        }
        Ok(Self(class as u8))
    }

    /// Smallest class holding `records` plus block overhead
    pub fn for_records<R: Record>(records: &[R]) -> Result<Self> {
        Self::for_required(required_bytes(records))
    }

    /// On-disk tag (1..=8)
    pub fn tag(self) -> u8 {
        self.0
    }

    /// Total block footprint in bytes
    pub fn capacity(self) -> usize {
        capacity_for(self)
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class {} ({} KiB)", self.0, self.capacity() / 1024)
    }
}

/// Bytes needed to store `records` in a single block
///
/// `4 * count + Σ byte_length + header + trailer`
pub fn required_bytes<R: Record>(records: &[R]) -> usize {
    let payload: usize = records.iter().map(Record::byte_length).sum();
    OFFSET_ENTRY_SIZE * records.len() + payload + FIXED_OVERHEAD
}

/// Capacity of a class: `32KiB * 2^class`
pub fn capacity_for(class: SizeClass) -> usize {
    SLOT_SIZE << class.0
}
