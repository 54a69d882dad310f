//! Block Decoder
//!
//! Rebuilds a block from its byte image, validating the layout.

use bytes::Buf;

use crate::error::{PackError, Result};
use crate::record::RecordCodec;

use super::{Block, SizeClass, HEADER_SIZE, OFFSET_ENTRY_SIZE, TRAILER_SIZE};

/// Read the class tag from the start of a block image
///
/// Only the first byte is consulted.
pub fn peek_class(bytes: &[u8]) -> Result<SizeClass> {
    let tag = *bytes
        .first()
        .ok_or_else(|| PackError::CorruptBlock("empty block buffer".to_string()))?;
    SizeClass::from_tag(tag)
        .ok_or_else(|| PackError::CorruptBlock(format!("invalid class tag {}", tag)))
}

impl<R> Block<R> {
    /// Decode a block image
    ///
    /// `bytes` must hold at least the block's capacity; anything past it is
    /// ignored. Fails with `CorruptBlock` when the class tag is invalid, the
    /// buffer is truncated, the offset table overruns the block, or offsets
    /// are not strictly increasing.
    pub fn decode<C>(bytes: &[u8], codec: &C) -> Result<Block<C::Record>>
    where
        C: RecordCodec<Record = R>,
    {
        let class = peek_class(bytes)?;
        let capacity = class.capacity();
        if bytes.len() < capacity {
            return Err(PackError::CorruptBlock(format!(
                "buffer of {} bytes is shorter than {}",
                bytes.len(),
                class
            )));
        }
        let bytes = &bytes[..capacity];

        let count = (&bytes[1..HEADER_SIZE]).get_u16() as usize;
        let table_end = capacity - TRAILER_SIZE;
        let next_pointer = (&bytes[table_end..]).get_u64();

        // The offset table must leave room for the header
        let table_len = OFFSET_ENTRY_SIZE * count;
        if HEADER_SIZE + table_len > table_end {
            return Err(PackError::CorruptBlock(format!(
                "{} offsets overrun a {}",
                count, class
            )));
        }
        let table_start = table_end - table_len;

        let mut offsets = Vec::with_capacity(count);
        let mut records = Vec::with_capacity(count);
        let mut cursor = HEADER_SIZE;
        for i in 0..count {
            let slot = table_end - OFFSET_ENTRY_SIZE * i - OFFSET_ENTRY_SIZE;
            let end = (&bytes[slot..slot + OFFSET_ENTRY_SIZE]).get_u32() as usize;

            if end <= cursor {
                return Err(PackError::CorruptBlock(format!(
                    "offset {} of record {} does not follow {}",
                    end, i, cursor
                )));
            }
            if end > table_start {
                return Err(PackError::CorruptBlock(format!(
                    "record {} ends at {}, inside the offset table at {}",
                    i, end, table_start
                )));
            }

            records.push(codec.deserialize(&bytes[cursor..end])?);
            offsets.push(end as u32);
            cursor = end;
        }

        Ok(Block {
            class,
            records,
            offsets,
            next_pointer,
        })
    }
}
