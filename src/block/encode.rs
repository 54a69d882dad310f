//! Block Encoder
//!
//! Lays a block out into its full `capacity`-sized byte image.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{PackError, Result};
use crate::record::Record;

use super::{Block, HEADER_SIZE, OFFSET_ENTRY_SIZE, TRAILER_SIZE};

impl<R: Record> Block<R> {
    /// Encode the block into exactly `capacity` bytes
    ///
    /// Records are written forward from byte 3, their end offsets backward
    /// from the trailer. Unused bytes in between stay zero.
    pub fn encode(&self) -> Result<Bytes> {
        let capacity = self.capacity();
        let table_end = capacity - TRAILER_SIZE;

        let mut out = BytesMut::zeroed(capacity);

        // Header: class tag + record count
        {
            let mut header = &mut out[..HEADER_SIZE];
            header.put_u8(self.class().tag());
            header.put_u16(self.len() as u16);
        }

        let mut cursor = HEADER_SIZE;
        for (i, record) in self.records().iter().enumerate() {
            let data = record.serialize();
            let end = self.offsets()[i] as usize;

            if data.is_empty() {
                return Err(PackError::EmptyRecord);
            }
            if cursor + data.len() != end {
                return Err(PackError::RecordLength {
                    declared: end - cursor,
                    actual: data.len(),
                });
            }

            out[cursor..end].copy_from_slice(&data);
            cursor = end;

            let slot = table_end - OFFSET_ENTRY_SIZE * i - OFFSET_ENTRY_SIZE;
            (&mut out[slot..slot + OFFSET_ENTRY_SIZE]).put_u32(end as u32);
        }

        // Trailer: next pointer
        (&mut out[table_end..]).put_u64(self.next_pointer());

        Ok(out.freeze())
    }
}
