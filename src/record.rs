//! Record boundary
//!
//! The engine never interprets record contents. Callers supply:
//! - a [`Record`] type that knows its serialized length and bytes
//! - a [`RecordCodec`] that turns stored bytes back into records
//!
//! `Bytes` and `Vec<u8>` implement [`Record`] directly, and [`RawCodec`]
//! decodes into `Bytes`, which is enough for opaque payloads.

use bytes::Bytes;

use crate::error::Result;

/// A storable record
///
/// `serialize().len()` must equal `byte_length()`: capacity accounting uses
/// the declared length while encoding writes the actual bytes.
pub trait Record {
    /// Serialized size in bytes
    fn byte_length(&self) -> usize;

    /// Serialized form
    fn serialize(&self) -> Bytes;
}

/// Decodes stored record bytes back into records
pub trait RecordCodec: Send + Sync {
    /// The record type produced by this codec
    type Record: Record + Clone + Send + Sync + 'static;

    /// Decode one record from exactly the bytes it was serialized to
    fn deserialize(&self, bytes: &[u8]) -> Result<Self::Record>;
}

impl Record for Bytes {
    fn byte_length(&self) -> usize {
        self.len()
    }

    fn serialize(&self) -> Bytes {
        self.clone()
    }
}

impl Record for Vec<u8> {
    fn byte_length(&self) -> usize {
        self.len()
    }

    fn serialize(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

/// Codec for opaque byte records
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl RecordCodec for RawCodec {
    type Record = Bytes;

    fn deserialize(&self, bytes: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(bytes))
    }
}
