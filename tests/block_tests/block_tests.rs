//! Tests for the block format
//!
//! These tests verify:
//! - Byte layout of encoded blocks (header, records, offset table, trailer)
//! - Decode of encoded blocks, including next pointers
//! - In-block append and free-space accounting
//! - Corruption detection on decode

#[path = "../common/mod.rs"]
mod common;

use blockpack::block::{required_bytes, HEADER_SIZE, MAX_BLOCK_CAPACITY};
use blockpack::{Block, PackError, RawCodec, Record, SizeClass};
use bytes::Bytes;

use common::{raw, raw_batch, Article, ArticleCodec};

const CAP: usize = 64 * 1024;

// =============================================================================
// Helper Functions
// =============================================================================

fn u32_at(bytes: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap())
}

fn put_u32_at(bytes: &mut [u8], pos: usize, value: u32) {
    bytes[pos..pos + 4].copy_from_slice(&value.to_be_bytes());
}

fn decode_raw(bytes: &[u8]) -> blockpack::Result<Block<Bytes>> {
    Block::<Bytes>::decode(bytes, &RawCodec)
}

/// Record that lies about its length
#[derive(Clone)]
struct Misreported;

impl Record for Misreported {
    fn byte_length(&self) -> usize {
        10
    }

    fn serialize(&self) -> Bytes {
        Bytes::from_static(b"short")
    }
}

// =============================================================================
// Encode Tests
// =============================================================================

#[test]
fn test_empty_block_encodes_full_capacity() {
    let block = Block::<Bytes>::new(SizeClass::SMALLEST);
    let bytes = block.encode().unwrap();

    assert_eq!(bytes.len(), CAP);
    assert_eq!(bytes[0], 1);
    assert_eq!(&bytes[1..3], &[0, 0]);
    assert!(bytes[3..].iter().all(|&b| b == 0));
}

#[test]
fn test_encode_layout() {
    let block = Block::from_records(vec![Bytes::from_static(b"abc"), Bytes::from_static(b"de")])
        .unwrap();
    let bytes = block.encode().unwrap();

    assert_eq!(bytes.len(), CAP);
    assert_eq!(bytes[0], 1);
    assert_eq!(&bytes[1..3], &[0, 2]);
    assert_eq!(&bytes[3..6], b"abc");
    assert_eq!(&bytes[6..8], b"de");

    // Padding between the records and the offset table stays zero
    assert!(bytes[8..CAP - 16].iter().all(|&b| b == 0));

    // Record 0's entry sits nearest the trailer
    assert_eq!(u32_at(&bytes, CAP - 12), 6);
    assert_eq!(u32_at(&bytes, CAP - 16), 8);

    // No next block
    assert_eq!(&bytes[CAP - 8..], &[0u8; 8]);
}

#[test]
fn test_encode_writes_next_pointer() {
    let mut block = Block::from_records(vec![raw(10, 1)]).unwrap();
    block.set_next_pointer(0x0102_0304_0506_0708);
    let bytes = block.encode().unwrap();

    assert_eq!(&bytes[CAP - 8..], &[1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn test_encode_larger_class() {
    let records = raw_batch(2, 40_000, 0);
    let block = Block::from_records(records).unwrap();

    assert_eq!(block.class().tag(), 2);
    let bytes = block.encode().unwrap();
    assert_eq!(bytes.len(), 128 * 1024);
    assert_eq!(bytes[0], 2);
}

#[test]
fn test_encode_rejects_misreported_length() {
    let block = Block::from_records(vec![Misreported]).unwrap();
    let result = block.encode();

    assert!(matches!(
        result,
        Err(PackError::RecordLength {
            declared: 10,
            actual: 5
        })
    ));
}

// =============================================================================
// Decode Tests
// =============================================================================

#[test]
fn test_round_trip_preserves_content_and_order() {
    let records = raw_batch(50, 120, 0);
    let block = Block::from_records(records.clone()).unwrap();

    let decoded = decode_raw(&block.encode().unwrap()).unwrap();

    assert_eq!(decoded.records(), records.as_slice());
    assert_eq!(decoded.offsets(), block.offsets());
    assert_eq!(decoded.class(), block.class());
    assert_eq!(decoded, block);
}

#[test]
fn test_round_trip_articles() {
    let articles = vec![
        Article::new("12", "测试title", "测试favicon图标", "测试描述"),
        Article::new("13", "测试一把", "测试fff", "desc"),
    ];
    let block = Block::from_records(articles.clone()).unwrap();

    let decoded = Block::<Article>::decode(&block.encode().unwrap(), &ArticleCodec).unwrap();

    assert_eq!(decoded.records(), articles.as_slice());
    assert_eq!(decoded.next_pointer(), 0);
}

#[test]
fn test_decode_reads_next_pointer() {
    let mut block = Block::from_records(vec![raw(30, 1)]).unwrap();
    block.set_next_pointer(65_548);

    let decoded = decode_raw(&block.encode().unwrap()).unwrap();

    assert_eq!(decoded.next_pointer(), 65_548);
    assert!(decoded.has_next());
}

#[test]
fn test_decode_empty_block() {
    let bytes = Block::<Bytes>::new(SizeClass::SMALLEST).encode().unwrap();
    let decoded = decode_raw(&bytes).unwrap();

    assert!(decoded.is_empty());
    assert_eq!(decoded.free_bytes(), CAP - 11);
}

#[test]
fn test_decode_ignores_bytes_past_capacity() {
    let block = Block::from_records(vec![raw(20, 1), raw(20, 2)]).unwrap();
    let mut bytes = block.encode().unwrap().to_vec();
    bytes.extend_from_slice(&[0xFF; 1000]);

    let decoded = decode_raw(&bytes).unwrap();
    assert_eq!(decoded, block);
}

#[test]
fn test_decode_rejects_invalid_class() {
    let mut bytes = Block::from_records(vec![raw(20, 1)])
        .unwrap()
        .encode()
        .unwrap()
        .to_vec();

    bytes[0] = 0;
    assert!(matches!(decode_raw(&bytes), Err(PackError::CorruptBlock(_))));

    bytes[0] = 9;
    assert!(matches!(decode_raw(&bytes), Err(PackError::CorruptBlock(_))));
}

#[test]
fn test_decode_rejects_truncated_buffer() {
    let bytes = Block::from_records(vec![raw(20, 1)])
        .unwrap()
        .encode()
        .unwrap();

    let result = decode_raw(&bytes[..CAP - 1]);
    assert!(matches!(result, Err(PackError::CorruptBlock(_))));

    assert!(matches!(decode_raw(&[]), Err(PackError::CorruptBlock(_))));
}

#[test]
fn test_decode_rejects_offset_table_overrun() {
    let mut bytes = Block::<Bytes>::new(SizeClass::SMALLEST)
        .encode()
        .unwrap()
        .to_vec();

    // 65535 offsets need 262140 bytes, far more than 64 KiB
    bytes[1] = 0xFF;
    bytes[2] = 0xFF;

    assert!(matches!(decode_raw(&bytes), Err(PackError::CorruptBlock(_))));
}

#[test]
fn test_decode_rejects_non_increasing_offsets() {
    let block = Block::from_records(vec![raw(20, 1), raw(20, 2)]).unwrap();
    let mut bytes = block.encode().unwrap().to_vec();

    // Second record ends where the first does
    let first_end = u32_at(&bytes, CAP - 12);
    put_u32_at(&mut bytes, CAP - 16, first_end);

    assert!(matches!(decode_raw(&bytes), Err(PackError::CorruptBlock(_))));
}

#[test]
fn test_decode_rejects_record_running_into_offset_table() {
    let block = Block::from_records(vec![raw(20, 1)]).unwrap();
    let mut bytes = block.encode().unwrap().to_vec();

    put_u32_at(&mut bytes, CAP - 12, (CAP - 8) as u32);

    assert!(matches!(decode_raw(&bytes), Err(PackError::CorruptBlock(_))));
}

#[test]
fn test_decode_propagates_codec_errors() {
    let block = Block::from_records(vec![Bytes::from_static(b"not an article")]).unwrap();
    let bytes = block.encode().unwrap();

    let result = Block::<Article>::decode(&bytes, &ArticleCodec);
    assert!(matches!(result, Err(PackError::Serialization(_))));
}

// =============================================================================
// Construction Tests
// =============================================================================

#[test]
fn test_from_records_picks_smallest_class() {
    let small = Block::from_records(raw_batch(10, 100, 0)).unwrap();
    assert_eq!(small.class(), SizeClass::SMALLEST);

    // 70 KB payload needs the 128 KiB class
    let medium = Block::from_records(raw_batch(7, 10_000, 0)).unwrap();
    assert_eq!(medium.class().tag(), 2);
}

#[test]
fn test_from_records_over_limit_fails() {
    let records = raw_batch(2, MAX_BLOCK_CAPACITY / 2, 0);
    let result = Block::from_records(records);

    assert!(matches!(result, Err(PackError::CapacityExceeded { .. })));
}

#[test]
fn test_with_class_too_small_fails() {
    let records = raw_batch(2, 40_000, 0);
    let result = Block::with_class(SizeClass::SMALLEST, records);

    assert!(matches!(
        result,
        Err(PackError::CapacityExceeded { limit, .. }) if limit == CAP
    ));
}

#[test]
fn test_empty_record_rejected() {
    let result = Block::from_records(vec![Bytes::new()]);
    assert!(matches!(result, Err(PackError::EmptyRecord)));
}

#[test]
fn test_offsets_are_cumulative() {
    let block = Block::from_records(vec![raw(5, 0), raw(7, 1), raw(11, 2)]).unwrap();

    assert_eq!(block.offsets(), &[8, 15, 26]);
}

// =============================================================================
// add_record Tests
// =============================================================================

#[test]
fn test_free_bytes_accounting() {
    let mut block = Block::<Bytes>::new(SizeClass::SMALLEST);
    assert_eq!(block.free_bytes(), CAP - HEADER_SIZE - 8);

    block.add_record(raw(100, 0)).unwrap();
    assert_eq!(block.free_bytes(), CAP - HEADER_SIZE - 8 - 104);

    block.add_record(raw(50, 1)).unwrap();
    assert_eq!(block.free_bytes(), CAP - HEADER_SIZE - 8 - 104 - 54);
    assert_eq!(block.offsets(), &[103, 153]);
}

#[test]
fn test_add_record_exact_fit() {
    let mut block = Block::<Bytes>::new(SizeClass::SMALLEST);
    block.add_record(raw(1000, 0)).unwrap();

    let last = block.free_bytes() - 4;
    block.add_record(raw(last, 1)).unwrap();
    assert_eq!(block.free_bytes(), 0);

    // The encoded block is still exactly one capacity
    let decoded = decode_raw(&block.encode().unwrap()).unwrap();
    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded.record(1).unwrap().len(), last);

    assert!(block.add_record(raw(1, 2)).is_err());
}

#[test]
fn test_add_record_full_leaves_block_unchanged() {
    let mut block = Block::<Bytes>::new(SizeClass::SMALLEST);
    let mut tag = 0;
    let rejected = loop {
        match block.add_record(raw(300, tag)) {
            Ok(()) => tag += 1,
            Err(full) => break full,
        }
    };

    assert!(rejected.needed > rejected.free);
    assert_eq!(rejected.needed, 304);

    // The rejected record comes back intact
    assert_eq!(rejected.into_record(), raw(300, tag));

    let before = block.clone();
    let before_bytes = block.encode().unwrap();
    assert!(block.add_record(raw(300, tag)).is_err());
    assert_eq!(block, before);
    assert_eq!(block.encode().unwrap(), before_bytes);
    assert_eq!(block.len(), tag);
    assert_eq!(block.class(), SizeClass::SMALLEST);
}

#[test]
fn test_add_record_succeeds_whenever_required_bytes_fit() {
    let mut block = Block::<Bytes>::new(SizeClass::SMALLEST);
    let mut current: Vec<Bytes> = Vec::new();

    for (i, len) in [4000usize, 12_000, 30_000, 19_000, 500, 1, 3].iter().enumerate() {
        let record = raw(*len, i);
        let mut candidate = current.clone();
        candidate.push(record.clone());
        let fits = required_bytes(&candidate) <= CAP;

        let result = block.add_record(record.clone());
        assert_eq!(result.is_ok(), fits, "record {} of {} bytes", i, len);
        if fits {
            current.push(record);
        }
        assert!(required_bytes(&current) <= CAP);
    }

    assert_eq!(block.records(), current.as_slice());
}

#[test]
fn test_block_full_converts_to_pack_error() {
    let mut block = Block::<Bytes>::new(SizeClass::SMALLEST);
    let full = block.add_record(raw(CAP, 0)).unwrap_err();

    let error: PackError = full.into();
    assert!(matches!(
        error,
        PackError::BlockFull { needed, free } if needed == CAP + 4 && free == CAP - 11
    ));
}

#[test]
fn test_fits_empty() {
    assert!(Block::<Bytes>::fits_empty(SizeClass::SMALLEST, CAP - 15));
    assert!(!Block::<Bytes>::fits_empty(SizeClass::SMALLEST, CAP - 14));
}
