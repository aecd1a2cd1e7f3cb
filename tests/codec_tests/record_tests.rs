//! Tests for the record layer
//!
//! These tests verify:
//! - Records written to a file read back in order
//! - Values stay pending until filled
//! - Clean end versus a record cut off mid-write
//! - Malformed records are rejected

use std::io::Write;

use appendkv::codec::{
    write_record, Op, Record, RecordReader, DEFAULT_MAX_LEN, ID_TAG, KEY_TAG, OP_TAG, VALUE_TAG,
};
use appendkv::error::Error;

// =============================================================================
// Helper Functions
// =============================================================================

fn sample_records() -> Vec<Record> {
    vec![
        Record::set(100, &b"alpha"[..], &b"one"[..]),
        Record::set(101, &b"beta"[..], vec![0x5Au8; 10_000]),
        Record::delete(102, &b"alpha"[..]),
        Record::set(103, &b""[..], &b""[..]),
    ]
}

fn write_all(records: &[Record]) -> Vec<u8> {
    let mut out = Vec::new();
    for r in records {
        let n = write_record(&mut out, r, DEFAULT_MAX_LEN).unwrap();
        assert_eq!(n, r.encoded_len());
    }
    out
}

// =============================================================================
// Read Tests
// =============================================================================

#[test]
fn test_records_read_back_from_file() {
    let records = sample_records();
    let data = write_all(&records);

    let mut file = tempfile::tempfile().unwrap();
    file.write_all(&data).unwrap();

    let mut reader = RecordReader::new(&file, data.len() as u64);
    let mut read = Vec::new();
    while let Some(record) = reader.read().unwrap() {
        read.push(record);
    }

    assert_eq!(read, records);
    assert_eq!(reader.position(), data.len() as u64);
}

#[test]
fn test_tags_in_order() {
    let data = write_all(&[Record::set(1, &b"k"[..], &b"v"[..])]);

    // id (13) + op (6) + key (6) + value (6)
    assert_eq!(data[0], ID_TAG);
    assert_eq!(data[13], OP_TAG);
    assert_eq!(data[18], Op::Set as u8);
    assert_eq!(data[19], KEY_TAG);
    assert_eq!(data[25], VALUE_TAG);
    assert_eq!(data.len(), 31);
}

#[test]
fn test_tombstone_has_empty_value() {
    let data = write_all(&[Record::delete(7, &b"gone"[..])]);
    let record = RecordReader::new(&data, data.len() as u64)
        .read()
        .unwrap()
        .unwrap();

    assert_eq!(record.op, Op::Delete);
    assert!(record.value.is_empty());
}

#[test]
fn test_offsets_chain_between_records() {
    let records = sample_records();
    let data = write_all(&records);
    let mut reader = RecordReader::new(&data, data.len() as u64);

    let mut expected_start = 0;
    for r in &records {
        let lazy = reader.read_lazy().unwrap().unwrap();
        assert_eq!(lazy.start_offset(), expected_start);
        assert_eq!(lazy.end_offset() - lazy.start_offset(), r.encoded_len());
        assert_eq!(lazy.value_len() as usize, r.value.len());
        expected_start = lazy.end_offset();
    }
    assert!(reader.read_lazy().unwrap().is_none());
}

#[test]
fn test_lazy_value_fill_and_convert() {
    let records = sample_records();
    let data = write_all(&records);
    let mut reader = RecordReader::new(&data, data.len() as u64);

    reader.read_lazy().unwrap().unwrap();
    let mut big = reader.read_lazy().unwrap().unwrap();
    assert!(big.value().is_none());

    reader.fill_value(&mut big).unwrap();
    assert_eq!(big.into_record().unwrap(), records[1]);
}

// =============================================================================
// Truncation Tests
// =============================================================================

#[test]
fn test_tail_cut_reads_earlier_records_then_errors() {
    let records = sample_records();
    let data = write_all(&records);
    let partial = data[..data.len() - 3].to_vec();

    let mut reader = RecordReader::new(&partial, partial.len() as u64);
    for expected in &records[..3] {
        assert_eq!(&reader.read().unwrap().unwrap(), expected);
    }
    assert!(reader.read().unwrap_err().is_unexpected_end());
}

#[test]
fn test_limit_before_file_end_hides_later_records() {
    let records = sample_records();
    let data = write_all(&records);
    let limit = records[0].encoded_len() + records[1].encoded_len();

    let mut reader = RecordReader::new(&data, limit);
    assert_eq!(reader.limit(), limit);
    assert!(reader.read().unwrap().is_some());
    assert!(reader.read().unwrap().is_some());
    assert!(reader.read().unwrap().is_none());
}

// =============================================================================
// Malformed Record Tests
// =============================================================================

#[test]
fn test_short_id_is_malformed() {
    let data = [ID_TAG, 4, 0, 0, 0, 1, 2, 3, 4];
    let mut reader = RecordReader::new(&data[..], data.len() as u64);
    assert!(matches!(reader.read(), Err(Error::MalformedRecord(_))));
}

#[test]
fn test_missing_value_field_is_unexpected_end() {
    let full = write_all(&[Record::set(1, &b"k"[..], &b"v"[..])]);
    let without_value = full[..25].to_vec();

    let mut reader = RecordReader::new(&without_value, without_value.len() as u64);
    assert!(matches!(
        reader.read(),
        Err(Error::UnexpectedEnd { offset: 25 })
    ));
}

#[test]
fn test_max_len_on_read() {
    let data = write_all(&[Record::set(1, &b"k"[..], vec![1u8; 64])]);
    let mut reader = RecordReader::with_max_len(&data, data.len() as u64, 32);

    assert!(matches!(
        reader.read(),
        Err(Error::InvalidLength { len: 64, max: 32 })
    ));
}
