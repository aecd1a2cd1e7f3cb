//! Record (packet) encoding.
//!
//! A record is four consecutive TLV fields: ID, Op, Key, Value. Scans read
//! the first three eagerly and leave the value pending, so walking the log
//! costs the same no matter how large the values are.

use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

use super::tlv::{Field, TlvReader, TlvWriter, DEFAULT_MAX_LEN, TLV_HEADER_SIZE};
use super::ReadAt;

pub const ID_TAG: u8 = 1;
pub const OP_TAG: u8 = 2;
pub const KEY_TAG: u8 = 3;
pub const VALUE_TAG: u8 = 4;

/// Record operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    Set = 1,
    Delete = 2,
}

impl TryFrom<u8> for Op {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            1 => Ok(Op::Set),
            2 => Ok(Op::Delete),
            other => Err(Error::MalformedRecord(format!("unknown op code {}", other))),
        }
    }
}

/// A fully materialized record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: u64,
    pub op: Op,
    pub key: Bytes,
    pub value: Bytes,
}

impl Record {
    pub fn set(id: u64, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            id,
            op: Op::Set,
            key: key.into(),
            value: value.into(),
        }
    }

    /// A tombstone; the value is always empty
    pub fn delete(id: u64, key: impl Into<Bytes>) -> Self {
        Self {
            id,
            op: Op::Delete,
            key: key.into(),
            value: Bytes::new(),
        }
    }

    /// Size of this record on disk
    pub fn encoded_len(&self) -> u64 {
        4 * TLV_HEADER_SIZE + 8 + 1 + self.key.len() as u64 + self.value.len() as u64
    }

    /// Serialize all four fields into one buffer
    pub fn encode(&self, max_len: u32) -> Result<Bytes> {
        let buf = BytesMut::with_capacity(self.encoded_len() as usize);
        let mut w = TlvWriter::with_max_len(buf.writer(), max_len);

        w.write(ID_TAG, &self.id.to_le_bytes())?;
        w.write(OP_TAG, &[self.op as u8])?;
        w.write(KEY_TAG, &self.key)?;
        w.write(VALUE_TAG, &self.value)?;

        Ok(w.into_inner().into_inner().freeze())
    }
}

/// Encode `record` and hand it to `sink` in a single `write_all`, so a
/// concurrent reader of the same file never sees a partially interleaved
/// record. Returns the number of bytes written.
pub fn write_record<W: Write>(mut sink: W, record: &Record, max_len: u32) -> Result<u64> {
    let buf = record.encode(max_len)?;
    sink.write_all(&buf)
        .map_err(|e| Error::io("error writing record", e))?;
    Ok(buf.len() as u64)
}

/// A record whose value may not have been read yet
#[derive(Debug, Clone)]
pub struct LazyRecord {
    pub id: u64,
    pub op: Op,
    pub key: Bytes,
    value: Field,
    start: u64,
    end: u64,
}

impl LazyRecord {
    /// The value, once filled
    pub fn value(&self) -> Option<&Bytes> {
        self.value.bytes()
    }

    pub fn value_len(&self) -> u32 {
        self.value.len
    }

    pub fn is_filled(&self) -> bool {
        self.value.is_filled()
    }

    /// Offset of the record's first byte
    pub fn start_offset(&self) -> u64 {
        self.start
    }

    /// Offset just past the record's last byte
    pub fn end_offset(&self) -> u64 {
        self.end
    }

    /// Convert into a `Record`; fails if the value was never filled
    pub fn into_record(self) -> Result<Record> {
        let value = match self.value.bytes() {
            Some(v) => v.clone(),
            None => {
                return Err(Error::MalformedRecord(format!(
                    "record {} value not filled",
                    self.id
                )))
            }
        };

        Ok(Record {
            id: self.id,
            op: self.op,
            key: self.key,
            value,
        })
    }
}

/// Sequential record reader over a positional source
pub struct RecordReader<R> {
    tlv: TlvReader<R>,
}

impl<R: ReadAt> RecordReader<R> {
    /// Read records in `[0, limit)`
    pub fn new(source: R, limit: u64) -> Self {
        Self::with_max_len(source, limit, DEFAULT_MAX_LEN)
    }

    pub fn with_max_len(source: R, limit: u64, max_len: u32) -> Self {
        Self {
            tlv: TlvReader::new(source).with_limit(limit).with_max_len(max_len),
        }
    }

    /// Offset of the next record
    pub fn position(&self) -> u64 {
        self.tlv.position()
    }

    pub fn limit(&self) -> u64 {
        self.tlv.limit()
    }

    /// Next record with its value left pending.
    ///
    /// `Ok(None)` only when the log ends cleanly between records. A record
    /// cut short anywhere after its first byte is `UnexpectedEnd`.
    pub fn read_lazy(&mut self) -> Result<Option<LazyRecord>> {
        let start = self.tlv.position();

        let id = match self.tlv.read()? {
            Some(field) => field,
            None => return Ok(None),
        };
        let id = decode_id(&id)?;

        let op = self.required(OP_TAG, true)?;
        let op = match op.bytes().map(|b| &b[..]) {
            Some([byte]) => Op::try_from(*byte)?,
            _ => {
                return Err(Error::MalformedRecord(format!(
                    "op field must be 1 byte, got {}",
                    op.len
                )))
            }
        };

        let key = self.required(KEY_TAG, true)?;
        let key = key.bytes().cloned().unwrap_or_default();

        let value = self.required(VALUE_TAG, false)?;

        Ok(Some(LazyRecord {
            id,
            op,
            key,
            value,
            start,
            end: self.tlv.position(),
        }))
    }

    /// Next record with its value read
    pub fn read(&mut self) -> Result<Option<Record>> {
        match self.read_lazy()? {
            Some(mut record) => {
                self.fill_value(&mut record)?;
                record.into_record().map(Some)
            }
            None => Ok(None),
        }
    }

    /// Read the pending value of `record`. Safe to call repeatedly.
    pub fn fill_value(&self, record: &mut LazyRecord) -> Result<()> {
        self.tlv.fill(&mut record.value)
    }

    fn required(&mut self, tag: u8, eager: bool) -> Result<Field> {
        let offset = self.tlv.position();
        let field = if eager {
            self.tlv.read()?
        } else {
            self.tlv.read_lazy()?
        };

        let field = field.ok_or(Error::UnexpectedEnd { offset })?;
        if field.tag != tag {
            return Err(Error::MalformedRecord(format!(
                "expected tag {} at offset {}, found {}",
                tag, offset, field.tag
            )));
        }
        Ok(field)
    }
}

fn decode_id(field: &Field) -> Result<u64> {
    if field.tag != ID_TAG {
        return Err(Error::MalformedRecord(format!(
            "expected id tag {}, found {}",
            ID_TAG, field.tag
        )));
    }

    let bytes: [u8; 8] = field
        .bytes()
        .and_then(|b| <[u8; 8]>::try_from(&b[..]).ok())
        .ok_or_else(|| {
            Error::MalformedRecord(format!("id field must be 8 bytes, got {}", field.len))
        })?;

    Ok(u64::from_le_bytes(bytes))
}
