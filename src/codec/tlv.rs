//! TLV reader and writer.

use std::io::Write;

use bytes::Bytes;

use crate::error::{Error, Result};

use super::ReadAt;

/// Tag (1) + length (4)
pub const TLV_HEADER_SIZE: u64 = 5;

/// Default cap on a single field: the whole u32 range
pub const DEFAULT_MAX_LEN: u32 = u32::MAX;

/// Value state of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Header read; value bytes start at `offset` and have not been read yet
    Pending { offset: u64 },

    /// Value bytes materialized
    Filled(Bytes),
}

/// One type-length-value field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub tag: u8,
    pub len: u32,
    pub value: FieldValue,
}

impl Field {
    /// A filled field. Values longer than `u32::MAX` cannot be represented
    /// on disk; the writer rejects them before this type is involved.
    pub fn new(tag: u8, value: impl Into<Bytes>) -> Self {
        let value = value.into();
        Self {
            tag,
            len: value.len() as u32,
            value: FieldValue::Filled(value),
        }
    }

    pub fn is_filled(&self) -> bool {
        matches!(self.value, FieldValue::Filled(_))
    }

    /// The value bytes, if filled
    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.value {
            FieldValue::Filled(b) => Some(b),
            FieldValue::Pending { .. } => None,
        }
    }

    /// Size of this field on disk
    pub fn encoded_len(&self) -> u64 {
        TLV_HEADER_SIZE + self.len as u64
    }
}

/// Writes TLV fields to a sink
pub struct TlvWriter<W> {
    sink: W,
    max_len: u32,
}

impl<W: Write> TlvWriter<W> {
    pub fn new(sink: W) -> Self {
        Self::with_max_len(sink, DEFAULT_MAX_LEN)
    }

    pub fn with_max_len(sink: W, max_len: u32) -> Self {
        Self { sink, max_len }
    }

    /// Write `[tag][len LE][value]`. Fails with `InvalidLength` before
    /// writing anything if `value` is longer than the configured maximum.
    pub fn write(&mut self, tag: u8, value: &[u8]) -> Result<()> {
        let len = value.len() as u64;
        if len > self.max_len as u64 {
            return Err(Error::InvalidLength {
                len,
                max: self.max_len,
            });
        }

        self.sink
            .write_all(&[tag])
            .and_then(|_| self.sink.write_all(&(len as u32).to_le_bytes()))
            .and_then(|_| self.sink.write_all(value))
            .map_err(|e| Error::io("error writing tlv", e))
    }

    pub fn write_field(&mut self, field: &Field) -> Result<()> {
        match &field.value {
            FieldValue::Filled(value) => self.write(field.tag, value),
            FieldValue::Pending { offset } => Err(Error::MalformedRecord(format!(
                "cannot write unfilled field (tag {}, value at {})",
                field.tag, offset
            ))),
        }
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

/// Reads TLV fields from a positional source.
///
/// The reader keeps its own cursor; the source is only ever addressed by
/// offset. Bytes at or past `limit` are treated as absent.
pub struct TlvReader<R> {
    source: R,
    pos: u64,
    limit: u64,
    max_len: u32,
}

impl<R: ReadAt> TlvReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            pos: 0,
            limit: u64::MAX,
            max_len: DEFAULT_MAX_LEN,
        }
    }

    /// Stop reading at `limit`
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Refuse to materialize values longer than `max_len`
    pub fn with_max_len(mut self, max_len: u32) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn seek(&mut self, pos: u64) {
        self.pos = pos;
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Read a field and its value.
    ///
    /// `Ok(None)` when no bytes remain at the cursor; `UnexpectedEnd` when
    /// the tag is present but the rest of the field is not.
    pub fn read(&mut self) -> Result<Option<Field>> {
        match self.read_lazy()? {
            Some(mut field) => {
                self.fill(&mut field)?;
                Ok(Some(field))
            }
            None => Ok(None),
        }
    }

    /// Read tag and length, record where the value lives, and move the
    /// cursor past it without reading it.
    pub fn read_lazy(&mut self) -> Result<Option<Field>> {
        let start = self.pos;

        let mut tag = [0u8; 1];
        if self.read_bounded(&mut tag, start)? == 0 {
            return Ok(None);
        }

        let mut len = [0u8; 4];
        if self.read_bounded(&mut len, start + 1)? < len.len() {
            return Err(Error::UnexpectedEnd { offset: start });
        }
        let len = u32::from_le_bytes(len);

        let offset = start + TLV_HEADER_SIZE;
        let end = offset.saturating_add(len as u64);
        if end > self.limit {
            return Err(Error::UnexpectedEnd { offset: start });
        }

        self.pos = end;

        Ok(Some(Field {
            tag: tag[0],
            len,
            value: FieldValue::Pending { offset },
        }))
    }

    /// Read the value of a pending field. A no-op on filled fields; on
    /// failure the field stays pending and can be filled again later.
    pub fn fill(&self, field: &mut Field) -> Result<()> {
        let offset = match field.value {
            FieldValue::Filled(_) => return Ok(()),
            FieldValue::Pending { offset } => offset,
        };

        if field.len > self.max_len {
            return Err(Error::InvalidLength {
                len: field.len as u64,
                max: self.max_len,
            });
        }

        let mut buf = vec![0u8; field.len as usize];
        if self.read_bounded(&mut buf, offset)? < buf.len() {
            return Err(Error::UnexpectedEnd { offset });
        }

        field.value = FieldValue::Filled(Bytes::from(buf));
        Ok(())
    }

    fn read_bounded(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let available = self.limit.saturating_sub(offset);
        let want = (buf.len() as u64).min(available) as usize;
        if want == 0 {
            return Ok(0);
        }

        self.source
            .read_full_at(&mut buf[..want], offset)
            .map_err(|e| Error::io("error reading tlv", e))
    }
}
