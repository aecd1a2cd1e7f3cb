//! Codec Module
//!
//! Binary encoding of the log.
//!
//! ## Responsibilities
//! - Encode/decode TLV fields
//! - Defer reading large values until a lookup needs them
//! - Tell "no more records" apart from "record cut off mid-write"
//!
//! ## File Format
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │ Record 1                                                  │
//! │ ┌────────────┬───────────┬─────────────┬───────────────┐  │
//! │ │ ID (tag 1) │ Op (tag 2)│ Key (tag 3) │ Value (tag 4) │  │
//! │ └────────────┴───────────┴─────────────┴───────────────┘  │
//! ├───────────────────────────────────────────────────────────┤
//! │ Record 2 ...                                              │
//! └───────────────────────────────────────────────────────────┘
//!
//! Each field: [tag (1)][length u32 LE (4)][payload (length)]
//!   ID payload:  u64 LE (8)
//!   Op payload:  1 = Set, 2 = Delete (1)
//! ```
//! No header, footer, or checksum.

mod read_at;
mod record;
mod tlv;

pub use read_at::ReadAt;
pub use record::{
    write_record, LazyRecord, Op, Record, RecordReader, ID_TAG, KEY_TAG, OP_TAG, VALUE_TAG,
};
pub use tlv::{Field, FieldValue, TlvReader, TlvWriter, DEFAULT_MAX_LEN, TLV_HEADER_SIZE};
