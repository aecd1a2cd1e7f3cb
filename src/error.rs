//! Error types for appendkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using Error
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for appendkv operations
#[derive(Debug, Error)]
pub enum Error {
    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("storage is not initialized")]
    NotInitialized,

    #[error("storage is already initialized")]
    AlreadyInitialized,

    // -------------------------------------------------------------------------
    // Lookup / Mutation Errors
    // -------------------------------------------------------------------------
    #[error("key not found")]
    KeyNotFound,

    #[error("storage is read only")]
    ReadOnlyStorage,

    // -------------------------------------------------------------------------
    // Recovery Errors
    // -------------------------------------------------------------------------
    /// Recovery hit something it cannot repair by truncation.
    #[error("storage is corrupted: {source}")]
    CorruptStorage {
        #[source]
        source: Box<Error>,
    },

    /// Recovery bookkeeping reached a state that should be impossible.
    /// Never repaired, never retried.
    #[error("recovery invariant violated: {0}")]
    RecoveryInvariant(String),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("length {len} cannot be greater than {max}")]
    InvalidLength { len: u64, max: u32 },

    /// A field or record was cut off mid-write.
    #[error("unexpected end of data at offset {offset}")]
    UnexpectedEnd { offset: u64 },

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    RawIo(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),
}

/// Coarse classification used by outer layers (e.g. a request handler) to
/// pick a response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Negative lookup, not an engine fault
    NotFound,
    /// Mutation attempted against a read-only engine
    ReadOnly,
    /// Everything else
    Other,
}

impl Error {
    /// Wrap an I/O error with the operation that produced it.
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Error::Io { context, source }
    }

    pub(crate) fn corrupt(source: Error) -> Self {
        Error::CorruptStorage {
            source: Box::new(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::KeyNotFound => ErrorKind::NotFound,
            Error::ReadOnlyStorage => ErrorKind::ReadOnly,
            _ => ErrorKind::Other,
        }
    }

    /// True for the truncated-record condition that recovery repairs.
    pub fn is_unexpected_end(&self) -> bool {
        matches!(self, Error::UnexpectedEnd { .. })
    }
}
