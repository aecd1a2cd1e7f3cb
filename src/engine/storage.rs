//! The `Storage` trait: the contract a transport or other front end sees.

use std::io::Write;

use bytes::Bytes;

use crate::error::Result;

use super::Engine;

/// Key-value storage as seen by callers outside the crate.
///
/// Object safe, so a front end can hold an `Arc<dyn Storage>`.
pub trait Storage: Send + Sync {
    fn init(&self) -> Result<()>;

    /// Value for `key`, or `Error::KeyNotFound`
    fn get(&self, key: &[u8]) -> Result<Bytes>;

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    fn delete(&self, key: &[u8]) -> Result<()>;

    /// May report false positives, never false negatives
    fn exists(&self, key: &[u8]) -> Result<bool>;

    fn len(&self) -> Result<usize>;

    /// Write the committed log to `sink`; returns bytes written
    fn snapshot(&self, sink: &mut dyn Write) -> Result<u64>;

    fn close(&self) -> Result<()>;
}

impl Storage for Engine {
    fn init(&self) -> Result<()> {
        Engine::init(self)
    }

    fn get(&self, key: &[u8]) -> Result<Bytes> {
        Engine::get(self, key)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        Engine::set(self, key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        Engine::delete(self, key)
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        Engine::exists(self, key)
    }

    fn len(&self) -> Result<usize> {
        Engine::len(self)
    }

    fn snapshot(&self, sink: &mut dyn Write) -> Result<u64> {
        Engine::snapshot(self, sink)
    }

    fn close(&self) -> Result<()> {
        Engine::close(self)
    }
}
