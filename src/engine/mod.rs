//! Engine Module
//!
//! The storage engine: one append-only log file, a Bloom filter over its
//! keys, and an ID generator stamping every record.
//!
//! ## Responsibilities
//! - Append Set/Delete records and track the commit boundary
//! - Answer lookups by replaying the log (last writer wins)
//! - Repair a torn tail record on startup
//! - Keep the Bloom filter in step with the log
//!
//! ## Lifecycle
//! ```text
//! Uninitialized ──init()──▶ Initialized ──close()──▶ Closed
//! ```
//! Every operation except `init()` requires `Initialized`.

mod flusher;
mod recovery;
mod storage;

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::{MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use crate::codec::{write_record, LazyRecord, Op, ReadAt, Record, RecordReader};
use crate::config::{Config, SyncMode};
use crate::error::{Error, Result};
use crate::filter::{Dibf, FilterStats, SyncFilter};
use crate::id::{IdGenerator, Snowflake};

use flusher::Flusher;

pub use recovery::RecoveryReport;
pub use storage::Storage;

/// Name of the log file inside the data directory
pub const LOG_FILENAME: &str = "appendkv.log";

/// Chunk size for snapshot copies
const SNAPSHOT_CHUNK: usize = 64 * 1024;

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader
///
/// - **Writes** (set/delete): serialized by `writer`, a mutex that also owns
///   the ID generator. ID assignment, append, flush, boundary update and
///   filter update happen under it end to end.
///
/// - **Reads** (get/exists/len/snapshot): never touch `writer`. They read
///   the log through positional reads and stop at one load of
///   `commit_boundary` taken when they start. Writers only append past the
///   boundary, so a reader never sees bytes change under it.
///
/// - **Filter**: its own lock inside `SyncFilter`.
///
/// - **Lifecycle**: operations hold a read guard on `state` while they run;
///   `init`/`close` take the write guard.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Full path of the log file
    path: PathBuf,

    /// Lifecycle and open handles
    state: RwLock<Lifecycle>,

    /// Write-exclusion lock; the generator is only reachable through it
    writer: Mutex<Box<dyn IdGenerator + Send>>,

    /// Key membership filter (internal lock)
    bloom: SyncFilter<Dibf>,

    /// End of the trusted prefix of the log
    commit_boundary: AtomicU64,

    /// Outcome of the last recovery pass
    last_recovery: Mutex<Option<RecoveryReport>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

enum Lifecycle {
    Uninitialized,
    Initialized(Handles),
    Closed,
}

struct Handles {
    /// Positional reads only; its own cursor is never used
    reader: File,

    /// Append-mode handle; absent when read-only
    writer: Option<File>,

    /// Present in `SyncMode::Async`
    flusher: Option<Flusher>,

    /// Whether the filter reflects the log. A read-only engine never
    /// rebuilds it, so lookups fall back to scanning.
    filter_ready: bool,
}

/// Where a scan is, handed to `for_each` visitors
pub struct ScanCursor<'a> {
    source: &'a File,
    position: u64,
    bound: u64,
    max_len: u32,
}

impl ScanCursor<'_> {
    /// Reader offset after the record just visited (or where an error
    /// stopped the scan)
    pub fn position(&self) -> u64 {
        self.position
    }

    /// The commit boundary this scan is limited to
    pub fn bound(&self) -> u64 {
        self.bound
    }

    /// Read the pending value of a record seen during this scan
    pub fn fill_value(&self, record: &mut LazyRecord) -> Result<()> {
        RecordReader::with_max_len(self.source, self.bound, self.max_len).fill_value(record)
    }
}

impl Engine {
    /// Create an uninitialized engine. Nothing touches the disk until
    /// `init()`.
    pub fn new(config: Config) -> Result<Self> {
        let ids = Snowflake::new(config.epoch_offset_ms, config.worker_id);
        if ids.worker_id() != config.worker_id {
            warn!(
                requested = config.worker_id,
                "worker id out of range, using 0"
            );
        }

        Self::with_id_generator(config, Box::new(ids))
    }

    /// Like `new`, with record IDs drawn from `ids` instead of a Snowflake
    /// built from the config. IDs must strictly increase.
    pub fn with_id_generator(config: Config, ids: Box<dyn IdGenerator + Send>) -> Result<Self> {
        config.validate()?;

        let bloom = Dibf::with_estimates(
            config.bloom_expected_items,
            config.bloom_false_positive_rate,
            config.bloom_collision_divisor,
        );
        debug!(filter = ?bloom, "bloom filter sized");

        Ok(Self {
            path: config.data_dir.join(LOG_FILENAME),
            config,
            state: RwLock::new(Lifecycle::Uninitialized),
            writer: Mutex::new(ids),
            bloom: SyncFilter::new(bloom),
            commit_boundary: AtomicU64::new(0),
            last_recovery: Mutex::new(None),
        })
    }

    /// Create and initialize in one step
    pub fn open(config: Config) -> Result<Self> {
        let engine = Self::new(config)?;
        engine.init()?;
        Ok(engine)
    }

    /// Open with default config in `path`
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Open the log and, unless read-only, replay it to rebuild the filter
    /// and repair a torn tail.
    pub fn init(&self) -> Result<()> {
        let mut state = self.state.write();
        match *state {
            Lifecycle::Uninitialized => {}
            Lifecycle::Initialized(_) => return Err(Error::AlreadyInitialized),
            Lifecycle::Closed => return Err(Error::NotInitialized),
        }

        let read_only = self.config.read_only;

        let writer = if read_only {
            None
        } else {
            fs::create_dir_all(&self.config.data_dir)
                .map_err(|e| Error::io("error creating data directory", e))?;

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|e| Error::io("error opening file for write fd", e))?;
            Some(file)
        };

        let reader = OpenOptions::new()
            .read(true)
            .open(&self.path)
            .map_err(|e| Error::io("error opening file for read fd", e))?;

        let size = reader
            .metadata()
            .map_err(|e| Error::io("error reading log size", e))?
            .len();
        self.commit_boundary.store(size, Ordering::Release);

        let mut handles = Handles {
            reader,
            writer,
            flusher: None,
            filter_ready: false,
        };

        if read_only {
            info!(
                path = %self.path.display(),
                boundary = size,
                "opened read-only, recovery skipped"
            );
        } else {
            let report = self.recover(&handles)?;
            info!(
                path = %self.path.display(),
                records = report.records_recovered,
                truncated = report.was_truncated,
                boundary = report.commit_boundary,
                "recovery complete"
            );
            *self.last_recovery.lock() = Some(report);
            handles.filter_ready = true;
        }

        if self.config.sync_mode == SyncMode::Async {
            if let Some(writer) = &handles.writer {
                let file = writer
                    .try_clone()
                    .map_err(|e| Error::io("error cloning write fd", e))?;
                handles.flusher = Some(Flusher::spawn(file)?);
            }
        }

        *state = Lifecycle::Initialized(handles);
        Ok(())
    }

    /// Value of `key`, or `KeyNotFound`
    pub fn get(&self, key: &[u8]) -> Result<Bytes> {
        let handles = self.handles()?;
        self.lookup(&handles, key)?.ok_or(Error::KeyNotFound)
    }

    /// Append a Set record for `key`
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let handles = self.handles()?;
        if self.config.read_only {
            return Err(Error::ReadOnlyStorage);
        }

        let mut ids = self.writer.lock();
        let record = Record::set(
            ids.next_id(),
            Bytes::copy_from_slice(key),
            Bytes::copy_from_slice(value),
        );
        self.append(&handles, &record)?;
        self.bloom.add(key);

        debug!(id = record.id, key_len = key.len(), value_len = value.len(), "set");
        Ok(())
    }

    /// Append a tombstone for `key`. A key the filter has never seen is
    /// skipped without writing anything.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let handles = self.handles()?;
        if self.config.read_only {
            return Err(Error::ReadOnlyStorage);
        }

        if !self.bloom.contains(key) {
            debug!(key_len = key.len(), "delete skipped, key absent");
            return Ok(());
        }

        let mut ids = self.writer.lock();
        let record = Record::delete(ids.next_id(), Bytes::copy_from_slice(key));
        self.append(&handles, &record)?;

        let cleared = self.bloom.delete(key);
        debug!(id = record.id, filter_cleared = cleared, "delete");
        Ok(())
    }

    /// Filter membership only: `false` is certain, `true` may be a false
    /// positive.
    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        let handles = self.handles()?;
        if handles.filter_ready {
            Ok(self.bloom.contains(key))
        } else {
            Ok(self.lookup(&handles, key)?.is_some())
        }
    }

    /// Exact number of live keys, by full replay
    pub fn len(&self) -> Result<usize> {
        let handles = self.handles()?;

        let mut live: HashSet<Bytes> = HashSet::new();
        self.scan(&handles, |_, record, _| {
            if let Some(record) = record {
                match record.op {
                    Op::Set => {
                        live.insert(record.key.clone());
                    }
                    Op::Delete => {
                        live.remove(&record.key);
                    }
                }
            }
            ControlFlow::<()>::Continue(())
        })?;

        Ok(live.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|n| n == 0)
    }

    /// Copy the committed prefix of the log to `sink`, byte for byte.
    /// Returns the number of bytes copied.
    pub fn snapshot<W: Write>(&self, mut sink: W) -> Result<u64> {
        let handles = self.handles()?;
        let bound = self.commit_boundary.load(Ordering::Acquire);

        let mut buf = vec![0u8; SNAPSHOT_CHUNK];
        let mut offset = 0u64;
        while offset < bound {
            let want = ((bound - offset) as usize).min(buf.len());
            let n = handles
                .reader
                .read_full_at(&mut buf[..want], offset)
                .map_err(|e| Error::io("error reading log for snapshot", e))?;
            if n < want {
                return Err(Error::UnexpectedEnd { offset: offset + n as u64 });
            }

            sink.write_all(&buf[..n])
                .map_err(|e| Error::io("error writing snapshot", e))?;
            offset += n as u64;
        }

        sink.flush()
            .map_err(|e| Error::io("error flushing snapshot", e))?;

        debug!(bytes = bound, "snapshot written");
        Ok(bound)
    }

    /// Close both handles. The engine cannot be reopened.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.write();
        let handles = match std::mem::replace(&mut *state, Lifecycle::Closed) {
            Lifecycle::Initialized(handles) => handles,
            other => {
                *state = other;
                return Err(Error::NotInitialized);
            }
        };

        let Handles {
            reader,
            writer,
            flusher,
            ..
        } = handles;

        if let Some(flusher) = flusher {
            flusher.shutdown();
        }

        let synced = match (&writer, self.config.sync_mode) {
            (Some(file), SyncMode::Sync | SyncMode::Async) => file
                .sync_all()
                .map_err(|e| Error::io("error syncing file on close", e)),
            _ => Ok(()),
        };

        drop(writer);
        drop(reader);

        info!(
            path = %self.path.display(),
            boundary = self.commit_boundary.load(Ordering::Acquire),
            "storage closed"
        );
        synced
    }

    /// Walk every committed record in file order.
    ///
    /// `visit` gets each record as `(cursor, Some(record), None)`. If a
    /// record cannot be read it gets `(cursor, None, Some(error))`; the scan
    /// then ends with that error unless `visit` breaks. Breaking at any
    /// point stops the scan and returns the break value.
    pub fn for_each<B, F>(&self, visit: F) -> Result<Option<B>>
    where
        F: FnMut(&ScanCursor<'_>, Option<&LazyRecord>, Option<&Error>) -> ControlFlow<B>,
    {
        let handles = self.handles()?;
        self.scan(&handles, visit)
    }

    /// First record with `id`, value included. Linear; for diagnostics.
    pub fn get_by_id(&self, id: u64) -> Result<Record> {
        let handles = self.handles()?;

        let found = self.scan(&handles, |cursor, record, _| match record {
            Some(record) if record.id == id => {
                let mut record = record.clone();
                ControlFlow::Break(cursor.fill_value(&mut record).map(|_| record))
            }
            _ => ControlFlow::Continue(()),
        })?;

        match found {
            Some(record) => record?.into_record(),
            None => Err(Error::KeyNotFound),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current end of the trusted log prefix
    pub fn commit_boundary(&self) -> u64 {
        self.commit_boundary.load(Ordering::Acquire)
    }

    pub fn is_initialized(&self) -> bool {
        matches!(*self.state.read(), Lifecycle::Initialized(_))
    }

    /// Filter estimates; advisory only
    pub fn bloom_stats(&self) -> FilterStats {
        self.bloom.stats()
    }

    /// What the last `init()` found, if it ran recovery
    pub fn last_recovery(&self) -> Option<RecoveryReport> {
        self.last_recovery.lock().clone()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn handles(&self) -> Result<MappedRwLockReadGuard<'_, Handles>> {
        RwLockReadGuard::try_map(self.state.read(), |state| match state {
            Lifecycle::Initialized(handles) => Some(handles),
            _ => None,
        })
        .map_err(|_| Error::NotInitialized)
    }

    fn record_reader<'a>(&self, file: &'a File, bound: u64) -> RecordReader<&'a File> {
        RecordReader::with_max_len(file, bound, self.config.max_field_len)
    }

    /// Latest value of `key`, `None` if absent or deleted
    fn lookup(&self, handles: &Handles, key: &[u8]) -> Result<Option<Bytes>> {
        if handles.filter_ready && !self.bloom.contains(key) {
            return Ok(None);
        }

        let mut candidate: Option<LazyRecord> = None;
        self.scan(handles, |_, record, _| {
            if let Some(record) = record {
                if &record.key[..] == key {
                    candidate = match record.op {
                        Op::Set => Some(record.clone()),
                        Op::Delete => None,
                    };
                }
            }
            ControlFlow::<()>::Continue(())
        })?;

        match candidate {
            Some(mut record) => {
                self.record_reader(&handles.reader, self.commit_boundary())
                    .fill_value(&mut record)?;
                Ok(record.value().cloned())
            }
            None => Ok(None),
        }
    }

    /// Shared scan loop, bounded by one load of the commit boundary
    fn scan<B, F>(&self, handles: &Handles, mut visit: F) -> Result<Option<B>>
    where
        F: FnMut(&ScanCursor<'_>, Option<&LazyRecord>, Option<&Error>) -> ControlFlow<B>,
    {
        let bound = self.commit_boundary.load(Ordering::Acquire);
        let mut reader = self.record_reader(&handles.reader, bound);

        loop {
            let next = reader.read_lazy();
            let cursor = ScanCursor {
                source: &handles.reader,
                position: reader.position(),
                bound,
                max_len: self.config.max_field_len,
            };

            match next {
                Ok(Some(record)) => {
                    if let ControlFlow::Break(b) = visit(&cursor, Some(&record), None) {
                        return Ok(Some(b));
                    }
                }
                Ok(None) => return Ok(None),
                Err(err) => {
                    return match visit(&cursor, None, Some(&err)) {
                        ControlFlow::Break(b) => Ok(Some(b)),
                        ControlFlow::Continue(()) => Err(err),
                    }
                }
            }
        }
    }

    /// Append one record and advance the commit boundary. Caller holds the
    /// write lock.
    fn append(&self, handles: &Handles, record: &Record) -> Result<()> {
        self.append_with(handles, record, |file| match self.config.sync_mode {
            SyncMode::Sync => file.sync_data(),
            SyncMode::Async => {
                if let Some(flusher) = &handles.flusher {
                    flusher.submit();
                }
                Ok(())
            }
            SyncMode::None => Ok(()),
        })
    }

    /// `append` with the durability step supplied by the caller. If either
    /// the write or `flush` fails the record is cut back off the log.
    fn append_with<F>(&self, handles: &Handles, record: &Record, flush: F) -> Result<()>
    where
        F: FnOnce(&File) -> io::Result<()>,
    {
        let mut file: &File = handles.writer.as_ref().ok_or(Error::ReadOnlyStorage)?;

        // The boundary can lag the file after a failed read-back, so the
        // rollback point is the file length itself.
        let start = file
            .metadata()
            .map_err(|e| Error::io("error reading log size", e))?
            .len();

        if let Err(e) = write_record(file, record, self.config.max_field_len) {
            rollback_partial_write(file, start);
            return Err(e);
        }

        if let Err(e) = flush(file) {
            rollback_partial_write(file, start);
            return Err(Error::io("error syncing file", e));
        }

        match file.stream_position() {
            Ok(offset) => self.commit_boundary.store(offset, Ordering::Release),
            Err(e) => warn!(
                error = %e,
                id = record.id,
                "could not read write offset, commit boundary left unchanged"
            ),
        }

        Ok(())
    }
}

/// Cut the log back to `len`, so the next append does not land behind a
/// record that was never acknowledged.
fn rollback_partial_write(file: &File, len: u64) {
    match file.metadata() {
        Ok(meta) if meta.len() > len => {
            if let Err(e) = file.set_len(len) {
                warn!(error = %e, len, "could not trim failed write");
            }
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "could not stat log after failed write"),
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if matches!(*self.state.get_mut(), Lifecycle::Initialized(_)) {
            if let Err(e) = self.close() {
                warn!(error = %e, "error closing storage on drop");
            }
        }
    }
}
