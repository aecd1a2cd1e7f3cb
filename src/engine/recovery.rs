//! Startup recovery.
//!
//! Replays the log up to the boundary found at open, rebuilding the Bloom
//! filter as it goes. A record cut off by a crash can only be the last one,
//! so the first `UnexpectedEnd` marks where the trusted prefix ends: the file
//! is truncated back to the end of the last complete record.
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬───────┐
//! │ record 1 │ record 2 │ record 3 │ rec 4 │ ◀── torn
//! └──────────┴──────────┴──────────┴───────┘
//!                                  ▲
//!                          last_good: new EOF
//! ```

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::ops::ControlFlow;
use std::sync::atomic::Ordering;

use tracing::{debug, warn};

use crate::codec::Op;
use crate::error::{Error, Result};

use super::{Engine, Handles};

/// What a recovery pass found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Complete records replayed
    pub records_recovered: u64,

    /// How many of them were Set records
    pub sets: u64,

    /// How many of them were tombstones
    pub deletes: u64,

    /// Whether a torn tail was cut off
    pub was_truncated: bool,

    /// Bytes removed from the end of the log
    pub truncated_bytes: u64,

    /// Commit boundary once recovery finished
    pub commit_boundary: u64,
}

impl Engine {
    /// Replay the log, rebuild the filter, and cut off a torn tail.
    ///
    /// Runs before the engine is published as initialized, so nothing else
    /// can be reading or writing.
    pub(super) fn recover(&self, handles: &Handles) -> Result<RecoveryReport> {
        // A failed earlier init may have filled it already.
        self.bloom.with(|f| f.clear());

        let bound = self.commit_boundary.load(Ordering::Acquire);
        let mut report = RecoveryReport::default();
        let mut last_good = 0u64;

        let outcome = self.scan(handles, |cursor, record, err| {
            if let Some(record) = record {
                if record.end_offset() > cursor.bound() {
                    return ControlFlow::Break(Err(Error::RecoveryInvariant(format!(
                        "record {} ends at {} past boundary {}",
                        record.id,
                        record.end_offset(),
                        cursor.bound()
                    ))));
                }

                last_good = record.end_offset();
                self.bloom.add(&record.key);

                report.records_recovered += 1;
                match record.op {
                    Op::Set => report.sets += 1,
                    Op::Delete => report.deletes += 1,
                }
                return ControlFlow::Continue(());
            }

            match err {
                Some(e) if e.is_unexpected_end() => ControlFlow::Break(Ok(())),
                _ => ControlFlow::Continue(()),
            }
        });

        match outcome {
            Ok(None) => {
                if last_good != bound {
                    return Err(Error::RecoveryInvariant(format!(
                        "clean scan ended at {} but boundary is {}",
                        last_good, bound
                    )));
                }
            }
            Ok(Some(Ok(()))) => {
                let writer = handles.writer.as_ref().ok_or(Error::ReadOnlyStorage)?;
                truncate_tail(writer, last_good)?;
                self.commit_boundary.store(last_good, Ordering::Release);

                report.was_truncated = true;
                report.truncated_bytes = bound - last_good;
                warn!(
                    from = bound,
                    to = last_good,
                    "truncated incomplete record at end of log"
                );
            }
            Ok(Some(Err(invariant))) => return Err(invariant),
            Err(e) => return Err(Error::corrupt(e)),
        }

        report.commit_boundary = self.commit_boundary.load(Ordering::Acquire);
        debug!(?report, "recovery pass finished");
        Ok(report)
    }
}

/// Shrink the log to `len` and make the new length durable
fn truncate_tail(mut file: &File, len: u64) -> Result<()> {
    file.set_len(len)
        .map_err(|e| Error::io("error truncating file", e))?;
    file.seek(SeekFrom::Start(len))
        .map_err(|e| Error::io("error seeking file", e))?;
    file.sync_all()
        .map_err(|e| Error::io("error syncing truncated file", e))
}
