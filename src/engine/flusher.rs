//! Background flusher for `SyncMode::Async`.
//!
//! Writers submit a flush request and return immediately. There is no
//! completion signal and no error path back to the writer: failures are
//! logged here and otherwise dropped.

use std::fs::File;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Sender, TrySendError};
use tracing::{debug, error};

use crate::error::{Error, Result};

pub(crate) struct Flusher {
    requests: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Flusher {
    /// Start the flusher thread over its own handle to the log file
    pub(crate) fn spawn(file: File) -> Result<Self> {
        // One slot: a queued request already covers every write before it.
        let (tx, rx) = channel::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("appendkv-flusher".to_string())
            .spawn(move || {
                for () in rx.iter() {
                    if let Err(e) = file.sync_data() {
                        error!(error = %e, "background flush failed");
                    }
                }
                debug!("flusher stopped");
            })
            .map_err(|e| Error::io("error spawning flusher", e))?;

        Ok(Self {
            requests: Some(tx),
            handle: Some(handle),
        })
    }

    /// Ask for a flush. Never blocks.
    pub(crate) fn submit(&self) {
        if let Some(tx) = &self.requests {
            match tx.try_send(()) {
                Ok(()) | Err(TrySendError::Full(())) => {}
                Err(TrySendError::Disconnected(())) => {
                    error!("flusher is gone, dropping flush request");
                }
            }
        }
    }

    /// Stop accepting requests, let the thread drain, and wait for it
    pub(crate) fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        drop(self.requests.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("flusher thread panicked");
            }
        }
    }
}

impl Drop for Flusher {
    fn drop(&mut self) {
        self.stop();
    }
}
