//! Configuration for appendkv
//!
//! Centralized configuration with sensible defaults. A `Config` is built once
//! and handed to `Engine::new`; the engine never reads process-wide state.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Main configuration for an appendkv instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the log file:
    ///   {data_dir}/
    ///     └── appendkv.log
    pub data_dir: PathBuf,

    /// How hard `set`/`delete` push written bytes to stable storage
    pub sync_mode: SyncMode,

    /// Reject mutations and skip recovery on init
    pub read_only: bool,

    /// Upper bound on any single encoded field (key or value)
    pub max_field_len: u32,

    // -------------------------------------------------------------------------
    // ID Generator Configuration
    // -------------------------------------------------------------------------
    /// Worker id stamped into every record ID, valid range [0, 1023].
    /// Out-of-range values fall back to 0.
    pub worker_id: i64,

    /// Milliseconds subtracted from the wall clock before packing IDs
    pub epoch_offset_ms: i64,

    // -------------------------------------------------------------------------
    // Bloom Filter Configuration
    // -------------------------------------------------------------------------
    /// Number of keys the filter is sized for
    pub bloom_expected_items: usize,

    /// Target false positive rate at `bloom_expected_items`
    pub bloom_false_positive_rate: f64,

    /// Main bits per collision-region bit (m / r)
    pub bloom_collision_divisor: f64,
}

/// Durability mode for writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// No explicit flush; the OS decides
    #[default]
    None,

    /// fsync before returning (success implies durability)
    Sync,

    /// Hand a flush to the background flusher and return immediately
    Async,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::None => "none",
            SyncMode::Sync => "sync",
            SyncMode::Async => "async",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(SyncMode::None),
            "sync" => Ok(SyncMode::Sync),
            "async" => Ok(SyncMode::Async),
            other => Err(Error::Config(format!("unknown sync mode: {}", other))),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./appendkv_data"),
            sync_mode: SyncMode::None,
            read_only: false,
            max_field_len: u32::MAX,
            worker_id: 0,
            epoch_offset_ms: 0,
            bloom_expected_items: 1_000_000,
            bloom_false_positive_rate: 0.01,
            bloom_collision_divisor: 20.0,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the values that have no sensible clamp
    pub fn validate(&self) -> Result<()> {
        let fp = self.bloom_false_positive_rate;
        if !(fp > 0.0 && fp < 1.0) {
            return Err(Error::Config(format!(
                "bloom false positive rate must be in (0, 1), got {}",
                fp
            )));
        }

        if !(self.bloom_collision_divisor > 0.0) {
            return Err(Error::Config(format!(
                "bloom collision divisor must be positive, got {}",
                self.bloom_collision_divisor
            )));
        }

        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the sync mode
    pub fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.config.sync_mode = mode;
        self
    }

    /// Open the storage read-only
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.config.read_only = read_only;
        self
    }

    /// Set the maximum encodable field length
    pub fn max_field_len(mut self, len: u32) -> Self {
        self.config.max_field_len = len;
        self
    }

    /// Set the ID generator worker id
    pub fn worker_id(mut self, id: i64) -> Self {
        self.config.worker_id = id;
        self
    }

    /// Set the ID generator epoch offset (unix millis)
    pub fn epoch_offset_ms(mut self, ms: i64) -> Self {
        self.config.epoch_offset_ms = ms;
        self
    }

    /// Size the Bloom filter for `items` keys at the given false positive rate
    pub fn bloom_sizing(mut self, items: usize, false_positive_rate: f64) -> Self {
        self.config.bloom_expected_items = items;
        self.config.bloom_false_positive_rate = false_positive_rate;
        self
    }

    /// Set the collision-region divisor
    pub fn bloom_collision_divisor(mut self, divisor: f64) -> Self {
        self.config.bloom_collision_divisor = divisor;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
