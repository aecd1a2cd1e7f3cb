//! # appendkv
//!
//! An embedded, append-only key-value store with:
//! - A single log file of TLV-encoded records as the only on-disk state
//! - Crash recovery that cuts off a torn final record
//! - A deletable Bloom filter to answer "definitely absent" without a scan
//! - Snowflake record IDs
//! - Single-writer/multi-reader concurrency model
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Storage trait / CLI                       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Engine                               │
//! │            (Single Writer / Multi Reader)                   │
//! └───────┬──────────────────────┬───────────────────┬──────────┘
//!         │                      │                   │
//!         ▼                      ▼                   ▼
//!  ┌─────────────┐        ┌─────────────┐     ┌─────────────┐
//!  │  Snowflake  │        │    DIBF     │     │    Codec    │
//!  │  (IDs)      │        │  (Mutex)    │     │ (TLV/Record)│
//!  └─────────────┘        └─────────────┘     └──────┬──────┘
//!                                                    │
//!                                                    ▼
//!                                             ┌─────────────┐
//!                                             │  Log file   │
//!                                             │  (Append)   │
//!                                             └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod filter;
pub mod id;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Error, ErrorKind, Result};
pub use config::{Config, SyncMode};
pub use engine::{Engine, Storage};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of appendkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
