//! ID Generator
//!
//! Snowflake-style 64-bit record IDs.
//!
//! ## Layout
//! ```text
//! ┌──────────────────────────────┬──────────────┬──────────────┐
//! │ ms since epoch offset (41)   │ worker (10)  │ sequence (12)│
//! └──────────────────────────────┴──────────────┴──────────────┘
//! ```
//! At most 4096 IDs per millisecond per instance; past that `next()` spins
//! until the clock moves on.

use std::time::{SystemTime, UNIX_EPOCH};

const WORKER_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const TIMESTAMP_BITS: u32 = 41;

pub const MAX_WORKER_ID: i64 = (1 << WORKER_BITS) - 1;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const TIMESTAMP_MASK: u64 = (1 << TIMESTAMP_BITS) - 1;

/// Produces record IDs
pub trait IdGenerator {
    fn next_id(&mut self) -> u64;
}

/// Millisecond wall clock
pub trait Clock {
    fn now_millis(&self) -> i64;
}

/// The system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Snowflake generator state. Not synchronized: callers serialize access.
#[derive(Debug)]
pub struct Snowflake<C = SystemClock> {
    epoch_offset: i64,
    worker_id: i64,
    sequence: u64,
    last_ts: i64,
    clock: C,
}

impl Snowflake<SystemClock> {
    /// Negative `epoch_offset` becomes 0; a `worker_id` outside [0, 1023]
    /// becomes 0.
    pub fn new(epoch_offset: i64, worker_id: i64) -> Self {
        Self::with_clock(epoch_offset, worker_id, SystemClock)
    }
}

impl<C: Clock> Snowflake<C> {
    pub fn with_clock(epoch_offset: i64, worker_id: i64, clock: C) -> Self {
        let epoch_offset = epoch_offset.max(0);
        let worker_id = if (0..=MAX_WORKER_ID).contains(&worker_id) {
            worker_id
        } else {
            0
        };

        Self {
            epoch_offset,
            worker_id,
            sequence: 0,
            last_ts: 0,
            clock,
        }
    }

    pub fn worker_id(&self) -> i64 {
        self.worker_id
    }

    /// Next ID. Never smaller than or equal to the previous one: a stalled or
    /// regressed clock keeps the last timestamp and bumps the sequence.
    pub fn next(&mut self) -> u64 {
        let mut ts = self.clock.now_millis();

        if ts <= self.last_ts {
            self.sequence = (self.sequence + 1) & SEQUENCE_MASK;
            if self.sequence == 0 {
                while ts <= self.last_ts {
                    std::hint::spin_loop();
                    ts = self.clock.now_millis();
                }
            } else {
                ts = self.last_ts;
            }
        } else {
            self.sequence = 0;
        }

        self.last_ts = ts;

        let elapsed = (ts - self.epoch_offset).max(0) as u64 & TIMESTAMP_MASK;
        (elapsed << (WORKER_BITS + SEQUENCE_BITS))
            | ((self.worker_id as u64) << SEQUENCE_BITS)
            | self.sequence
    }
}

impl<C: Clock> IdGenerator for Snowflake<C> {
    fn next_id(&mut self) -> u64 {
        self.next()
    }
}

/// Split an ID into (timestamp ms since epoch offset, worker id, sequence)
pub fn decompose(id: u64) -> (u64, u64, u64) {
    (
        id >> (WORKER_BITS + SEQUENCE_BITS),
        (id >> SEQUENCE_BITS) & MAX_WORKER_ID as u64,
        id & SEQUENCE_MASK,
    )
}
