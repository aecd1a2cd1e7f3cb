//! Filter Module
//!
//! Probabilistic key membership used to skip log scans.
//!
//! ## Responsibilities
//! - Answer "definitely absent" in O(k) without touching the log
//! - Support deletion without ever producing a false negative
//! - Serialize concurrent access behind the filter's own lock
//!
//! ## Layout
//! ```text
//! main bits (m)      ┌──────────┬──────────┬──────────┬──────────┐
//!                    │ region 0 │ region 1 │ region 2 │   ...    │
//!                    └──────────┴──────────┴──────────┴──────────┘
//! collision bits (r)      0          1          0         ...
//! ```
//! A set collision bit means some main bit in that region is shared by two
//! or more keys; keys touching it are never cleared.

pub mod bitset;
pub mod dibf;

use parking_lot::Mutex;

pub use bitset::Bitset;
pub use dibf::{default_hashers, estimate_parameters, Dibf, HashFn};

/// A set-membership filter over raw key bytes
pub trait MembershipFilter {
    /// Record `item` as present
    fn add(&mut self, item: &[u8]);

    /// `false` means definitely absent; `true` means possibly present
    fn contains(&self, item: &[u8]) -> bool;

    /// Try to forget `item`. Returns whether any bits were cleared; a
    /// `false` result leaves the filter unchanged.
    fn delete(&mut self, item: &[u8]) -> bool;
}

/// Wraps a filter so that every call runs under a scoped lock.
///
/// The lock is independent of the engine's write lock: readers calling
/// `contains` and the writer calling `add`/`delete` only contend here.
pub struct SyncFilter<F> {
    inner: Mutex<F>,
}

impl<F: MembershipFilter> SyncFilter<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub fn add(&self, item: &[u8]) {
        self.inner.lock().add(item);
    }

    pub fn contains(&self, item: &[u8]) -> bool {
        self.inner.lock().contains(item)
    }

    pub fn delete(&self, item: &[u8]) -> bool {
        self.inner.lock().delete(item)
    }

    /// Run `f` with exclusive access to the wrapped filter
    pub fn with<R>(&self, f: impl FnOnce(&mut F) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

/// Point-in-time filter estimates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterStats {
    pub approximate_count: u64,
    pub false_positive_rate: f64,
}

impl SyncFilter<Dibf> {
    pub fn stats(&self) -> FilterStats {
        self.with(|f| FilterStats {
            approximate_count: f.approximate_count(),
            false_positive_rate: f.current_false_positive_rate(),
        })
    }
}
