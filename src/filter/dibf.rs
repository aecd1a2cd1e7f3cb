//! Deletable Bloom filter.
//!
//! A standard Bloom filter plus a second, coarser bitset that records which
//! regions of the main bitset have seen a collision (a bit set by two or more
//! items). Bits in collision-free regions belong to exactly one item and can
//! be cleared on delete; an item touching any colliding region is never
//! cleared, so deletion cannot introduce a false negative.
//!
//! Based on: https://arxiv.org/pdf/1005.0352.pdf

use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hasher};

use super::bitset::Bitset;
use super::MembershipFilter;

/// A hash function over raw key bytes
pub type HashFn = Box<dyn Fn(&[u8]) -> u64 + Send + Sync>;

/// Deletable Bloom filter
pub struct Dibf {
    /// Main bits
    m: u64,
    /// Hash functions per item
    k: u64,
    main: Bitset,
    collisions: Bitset,
    hashers: Vec<HashFn>,
}

impl Dibf {
    /// Create a filter with `m` main bits, `k` hash functions and `r`
    /// collision-region bits. `m` and `k` are raised to at least 1; `r` is
    /// clamped to `m` when it is 0 or larger than `m`.
    pub fn new(m: u64, k: u64, r: u64) -> Self {
        let k = k.max(1);
        Self::with_hashers(m, k, r, default_hashers(k))
    }

    /// Like [`Dibf::new`] but with caller-supplied hash functions. The
    /// number of functions determines `k`.
    pub fn with_hashers(m: u64, k: u64, r: u64, hashers: Vec<HashFn>) -> Self {
        let m = m.max(1);
        let r = if r == 0 || r > m { m } else { r };
        let k = if hashers.is_empty() { k.max(1) } else { hashers.len() as u64 };
        let hashers = if hashers.is_empty() {
            default_hashers(k)
        } else {
            hashers
        };

        Self {
            m,
            k,
            main: Bitset::new(m),
            collisions: Bitset::new(r),
            hashers,
        }
    }

    /// Size a filter for `n` items at false positive rate `fp`, with one
    /// collision bit per `divisor` main bits.
    pub fn with_estimates(n: usize, fp: f64, divisor: f64) -> Self {
        let (m, k) = estimate_parameters(n, fp);
        let r = (m as f64 / divisor) as u64;
        Self::new(m, k, r)
    }

    /// Number of hash functions
    pub fn k(&self) -> u64 {
        self.k
    }

    /// Number of main bits
    pub fn capacity(&self) -> u64 {
        self.m
    }

    /// Number of collision-region bits
    pub fn regions(&self) -> u64 {
        self.collisions.size()
    }

    /// Estimated number of items, from the fraction of set bits.
    ///
    /// Based on: https://en.wikipedia.org/wiki/Bloom_filter#Approximating_the_number_of_items_in_a_Bloom_filter
    pub fn approximate_count(&self) -> u64 {
        let x = self.main.count() as f64;
        let m = self.m as f64;
        let k = self.k as f64;

        if x >= m {
            return u64::MAX;
        }

        let count = (m / k) * (1.0 / (1.0 - x / m)).ln();
        (count + 0.5).floor() as u64
    }

    /// Estimated false positive rate at the current fill.
    ///
    /// Based on: https://en.wikipedia.org/wiki/Bloom_filter#Probability_of_false_positives
    pub fn current_false_positive_rate(&self) -> f64 {
        let n = self.approximate_count() as f64;
        let m = self.m as f64;
        let k = self.k as f64;

        (1.0 - (-k * n / m).exp()).powf(k)
    }

    /// Reset both bitsets.
    pub fn clear(&mut self) {
        self.main.clear();
        self.collisions.clear();
    }

    /// Region of a main bit. When `r` does not divide `m` the tail bits
    /// fold into the last region so every bit stays tracked.
    fn region(&self, bit: u64) -> u64 {
        let regions = self.collisions.size();
        (bit / (self.m / regions)).min(regions - 1)
    }

    fn positions(&self, item: &[u8]) -> Vec<u64> {
        self.hashers.iter().map(|h| h(item) % self.m).collect()
    }
}

impl MembershipFilter for Dibf {
    fn add(&mut self, item: &[u8]) {
        for bit in self.positions(item) {
            if self.main.get(bit) {
                self.collisions.set(self.region(bit));
            }
            self.main.set(bit);
        }
    }

    fn contains(&self, item: &[u8]) -> bool {
        self.positions(item).into_iter().all(|bit| self.main.get(bit))
    }

    fn delete(&mut self, item: &[u8]) -> bool {
        let positions = self.positions(item);

        if !positions.iter().all(|&bit| self.main.get(bit)) {
            return false;
        }

        // One colliding region pins every bit of this item.
        if positions
            .iter()
            .any(|&bit| self.collisions.get(self.region(bit)))
        {
            return false;
        }

        for bit in positions {
            self.main.unset(bit);
        }
        true
    }
}

impl fmt::Debug for Dibf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dibf")
            .field("m", &self.m)
            .field("k", &self.k)
            .field("regions", &self.collisions.size())
            .field("set_bits", &self.main.count())
            .field("collision_bits", &self.collisions.count())
            .finish()
    }
}

/// Estimate `(m, k)` for `n` items at false positive rate `fp`.
///
/// Based on: https://en.wikipedia.org/wiki/Bloom_filter#Optimal_number_of_hash_functions
pub fn estimate_parameters(n: usize, fp: f64) -> (u64, u64) {
    let ln2 = std::f64::consts::LN_2;
    let m = (-(n as f64) * fp.ln() / (ln2 * ln2)).ceil() as u64;
    let k = (-fp.ln() / ln2).ceil() as u64;
    (m, k)
}

/// `k` double-hashing functions `h1 + i*h2 + i*i` over two randomly seeded
/// hashers. Seeds are per process, which is fine for an unpersisted filter.
pub fn default_hashers(k: u64) -> Vec<HashFn> {
    let s1 = RandomState::new();
    let s2 = RandomState::new();

    (0..k)
        .map(|i| {
            let s1 = s1.clone();
            let s2 = s2.clone();
            Box::new(move |item: &[u8]| {
                let mut h1 = s1.build_hasher();
                h1.write(item);
                let mut h2 = s2.build_hasher();
                h2.write(item);
                h1.finish()
                    .wrapping_add(i.wrapping_mul(h2.finish()))
                    .wrapping_add(i.wrapping_mul(i))
            }) as HashFn
        })
        .collect()
}
