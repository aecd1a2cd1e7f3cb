//! Fixed-size bit array backed by 64-bit words.

const WORD_BITS: u64 = 64;

/// A fixed-size set of bits. Out-of-range indexes are ignored on write and
/// read as unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitset {
    words: Vec<u64>,
    size: u64,
}

impl Bitset {
    /// Create a bitset of `size` bits, all unset.
    pub fn new(size: u64) -> Self {
        Self {
            words: vec![0; (size / WORD_BITS + 1) as usize],
            size,
        }
    }

    pub fn set(&mut self, index: u64) {
        if index >= self.size {
            return;
        }
        self.words[(index / WORD_BITS) as usize] |= 1 << (index % WORD_BITS);
    }

    pub fn unset(&mut self, index: u64) {
        if index >= self.size {
            return;
        }
        self.words[(index / WORD_BITS) as usize] &= !(1 << (index % WORD_BITS));
    }

    pub fn get(&self, index: u64) -> bool {
        if index >= self.size {
            return false;
        }
        self.words[(index / WORD_BITS) as usize] & (1 << (index % WORD_BITS)) != 0
    }

    /// Number of addressable bits
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of set bits
    pub fn count(&self) -> u64 {
        self.words.iter().map(|w| w.count_ones() as u64).sum()
    }

    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Bits set in either. `None` when sizes differ.
    pub fn union(&self, other: &Bitset) -> Option<Bitset> {
        self.combine(other, |a, b| a | b)
    }

    /// Bits set in both. `None` when sizes differ.
    pub fn intersect(&self, other: &Bitset) -> Option<Bitset> {
        self.combine(other, |a, b| a & b)
    }

    /// Bits set in `self` but not in `other`. `None` when sizes differ.
    pub fn difference(&self, other: &Bitset) -> Option<Bitset> {
        self.combine(other, |a, b| a & !b)
    }

    fn combine(&self, other: &Bitset, op: impl Fn(u64, u64) -> u64) -> Option<Bitset> {
        if self.size != other.size {
            return None;
        }

        let words = self
            .words
            .iter()
            .zip(&other.words)
            .map(|(a, b)| op(*a, *b))
            .collect();

        Some(Bitset {
            words,
            size: self.size,
        })
    }
}
