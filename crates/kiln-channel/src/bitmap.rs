//! # Allocation Bitmap
//!
//! One bit per channel slot, set while the slot is allocated.

use alloc::vec;
use alloc::vec::Vec;

const BITS: usize = u64::BITS as usize;

/// Fixed-length allocation bitmap
#[derive(Debug, Clone)]
pub struct AllocBitmap {
    words: Vec<u64>,
    len: usize,
}

impl AllocBitmap {
    /// Create a bitmap of `len` clear bits
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(BITS)],
            len,
        }
    }

    /// Number of bits
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check for a zero-length bitmap
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Index of the first clear bit
    pub fn find_first_zero(&self) -> Option<usize> {
        for (word_idx, word) in self.words.iter().enumerate() {
            if *word != u64::MAX {
                let index = word_idx * BITS + (!*word).trailing_zeros() as usize;
                return (index < self.len).then_some(index);
            }
        }
        None
    }

    /// Test a bit
    #[inline]
    pub fn test(&self, index: usize) -> bool {
        index < self.len && self.words[index / BITS] & (1 << (index % BITS)) != 0
    }

    /// Set a bit
    #[inline]
    pub fn set(&mut self, index: usize) {
        debug_assert!(index < self.len);
        self.words[index / BITS] |= 1 << (index % BITS);
    }

    /// Clear a bit
    #[inline]
    pub fn clear(&mut self, index: usize) {
        debug_assert!(index < self.len);
        self.words[index / BITS] &= !(1 << (index % BITS));
    }

    /// Number of set bits
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}
