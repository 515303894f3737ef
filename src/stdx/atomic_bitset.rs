//! Lock-free [`AtomicBitSet`] with atomic insert-if-absent for concurrent
//! dedup.
//!
//! # Invariants
//! - Bits are stored in `AtomicU64` words; padding bits beyond the logical
//!   capacity are zero (maintained by never setting them).
//! - A bit transitions 0→1 at most once per run; there is no clear
//!   operation, so a set bit stays set for the bitset's lifetime.
//!
//! # Ordering
//! All atomic operations use `Relaxed` ordering. This is sufficient
//! because:
//! - `fetch_or` atomicity guarantees exactly one caller sees "was-zero"
//!   per bit.
//! - No dependent data requires acquire/release synchronization; readers
//!   of aggregate state (e.g. `count`) run after the worker join barrier.
//!
//! # Performance
//! - `test_and_set`, `is_set` are O(1).
//! - `count` is O(words).

#[cfg(loom)]
use loom::sync::atomic::{AtomicU64, Ordering};
#[cfg(not(loom))]
use std::sync::atomic::{AtomicU64, Ordering};

/// Computes the number of `u64` words needed to store `n` bits.
pub const fn words_for_bits(n: u64) -> usize {
    (n.div_ceil(64)) as usize
}

/// Lock-free bitset backed by `Vec<AtomicU64>`.
///
/// Designed for concurrent deduplication where multiple threads race to
/// claim bits via [`test_and_set`](Self::test_and_set). The atomic
/// `fetch_or` guarantees exactly one caller observes `true` (was-unset)
/// per bit, making it suitable for "first writer wins" patterns.
///
/// Capacity is a `u64` bit count so the full 2^32-entry address space
/// can be represented on every 64-bit target; the word vector length
/// (`bits / 64`) always fits in `usize`.
///
/// # Examples
///
/// ```
/// use ipcount_rs::stdx::atomic_bitset::AtomicBitSet;
///
/// let bits = AtomicBitSet::empty(128);
/// assert!(bits.test_and_set(42));   // first caller wins
/// assert!(!bits.test_and_set(42));  // second caller loses
/// assert!(bits.is_set(42));
/// ```
pub struct AtomicBitSet {
    words: Vec<AtomicU64>,
    bit_length: u64,
}

impl std::fmt::Debug for AtomicBitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicBitSet")
            .field("bit_length", &self.bit_length)
            .field("words_len", &self.words.len())
            .finish()
    }
}

impl AtomicBitSet {
    /// Creates an empty bitset with capacity for `bit_length` bits, all
    /// initialized to zero.
    ///
    /// # Panics
    ///
    /// Panics if `bit_length` is zero (a zero-capacity bitset has no
    /// valid indices and is always a bug at the call site).
    pub fn empty(bit_length: u64) -> Self {
        assert!(bit_length > 0, "AtomicBitSet requires bit_length > 0");
        let num_words = words_for_bits(bit_length);
        let mut words = Vec::with_capacity(num_words);
        for _ in 0..num_words {
            words.push(AtomicU64::new(0));
        }
        Self { words, bit_length }
    }

    /// Atomically sets bit `idx` and returns `true` if it was previously
    /// unset.
    ///
    /// This is the core dedup primitive: exactly one concurrent caller per
    /// bit will observe `true`. A relaxed load pre-checks the word so that
    /// re-inserts of an already-present bit (the common case on skewed
    /// inputs) skip the read-modify-write entirely.
    ///
    /// # Panics
    ///
    /// Panics (debug) if `idx >= bit_length`.
    #[inline(always)]
    pub fn test_and_set(&self, idx: u64) -> bool {
        debug_assert!(idx < self.bit_length, "bit index out of bounds");
        let word_idx = (idx / 64) as usize;
        let mask = 1u64 << (idx % 64);
        let word = &self.words[word_idx];
        if word.load(Ordering::Relaxed) & mask != 0 {
            return false;
        }
        let prev = word.fetch_or(mask, Ordering::Relaxed);
        (prev & mask) == 0
    }

    /// Returns whether bit `idx` is set.
    ///
    /// # Panics
    ///
    /// Panics (debug) if `idx >= bit_length`.
    #[inline(always)]
    pub fn is_set(&self, idx: u64) -> bool {
        debug_assert!(idx < self.bit_length, "bit index out of bounds");
        let word_idx = (idx / 64) as usize;
        let mask = 1u64 << (idx % 64);
        (self.words[word_idx].load(Ordering::Relaxed) & mask) != 0
    }

    /// Returns the number of addressable bits.
    #[inline]
    pub fn bit_length(&self) -> u64 {
        self.bit_length
    }

    /// Counts the number of set bits.
    ///
    /// Because loads are `Relaxed`, the result is a snapshot — concurrent
    /// `test_and_set` calls may or may not be reflected. Call after the
    /// join barrier for an exact value.
    pub fn count(&self) -> u64 {
        let len = self.words.len();
        let mut total = 0u64;

        // All words except the last — no masking needed.
        for word in &self.words[..len - 1] {
            total += u64::from(word.load(Ordering::Relaxed).count_ones());
        }

        // Last word: mask off padding bits.
        let remaining_bits = self.bit_length % 64;
        let last_mask = if remaining_bits == 0 {
            u64::MAX
        } else {
            (1u64 << remaining_bits) - 1
        };
        total += u64::from(
            (self.words[len - 1].load(Ordering::Relaxed) & last_mask).count_ones(),
        );
        total
    }
}

// ---------------------------------------------------------------------------
// Loom concurrency tests
// ---------------------------------------------------------------------------

#[cfg(loom)]
mod loom_tests {
    use super::*;
    use loom::thread;

    /// Two threads race on the same bit — exactly one must win.
    #[test]
    fn concurrent_insert_single_winner() {
        loom::model(|| {
            let bs = std::sync::Arc::new(AtomicBitSet::empty(64));
            let bs2 = bs.clone();

            let h = thread::spawn(move || bs2.test_and_set(7));

            let won_main = bs.test_and_set(7);
            let won_thread = h.join().unwrap();

            // Exactly one winner (XOR).
            assert!(
                won_main ^ won_thread,
                "exactly one caller must win: main={won_main}, thread={won_thread}"
            );
            assert!(bs.is_set(7));
        });
    }

    /// Two threads set different bits in the same word — both must be
    /// visible (no lost update on the shared word).
    #[test]
    fn no_lost_updates_same_word() {
        loom::model(|| {
            let bs = std::sync::Arc::new(AtomicBitSet::empty(64));
            let bs2 = bs.clone();

            let h = thread::spawn(move || {
                assert!(bs2.test_and_set(1));
            });

            assert!(bs.test_and_set(0));
            h.join().unwrap();

            assert!(bs.is_set(0));
            assert!(bs.is_set(1));
            assert_eq!(bs.count(), 2);
        });
    }
}

// ---------------------------------------------------------------------------
// Concurrent smoke tests (also valid under Miri / cargo miri test)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn words_for_bits_rounds_up() {
        assert_eq!(words_for_bits(1), 1);
        assert_eq!(words_for_bits(64), 1);
        assert_eq!(words_for_bits(65), 2);
        assert_eq!(words_for_bits(1 << 32), 1 << 26);
    }

    /// Basic single-threaded ops — validates allocation, indexing, and
    /// word-boundary arithmetic.
    #[test]
    fn single_thread_ops() {
        let bs = AtomicBitSet::empty(128);
        assert!(bs.test_and_set(0));
        assert!(bs.test_and_set(63));
        assert!(bs.test_and_set(64));
        assert!(bs.test_and_set(127));
        assert!(!bs.test_and_set(0));
        assert!(bs.is_set(0));
        assert!(bs.is_set(127));
        assert!(!bs.is_set(1));
        assert_eq!(bs.count(), 4);
        assert_eq!(bs.bit_length(), 128);
    }

    #[test]
    #[should_panic(expected = "bit_length > 0")]
    fn zero_capacity_panics() {
        AtomicBitSet::empty(0);
    }

    #[test]
    fn count_masks_padding_bits() {
        // 70 bits: second word has 6 addressable bits, 58 padding bits.
        let bs = AtomicBitSet::empty(70);
        assert!(bs.test_and_set(69));
        assert_eq!(bs.count(), 1);
    }

    /// M threads race on the same index — exactly one observes `true`.
    #[test]
    fn race_on_one_bit_has_single_winner() {
        for _ in 0..32 {
            let bs = Arc::new(AtomicBitSet::empty(64));
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let bs = Arc::clone(&bs);
                    thread::spawn(move || bs.test_and_set(13))
                })
                .collect();

            let wins = handles
                .into_iter()
                .map(|h| h.join())
                .filter(|r| matches!(r, Ok(true)))
                .count();
            assert_eq!(wins, 1, "exactly one thread must observe a fresh insert");
            assert_eq!(bs.count(), 1);
        }
    }

    /// Threads hammer overlapping bits of one word — no lost updates.
    #[test]
    fn concurrent_same_word_no_lost_updates() {
        let bs = Arc::new(AtomicBitSet::empty(64));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let bs = Arc::clone(&bs);
                thread::spawn(move || {
                    for i in 0..16 {
                        bs.test_and_set((t * 4 + i) % 64);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        for idx in [0, 3, 12, 15, 48, 51, 60, 63] {
            assert!(bs.is_set(idx));
        }
    }

    /// Threads target disjoint words — every claimed bit survives.
    #[test]
    fn concurrent_different_words() {
        let bs = Arc::new(AtomicBitSet::empty(256));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let bs = Arc::clone(&bs);
                thread::spawn(move || {
                    let base = t * 64;
                    for i in 0..16 {
                        assert!(bs.test_and_set(base + i));
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(bs.count(), 64); // 4 threads x 16 bits
    }
}
