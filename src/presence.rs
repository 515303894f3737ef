//! Presence bitmap over the full IPv4 address space.
//!
//! One bit per possible 32-bit address: 2^32 bits in 2^26 `AtomicU64`
//! words, 512 MiB. Allocated once per run, shared by every worker, never
//! resized and never cleared. The only mutation path is
//! [`insert_if_absent`](PresenceBitmap::insert_if_absent); raw word
//! access is not exposed, which is what preserves the no-lost-update
//! invariant across concurrent workers.

use crate::stdx::AtomicBitSet;

/// Number of addressable bits: the whole IPv4 space.
pub const ADDRESS_SPACE_BITS: u64 = 1 << 32;

/// Exact set-membership structure for IPv4 addresses.
///
/// Backed by [`AtomicBitSet`], keyed directly by the integer form the
/// codec produces. Freshly-zeroed pages are provided by the allocator, so
/// construction cost is dominated by first-touch during scanning rather
/// than by an explicit clear.
#[derive(Debug)]
pub struct PresenceBitmap {
    bits: AtomicBitSet,
}

impl PresenceBitmap {
    /// Allocates the full 512 MiB bitmap, all bits zero.
    pub fn new() -> Self {
        Self {
            bits: AtomicBitSet::empty(ADDRESS_SPACE_BITS),
        }
    }

    /// Atomically inserts `addr`, returning `true` iff it was absent.
    ///
    /// Linearizable: for a given address, exactly one caller across all
    /// concurrent callers observes `true` per run. Callers increment the
    /// unique counter exactly when this returns `true`.
    #[inline(always)]
    pub fn insert_if_absent(&self, addr: u32) -> bool {
        self.bits.test_and_set(u64::from(addr))
    }

    /// Returns whether `addr` has been inserted.
    #[inline]
    pub fn contains(&self, addr: u32) -> bool {
        self.bits.is_set(u64::from(addr))
    }

    /// Counts inserted addresses by scanning the words.
    ///
    /// O(2^26) loads; meant for post-join cross-checks, not the hot path
    /// (the run's result comes from the unique counter).
    pub fn distinct(&self) -> u64 {
        self.bits.count()
    }
}

impl Default for PresenceBitmap {
    fn default() -> Self {
        Self::new()
    }
}
