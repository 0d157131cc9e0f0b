//! Growth policies: capacity sizing and hash-to-bucket mapping.
//!
//! A policy is a small value with no state beyond its configuration
//! constants. Three contracts hold for every implementation:
//! - `bucket_of(hash, c) < c` for every capacity `c` the policy produces;
//! - `next_capacity(c)` is strictly larger than `c` and itself valid;
//! - no capacity above `max_capacity()` is ever produced.

use crate::error::MapError;
use crate::index_table::IndexTable;

/// Capacity sizing and bucket selection for an index table.
pub trait GrowthPolicy {
    /// Smallest table size, at least 1.
    fn min_capacity(&self) -> usize;

    /// Largest table size the policy can produce.
    fn max_capacity(&self) -> usize;

    /// Load factor in `(0, 1)` at which growth triggers.
    fn threshold(&self) -> f64;

    /// The next larger capacity, or `None` once `max_capacity` is reached.
    fn next_capacity(&self, current: usize) -> Option<usize>;

    /// Map a hash into `[0, capacity)`.
    fn bucket_of(&self, hash: u64, capacity: usize) -> usize;

    /// Smallest valid capacity that is at least `n`.
    fn capacity_at_least(&self, n: usize) -> Result<usize, MapError> {
        let mut cap = self.min_capacity();
        while cap < n {
            cap = self.next_capacity(cap).ok_or(MapError::CapacityExhausted {
                requested: n,
                max: self.max_capacity(),
            })?;
        }
        Ok(cap)
    }

    /// Smallest valid capacity, not below `current`, that holds `len`
    /// elements while staying under the threshold.
    fn capacity_for_len(&self, len: usize, current: usize) -> Result<usize, MapError> {
        let mut cap = current.max(self.min_capacity());
        while over_threshold(len, cap, self.threshold()) {
            cap = self.next_capacity(cap).ok_or(MapError::CapacityExhausted {
                requested: len,
                max: self.max_capacity(),
            })?;
        }
        Ok(cap)
    }
}

/// `len / capacity >= threshold`, evaluated without dividing.
#[inline]
pub(crate) fn over_threshold(len: usize, capacity: usize, threshold: f64) -> bool {
    len as f64 >= capacity as f64 * threshold
}

fn check_threshold(threshold: f64) -> f64 {
    assert!(
        threshold > 0.0 && threshold < 1.0,
        "threshold must lie in (0, 1), got {threshold}"
    );
    threshold
}

/// Power-of-two sizing with mask-based bucket selection.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BitwiseGrowthPolicy {
    threshold: f64,
}

impl BitwiseGrowthPolicy {
    pub const DEFAULT_THRESHOLD: f64 = 0.8;
    pub const MIN_CAPACITY: usize = 8;
    /// Largest power of two the index table can allocate.
    pub const MAX_CAPACITY: usize = IndexTable::MAX_SLOTS;

    pub const fn new() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
        }
    }

    /// Panics unless `0 < threshold < 1`.
    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            threshold: check_threshold(threshold),
        }
    }
}

impl Default for BitwiseGrowthPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl GrowthPolicy for BitwiseGrowthPolicy {
    #[inline]
    fn min_capacity(&self) -> usize {
        Self::MIN_CAPACITY
    }

    #[inline]
    fn max_capacity(&self) -> usize {
        Self::MAX_CAPACITY
    }

    #[inline]
    fn threshold(&self) -> f64 {
        self.threshold
    }

    #[inline]
    fn next_capacity(&self, current: usize) -> Option<usize> {
        debug_assert!(current.is_power_of_two());
        if current >= Self::MAX_CAPACITY {
            return None;
        }
        Some(current << 1)
    }

    #[inline]
    fn bucket_of(&self, hash: u64, capacity: usize) -> usize {
        debug_assert!(capacity.is_power_of_two());
        (hash as usize) & (capacity - 1)
    }
}

/// Roughly doubling primes; each entry is prime.
const PRIMES: [usize; 28] = [
    13,
    29,
    53,
    97,
    193,
    389,
    769,
    1543,
    3079,
    6151,
    12289,
    24593,
    49157,
    98317,
    196613,
    393241,
    786433,
    1572869,
    3145739,
    6291469,
    12582917,
    25165843,
    50331653,
    100663319,
    201326611,
    402653189,
    805306457,
    1610612741,
];

/// Prime table sizes with modulus-based bucket selection.
///
/// Slower per lookup than masking but uses every hash bit, which helps
/// hashers with weak low bits.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PrimeGrowthPolicy {
    threshold: f64,
}

impl PrimeGrowthPolicy {
    pub const DEFAULT_THRESHOLD: f64 = 0.8;

    pub const fn new() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
        }
    }

    /// Panics unless `0 < threshold < 1`.
    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            threshold: check_threshold(threshold),
        }
    }
}

impl Default for PrimeGrowthPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl GrowthPolicy for PrimeGrowthPolicy {
    fn min_capacity(&self) -> usize {
        PRIMES[0]
    }

    fn max_capacity(&self) -> usize {
        PRIMES
            .iter()
            .rev()
            .copied()
            .find(|&p| p <= IndexTable::MAX_SLOTS)
            .unwrap_or(PRIMES[0])
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn next_capacity(&self, current: usize) -> Option<usize> {
        PRIMES
            .iter()
            .copied()
            .find(|&p| p > current)
            .filter(|&p| p <= self.max_capacity())
    }

    #[inline]
    fn bucket_of(&self, hash: u64, capacity: usize) -> usize {
        (hash % capacity as u64) as usize
    }
}
