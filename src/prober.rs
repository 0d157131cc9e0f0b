//! Probe sequences over an `IndexTable`.
//!
//! A prober walks slots from a start bucket along a fixed cyclic order
//! until it reaches an empty slot or an occupied slot whose position the
//! caller's predicate accepts. The order must visit every slot exactly
//! once per cycle; the map's growth rule guarantees at least one empty
//! slot, so a walk that returns to its start means the table and storage
//! have desynchronized.

use crate::error::invariant_violation;
use crate::index_table::{IndexTable, Slot};

/// Where a probe stopped.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Probe {
    /// An occupied slot whose position satisfied the predicate.
    Found { bucket: usize, position: usize },
    /// The first empty slot on the sequence.
    Vacant { bucket: usize },
}

/// Collision resolution strategy.
pub trait Prober {
    /// Bucket visited after `bucket` in a table of `capacity` slots.
    fn next_bucket(&self, bucket: usize, capacity: usize) -> usize;

    /// Walk from `start` until an empty slot or `stop(position)` holds.
    ///
    /// Panics if the walk covers the whole table without stopping.
    fn probe<F>(&self, table: &IndexTable, start: usize, mut stop: F) -> Probe
    where
        F: FnMut(usize) -> bool,
    {
        let capacity = table.capacity();
        let mut bucket = start;
        for _ in 0..capacity {
            match table.get(bucket) {
                Slot::Empty => return Probe::Vacant { bucket },
                Slot::Occupied(position) => {
                    if stop(position) {
                        return Probe::Found { bucket, position };
                    }
                }
            }
            bucket = self.next_bucket(bucket, capacity);
        }
        invariant_violation("probe sequence wrapped without reaching an empty slot")
    }

    /// First empty slot on the sequence from `start`.
    #[inline]
    fn vacant_from(&self, table: &IndexTable, start: usize) -> usize {
        match self.probe(table, start, |_| false) {
            Probe::Vacant { bucket } => bucket,
            Probe::Found { .. } => unreachable!("predicate never accepts"),
        }
    }
}

/// Step of one, wrapping at the end of the table.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LinearProber;

impl Prober for LinearProber {
    #[inline]
    fn next_bucket(&self, bucket: usize, capacity: usize) -> usize {
        let next = bucket + 1;
        if next == capacity {
            0
        } else {
            next
        }
    }
}

/// Fixed step, wrapping modulo the capacity.
///
/// The step must be coprime with every capacity the growth policy
/// produces: odd for power-of-two tables, below the smallest prime for
/// prime tables.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StepProber {
    step: usize,
}

impl StepProber {
    /// Panics if `step` is zero.
    pub fn new(step: usize) -> Self {
        assert!(step > 0, "probe step must be non-zero");
        Self { step }
    }

    pub fn step(&self) -> usize {
        self.step
    }
}

impl Default for StepProber {
    fn default() -> Self {
        Self::new(1)
    }
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

impl Prober for StepProber {
    #[inline]
    fn next_bucket(&self, bucket: usize, capacity: usize) -> usize {
        debug_assert_eq!(
            gcd(self.step, capacity),
            1,
            "probe step {} does not cycle a table of {}",
            self.step,
            capacity
        );
        (bucket + self.step % capacity) % capacity
    }
}
