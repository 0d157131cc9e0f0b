//! The physical open-addressing array: slots holding positions into storage.

use std::collections::TryReserveError;

/// One entry of the index table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum Slot {
    #[default]
    Empty,
    /// Position of a live element in storage.
    Occupied(usize),
}

impl Slot {
    #[inline]
    pub fn position(self) -> Option<usize> {
        match self {
            Slot::Empty => None,
            Slot::Occupied(p) => Some(p),
        }
    }
}

/// Fixed-size slot array. Its length is the map's capacity and only
/// changes by building a new table during rehash.
#[derive(Clone, Debug)]
pub struct IndexTable {
    slots: Box<[Slot]>,
    occupied: usize,
}

impl IndexTable {
    /// Largest power-of-two slot count whose allocation fits in `isize::MAX` bytes.
    pub const MAX_SLOTS: usize = {
        let fits = isize::MAX as usize / core::mem::size_of::<Slot>();
        1 << (usize::BITS - 1 - fits.leading_zeros())
    };

    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Slot::Empty; capacity].into_boxed_slice(),
            occupied: 0,
        }
    }

    /// Like `new`, but reports a failed allocation instead of aborting.
    pub fn try_new(capacity: usize) -> Result<Self, TryReserveError> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity)?;
        slots.resize(capacity, Slot::Empty);
        Ok(Self {
            slots: slots.into_boxed_slice(),
            occupied: 0,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    #[inline]
    pub fn occupied(&self) -> usize {
        self.occupied
    }

    #[inline]
    pub fn get(&self, bucket: usize) -> Slot {
        self.slots[bucket]
    }

    /// Store `position` in an empty slot.
    #[inline]
    pub fn occupy(&mut self, bucket: usize, position: usize) {
        debug_assert_eq!(self.slots[bucket], Slot::Empty);
        self.slots[bucket] = Slot::Occupied(position);
        self.occupied += 1;
    }

    /// Empty a slot, returning the position it held.
    #[inline]
    pub fn vacate(&mut self, bucket: usize) -> Option<usize> {
        let old = core::mem::take(&mut self.slots[bucket]).position();
        if old.is_some() {
            self.occupied -= 1;
        }
        old
    }

    /// Point an occupied slot at a different position.
    #[inline]
    pub fn repoint(&mut self, bucket: usize, position: usize) {
        debug_assert!(matches!(self.slots[bucket], Slot::Occupied(_)));
        self.slots[bucket] = Slot::Occupied(position);
    }

    /// Decrement every position above `removed`, following an
    /// order-preserving removal from storage. O(capacity).
    pub fn close_gap(&mut self, removed: usize) {
        for slot in self.slots.iter_mut() {
            if let Slot::Occupied(p) = slot {
                debug_assert_ne!(*p, removed);
                if *p > removed {
                    *p -= 1;
                }
            }
        }
    }

    /// Empty every slot, keeping the capacity.
    pub fn clear(&mut self) {
        self.slots.fill(Slot::Empty);
        self.occupied = 0;
    }

    /// Occupied `(bucket, position)` pairs in bucket order.
    #[cfg(test)]
    pub fn occupied_slots(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(b, s)| s.position().map(|p| (b, p)))
    }
}
