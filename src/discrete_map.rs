//! DiscreteMap: open addressing over an index table of storage positions.

use crate::error::{capacity_exhausted, invariant_violation, MapError};
use crate::index_table::IndexTable;
use crate::policy::{over_threshold, BitwiseGrowthPolicy, GrowthPolicy};
use crate::prober::{LinearProber, Probe, Prober};
use crate::reentrancy::Reentrancy;
use crate::storage::Storage;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::iter::{FusedIterator, Zip};
use core::marker::PhantomData;
use core::ops::Index;
use hashbrown::hash_map::DefaultHashBuilder;

/// Opaque reference to an element, valid until the next mutating call on
/// the map that produced it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle {
    position: usize,
    epoch: u64,
}

impl Handle {
    /// Storage position at the time the handle was issued.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn key<'a, K, V, S, G, P>(&self, map: &'a DiscreteMap<K, V, S, G, P>) -> Option<&'a K> {
        map.handle_key(*self)
    }

    pub fn value<'a, K, V, S, G, P>(&self, map: &'a DiscreteMap<K, V, S, G, P>) -> Option<&'a V> {
        map.handle_value(*self)
    }

    pub fn value_mut<'a, K, V, S, G, P>(
        &self,
        map: &'a mut DiscreteMap<K, V, S, G, P>,
    ) -> Option<&'a mut V> {
        map.handle_value_mut(*self)
    }
}

/// Hash map whose buckets hold positions into insertion-ordered storage.
///
/// Duplicate inserts keep the existing value. Removal comes in an
/// order-preserving flavor (`remove`/`erase`) and a swap flavor
/// (`swap_remove`/`erase_unordered`).
#[derive(Clone)]
pub struct DiscreteMap<K, V, S = DefaultHashBuilder, G = BitwiseGrowthPolicy, P = LinearProber> {
    hasher: S,
    growth: G,
    prober: P,
    index: IndexTable,
    storage: Storage<K, V>,
    // Bumped by every call that changes structure; stamps issued handles.
    epoch: u64,
    reentrancy: Reentrancy,
}

impl<K, V> DiscreteMap<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }

    /// A map that holds `n` elements without growing.
    pub fn with_capacity(n: usize) -> Self {
        Self::with_capacity_and_hasher(n, Default::default())
    }
}

impl<K, V, S, G, P> Default for DiscreteMap<K, V, S, G, P>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
    G: GrowthPolicy + Default,
    P: Prober + Default,
{
    fn default() -> Self {
        Self::with_policies(0, S::default(), G::default(), P::default())
    }
}

// Accessors that never hash or compare keys.
impl<K, V, S, G, P> DiscreteMap<K, V, S, G, P> {
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Number of slots in the index table.
    pub fn capacity(&self) -> usize {
        self.index.capacity()
    }

    /// `len / capacity` as a fraction.
    pub fn load_factor(&self) -> f64 {
        self.len() as f64 / self.capacity() as f64
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    pub fn growth_policy(&self) -> &G {
        &self.growth
    }

    pub fn prober(&self) -> &P {
        &self.prober
    }

    /// Keys in storage order.
    pub fn keys(&self) -> &[K] {
        self.storage.keys()
    }

    /// Values in storage order.
    pub fn values(&self) -> &[V] {
        self.storage.values()
    }

    pub fn values_mut(&mut self) -> &mut [V] {
        self.storage.values_mut()
    }

    /// Entries in storage order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            it: self.storage.keys().iter().zip(self.storage.values().iter()),
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        let (keys, values) = self.storage.split_mut();
        IterMut {
            it: keys.iter().zip(values.iter_mut()),
        }
    }

    /// Remove every element, yielding them in storage order. Capacity is kept.
    pub fn drain(&mut self) -> Drain<'_, K, V> {
        let _g = self.reentrancy.enter();
        self.index.clear();
        self.bump_epoch();
        let (keys, values) = self.storage.take();
        Drain {
            it: keys.into_iter().zip(values),
            _map: PhantomData,
        }
    }

    /// Remove every element, keeping the capacity.
    pub fn clear(&mut self) {
        let _g = self.reentrancy.enter();
        self.index.clear();
        self.storage.clear();
        self.bump_epoch();
    }

    /// Key and value behind a handle, or `StaleHandle`.
    pub fn resolve(&self, handle: Handle) -> Result<(&K, &V), MapError> {
        let _g = self.reentrancy.enter();
        let p = self.live_position(handle).ok_or(MapError::StaleHandle)?;
        Ok((self.storage.key(p), self.storage.value(p)))
    }

    pub(crate) fn handle_key(&self, h: Handle) -> Option<&K> {
        let _g = self.reentrancy.enter();
        self.live_position(h).map(|p| self.storage.key(p))
    }

    pub(crate) fn handle_value(&self, h: Handle) -> Option<&V> {
        let _g = self.reentrancy.enter();
        self.live_position(h).map(|p| self.storage.value(p))
    }

    pub(crate) fn handle_value_mut(&mut self, h: Handle) -> Option<&mut V> {
        let _g = self.reentrancy.enter();
        let p = self.live_position(h)?;
        Some(self.storage.value_mut(p))
    }

    #[inline]
    fn live_position(&self, h: Handle) -> Option<usize> {
        (h.epoch == self.epoch && h.position < self.storage.len()).then_some(h.position)
    }

    #[inline]
    fn handle(&self, position: usize) -> Handle {
        Handle {
            position,
            epoch: self.epoch,
        }
    }

    #[inline]
    fn bump_epoch(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
    }
}

impl<K, V, S, G, P> DiscreteMap<K, V, S, G, P>
where
    G: GrowthPolicy,
{
    /// Load factor at which an insert grows the table first.
    pub fn threshold(&self) -> f64 {
        self.growth.threshold()
    }

    /// Most elements the policy's largest table can hold.
    pub fn max_size(&self) -> usize {
        (self.growth.max_capacity() as f64 * self.growth.threshold()) as usize
    }
}

impl<K, V, S> DiscreteMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_and_hasher(0, hasher)
    }

    pub fn with_capacity_and_hasher(n: usize, hasher: S) -> Self {
        Self::with_policies(n, hasher, BitwiseGrowthPolicy::new(), LinearProber)
    }
}

impl<K, V, S, G, P> DiscreteMap<K, V, S, G, P>
where
    K: Eq + Hash,
    S: BuildHasher,
    G: GrowthPolicy,
    P: Prober,
{
    /// Fully configured constructor. The table starts large enough for
    /// `n` elements and never below the policy's minimum.
    ///
    /// Panics if the policy cannot size a table for `n`.
    pub fn with_policies(n: usize, hasher: S, growth: G, prober: P) -> Self {
        let capacity = growth
            .capacity_for_len(n, growth.min_capacity())
            .unwrap_or_else(|e| capacity_exhausted(e));
        Self {
            hasher,
            growth,
            prober,
            index: IndexTable::new(capacity),
            storage: Storage::with_capacity(n),
            epoch: 0,
            reentrancy: Reentrancy::new(),
        }
    }

    #[inline]
    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    #[inline]
    fn home(&self, hash: u64) -> usize {
        self.growth.bucket_of(hash, self.index.capacity())
    }

    fn locate<Q>(&self, hash: u64, q: &Q) -> Probe
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let storage = &self.storage;
        self.prober.probe(&self.index, self.home(hash), |p| {
            storage.hash(p) == hash && storage.key(p).borrow() == q
        })
    }

    fn find_position<Q>(&self, q: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        match self.locate(self.make_hash(q), q) {
            Probe::Found { position, .. } => Some(position),
            Probe::Vacant { .. } => None,
        }
    }

    /// Replace the index table with one of `capacity` slots, placing every
    /// storage position by its cached hash. Storage is untouched. On a
    /// failed allocation the map is left as it was.
    fn rebuild(&mut self, capacity: usize) -> Result<(), MapError> {
        let old_capacity = self.index.capacity();
        let index = IndexTable::try_new(capacity).map_err(|_| MapError::CapacityExhausted {
            requested: capacity,
            max: self.growth.max_capacity(),
        })?;
        self.index = place_all(index, self.storage.hashes(), &self.growth, &self.prober);
        self.bump_epoch();
        tracing::trace!(
            old_capacity,
            new_capacity = capacity,
            len = self.storage.len(),
            "rebuilt index table"
        );
        Ok(())
    }

    /// Grow so that `len` elements sit under the threshold.
    fn ensure_fits(&mut self, len: usize) -> Result<(), MapError> {
        let current = self.index.capacity();
        let target = self.growth.capacity_for_len(len, current)?;
        if target > current {
            tracing::debug!(len, current, target, "load threshold reached, growing");
            self.rebuild(target)?;
        }
        Ok(())
    }

    fn insert_inner<F>(&mut self, key: K, make: F) -> Result<(Handle, bool), MapError>
    where
        F: FnOnce() -> V,
    {
        let hash = self.make_hash(&key);
        let mut bucket = match self.locate(hash, &key) {
            Probe::Found { position, .. } => return Ok((self.handle(position), false)),
            Probe::Vacant { bucket } => bucket,
        };
        let len = self.storage.len() + 1;
        if over_threshold(len, self.index.capacity(), self.growth.threshold()) {
            self.ensure_fits(len)?;
            bucket = self.prober.vacant_from(&self.index, self.home(hash));
        }
        let position = self.storage.push(key, make(), hash);
        self.index.occupy(bucket, position);
        self.bump_epoch();
        debug_assert_eq!(self.index.occupied(), self.storage.len());
        Ok((self.handle(position), true))
    }

    /// Insert `key -> value` unless `key` is present. Returns the element's
    /// handle and whether it was newly inserted; an existing value is not
    /// overwritten.
    ///
    /// Panics if growth is needed and the policy is exhausted.
    pub fn insert(&mut self, key: K, value: V) -> (Handle, bool) {
        let _g = self.reentrancy.enter();
        self.insert_inner(key, || value)
            .unwrap_or_else(|e| capacity_exhausted(e))
    }

    /// Like `insert`, but reports exhaustion and leaves the map unchanged.
    pub fn try_insert(&mut self, key: K, value: V) -> Result<(Handle, bool), MapError> {
        let _g = self.reentrancy.enter();
        self.insert_inner(key, || value)
    }

    /// Insert with a lazily built value; `make` only runs when `key` is absent.
    pub fn insert_with<F>(&mut self, key: K, make: F) -> (Handle, bool)
    where
        F: FnOnce() -> V,
    {
        let _g = self.reentrancy.enter();
        self.insert_inner(key, make)
            .unwrap_or_else(|e| capacity_exhausted(e))
    }

    /// Mutable access to the value for `key`, inserting `make()` first when absent.
    pub fn get_or_insert_with<F>(&mut self, key: K, make: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        let _g = self.reentrancy.enter();
        let (h, _) = self
            .insert_inner(key, make)
            .unwrap_or_else(|e| capacity_exhausted(e));
        self.storage.value_mut(h.position)
    }

    pub fn find<Q>(&self, q: &Q) -> Option<Handle>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        self.find_position(q).map(|p| self.handle(p))
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        self.find_position(q).is_some()
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        self.find_position(q).map(|p| self.storage.value(p))
    }

    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let p = self.find_position(q)?;
        Some(self.storage.value_mut(p))
    }

    pub fn get_key_value<Q>(&self, q: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        self.find_position(q)
            .map(|p| (self.storage.key(p), self.storage.value(p)))
    }

    /// Checked access: `KeyNotFound` when absent.
    pub fn at<Q>(&self, q: &Q) -> Result<&V, MapError>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        self.find_position(q)
            .map(|p| self.storage.value(p))
            .ok_or(MapError::KeyNotFound)
    }

    /// Slots visited by a lookup of `q`, counting the slot it stops at.
    pub fn probe_length<Q>(&self, q: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let hash = self.make_hash(q);
        let storage = &self.storage;
        let mut visited = 0;
        let probe = self.prober.probe(&self.index, self.home(hash), |p| {
            visited += 1;
            storage.hash(p) == hash && storage.key(p).borrow() == q
        });
        match probe {
            Probe::Found { .. } => visited,
            Probe::Vacant { .. } => visited + 1,
        }
    }

    /// After clearing `cleared`, take every occupied slot of the run that
    /// follows it and place it again from its home bucket, so no probe
    /// chain is cut by the new empty slot.
    fn reseat_run(&mut self, cleared: usize) {
        let capacity = self.index.capacity();
        let mut bucket = self.prober.next_bucket(cleared, capacity);
        while let Some(position) = self.index.vacate(bucket) {
            let home = self.home(self.storage.hash(position));
            let target = self.prober.vacant_from(&self.index, home);
            self.index.occupy(target, position);
            bucket = self.prober.next_bucket(bucket, capacity);
        }
    }

    fn remove_ordered(&mut self, bucket: usize, position: usize) -> (K, V) {
        self.index.vacate(bucket);
        self.reseat_run(bucket);
        let kv = self.storage.remove(position);
        if position < self.storage.len() {
            self.index.close_gap(position);
        }
        self.bump_epoch();
        debug_assert_eq!(self.index.occupied(), self.storage.len());
        kv
    }

    fn remove_swapped(&mut self, bucket: usize, position: usize) -> (K, V) {
        self.index.vacate(bucket);
        self.reseat_run(bucket);
        let last = self.storage.len() - 1;
        if position != last {
            let home = self.home(self.storage.hash(last));
            match self.prober.probe(&self.index, home, |p| p == last) {
                Probe::Found { bucket, .. } => self.index.repoint(bucket, position),
                Probe::Vacant { .. } => invariant_violation("last element missing from index table"),
            }
        }
        let kv = self.storage.swap_remove(position);
        self.bump_epoch();
        debug_assert_eq!(self.index.occupied(), self.storage.len());
        kv
    }

    /// Remove `q`, keeping the remaining elements in insertion order.
    /// O(capacity): every slot position above the removed one is renumbered.
    pub fn remove<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        match self.locate(self.make_hash(q), q) {
            Probe::Found { bucket, position } => Some(self.remove_ordered(bucket, position)),
            Probe::Vacant { .. } => None,
        }
    }

    /// Remove `q` by moving the last element into its position.
    pub fn swap_remove<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        match self.locate(self.make_hash(q), q) {
            Probe::Found { bucket, position } => Some(self.remove_swapped(bucket, position)),
            Probe::Vacant { .. } => None,
        }
    }

    /// Order-preserving erase; false when `q` is absent.
    pub fn erase<Q>(&mut self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.remove(q).is_some()
    }

    /// Swap erase; false when `q` is absent.
    pub fn erase_unordered<Q>(&mut self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.swap_remove(q).is_some()
    }

    /// Make room for `additional` more elements without growing on insert.
    pub fn reserve(&mut self, additional: usize) {
        self.try_reserve(additional)
            .unwrap_or_else(|e| capacity_exhausted(e))
    }

    pub fn try_reserve(&mut self, additional: usize) -> Result<(), MapError> {
        let _g = self.reentrancy.enter();
        let len = self
            .storage
            .len()
            .checked_add(additional)
            .ok_or(MapError::CapacityExhausted {
                requested: usize::MAX,
                max: self.growth.max_capacity(),
            })?;
        // Policy limits are checked before any allocation is attempted.
        self.growth.capacity_for_len(len, self.index.capacity())?;
        self.storage
            .try_reserve(additional)
            .map_err(|_| MapError::CapacityExhausted {
                requested: len,
                max: self.growth.max_capacity(),
            })?;
        self.ensure_fits(len)
    }

    /// Rebuild the index table with at least `n` slots. No-op when `n`
    /// does not exceed the current capacity; never shrinks.
    pub fn rehash(&mut self, n: usize) {
        self.try_rehash(n).unwrap_or_else(|e| capacity_exhausted(e))
    }

    pub fn try_rehash(&mut self, n: usize) -> Result<(), MapError> {
        let _g = self.reentrancy.enter();
        if n <= self.index.capacity() {
            return Ok(());
        }
        let capacity = self.growth.capacity_at_least(n)?;
        self.rebuild(capacity)
    }

    /// Keep only the elements for which `f` returns true, preserving order.
    pub fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        let _g = self.reentrancy.enter();
        let mut reindex = Reindex {
            index: &mut self.index,
            storage: &mut self.storage,
            growth: &self.growth,
            prober: &self.prober,
            epoch: &mut self.epoch,
        };
        reindex.storage.retain(f);
    }

    /// Check the slot/position bijection and cached hashes.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let len = self.storage.len();
        assert_eq!(self.index.occupied(), len, "occupied slots != len");
        let mut seen = vec![false; len];
        for (bucket, position) in self.index.occupied_slots() {
            assert!(position < len, "slot {bucket} holds out-of-range {position}");
            assert!(!seen[position], "position {position} held twice");
            seen[position] = true;
            assert_eq!(self.storage.hash(position), self.make_hash(self.storage.key(position)));
            assert!(
                matches!(self.locate(self.storage.hash(position), self.storage.key(position)),
                    Probe::Found { position: p, .. } if p == position),
                "position {position} unreachable from its home bucket"
            );
        }
        assert!(
            !over_threshold(len, self.index.capacity(), self.growth.threshold()) || len == 0,
            "load factor at or above threshold"
        );
    }
}

/// Place every cached hash into the empty table `index`.
fn place_all<G, P>(mut index: IndexTable, hashes: &[u64], growth: &G, prober: &P) -> IndexTable
where
    G: GrowthPolicy,
    P: Prober,
{
    let capacity = index.capacity();
    for (position, &hash) in hashes.iter().enumerate() {
        let bucket = prober.vacant_from(&index, growth.bucket_of(hash, capacity));
        index.occupy(bucket, position);
    }
    index
}

// Rebuilds the index table on drop if storage lost elements, including
// when a `retain` predicate unwinds partway through.
struct Reindex<'a, K, V, G: GrowthPolicy, P: Prober> {
    index: &'a mut IndexTable,
    storage: &'a mut Storage<K, V>,
    growth: &'a G,
    prober: &'a P,
    epoch: &'a mut u64,
}

impl<K, V, G: GrowthPolicy, P: Prober> Drop for Reindex<'_, K, V, G, P> {
    fn drop(&mut self) {
        if self.index.occupied() == self.storage.len() {
            return;
        }
        let mut index = core::mem::replace(self.index, IndexTable::new(0));
        index.clear();
        *self.index = place_all(index, self.storage.hashes(), self.growth, self.prober);
        *self.epoch = self.epoch.wrapping_add(1);
        tracing::trace!(
            capacity = self.index.capacity(),
            len = self.storage.len(),
            "reindexed after retain"
        );
    }
}

impl<K, V, S, G, P> fmt::Debug for DiscreteMap<K, V, S, G, P>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S, G, P> PartialEq for DiscreteMap<K, V, S, G, P>
where
    K: Eq + Hash,
    V: PartialEq,
    S: BuildHasher,
    G: GrowthPolicy,
    P: Prober,
{
    /// Map equality; storage order is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K, V, S, G, P> Eq for DiscreteMap<K, V, S, G, P>
where
    K: Eq + Hash,
    V: Eq,
    S: BuildHasher,
    G: GrowthPolicy,
    P: Prober,
{
}

impl<K, Q, V, S, G, P> Index<&Q> for DiscreteMap<K, V, S, G, P>
where
    K: Eq + Hash + Borrow<Q>,
    Q: ?Sized + Hash + Eq,
    S: BuildHasher,
    G: GrowthPolicy,
    P: Prober,
{
    type Output = V;

    /// Panics if `key` is absent.
    fn index(&self, key: &Q) -> &V {
        match self.get(key) {
            Some(v) => v,
            None => panic!("{}", MapError::KeyNotFound),
        }
    }
}

/// Later duplicates of a key are ignored, matching `insert`.
impl<K, V, S, G, P> Extend<(K, V)> for DiscreteMap<K, V, S, G, P>
where
    K: Eq + Hash,
    S: BuildHasher,
    G: GrowthPolicy,
    P: Prober,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K, V, S, G, P> FromIterator<(K, V)> for DiscreteMap<K, V, S, G, P>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
    G: GrowthPolicy + Default,
    P: Prober + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::default();
        map.extend(iter);
        map
    }
}

/// Iterator over `(&K, &V)` in storage order.
#[derive(Clone)]
pub struct Iter<'a, K, V> {
    it: Zip<core::slice::Iter<'a, K>, core::slice::Iter<'a, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next()
    }
    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.it.next_back()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// Iterator over `(&K, &mut V)` in storage order.
pub struct IterMut<'a, K, V> {
    it: Zip<core::slice::Iter<'a, K>, core::slice::IterMut<'a, V>>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next()
    }
    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for IterMut<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.it.next_back()
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}
impl<K, V> FusedIterator for IterMut<'_, K, V> {}

/// Owning iterator in storage order.
pub struct IntoIter<K, V> {
    it: Zip<std::vec::IntoIter<K>, std::vec::IntoIter<V>>,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next()
    }
    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for IntoIter<K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.it.next_back()
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}
impl<K, V> FusedIterator for IntoIter<K, V> {}

/// Draining iterator returned by `DiscreteMap::drain`.
pub struct Drain<'a, K, V> {
    it: Zip<std::vec::IntoIter<K>, std::vec::IntoIter<V>>,
    _map: PhantomData<&'a mut ()>,
}

impl<K, V> Iterator for Drain<'_, K, V> {
    type Item = (K, V);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next()
    }
    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Drain<'_, K, V> {}
impl<K, V> FusedIterator for Drain<'_, K, V> {}

impl<K, V, S, G, P> IntoIterator for DiscreteMap<K, V, S, G, P> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> IntoIter<K, V> {
        let (keys, values) = self.storage.into_parts();
        IntoIter {
            it: keys.into_iter().zip(values),
        }
    }
}

impl<'a, K, V, S, G, P> IntoIterator for &'a DiscreteMap<K, V, S, G, P> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<'a, K, V, S, G, P> IntoIterator for &'a mut DiscreteMap<K, V, S, G, P> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> IterMut<'a, K, V> {
        self.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PrimeGrowthPolicy;
    use crate::prober::StepProber;
    use std::collections::BTreeSet;
    use std::hash::Hasher;

    /// Hashes integers to themselves so bucket placement is predictable.
    #[derive(Clone, Default)]
    struct IdentityBuildHasher;
    #[derive(Default)]
    struct IdentityHasher(u64);
    impl BuildHasher for IdentityBuildHasher {
        type Hasher = IdentityHasher;
        fn build_hasher(&self) -> Self::Hasher {
            IdentityHasher(0)
        }
    }
    impl Hasher for IdentityHasher {
        fn write(&mut self, bytes: &[u8]) {
            for &b in bytes {
                self.0 = (self.0 << 8) | b as u64;
            }
        }
        fn write_u32(&mut self, n: u32) {
            self.0 = n as u64;
        }
        fn write_u64(&mut self, n: u64) {
            self.0 = n;
        }
        fn write_usize(&mut self, n: usize) {
            self.0 = n as u64;
        }
        fn finish(&self) -> u64 {
            self.0
        }
    }

    type IdMap<V> = DiscreteMap<u32, V, IdentityBuildHasher>;

    fn id_map<V>() -> IdMap<V> {
        DiscreteMap::with_hasher(IdentityBuildHasher)
    }

    /// Invariant: growth from 8 to 16 happens exactly at the 7th insert (threshold 0.8).
    #[test]
    fn grows_before_crossing_threshold() {
        let mut m: DiscreteMap<u32, u32> = DiscreteMap::new();
        assert_eq!(m.capacity(), 8);
        for k in 1..=6 {
            assert!(m.insert(k, k * 10).1);
            assert_eq!(m.capacity(), 8);
        }
        assert!(m.insert(7, 70).1);
        assert_eq!(m.capacity(), 16);
        for k in 1..=7 {
            assert_eq!(m.get(&k), Some(&(k * 10)));
        }
        assert!(m.erase(&4));
        assert!(m.find(&4).is_none());
        assert_eq!(m.get(&3), Some(&30));
        assert_eq!(m.get(&5), Some(&50));
        m.assert_consistent();
    }

    /// Invariant: a colliding key stays reachable after the key ahead of it is erased.
    #[test]
    fn collision_survives_ordered_erase() {
        let mut m = id_map();
        // 3 and 11 both map to bucket 3 of 8.
        m.insert(3, "a");
        m.insert(11, "b");
        assert_eq!(m.index.get(4).position(), Some(1));
        assert!(m.erase(&3));
        assert_eq!(m.get(&11), Some(&"b"));
        assert_eq!(m.find(&11).map(|h| h.position()), Some(0));
        m.assert_consistent();
    }

    /// Invariant: same as above for swap erase, including a run that wraps the table end.
    #[test]
    fn wrapped_run_survives_swap_erase() {
        let mut m = id_map();
        // 7, 15, 23 all home at bucket 7; the run wraps to buckets 0 and 1.
        m.insert(7, 'x');
        m.insert(15, 'y');
        m.insert(23, 'z');
        m.insert(1, 'w'); // home 1, displaced to 2
        assert_eq!(m.index.get(0).position(), Some(1));
        assert!(m.erase_unordered(&7));
        for (k, v) in [(15, 'y'), (23, 'z'), (1, 'w')] {
            assert_eq!(m.get(&k), Some(&v));
        }
        assert_eq!(m.keys(), &[1, 15, 23]);
        m.assert_consistent();
    }

    /// Invariant: duplicate inserts keep the original value and report not-inserted.
    #[test]
    fn insert_does_not_overwrite() {
        let mut m: DiscreteMap<String, i32> = DiscreteMap::new();
        let (h1, new1) = m.insert("k".to_string(), 1);
        let (h2, new2) = m.insert("k".to_string(), 2);
        assert!(new1 && !new2);
        assert_eq!(h1.position(), h2.position());
        assert_eq!(m.get("k"), Some(&1));
        assert_eq!(m.len(), 1);
    }

    /// Invariant: erasing an absent key changes nothing.
    #[test]
    fn erase_absent_is_noop() {
        let mut m: DiscreteMap<u32, u32> = (0..5).map(|k| (k, k)).collect();
        let (len, cap, lf) = (m.len(), m.capacity(), m.load_factor());
        let h = m.find(&2).unwrap();
        assert!(!m.erase(&99));
        assert!(!m.erase_unordered(&99));
        assert_eq!(m.remove(&99), None);
        assert_eq!((m.len(), m.capacity(), m.load_factor()), (len, cap, lf));
        assert_eq!(h.value(&m), Some(&2), "no mutation, handle stays valid");
    }

    /// Invariant: handles are invalidated by any structural mutation.
    #[test]
    fn handles_go_stale_after_mutation() {
        let mut m: DiscreteMap<&str, i32> = DiscreteMap::new();
        let (ha, _) = m.insert("a", 1);
        assert_eq!(ha.key(&m), Some(&"a"));
        *ha.value_mut(&mut m).unwrap() += 1;
        assert_eq!(m.resolve(ha), Ok((&"a", &2)));

        let (hb, _) = m.insert("b", 2);
        assert!(ha.value(&m).is_none());
        assert_eq!(m.resolve(ha), Err(MapError::StaleHandle));
        assert_eq!(hb.value(&m), Some(&2));

        m.rehash(64);
        assert!(hb.value(&m).is_none());
        let hb = m.find("b").unwrap();
        m.erase("a");
        assert!(hb.key(&m).is_none());
        assert_eq!(m.find("b").unwrap().position(), 0);
    }

    /// Invariant: order-preserving erase keeps insertion order; swap erase moves the tail.
    #[test]
    fn erase_orders() {
        let mut a: DiscreteMap<u32, ()> = (0..6).map(|k| (k, ())).collect();
        let mut b = a.clone();
        a.erase(&1);
        b.erase_unordered(&1);
        assert_eq!(a.keys(), &[0, 2, 3, 4, 5]);
        assert_eq!(b.keys(), &[0, 5, 2, 3, 4]);
        a.assert_consistent();
        b.assert_consistent();
        assert_eq!(a, b);
    }

    /// Invariant: explicit rehash keeps membership and never shrinks.
    #[test]
    fn rehash_preserves_membership() {
        let mut m: DiscreteMap<String, usize> = DiscreteMap::new();
        for i in 0..20 {
            m.insert(format!("k{i}"), i);
        }
        let cap = m.capacity();
        m.rehash(cap / 2);
        assert_eq!(m.capacity(), cap);
        m.rehash(cap + 1);
        assert_eq!(m.capacity(), cap * 2);
        for i in 0..20 {
            assert_eq!(m.get(format!("k{i}").as_str()), Some(&i));
        }
        m.assert_consistent();
    }

    /// Invariant: reserve pre-grows so the reserved inserts never rehash.
    #[test]
    fn reserve_avoids_growth() {
        let mut m: DiscreteMap<u64, u64> = DiscreteMap::new();
        m.reserve(100);
        let cap = m.capacity();
        assert_eq!(cap, 128);
        for i in 0..100 {
            m.insert(i, i);
        }
        assert_eq!(m.capacity(), cap);
        assert!(m.load_factor() < m.threshold());
        let m2: DiscreteMap<u64, u64> = DiscreteMap::with_capacity(100);
        assert_eq!(m2.capacity(), 128);
    }

    /// Invariant: load factor stays below threshold after every insert.
    #[test]
    fn load_factor_below_threshold_after_insert() {
        let mut m: DiscreteMap<u32, u32> = DiscreteMap::new();
        let mut last_cap = m.capacity();
        for k in 0..1000 {
            m.insert(k, k);
            assert!(m.load_factor() < m.threshold());
            assert!(m.capacity() >= last_cap);
            last_cap = m.capacity();
        }
        m.assert_consistent();
    }

    /// Invariant: checked access reports KeyNotFound; Index panics.
    #[test]
    fn at_and_index() {
        let mut m: DiscreteMap<String, i32> = DiscreteMap::new();
        m.insert("x".into(), 5);
        assert_eq!(m.at("x"), Ok(&5));
        assert_eq!(m.at("y"), Err(MapError::KeyNotFound));
        assert_eq!(m["x"], 5);
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| m["y"]));
        assert!(res.is_err());
    }

    /// Invariant: get_or_insert_with inserts once and returns the stored value afterwards.
    #[test]
    fn get_or_insert_with_behaves_like_subscript() {
        let mut m: DiscreteMap<&str, Vec<u8>> = DiscreteMap::new();
        m.get_or_insert_with("a", Vec::new).push(1);
        m.get_or_insert_with("a", || unreachable!()).push(2);
        assert_eq!(m.get("a"), Some(&vec![1, 2]));
        let mut calls = 0;
        let (_, inserted) = m.insert_with("a", || {
            calls += 1;
            vec![]
        });
        assert!(!inserted);
        assert_eq!(calls, 0);
    }

    /// Invariant: retain keeps order and rebuilds a consistent index.
    #[test]
    fn retain_rebuilds_index() {
        let mut m: DiscreteMap<u32, u32> = (0..50).map(|k| (k, k)).collect();
        m.retain(|k, v| {
            *v += 1;
            k % 3 == 0
        });
        assert_eq!(m.len(), 17);
        assert!(m.keys().windows(2).all(|w| w[0] < w[1]));
        assert_eq!(m.get(&9), Some(&10));
        assert!(!m.contains_key(&10));
        m.assert_consistent();
    }

    /// Invariant: a panicking retain predicate leaves the map consistent and usable.
    #[test]
    fn retain_panic_keeps_map_consistent() {
        let mut m: DiscreteMap<u32, u32> = (0..10).map(|k| (k, k)).collect();
        let stale = m.find(&9).unwrap();
        let r = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            m.retain(|k, _| {
                assert_ne!(*k, 5, "predicate failed");
                k % 2 == 0
            });
        }));
        assert!(r.is_err());
        m.assert_consistent();
        // 1 and 3 were rejected before the panic; 5..10 were never judged.
        assert_eq!(m.keys(), &[0, 2, 4, 5, 6, 7, 8, 9]);
        assert_eq!(m.get(&9), Some(&9));
        assert!(!m.contains_key(&3));
        assert_eq!(stale.value(&m), None);
        m.insert(3, 30);
        assert_eq!(m.get(&3), Some(&30));
        m.assert_consistent();
    }

    /// Invariant: iteration visits storage order and is restartable.
    #[test]
    fn iteration_in_storage_order() {
        let mut m: DiscreteMap<&str, i32> = DiscreteMap::new();
        for (i, k) in ["c", "a", "b"].into_iter().enumerate() {
            m.insert(k, i as i32);
        }
        let first: Vec<_> = m.iter().map(|(k, _)| *k).collect();
        let second: Vec<_> = (&m).into_iter().map(|(k, _)| *k).collect();
        assert_eq!(first, vec!["c", "a", "b"]);
        assert_eq!(first, second);
        assert_eq!(m.iter().len(), 3);
        assert_eq!(m.iter().next_back(), Some((&"b", &2)));

        for (_, v) in &mut m {
            *v *= 10;
        }
        assert_eq!(m.values(), &[0, 10, 20]);

        let drained: Vec<_> = m.drain().collect();
        assert_eq!(drained, vec![("c", 0), ("a", 10), ("b", 20)]);
        assert!(m.is_empty());
        assert_eq!(m.capacity(), 8);
        m.insert("z", 1);
        assert_eq!(m.into_iter().collect::<Vec<_>>(), vec![("z", 1)]);
    }

    /// Invariant: clear keeps capacity and leaves a usable map.
    #[test]
    fn clear_keeps_capacity() {
        let mut m: DiscreteMap<u32, u32> = (0..40).map(|k| (k, k)).collect();
        let cap = m.capacity();
        m.clear();
        assert_eq!((m.len(), m.capacity()), (0, cap));
        assert!(!m.contains_key(&3));
        m.insert(3, 3);
        m.assert_consistent();
    }

    /// Invariant: prime sizing with a stepped prober keeps every key reachable.
    #[test]
    fn prime_policy_with_step_prober() {
        let mut m: DiscreteMap<u32, u32, IdentityBuildHasher, PrimeGrowthPolicy, StepProber> =
            DiscreteMap::with_policies(0, IdentityBuildHasher, PrimeGrowthPolicy::new(), StepProber::new(3));
        assert_eq!(m.capacity(), 13);
        // 0, 13, 26 share bucket 0 and step by 3.
        for k in [0, 13, 26] {
            m.insert(k, k);
        }
        assert_eq!(m.index.get(3).position(), Some(1));
        assert_eq!(m.index.get(6).position(), Some(2));
        assert!(m.erase(&0));
        assert_eq!(m.get(&26), Some(&26));
        for k in 100..200 {
            m.insert(k, k);
        }
        assert_eq!(m.capacity(), 193);
        m.assert_consistent();
    }

    /// Invariant: try_* report exhaustion without touching the map.
    #[test]
    fn exhaustion_is_reported_by_try_methods() {
        let mut m: DiscreteMap<u32, u32, DefaultHashBuilder, PrimeGrowthPolicy> =
            DiscreteMap::with_policies(0, Default::default(), PrimeGrowthPolicy::new(), LinearProber);
        m.insert(1, 1);
        let max = m.growth_policy().max_capacity();
        assert!(matches!(
            m.try_rehash(max + 1),
            Err(MapError::CapacityExhausted { .. })
        ));
        assert!(matches!(
            m.try_reserve(usize::MAX),
            Err(MapError::CapacityExhausted { .. })
        ));
        assert_eq!(m.capacity(), 13);
        assert_eq!(m.len(), 1);
        assert!(m.max_size() < max);
    }

    /// Invariant: probe_length counts the slot that ends the search.
    #[test]
    fn probe_length_counts_slots() {
        let mut m = id_map();
        m.insert(2, ());
        m.insert(10, ());
        m.insert(18, ());
        assert_eq!(m.probe_length(&2), 1);
        assert_eq!(m.probe_length(&18), 3);
        assert_eq!(m.probe_length(&26), 4);
        assert_eq!(m.probe_length(&5), 1);
    }

    /// Invariant: equality ignores storage order; Debug prints storage order.
    #[test]
    fn equality_and_debug() {
        let a: DiscreteMap<u32, char> = [(1, 'a'), (2, 'b')].into_iter().collect();
        let b: DiscreteMap<u32, char> = [(2, 'b'), (1, 'a')].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(format!("{a:?}"), "{1: 'a', 2: 'b'}");
        let keys: BTreeSet<_> = b.keys().iter().copied().collect();
        assert_eq!(keys, BTreeSet::from([1, 2]));
    }

    /// Invariant (debug-only): calling back into the map from `K: Eq` panics.
    #[cfg(debug_assertions)]
    #[test]
    fn reentrancy_from_eq_panics() {
        struct Reentrant {
            id: u32,
            map: *const DiscreteMap<Reentrant, ()>,
        }
        impl Hash for Reentrant {
            fn hash<H: Hasher>(&self, state: &mut H) {
                // Every key collides so probing has to compare.
                0u8.hash(state);
            }
        }
        impl PartialEq for Reentrant {
            fn eq(&self, other: &Self) -> bool {
                if !other.map.is_null() {
                    let m = unsafe { &*other.map };
                    let _ = m.len();
                    let _ = m.contains_key(self);
                }
                self.id == other.id
            }
        }
        impl Eq for Reentrant {}

        let mut m: DiscreteMap<Reentrant, ()> = DiscreteMap::new();
        m.insert(
            Reentrant {
                id: 1,
                map: core::ptr::null(),
            },
            (),
        );
        let query = Reentrant {
            id: 2,
            map: &m as *const _,
        };
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = m.contains_key(&query);
        }));
        assert!(res.is_err(), "expected reentrancy to panic in debug builds");
    }
}
