//! Index-aligned element storage: keys, values and their cached hashes.
//!
//! Position `i` names the element `(keys[i], values[i])`; insertion order
//! is position order. The three sequences always have the same length.

use std::collections::TryReserveError;

#[derive(Clone, Debug)]
pub struct Storage<K, V> {
    keys: Vec<K>,
    values: Vec<V>,
    hashes: Vec<u64>,
}

impl<K, V> Storage<K, V> {
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            hashes: Vec::new(),
        }
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            keys: Vec::with_capacity(n),
            values: Vec::with_capacity(n),
            hashes: Vec::with_capacity(n),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Append an element and return its position.
    pub fn push(&mut self, key: K, value: V, hash: u64) -> usize {
        let position = self.keys.len();
        self.keys.push(key);
        self.values.push(value);
        self.hashes.push(hash);
        position
    }

    /// Remove the element at `position`, shifting later elements down.
    pub fn remove(&mut self, position: usize) -> (K, V) {
        self.hashes.remove(position);
        (self.keys.remove(position), self.values.remove(position))
    }

    /// Remove the element at `position`, moving the last element into it.
    pub fn swap_remove(&mut self, position: usize) -> (K, V) {
        self.hashes.swap_remove(position);
        (
            self.keys.swap_remove(position),
            self.values.swap_remove(position),
        )
    }

    #[inline]
    pub fn key(&self, position: usize) -> &K {
        &self.keys[position]
    }

    #[inline]
    pub fn value(&self, position: usize) -> &V {
        &self.values[position]
    }

    #[inline]
    pub fn value_mut(&mut self, position: usize) -> &mut V {
        &mut self.values[position]
    }

    #[inline]
    pub fn hash(&self, position: usize) -> u64 {
        self.hashes[position]
    }

    #[inline]
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    #[inline]
    pub fn values(&self) -> &[V] {
        &self.values
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut [V] {
        &mut self.values
    }

    #[inline]
    pub fn hashes(&self) -> &[u64] {
        &self.hashes
    }

    /// Shared keys alongside mutable values.
    pub fn split_mut(&mut self) -> (&[K], &mut [V]) {
        (&self.keys, &mut self.values)
    }

    /// Keep the elements for which `f` returns true, in order.
    /// Returns the number removed.
    ///
    /// If `f` panics, the elements it already rejected are dropped and
    /// every other element stays, in order.
    pub fn retain<F>(&mut self, mut f: F) -> usize
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        let before = self.len();
        let mut g = Compact {
            storage: self,
            kept: 0,
            next: 0,
        };
        while g.next < before {
            let i = g.next;
            if f(&g.storage.keys[i], &mut g.storage.values[i]) {
                g.storage.swap(g.kept, i);
                g.kept += 1;
            }
            g.next += 1;
        }
        drop(g);
        before - self.len()
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.keys.swap(a, b);
        self.values.swap(a, b);
        self.hashes.swap(a, b);
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.values.clear();
        self.hashes.clear();
    }

    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        self.keys.try_reserve(additional)?;
        self.values.try_reserve(additional)?;
        self.hashes.try_reserve(additional)
    }

    /// Take every element out, leaving storage empty.
    pub fn take(&mut self) -> (Vec<K>, Vec<V>) {
        self.hashes.clear();
        (
            core::mem::take(&mut self.keys),
            core::mem::take(&mut self.values),
        )
    }

    pub fn into_parts(self) -> (Vec<K>, Vec<V>) {
        (self.keys, self.values)
    }
}

// Layout during `retain`: `[0, kept)` kept, `[kept, next)` rejected,
// `[next, len)` not yet visited. Dropping removes the rejected range.
struct Compact<'a, K, V> {
    storage: &'a mut Storage<K, V>,
    kept: usize,
    next: usize,
}

impl<K, V> Drop for Compact<'_, K, V> {
    fn drop(&mut self) {
        let s = &mut *self.storage;
        let rejected = self.kept..self.next;
        s.keys.drain(rejected.clone());
        s.values.drain(rejected.clone());
        s.hashes.drain(rejected);
    }
}

impl<K, V> Default for Storage<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
