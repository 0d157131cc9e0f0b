#![cfg(test)]

// Property tests for DiscreteMap kept inside the crate so they can check
// the index/storage bijection through `assert_consistent`.

use crate::discrete_map::DiscreteMap;
use crate::policy::{BitwiseGrowthPolicy, PrimeGrowthPolicy};
use crate::prober::{LinearProber, StepProber};
use core::hash::BuildHasher;
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::Hasher;

// Key newtype with Borrow<str> to exercise borrowed lookup.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// Pool-indexed operations so shrinking moves toward earlier keys.
#[derive(Clone, Debug)]
enum Op {
    Insert(usize, i32),
    Remove(usize),
    SwapRemove(usize),
    Find(usize),
    Contains(String),
    Mutate(usize, i32),
    Rehash(usize),
    Retain(u8),
    Iterate,
}

fn key_from(pool: &[String], i: usize) -> Key {
    Key(pool[i].clone())
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<Op>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=24).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Insert(i, v)),
            2 => idx.clone().prop_map(Op::Remove),
            2 => idx.clone().prop_map(Op::SwapRemove),
            2 => idx.clone().prop_map(Op::Find),
            1 => prop_oneof![contains_pool, "[a-z]{0,5}"].prop_map(Op::Contains),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| Op::Mutate(i, d)),
            1 => (0usize..300).prop_map(Op::Rehash),
            1 => any::<u8>().prop_map(Op::Retain),
            1 => Just(Op::Iterate),
        ];
        proptest::collection::vec(op, 1..120).prop_map(move |ops| (pool.clone(), ops))
    })
}

// Drives `sut` and a std HashMap model through the same operations.
// Invariants checked after every op:
// - bijection between occupied slots and `0..len`, all keys reachable;
// - no-overwrite insert semantics and value parity with the model;
// - order-preserving removal keeps the relative order of survivors;
// - capacity never decreases and load stays under the threshold.
fn run_scenario<S, G, P>(
    mut sut: DiscreteMap<Key, i32, S, G, P>,
    pool: &[String],
    ops: Vec<Op>,
) -> Result<(), TestCaseError>
where
    S: BuildHasher,
    G: crate::policy::GrowthPolicy,
    P: crate::prober::Prober,
{
    let mut model: HashMap<Key, i32> = HashMap::new();
    let mut order: Vec<Key> = Vec::new();
    let mut last_capacity = sut.capacity();

    for op in ops {
        match op {
            Op::Insert(i, v) => {
                let k = key_from(pool, i);
                let (h, inserted) = sut.insert(k.clone(), v);
                prop_assert_eq!(inserted, !model.contains_key(&k));
                if inserted {
                    model.insert(k.clone(), v);
                    order.push(k.clone());
                }
                prop_assert_eq!(h.key(&sut), Some(&k));
                prop_assert_eq!(h.value(&sut), model.get(&k));
            }
            Op::Remove(i) => {
                let k = key_from(pool, i);
                let got = sut.remove(&k);
                let want = model.remove(&k).map(|v| (k.clone(), v));
                prop_assert_eq!(got, want);
                order.retain(|o| o != &k);
                prop_assert_eq!(sut.keys(), &order[..]);
            }
            Op::SwapRemove(i) => {
                let k = key_from(pool, i);
                let got = sut.swap_remove(&k);
                let want = model.remove(&k).map(|v| (k.clone(), v));
                prop_assert_eq!(got, want);
                if let Some(p) = order.iter().position(|o| o == &k) {
                    order.swap_remove(p);
                }
                prop_assert_eq!(sut.keys(), &order[..]);
            }
            Op::Find(i) => {
                let k = key_from(pool, i);
                let h = sut.find(&k);
                prop_assert_eq!(h.is_some(), model.contains_key(&k));
                if let Some(h) = h {
                    prop_assert_eq!(h.value(&sut), model.get(&k));
                }
            }
            Op::Contains(s) => {
                let has = sut.contains_key(s.as_str());
                let has_model = model.keys().any(|k| k.0 == s);
                prop_assert_eq!(has, has_model);
            }
            Op::Mutate(i, d) => {
                let k = key_from(pool, i);
                if let Some(v) = sut.get_mut(&k) {
                    *v = v.wrapping_add(d);
                    let mv = model.get_mut(&k).expect("present in model");
                    *mv = mv.wrapping_add(d);
                } else {
                    prop_assert!(!model.contains_key(&k));
                }
            }
            Op::Rehash(n) => {
                let before = sut.capacity();
                sut.rehash(n);
                prop_assert!(sut.capacity() >= before);
                if n > before {
                    prop_assert!(sut.capacity() >= n);
                }
            }
            Op::Retain(m) => {
                let keep = |v: &i32| (*v as u8) & 3 != m & 3;
                sut.retain(|_, v| keep(v));
                model.retain(|_, v| keep(v));
                order.retain(|k| model.contains_key(k));
                prop_assert_eq!(sut.keys(), &order[..]);
            }
            Op::Iterate => {
                let s_keys: BTreeSet<_> = sut.iter().map(|(k, _)| k.clone()).collect();
                let m_keys: BTreeSet<_> = model.keys().cloned().collect();
                prop_assert_eq!(s_keys, m_keys);
                for (k, v) in &sut {
                    prop_assert_eq!(model.get(k), Some(v));
                }
            }
        }

        sut.assert_consistent();
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
        prop_assert!(sut.capacity() >= last_capacity);
        prop_assert!(sut.load_factor() < sut.threshold());
        last_capacity = sut.capacity();
    }
    Ok(())
}

// Collision variant: a constant hasher sends every key to one bucket.
#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

// Low-entropy variant: few distinct hashes, so runs form and interleave.
#[derive(Clone, Default)]
struct ClumpyBuildHasher;
struct ClumpyHasher(u64);
impl BuildHasher for ClumpyBuildHasher {
    type Hasher = ClumpyHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ClumpyHasher(0)
    }
}
impl Hasher for ClumpyHasher {
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = self.0.wrapping_mul(31).wrapping_add(b as u64);
        }
    }
    fn finish(&self) -> u64 {
        self.0 % 5
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        run_scenario(DiscreteMap::new(), &pool, ops)?;
    }

    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        run_scenario(DiscreteMap::with_hasher(ConstBuildHasher), &pool, ops)?;
    }

    #[test]
    fn prop_state_machine_clumped_step_prober((pool, ops) in arb_scenario()) {
        let sut: DiscreteMap<Key, i32, ClumpyBuildHasher, BitwiseGrowthPolicy, StepProber> =
            DiscreteMap::with_policies(0, ClumpyBuildHasher, BitwiseGrowthPolicy::new(), StepProber::new(5));
        run_scenario(sut, &pool, ops)?;
    }

    #[test]
    fn prop_state_machine_prime_policy((pool, ops) in arb_scenario()) {
        let sut: DiscreteMap<Key, i32, ClumpyBuildHasher, PrimeGrowthPolicy, LinearProber> =
            DiscreteMap::with_policies(0, ClumpyBuildHasher, PrimeGrowthPolicy::with_threshold(0.9), LinearProber);
        run_scenario(sut, &pool, ops)?;
    }

    // Round-trip: unique keys are all findable with their inserted values,
    // and an explicit rehash to a larger table keeps every one of them.
    #[test]
    fn prop_unique_keys_round_trip(keys in proptest::collection::hash_set(any::<u64>(), 0..200), grow in 1usize..4) {
        let mut m: DiscreteMap<u64, u64> = DiscreteMap::new();
        for &k in &keys {
            prop_assert!(m.insert(k, k ^ 0x5a5a).1);
        }
        for &k in &keys {
            prop_assert!(!m.insert(k, 0).1);
        }
        let target = m.capacity() << grow;
        m.rehash(target);
        prop_assert_eq!(m.capacity(), target);
        for &k in &keys {
            prop_assert_eq!(m.get(&k), Some(&(k ^ 0x5a5a)));
        }
        m.assert_consistent();
    }
}
