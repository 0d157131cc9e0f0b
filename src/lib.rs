//! discrete-map: an open-addressing hash map whose bucket array stores
//! positions into insertion-ordered key/value storage.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: keep three structures consistent across insert, lookup,
//!   erase and growth: the index table (buckets), the key sequence and
//!   the value sequence.
//! - Layers:
//!   - GrowthPolicy: pure sizing and hash-to-bucket mapping
//!     (`BitwiseGrowthPolicy`, `PrimeGrowthPolicy`).
//!   - IndexTable: slots that are `Empty` or `Occupied(position)`.
//!   - Prober: walks slots from a home bucket along a fixed cycle
//!     (`LinearProber`, `StepProber`).
//!   - Storage: index-aligned keys, values and cached hashes.
//!   - DiscreteMap: owns all of the above and drives them.
//!
//! Invariants
//! - Bijection: the positions held by occupied slots are exactly
//!   `0..len()`, each once. The occupied slot count equals `len()`.
//! - Load: an insert that would bring `len / capacity` to the policy's
//!   threshold grows the table before the element is placed, so at
//!   least one slot is always empty and every probe terminates.
//! - Capacity never decreases; erase does not shrink.
//!
//! Deletion
//! - No tombstones. Clearing a slot would cut the probe chain of any key
//!   that was displaced past it, so the rest of the run after the
//!   cleared slot is re-seated from each element's home bucket.
//! - `remove`/`erase` shift storage down and renumber every slot above
//!   the removed position: insertion order survives, cost is
//!   O(capacity).
//! - `swap_remove`/`erase_unordered` move the last element into the hole
//!   and repoint its one slot.
//!
//! Hashing
//! - Each element's `u64` hash is computed once on insert and cached in
//!   storage. Rehash, re-seating and relocation use the cached hash;
//!   `K: Hash` is never invoked after insertion.
//!
//! Handles
//! - `find`/`insert` return a `Handle` stamped with the map's epoch.
//!   Every structural mutation bumps the epoch, so a handle resolves only
//!   until the next mutating call and never aliases a moved element.
//!
//! Failure
//! - Absent keys are `None`/`MapError::KeyNotFound`.
//! - Growth past the policy maximum is `MapError::CapacityExhausted` from
//!   the `try_*` methods and a panic elsewhere. The policy maximum never
//!   exceeds what the slot array can allocate, and a failed allocation on
//!   a `try_*` path is reported the same way.
//! - A panic inside a `retain` predicate leaves the map consistent: the
//!   index table is rebuilt from whatever storage still holds.
//! - A probe that wraps the whole table means index and storage have
//!   desynchronized; it panics and is never retried.
//!
//! Constraints
//! - Single-threaded: `!Send`/`!Sync`. A debug-only guard panics if user
//!   code (`K: Eq`, closures) re-enters the map mid-operation.

pub mod discrete_map;
mod discrete_map_proptest;
pub mod error;
pub mod index_table;
pub mod policy;
pub mod prober;
mod reentrancy;
mod storage;

// Public surface
pub use discrete_map::{DiscreteMap, Handle};
pub use error::MapError;
pub use policy::{BitwiseGrowthPolicy, GrowthPolicy, PrimeGrowthPolicy};
pub use prober::{LinearProber, Probe, Prober, StepProber};
