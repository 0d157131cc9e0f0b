//! Error taxonomy for `DiscreteMap`.

use core::fmt;

/// Recoverable and fatal conditions surfaced by the map.
///
/// `KeyNotFound` and `StaleHandle` are ordinary results. `CapacityExhausted`
/// is only ever returned by the `try_*` methods; their infallible siblings
/// panic with the same message instead of continuing.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MapError {
    /// The requested key is absent.
    KeyNotFound,
    /// The growth policy cannot produce a capacity large enough.
    CapacityExhausted {
        /// Number of elements (or table size) that was requested.
        requested: usize,
        /// Largest capacity the policy can represent.
        max: usize,
    },
    /// A `Handle` was used after a mutating call invalidated it.
    StaleHandle,
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::KeyNotFound => f.write_str("key not found"),
            MapError::CapacityExhausted { requested, max } => write!(
                f,
                "capacity exhausted: {requested} requested, policy maximum is {max}"
            ),
            MapError::StaleHandle => f.write_str("handle invalidated by a later mutation"),
        }
    }
}

impl std::error::Error for MapError {}

/// Abort on a broken index/storage invariant. Never retried or masked.
#[cold]
#[inline(never)]
pub(crate) fn invariant_violation(what: &str) -> ! {
    tracing::error!(what, "discrete map invariant violated");
    panic!("discrete map invariant violated: {what}");
}

/// Abort an infallible operation whose growth the policy cannot satisfy.
#[cold]
#[inline(never)]
pub(crate) fn capacity_exhausted(err: MapError) -> ! {
    tracing::error!(%err, "growth policy exhausted");
    panic!("{err}");
}
