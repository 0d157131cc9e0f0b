//! Debug-only reentrancy guard.
//!
//! Debug builds panic when user code (`K: Eq`, closures) re-enters the
//! map mid-operation. Release builds compile it away.

#[cfg(debug_assertions)]
use core::cell::Cell;
use core::marker::PhantomData;
#[cfg(debug_assertions)]
use std::rc::Rc;

/// Per-map entry tracker. Public entry points hold `self.reentrancy.enter()`
/// for their whole body.
#[derive(Debug)]
pub(crate) struct Reentrancy {
    // Shared with the live marker so holding it does not borrow the map.
    #[cfg(debug_assertions)]
    busy: Rc<Cell<bool>>,
    // The map is single-threaded; keep it !Send + !Sync.
    _single_thread: PhantomData<*mut ()>,
}

impl Reentrancy {
    pub(crate) fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            busy: Rc::new(Cell::new(false)),
            _single_thread: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn enter(&self) -> Entered {
        #[cfg(debug_assertions)]
        {
            assert!(
                !self.busy.replace(true),
                "reentrant call into DiscreteMap during an operation on the same map"
            );
            Entered {
                busy: Rc::clone(&self.busy),
            }
        }

        #[cfg(not(debug_assertions))]
        {
            Entered { _priv: () }
        }
    }
}

impl Default for Reentrancy {
    fn default() -> Self {
        Self::new()
    }
}

// A cloned map starts outside any operation.
impl Clone for Reentrancy {
    fn clone(&self) -> Self {
        Self::new()
    }
}

/// RAII marker returned by `Reentrancy::enter`.
pub(crate) struct Entered {
    #[cfg(debug_assertions)]
    busy: Rc<Cell<bool>>,
    #[cfg(not(debug_assertions))]
    _priv: (),
}

impl Drop for Entered {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.busy.set(false);
    }
}
