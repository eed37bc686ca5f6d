//! Memos
//!
//! A memo is a pure derived value: it re-runs only when one of its
//! dependencies actually changed, caches the result, and suppresses
//! propagation to its own observers when the recomputed value is equal to
//! the cached one.
//!
//! # How Laziness Works
//!
//! A memo runs eagerly once at creation, then only on demand. When a
//! dependency changes, the memo is merely marked dirty; the recompute
//! happens when something reads it: either a downstream computation during
//! the flush, or `get` called directly. A memo marked maybe-dirty (reachable
//! only through another memo) first settles its upstream chain, which can
//! collapse it back to clean with no recompute at all.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::graph::{Comparator, DirtyState, EvalFn, NodeId, Value};
use crate::reactive::error::EvalError;
use crate::reactive::runtime::{downcast_value, with_runtime, NodeGuard};

/// A cached derived value.
pub struct Memo<T: 'static> {
    id: NodeId,
    guard: Rc<NodeGuard>,
    _marker: PhantomData<T>,
}

impl<T: Clone + PartialEq + 'static> Memo<T> {
    /// Create a memo using `PartialEq` to suppress unchanged results. The
    /// closure receives the previous value, if any.
    pub fn new(f: impl FnMut(Option<&T>) -> T + 'static) -> Self {
        Self::with_equals(f, |a, b| a == b)
    }

    /// Like [`Memo::new`] for a fallible computation: an `Err` is routed to
    /// the owner chain's error handlers and the memo keeps its last value.
    pub fn try_new(f: impl FnMut(Option<&T>) -> Result<T, EvalError> + 'static) -> Self {
        Self::create(f, |a, b| a == b)
    }
}

impl<T: Clone + 'static> Memo<T> {
    /// Create a memo with a custom equality predicate.
    pub fn with_equals(
        mut f: impl FnMut(Option<&T>) -> T + 'static,
        equals: impl Fn(&T, &T) -> bool + 'static,
    ) -> Self {
        Self::create(move |prev| Ok(f(prev)), equals)
    }

    fn create(
        mut f: impl FnMut(Option<&T>) -> Result<T, EvalError> + 'static,
        equals: impl Fn(&T, &T) -> bool + 'static,
    ) -> Self {
        let eval: EvalFn = Rc::new(RefCell::new(move |prev: Option<Value>| {
            let prev = prev.as_ref().and_then(|v| v.downcast_ref::<T>());
            f(prev).map(|v| Rc::new(v) as Value)
        }));
        let comparator: Comparator = Rc::new(move |a: &dyn Any, b: &dyn Any| {
            match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
                (Some(a), Some(b)) => equals(a, b),
                _ => false,
            }
        });
        let id = with_runtime(|rt| {
            let id = rt.create_computation(
                eval,
                Some(comparator),
                DirtyState::Clean,
                true,
                false,
                true,
            );
            rt.pin(id);
            // Eager first run establishes the value and the dependency set.
            rt.update_computation(id);
            id
        });
        Self {
            id,
            guard: Rc::new(NodeGuard::new(id)),
            _marker: PhantomData,
        }
    }

    /// Read the cached value, recomputing first if a dependency changed.
    /// Registers a dependency on the active computation.
    pub fn get(&self) -> T {
        downcast_value(with_runtime(|rt| rt.read_memo(self.id)))
    }

    /// Like [`Memo::get`] but returns `None` when the memo has no value,
    /// such as after its first run failed.
    pub fn try_get(&self) -> Option<T> {
        with_runtime(|rt| rt.read_memo(self.id)).and_then(|v| v.downcast_ref::<T>().cloned())
    }
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            guard: self.guard.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.id.raw())
            .field("value", &self.try_get())
            .finish()
    }
}
