//! Signals
//!
//! A signal is a reactive value cell: reading it inside a computation makes
//! that computation depend on it, writing it schedules the dependents. The
//! handle is a cheap clone-by-`Rc` reference; the underlying node is released
//! when the last handle drops.
//!
//! # How Tracking Works
//!
//! `get` asks the runtime which computation is currently evaluating and, if
//! one is, records a dependency edge before returning the value. `set`
//! compares against the current value with the signal's comparator and only
//! propagates a real change. Reads that must not create an edge go through
//! `get_untracked` (or [`untrack`](crate::reactive::untrack)).

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::graph::{Comparator, NodeId};
use crate::reactive::runtime::{downcast_value, with_runtime, NodeGuard};

/// A reactive value cell.
pub struct Signal<T: 'static> {
    id: NodeId,
    guard: Rc<NodeGuard>,
    _marker: PhantomData<T>,
}

impl<T: Clone + PartialEq + 'static> Signal<T> {
    /// Create a signal using `PartialEq` to suppress no-op writes.
    pub fn new(value: T) -> Self {
        Self::with_equals(value, |a, b| a == b)
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Create a signal with a custom equality predicate. `|_, _| false`
    /// makes every write propagate.
    pub fn with_equals(value: T, equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        let comparator: Comparator = Rc::new(move |a: &dyn Any, b: &dyn Any| {
            match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
                (Some(a), Some(b)) => equals(a, b),
                _ => false,
            }
        });
        let id = with_runtime(|rt| {
            let id = rt.create_signal(Rc::new(value), comparator);
            rt.pin(id);
            id
        });
        Self {
            id,
            guard: Rc::new(NodeGuard::new(id)),
            _marker: PhantomData,
        }
    }

    /// Read the value, registering a dependency on the active computation.
    pub fn get(&self) -> T {
        downcast_value(with_runtime(|rt| rt.read(self.id)))
    }

    /// Read the value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        downcast_value(with_runtime(|rt| rt.read_untracked(self.id)))
    }

    /// Write a new value. Dependents re-run unless the comparator judges it
    /// equal to the current one.
    pub fn set(&self, value: T) {
        with_runtime(|rt| rt.write_signal(self.id, Rc::new(value)));
    }

    /// Write a value derived from the current one. The read is untracked.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.get_untracked());
        self.set(next);
    }

    /// Number of computations currently depending on this signal. Useful in
    /// tests for observing dynamic dependency pruning.
    pub fn observer_count(&self) -> usize {
        with_runtime(|rt| rt.observer_count(self.id))
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            guard: self.guard.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id.raw())
            .field("value", &self.get_untracked())
            .field("observers", &self.observer_count())
            .finish()
    }
}
