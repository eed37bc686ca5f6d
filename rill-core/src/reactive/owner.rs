//! Owners and Roots
//!
//! The owner tree is the lifecycle structure of the reactive graph,
//! orthogonal to the dependency graph: every computation is owned by the
//! scope that created it, and disposing an owner tears down its whole
//! subtree: children first, then cleanups, then edges.
//!
//! # How Roots Work
//!
//! [`create_root`] opens a detached owner scope: computations created inside
//! it live until the returned disposer runs, independent of any enclosing
//! scope's lifetime. The root still records its creation-time owner as a
//! parent so error propagation can cross the root boundary, but it is not
//! entered into that parent's owned list.

use crate::graph::NodeId;
use crate::reactive::runtime::{untrack, with_runtime};

/// Handle to an owner scope, usable for explicit disposal or for re-entering
/// the scope later via [`with_owner`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Owner {
    id: NodeId,
}

impl Owner {
    /// Dispose this owner's subtree: owned children first (pre-order), then
    /// cleanups in registration order, then dependency edges. Idempotent.
    pub fn dispose(&self) {
        untrack(|| with_runtime(|rt| rt.dispose_node(self.id)));
    }
}

/// Disposer handed to a [`create_root`] body.
#[derive(Clone, Copy, Debug)]
pub struct RootDisposer {
    id: NodeId,
}

impl RootDisposer {
    /// Tear down everything created under the root. Idempotent.
    pub fn dispose(&self) {
        untrack(|| with_runtime(|rt| rt.dispose_node(self.id)));
    }
}

/// Run `f` under a fresh detached owner, passing it the root's disposer.
/// Tracking is disabled for the body itself; computations created inside
/// track normally.
pub fn create_root<T>(f: impl FnOnce(RootDisposer) -> T) -> T {
    with_runtime(|rt| {
        let id = rt.create_root_node();
        let disposer = RootDisposer { id };
        rt.run_as_owner(Some(id), move || f(disposer))
    })
}

/// Register a thunk to run when the current owner is disposed or re-runs.
/// No-op outside any owner scope.
pub fn on_cleanup(f: impl FnOnce() + 'static) {
    with_runtime(|rt| rt.register_cleanup(Box::new(f)));
}

/// The owner currently in scope, if any.
pub fn current_owner() -> Option<Owner> {
    with_runtime(|rt| rt.current_owner().map(|id| Owner { id }))
}

/// Run `f` with `owner` as the active scope, so computations and cleanups
/// created inside attach to it instead of the caller's scope.
pub fn with_owner<T>(owner: Owner, f: impl FnOnce() -> T) -> T {
    with_runtime(|rt| rt.run_as_owner(Some(owner.id), f))
}
