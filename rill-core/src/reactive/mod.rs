//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, effects,
//! and the owner tree that scopes their lifetimes.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] is a container for mutable state. When a signal's value is
//! read within a tracking context (such as a memo or effect), the signal
//! automatically registers that context as a dependent. When the signal's
//! value changes, dependents are scheduled and re-run.
//!
//! ## Memos
//!
//! A [`Memo`] is a derived value that caches its result. It re-evaluates
//! only when one of its dependencies actually changed, and propagates to its
//! own dependents only when the recomputed value differs from the cached one.
//!
//! ## Effects
//!
//! An [`Effect`] is a side-effecting computation that re-runs whenever its
//! dependencies change. Effects synchronize reactive state with external
//! systems; render effects run before user effects within each update pass.
//!
//! ## Owners
//!
//! Every computation is owned by the scope that created it. Disposing an
//! owner ([`create_root`] hands back a disposer) tears down the whole
//! subtree and runs registered [`on_cleanup`] thunks. Error handlers
//! registered with [`on_error`] are inherited down the owner tree.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local runtime holding an arena of graph
//! nodes plus the scheduler queues. Dependency edges are discovered by
//! reading: when a signal is read we check for an active computation and, if
//! one exists, record a bidirectional edge. Updates settle glitch-free in
//! two phases, pure computations first and effects after.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod effect;
pub(crate) mod error;
mod memo;
mod owner;
mod runtime;
mod signal;

pub use effect::{on, on_mount, Effect};
pub use error::{catch_error, on_error, try_on_error, EvalError, RuntimeError};
pub use memo::Memo;
pub use owner::{create_root, current_owner, on_cleanup, with_owner, Owner, RootDisposer};
pub use runtime::{batch, set_update_limit, untrack};
pub use signal::Signal;
