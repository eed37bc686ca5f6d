//! Error Types & Handler Registration
//!
//! Evaluation closures can fail, and failures are recovered by the nearest
//! error handler registered on the owner chain rather than tearing down the
//! whole graph.
//!
//! # How Errors Flow
//!
//! 1. An evaluation closure returns `Err(EvalError)`.
//!
//! 2. The runtime looks for a handler list on the failing computation. The
//!    list is aliased from its owner at creation time, so the nearest
//!    ancestor with handlers covers the whole subtree.
//!
//! 3. Handlers run in registration order. A handler that itself fails
//!    propagates the new error starting from the owner's parent; handlers
//!    never catch their own failures.
//!
//! 4. If no handler exists anywhere up the chain, the error is fatal and the
//!    runtime panics with a [`RuntimeError`].
//!
//! Errors raised while an effect phase is in flight are not handled
//! mid-flush: the runtime defers the handler invocation and runs it as its
//! own pass, so handler side effects follow the normal batching rules.

use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::reactive::runtime::with_runtime;

/// An error produced by a reactive evaluation closure.
///
/// Cheap to clone: one instance flows through every handler on the chain.
#[derive(Clone)]
pub struct EvalError(Rc<dyn StdError + 'static>);

impl EvalError {
    /// Wrap a concrete error.
    pub fn new(error: impl StdError + 'static) -> Self {
        Self(Rc::new(error))
    }

    /// Build an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self(Rc::new(Message(message.into())))
    }

    /// Downcast to the concrete error type, if it matches.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl<E: StdError + 'static> From<E> for EvalError {
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

/// Message-only error used by [`EvalError::msg`].
#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

/// Fatal runtime failures. These unwind to the host; they are never visible
/// to registered error handlers.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The pure queue grew past the configured limit within a single pass,
    /// indicating a dependency cycle or runaway write amplification.
    #[error("maximum update depth exceeded (limit {limit})")]
    MaxUpdateDepth { limit: usize },

    /// An evaluation failed and no handler exists on the owner chain.
    #[error("unhandled reactive error: {0}")]
    Unhandled(EvalError),
}

/// Register an error handler on the current owner.
///
/// The handler catches errors thrown by any computation in the owner's
/// subtree, including computations that were already running before the
/// handler was registered. No-op outside an owner scope.
pub fn on_error(handler: impl Fn(&EvalError) + 'static) {
    try_on_error(move |error| {
        handler(error);
        Ok(())
    });
}

/// Like [`on_error`], for handlers that can themselves fail. A returned
/// error propagates up from the owner's parent.
pub fn try_on_error(handler: impl Fn(&EvalError) -> Result<(), EvalError> + 'static) {
    with_runtime(|rt| rt.register_error_handler(Rc::new(handler)));
}

/// Run `f` with `handler` catching every error raised inside its scope,
/// including later re-runs of computations created there.
///
/// The scope gets its own handler list instead of aliasing the enclosing
/// owner's, so errors it catches never reach handlers registered outside.
/// A failure of `handler` itself still escalates to the enclosing owner.
pub fn catch_error<T>(f: impl FnOnce() -> T, handler: impl Fn(&EvalError) + 'static) -> T {
    with_runtime(|rt| {
        rt.run_in_error_scope(|| {
            on_error(handler);
            f()
        })
    })
}
