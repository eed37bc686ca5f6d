//! Effects
//!
//! An effect is a non-pure computation: it runs for its side effects and is
//! pushed eagerly when a dependency changes, rather than pulled on read.
//!
//! # Render vs User Effects
//!
//! Effects come in two tiers. Render effects ([`Effect::new`]) run first
//! within each effect phase and are meant for framework-internal work such
//! as patching output state. User effects ([`Effect::user`]) run after all
//! render effects have settled, so they observe the finished result; their
//! first run is likewise deferred to the current pass's user-effect phase
//! when one is open.
//!
//! Effects are owned by their creation scope and torn down when that owner
//! is disposed; the returned handle is only an address for explicit
//! [`Effect::dispose`], not a lifetime guard.

use std::cell::RefCell;
use std::rc::Rc;

use crate::graph::{EvalFn, NodeId, Value};
use crate::reactive::error::EvalError;
use crate::reactive::runtime::{untrack, with_runtime};

/// Handle to a running effect.
#[derive(Clone, Copy)]
pub struct Effect {
    id: NodeId,
}

impl Effect {
    /// Create a render effect. Runs immediately, re-runs whenever a
    /// dependency changes.
    pub fn new(mut f: impl FnMut() + 'static) -> Self {
        Self::try_new(move || {
            f();
            Ok(())
        })
    }

    /// Like [`Effect::new`] for a fallible body: an `Err` is routed to the
    /// owner chain's error handlers instead of unwinding.
    pub fn try_new(f: impl FnMut() -> Result<(), EvalError> + 'static) -> Self {
        Self::create(f, false)
    }

    /// Create a user effect: it runs in the user tier, after every render
    /// effect of the same pass has settled.
    pub fn user(mut f: impl FnMut() + 'static) -> Self {
        Self::try_user(move || {
            f();
            Ok(())
        })
    }

    /// Fallible variant of [`Effect::user`].
    pub fn try_user(f: impl FnMut() -> Result<(), EvalError> + 'static) -> Self {
        Self::create(f, true)
    }

    /// Create a render effect whose body receives the value it returned on
    /// the previous run, for carrying state across runs without a cell.
    pub fn new_with<T: 'static>(mut f: impl FnMut(Option<&T>) -> T + 'static) -> Self {
        let eval: EvalFn = Rc::new(RefCell::new(move |prev: Option<Value>| {
            let prev = prev.as_ref().and_then(|v| v.downcast_ref::<T>());
            Ok(Rc::new(f(prev)) as Value)
        }));
        let id = with_runtime(|rt| rt.create_effect(eval, false));
        Self { id }
    }

    fn create(mut f: impl FnMut() -> Result<(), EvalError> + 'static, user: bool) -> Self {
        let eval: EvalFn = Rc::new(RefCell::new(move |_prev: Option<Value>| {
            f()?;
            Ok(Rc::new(()) as Value)
        }));
        let id = with_runtime(|rt| rt.create_effect(eval, user));
        Self { id }
    }

    /// Stop the effect and run its cleanups. Idempotent.
    pub fn dispose(&self) {
        with_runtime(|rt| rt.dispose_node(self.id));
    }
}

/// Make a computation's dependencies explicit: `source` is the only tracked
/// read, and `f` runs untracked with the source's current and previous
/// values. The result plugs into [`Effect::new_with`] or [`Memo::new`].
///
/// [`Memo::new`]: crate::reactive::Memo::new
pub fn on<D: 'static, T: 'static>(
    source: impl Fn() -> D + 'static,
    mut f: impl FnMut(&D, Option<&D>) -> T + 'static,
) -> impl FnMut(Option<&T>) -> T + 'static {
    let mut prev_input: Option<D> = None;
    move |_prev: Option<&T>| {
        let input = source();
        let result = untrack(|| f(&input, prev_input.as_ref()));
        prev_input = Some(input);
        result
    }
}

/// Run `f` exactly once, untracked, in the user-effect phase of the current
/// pass (or immediately when no pass is open).
pub fn on_mount(f: impl FnOnce() + 'static) {
    let mut f = Some(f);
    Effect::user(move || {
        if let Some(f) = f.take() {
            untrack(f);
        }
    });
}
