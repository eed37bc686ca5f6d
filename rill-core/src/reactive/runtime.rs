//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns the node arena, the scheduler queues, and the tracking
//! context, and it implements the update-pass algorithm.
//!
//! # How an Update Pass Works
//!
//! 1. A signal write compares old and new values; equal values stop here.
//!
//! 2. Otherwise every clean observer is enqueued (pure computations into
//!    the update queue, effects into the effect queue) and marked dirty.
//!    Observers reachable only through a memo are marked maybe-dirty, since
//!    whether they really changed depends on whether the memo's value does.
//!
//! 3. The update queue is flushed in dependency order: each entry settles
//!    its stale owner-chain ancestors outermost-first (a parent that re-runs
//!    rebuilds its children anyway), resolves maybe-dirty nodes by pulling
//!    their upstream chain, and finally re-runs if still dirty.
//!
//! 4. The effect queue runs as its own pass afterwards, render effects
//!    before user effects. Writes inside an effect start a nested pass that
//!    settles completely before the outer effect loop continues.
//!
//! # Reentrancy
//!
//! Execution is single-threaded; the only concurrency is logical reentrancy
//! (writing a signal from inside a running computation). The runtime lives
//! in a thread-local and uses per-field interior mutability so that user
//! closures always run with no borrow held, so any reactive call they make
//! re-enters cleanly. The active computation and owner follow strict
//! save/restore discipline via an RAII scope guard, including on early exits.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::graph::{
    Cleanup, Comparator, DirtyState, ErrorHandler, EvalFn, HandlerList, Node, NodeArena, NodeId,
    Value,
};
use crate::reactive::error::{EvalError, RuntimeError};

/// Default bound on the update queue within a single pass. Exceeding it
/// indicates a dependency cycle or runaway write amplification.
const DEFAULT_UPDATE_LIMIT: usize = 1_000_000;

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

/// Run a closure against this thread's runtime.
pub(crate) fn with_runtime<T>(f: impl FnOnce(&Runtime) -> T) -> T {
    RUNTIME.with(f)
}

/// A handler invocation postponed until after the current effect phase, so
/// its side effects follow the normal batching rules.
struct DeferredError {
    error: EvalError,
    handlers: HandlerList,
    owner: Option<NodeId>,
}

/// The per-thread scheduler context.
///
/// Every field has its own interior-mutability cell: methods take `&self`
/// and borrow only for the small bookkeeping step at hand, never across a
/// call into user code.
pub(crate) struct Runtime {
    /// All graph nodes.
    arena: RefCell<NodeArena>,

    /// The computation currently evaluating; reads register edges onto it.
    listener: Cell<Option<NodeId>>,

    /// The owner currently in scope; new computations and cleanups attach
    /// here.
    owner: Cell<Option<NodeId>>,

    /// Pure queue. `Some` iff an update pass is in flight.
    updates: RefCell<Option<Vec<NodeId>>>,

    /// Effect queue, opened by the outermost pass and run as its own pass.
    effects: RefCell<Option<Vec<NodeId>>>,

    /// Logical clock, incremented once per outermost pass.
    clock: Cell<u64>,

    /// Set once any user effect exists; switches effect dispatch to the
    /// render-then-user two-tier split.
    user_effects: Cell<bool>,

    /// Cycle/runaway-write guard on the update queue.
    update_limit: Cell<usize>,

    /// Error-handler invocations deferred out of an effect phase.
    deferred_errors: RefCell<Vec<DeferredError>>,

    /// Handle releases that arrived while the arena was borrowed.
    pending_release: RefCell<Vec<NodeId>>,
}

impl Runtime {
    fn new() -> Self {
        Self {
            arena: RefCell::new(NodeArena::new()),
            listener: Cell::new(None),
            owner: Cell::new(None),
            updates: RefCell::new(None),
            effects: RefCell::new(None),
            clock: Cell::new(0),
            user_effects: Cell::new(false),
            update_limit: Cell::new(DEFAULT_UPDATE_LIMIT),
            deferred_errors: RefCell::new(Vec::new()),
            pending_release: RefCell::new(Vec::new()),
        }
    }

    // ------------------------------------------------------------------
    // Node creation and access
    // ------------------------------------------------------------------

    pub fn create_signal(&self, value: Value, comparator: Comparator) -> NodeId {
        self.arena
            .borrow_mut()
            .insert(Node::signal(value, comparator))
    }

    /// Allocate a computation parented under the active owner, aliasing the
    /// owner's error-handler list.
    pub fn create_computation(
        &self,
        eval: EvalFn,
        comparator: Option<Comparator>,
        state: DirtyState,
        pure: bool,
        user: bool,
        memo: bool,
    ) -> NodeId {
        let owner = self.owner.get();
        let handlers = owner.and_then(|o| self.arena.borrow().get(o).and_then(|n| n.handlers.clone()));
        let mut arena = self.arena.borrow_mut();
        let id = arena.insert(Node::computation(
            eval, None, comparator, state, pure, user, memo, owner, handlers,
        ));
        if let Some(o) = owner {
            if let Some(parent) = arena.get_mut(o) {
                parent.owned.push(id);
            }
        }
        id
    }

    /// Create an effect. Render effects run immediately; user effects join
    /// the open effect queue if one exists, otherwise they run immediately
    /// too.
    pub fn create_effect(&self, eval: EvalFn, user: bool) -> NodeId {
        let id = self.create_computation(eval, None, DirtyState::Dirty, false, user, false);
        if user {
            self.user_effects.set(true);
            let queued = {
                let mut effects = self.effects.borrow_mut();
                match effects.as_mut() {
                    Some(queue) => {
                        queue.push(id);
                        true
                    }
                    None => false,
                }
            };
            if queued {
                return id;
            }
        }
        self.update_computation(id);
        id
    }

    /// Create a detached root owner: it records the current owner as parent
    /// (error-handler lookup crosses root boundaries) but is not entered
    /// into the parent's owned list, so it shares no lifecycle with it.
    pub fn create_root_node(&self) -> NodeId {
        let parent = self.owner.get();
        let handlers =
            parent.and_then(|p| self.arena.borrow().get(p).and_then(|n| n.handlers.clone()));
        self.arena.borrow_mut().insert(Node::owner(parent, handlers))
    }

    pub fn current_owner(&self) -> Option<NodeId> {
        self.owner.get()
    }

    /// Run `f` with the given owner in scope and tracking disabled, as its
    /// own update pass.
    pub fn run_as_owner<T>(&self, owner: Option<NodeId>, f: impl FnOnce() -> T) -> T {
        let _scope = ScopeGuard::enter(self, None, owner);
        self.run_updates(f, true)
    }

    /// Run `f` under a fresh owner that starts its own handler list rather
    /// than aliasing the parent's, keeping the current tracking scope. The
    /// owner is disposed together with its parent.
    pub fn run_in_error_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        let parent = self.owner.get();
        let scope = {
            let mut arena = self.arena.borrow_mut();
            let id = arena.insert(Node::owner(parent, None));
            if let Some(p) = parent {
                if let Some(node) = arena.get_mut(p) {
                    node.owned.push(id);
                }
            }
            id
        };
        let _scope = ScopeGuard::enter(self, self.listener.get(), Some(scope));
        f()
    }

    pub fn register_cleanup(&self, cleanup: Cleanup) {
        let Some(owner) = self.owner.get() else {
            return;
        };
        let mut arena = self.arena.borrow_mut();
        if let Some(node) = arena.get_mut(owner) {
            node.cleanups.push(cleanup);
        }
    }

    /// Register an error handler on the active owner. The first handler on
    /// an owner creates the shared list and seeds it pre-order onto every
    /// live descendant that lacks one, so errors in already-running children
    /// still reach a handler added later at an ancestor.
    pub fn register_error_handler(&self, handler: ErrorHandler) {
        let Some(owner) = self.owner.get() else {
            return;
        };
        let existing = self.arena.borrow().get(owner).and_then(|n| n.handlers.clone());
        if let Some(list) = existing {
            list.borrow_mut().push(handler);
            return;
        }
        let list: HandlerList = Rc::new(RefCell::new(vec![handler]));
        let mut stack = vec![owner];
        let mut arena = self.arena.borrow_mut();
        while let Some(id) = stack.pop() {
            if let Some(node) = arena.get_mut(id) {
                if node.handlers.is_none() {
                    node.handlers = Some(list.clone());
                }
                stack.extend(node.owned.iter().copied());
            }
        }
    }

    // ------------------------------------------------------------------
    // Reads and writes
    // ------------------------------------------------------------------

    /// Read a node's value, registering it as a dependency of the active
    /// computation.
    pub fn read(&self, id: NodeId) -> Option<Value> {
        if let Some(listener) = self.listener.get() {
            self.arena.borrow_mut().connect(id, listener);
        }
        self.read_untracked(id)
    }

    pub fn read_untracked(&self, id: NodeId) -> Option<Value> {
        self.arena.borrow().get(id).and_then(|n| n.value.clone())
    }

    /// Read a memo, settling it first if it is dirty: a dirty memo re-runs
    /// synchronously; a maybe-dirty one resolves its upstream chain, which
    /// either re-runs what actually changed or collapses the memo back to
    /// clean without a recompute.
    pub fn read_memo(&self, id: NodeId) -> Option<Value> {
        let state = {
            let arena = self.arena.borrow();
            arena.get(id).and_then(|n| n.compute.as_ref()).and_then(|c| {
                if !c.sources.is_empty() && c.state != DirtyState::Clean {
                    Some(c.state)
                } else {
                    None
                }
            })
        };
        match state {
            Some(DirtyState::Dirty) => self.update_computation(id),
            Some(DirtyState::MaybeDirty) => {
                let saved = self.updates.borrow_mut().take();
                self.run_updates(|| self.look_upstream(id, None), false);
                *self.updates.borrow_mut() = saved;
            }
            _ => {}
        }
        self.read(id)
    }

    /// Write a value into a signal (or commit a memo). Equal values suppress
    /// propagation entirely; otherwise observers are marked and enqueued
    /// inside an implicit batch.
    pub fn write_signal(&self, id: NodeId, new_value: Value) {
        let (old, comparator, has_observers) = {
            let arena = self.arena.borrow();
            let Some(node) = arena.get(id) else {
                return;
            };
            (
                node.value.clone(),
                node.comparator.clone(),
                !node.observers.is_empty(),
            )
        };
        if let (Some(old), Some(eq)) = (old.as_ref(), comparator.as_ref()) {
            if eq(&**old, &*new_value) {
                return;
            }
        }
        trace!(node = id.raw(), "signal write");
        let old = {
            let mut arena = self.arena.borrow_mut();
            match arena.get_mut(id) {
                Some(node) => node.value.replace(new_value),
                None => return,
            }
        };
        drop(old);
        if has_observers {
            self.run_updates(|| self.mark_observers(id), false);
        }
    }

    pub fn observer_count(&self, id: NodeId) -> usize {
        self.arena.borrow().get(id).map_or(0, |n| n.observers.len())
    }

    // ------------------------------------------------------------------
    // Dirty marking
    // ------------------------------------------------------------------

    fn mark_observers(&self, id: NodeId) {
        let observers = self.observer_ids(id);
        for observer in observers {
            let info = {
                let arena = self.arena.borrow();
                arena
                    .get(observer)
                    .and_then(|n| n.compute.as_ref())
                    .map(|c| (c.state, c.pure, c.memo))
            };
            let Some((state, pure, memo)) = info else {
                continue;
            };
            if state == DirtyState::Clean {
                self.enqueue(observer, pure);
                if memo {
                    self.mark_downstream(observer);
                }
            }
            let mut arena = self.arena.borrow_mut();
            if let Some(c) = arena.get_mut(observer).and_then(|n| n.compute.as_mut()) {
                c.mark_dirty();
            }
        }
        self.check_update_limit();
    }

    /// Observers further downstream of a changed memo only *might* need to
    /// recompute; they become maybe-dirty and the question is settled at
    /// flush time.
    fn mark_downstream(&self, id: NodeId) {
        let observers = self.observer_ids(id);
        for observer in observers {
            let info = {
                let arena = self.arena.borrow();
                arena
                    .get(observer)
                    .and_then(|n| n.compute.as_ref())
                    .map(|c| (c.state, c.pure, c.memo))
            };
            let Some((state, pure, memo)) = info else {
                continue;
            };
            if state == DirtyState::Clean {
                {
                    let mut arena = self.arena.borrow_mut();
                    if let Some(c) = arena.get_mut(observer).and_then(|n| n.compute.as_mut()) {
                        c.mark_maybe_dirty();
                    }
                }
                self.enqueue(observer, pure);
                if memo {
                    self.mark_downstream(observer);
                }
            }
        }
    }

    fn observer_ids(&self, id: NodeId) -> Vec<NodeId> {
        let arena = self.arena.borrow();
        match arena.get(id) {
            Some(node) => node.observers.iter().map(|&(o, _)| o).collect(),
            None => Vec::new(),
        }
    }

    fn enqueue(&self, id: NodeId, pure: bool) {
        if pure {
            if let Some(queue) = self.updates.borrow_mut().as_mut() {
                queue.push(id);
            }
        } else if let Some(queue) = self.effects.borrow_mut().as_mut() {
            queue.push(id);
        }
    }

    fn check_update_limit(&self) {
        let limit = self.update_limit.get();
        let over = self
            .updates
            .borrow()
            .as_ref()
            .map_or(false, |q| q.len() > limit);
        if over {
            *self.updates.borrow_mut() = None;
            *self.effects.borrow_mut() = None;
            panic!("{}", RuntimeError::MaxUpdateDepth { limit });
        }
    }

    pub fn set_update_limit(&self, limit: usize) {
        self.update_limit.set(limit);
    }

    // ------------------------------------------------------------------
    // Flush algorithm
    // ------------------------------------------------------------------

    /// Run `f` as an update pass. Nested calls fold into the pass already in
    /// flight. `init` passes (roots, explicit owner scopes) skip the pure
    /// queue but still open and settle the effect queue.
    pub fn run_updates<T>(&self, f: impl FnOnce() -> T, init: bool) -> T {
        if self.updates.borrow().is_some() {
            return f();
        }
        self.flush_releases();
        if !init {
            *self.updates.borrow_mut() = Some(Vec::new());
        }
        let wait = if self.effects.borrow().is_some() {
            // Reentrant pass from inside effect execution: the outer call
            // owns the effect queue and will flush it.
            true
        } else {
            *self.effects.borrow_mut() = Some(Vec::new());
            false
        };
        self.clock.set(self.clock.get() + 1);
        trace!(clock = self.clock.get(), wait, "update pass");
        let result = f();
        self.complete_updates(wait);
        result
    }

    fn complete_updates(&self, wait: bool) {
        if self.updates.borrow().is_some() {
            // The queue may grow while it runs; iterate by live length.
            let mut i = 0;
            loop {
                let next = {
                    let updates = self.updates.borrow();
                    updates.as_ref().and_then(|q| q.get(i).copied())
                };
                match next {
                    Some(id) => {
                        self.run_top(id);
                        i += 1;
                    }
                    None => break,
                }
            }
            *self.updates.borrow_mut() = None;
        }
        if wait {
            return;
        }
        let effects = self.effects.borrow_mut().take();
        if let Some(effects) = effects {
            if !effects.is_empty() {
                debug!(count = effects.len(), "running effect queue");
                self.run_updates(|| self.run_effects(effects), false);
            }
        }
        let deferred: Vec<DeferredError> =
            std::mem::take(&mut *self.deferred_errors.borrow_mut());
        if !deferred.is_empty() {
            self.run_updates(
                || {
                    for d in deferred {
                        self.run_error_handlers(d.error, d.handlers, d.owner);
                    }
                },
                false,
            );
        }
    }

    fn run_effects(&self, queue: Vec<NodeId>) {
        if self.user_effects.get() {
            self.run_user_effects(queue);
        } else {
            for id in queue {
                self.run_top(id);
            }
        }
    }

    /// Two-tier split: render effects settle first so user effects observe
    /// the finished result. Order within each tier is queue order.
    fn run_user_effects(&self, mut queue: Vec<NodeId>) {
        let mut user_len = 0;
        for i in 0..queue.len() {
            let id = queue[i];
            let is_user = {
                let arena = self.arena.borrow();
                arena
                    .get(id)
                    .and_then(|n| n.compute.as_ref())
                    .map_or(false, |c| c.user)
            };
            if is_user {
                queue[user_len] = id;
                user_len += 1;
            } else {
                self.run_top(id);
            }
        }
        for &id in queue.iter().take(user_len) {
            self.run_top(id);
        }
    }

    /// Settle one queue entry: resolve maybe-dirty nodes upstream, and run
    /// dirty ones after their dirty owner-chain ancestors: a parent that
    /// re-runs disposes and recreates its children, so it must go first.
    fn run_top(&self, id: NodeId) {
        match self.node_state(id) {
            DirtyState::Clean => return,
            DirtyState::MaybeDirty => return self.look_upstream(id, None),
            DirtyState::Dirty => {}
        }

        // A dirty memo nobody observes stays dirty: the recompute happens
        // lazily on the next read instead of during the flush.
        let unobserved_memo = {
            let arena = self.arena.borrow();
            arena.get(id).map_or(false, |n| {
                n.observers.is_empty() && n.compute.as_ref().map_or(false, |c| c.memo)
            })
        };
        if unobserved_memo {
            return;
        }

        let mut ancestors = vec![id];
        {
            let arena = self.arena.borrow();
            let clock = self.clock.get();
            let mut current = arena.get(id).and_then(|n| n.parent);
            while let Some(parent) = current {
                let Some(node) = arena.get(parent) else {
                    break;
                };
                let behind = node
                    .compute
                    .as_ref()
                    .map_or(true, |c| c.updated_at.map_or(true, |t| t < clock));
                if !behind {
                    break;
                }
                if node.state() != DirtyState::Clean {
                    ancestors.push(parent);
                }
                current = node.parent;
            }
        }

        for &node in ancestors.iter().rev() {
            match self.node_state(node) {
                DirtyState::Dirty => self.update_computation(node),
                DirtyState::MaybeDirty => {
                    let saved = self.updates.borrow_mut().take();
                    self.run_updates(|| self.look_upstream(node, Some(id)), false);
                    *self.updates.borrow_mut() = saved;
                }
                DirtyState::Clean => {}
            }
        }
    }

    /// Resolve a maybe-dirty node by forcing its unresolved sources first.
    /// If no source commit re-marks this node, it stays clean: no recompute.
    /// `ignore` breaks mutual recursion with the node that started the
    /// resolution.
    fn look_upstream(&self, id: NodeId, ignore: Option<NodeId>) {
        {
            let mut arena = self.arena.borrow_mut();
            if let Some(c) = arena.get_mut(id).and_then(|n| n.compute.as_mut()) {
                c.mark_clean();
            }
        }
        let sources: Vec<NodeId> = {
            let arena = self.arena.borrow();
            match arena.get(id).and_then(|n| n.compute.as_ref()) {
                Some(c) => c.sources.iter().map(|&(s, _)| s).collect(),
                None => return,
            }
        };
        let clock = self.clock.get();
        for source in sources {
            let info = {
                let arena = self.arena.borrow();
                arena
                    .get(source)
                    .and_then(|n| n.compute.as_ref())
                    .map(|c| (c.state, c.updated_at, !c.sources.is_empty()))
            };
            // Only computations with sources of their own can be unresolved.
            let Some((state, updated_at, has_sources)) = info else {
                continue;
            };
            if !has_sources {
                continue;
            }
            match state {
                DirtyState::Dirty => {
                    if Some(source) == ignore {
                        continue;
                    }
                    if updated_at.map_or(true, |t| t < clock) {
                        self.run_top(source);
                    }
                }
                DirtyState::MaybeDirty => self.look_upstream(source, ignore),
                DirtyState::Clean => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Computation execution
    // ------------------------------------------------------------------

    /// Tear a computation down to zero edges/children/cleanups and re-run
    /// it, so it ends up with exactly the dependencies read this time.
    pub fn update_computation(&self, id: NodeId) {
        let is_computation = self
            .arena
            .borrow()
            .get(id)
            .map_or(false, |n| n.compute.is_some());
        if !is_computation {
            return;
        }
        self.clean_node(id);
        self.run_computation(id, self.clock.get());
    }

    fn run_computation(&self, id: NodeId, time: u64) {
        let (eval, prev) = {
            let arena = self.arena.borrow();
            let Some(node) = arena.get(id) else {
                return;
            };
            let Some(c) = node.compute.as_ref() else {
                return;
            };
            (c.eval.clone(), node.value.clone())
        };

        let scope = ScopeGuard::enter(self, Some(id), Some(id));
        let result = {
            let mut eval = eval.borrow_mut();
            (&mut *eval)(prev)
        };
        match result {
            Ok(new_value) => {
                drop(scope);
                self.commit(id, time, new_value);
            }
            Err(error) => {
                trace!(node = id.raw(), "computation failed");
                let owned = {
                    let mut arena = self.arena.borrow_mut();
                    match arena.get_mut(id) {
                        Some(node) => {
                            let pure = node.compute.as_ref().map_or(false, |c| c.pure);
                            if let Some(c) = node.compute.as_mut() {
                                c.updated_at = Some(time + 1);
                                if pure {
                                    // Stays dirty so a future read retries.
                                    c.mark_dirty();
                                }
                            }
                            if pure {
                                std::mem::take(&mut node.owned)
                            } else {
                                Vec::new()
                            }
                        }
                        None => Vec::new(),
                    }
                };
                for child in owned {
                    self.dispose_node(child);
                }
                // Handlers see the failing node as the active owner.
                self.handle_error(error, Some(id));
                drop(scope);
            }
        }
    }

    /// Commit a freshly computed value unless a nested pass already wrote a
    /// newer one. Memos that have run before route through the signal write
    /// path so their own observers are compared-and-marked.
    fn commit(&self, id: NodeId, time: u64, new_value: Value) {
        enum Route {
            Skip,
            Direct,
            Write,
        }
        let route = {
            let arena = self.arena.borrow();
            match arena.get(id).and_then(|n| n.compute.as_ref()) {
                Some(c) => {
                    if c.updated_at.map_or(false, |t| t > time) {
                        Route::Skip
                    } else if c.updated_at.is_some() && c.memo {
                        Route::Write
                    } else {
                        Route::Direct
                    }
                }
                None => Route::Skip,
            }
        };
        match route {
            Route::Skip => {}
            Route::Direct => {
                let old = {
                    let mut arena = self.arena.borrow_mut();
                    match arena.get_mut(id) {
                        Some(node) => {
                            let old = node.value.replace(new_value);
                            if let Some(c) = node.compute.as_mut() {
                                c.updated_at = Some(time);
                            }
                            old
                        }
                        None => None,
                    }
                };
                drop(old);
            }
            Route::Write => {
                self.write_signal(id, new_value);
                let mut arena = self.arena.borrow_mut();
                if let Some(c) = arena.get_mut(id).and_then(|n| n.compute.as_mut()) {
                    c.updated_at = Some(time);
                }
            }
        }
    }

    fn node_state(&self, id: NodeId) -> DirtyState {
        self.arena.borrow().get(id).map_or(DirtyState::Clean, |n| n.state())
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Reset a node for re-run: detach every source edge, dispose owned
    /// children, run cleanups in registration order, mark clean.
    pub fn clean_node(&self, id: NodeId) {
        self.arena.borrow_mut().detach_sources(id);
        let (owned, cleanups) = {
            let mut arena = self.arena.borrow_mut();
            match arena.get_mut(id) {
                Some(node) => (
                    std::mem::take(&mut node.owned),
                    std::mem::take(&mut node.cleanups),
                ),
                None => (Vec::new(), Vec::new()),
            }
        };
        for child in owned {
            self.dispose_node(child);
        }
        for cleanup in cleanups {
            cleanup();
        }
        let mut arena = self.arena.borrow_mut();
        if let Some(c) = arena.get_mut(id).and_then(|n| n.compute.as_mut()) {
            c.mark_clean();
        }
    }

    /// Full disposal: clean, then remove from the arena. Idempotent: every
    /// step tolerates a missing node. A pinned node (one with a live public
    /// handle) is cleaned but kept in the arena so reads through the handle
    /// still see the last value; it is removed when the handle drops.
    pub fn dispose_node(&self, id: NodeId) {
        trace!(node = id.raw(), "dispose");
        self.clean_node(id);
        let pinned = self.arena.borrow().get(id).map_or(false, |n| n.pinned);
        if pinned {
            return;
        }
        let node = self.arena.borrow_mut().remove(id);
        // Dropped outside the borrow: the node's closures may hold handles
        // whose release re-enters the arena.
        drop(node);
    }

    /// Keep `id` in the arena across owner disposal while a public handle
    /// to it is alive.
    pub fn pin(&self, id: NodeId) {
        if let Some(node) = self.arena.borrow_mut().get_mut(id) {
            node.pinned = true;
        }
    }

    fn unpin(&self, id: NodeId) {
        if let Some(node) = self.arena.borrow_mut().get_mut(id) {
            node.pinned = false;
        }
    }

    /// Release a node whose last public handle was dropped.
    fn release(&self, id: NodeId) {
        if self.arena.try_borrow_mut().is_ok() {
            self.unpin(id);
            self.dispose_node(id);
        } else {
            self.pending_release.borrow_mut().push(id);
        }
    }

    fn flush_releases(&self) {
        loop {
            let next = self.pending_release.borrow_mut().pop();
            match next {
                Some(id) => {
                    self.unpin(id);
                    self.dispose_node(id);
                }
                None => break,
            }
        }
    }

    // ------------------------------------------------------------------
    // Error propagation
    // ------------------------------------------------------------------

    /// Route an error to the nearest handler list on the owner chain, or
    /// panic if none exists anywhere. During an effect phase the invocation
    /// is deferred and runs as its own pass.
    pub fn handle_error(&self, error: EvalError, owner: Option<NodeId>) {
        let handlers =
            owner.and_then(|id| self.arena.borrow().get(id).and_then(|n| n.handlers.clone()));
        let Some(handlers) = handlers else {
            // Abandon the in-flight pass so a caller that catches the unwind
            // resumes against reset queues.
            *self.updates.borrow_mut() = None;
            *self.effects.borrow_mut() = None;
            panic!("{}", RuntimeError::Unhandled(error));
        };
        if self.effects.borrow().is_some() {
            trace!("deferring error handlers");
            self.deferred_errors.borrow_mut().push(DeferredError {
                error,
                handlers,
                owner,
            });
        } else {
            self.run_error_handlers(error, handlers, owner);
        }
    }

    /// Handlers run in registration order; a handler failure aborts the
    /// rest and propagates the new error from the owner's parent.
    fn run_error_handlers(&self, error: EvalError, handlers: HandlerList, owner: Option<NodeId>) {
        let list: Vec<ErrorHandler> = handlers.borrow().clone();
        for handler in list {
            if let Err(next) = handler(&error) {
                let parent =
                    owner.and_then(|id| self.arena.borrow().get(id).and_then(|n| n.parent));
                self.handle_error(next, parent);
                return;
            }
        }
    }

    pub fn listener(&self) -> Option<NodeId> {
        self.listener.get()
    }

    #[cfg(test)]
    fn node_count(&self) -> usize {
        self.arena.borrow().len()
    }
}

/// RAII save/restore for the active computation and owner. Restores on every
/// exit path, so a panic inside an evaluation cannot leave stale tracking
/// state behind.
pub(crate) struct ScopeGuard<'a> {
    rt: &'a Runtime,
    listener: Option<NodeId>,
    owner: Option<NodeId>,
}

impl<'a> ScopeGuard<'a> {
    pub fn enter(rt: &'a Runtime, listener: Option<NodeId>, owner: Option<NodeId>) -> Self {
        Self {
            rt,
            listener: rt.listener.replace(listener),
            owner: rt.owner.replace(owner),
        }
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.rt.listener.set(self.listener);
        self.rt.owner.set(self.owner);
    }
}

/// Shared guard embedded in `Signal`/`Memo` handles: the last clone's drop
/// releases the underlying node.
pub(crate) struct NodeGuard {
    id: NodeId,
}

impl NodeGuard {
    pub fn new(id: NodeId) -> Self {
        Self { id }
    }
}

impl Drop for NodeGuard {
    fn drop(&mut self) {
        let id = self.id;
        // The runtime may already be gone during thread teardown.
        let _ = RUNTIME.try_with(|rt| rt.release(id));
    }
}

/// Group several writes into one update pass; dependents re-run once after
/// the closure finishes. Nested batches fold into the outermost one.
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    with_runtime(|rt| rt.run_updates(f, false))
}

/// Run a closure with dependency tracking disabled: reads inside it do not
/// register edges on the active computation.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    with_runtime(|rt| {
        let _scope = ScopeGuard::enter(rt, None, rt.current_owner());
        f()
    })
}

/// Configure this thread's bound on update-queue growth within one pass.
pub fn set_update_limit(limit: usize) {
    with_runtime(|rt| rt.set_update_limit(limit));
}

/// Downcast a type-erased reactive value, panicking on a missing node or a
/// type mismatch; both indicate a handle outliving its node.
pub(crate) fn downcast_value<T: Clone + 'static>(value: Option<Value>) -> T {
    value
        .and_then(|v| v.downcast_ref::<T>().cloned())
        .expect("reactive value missing or of unexpected type")
}
