//! Graph Nodes
//!
//! This module defines the node type that lives in the dependency graph.
//!
//! A single `Node` plays up to three roles, mirroring how the reactive
//! primitives overlap:
//!
//! - **Signal**: has a `value` and a `comparator`, tracks `observers`.
//! - **Computation**: has `compute` state (evaluation closure, dirty state,
//!   source edges, clock stamp). A computation that is itself read by other
//!   computations (a memo) additionally behaves as a signal.
//! - **Owner**: every node can own child computations and cleanups created
//!   while it ran, and carries an (aliased) error-handler list.
//!
//! The ownership tree and the dependency graph are orthogonal: a node's
//! `parent`/`owned` links say nothing about its `sources`/`observers` edges.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::reactive::error::EvalError;

/// Unique identifier for a node in the dependency graph.
///
/// Ids are allocated by the arena from a monotonically increasing counter and
/// are never reused, so an edge that outlives its node simply dangles and is
/// skipped rather than aliasing a newer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Dirty state of a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// The node's value is up-to-date.
    Clean,

    /// The node might need to recompute. Something upstream of one of its
    /// memo dependencies changed, but whether the memo's value actually
    /// changes is not known until the upstream chain resolves.
    MaybeDirty,

    /// The node definitely needs to recompute. A direct input has changed.
    Dirty,
}

/// Type-erased value stored in a signal or computation.
pub(crate) type Value = Rc<dyn Any>;

/// Equality comparator over type-erased values. Returning `true` suppresses
/// propagation at the source.
pub(crate) type Comparator = Rc<dyn Fn(&dyn Any, &dyn Any) -> bool>;

/// Evaluation closure of a computation: receives the previous value, returns
/// the next one or an error to hand to the owner chain's handlers.
pub(crate) type EvalFn = Rc<RefCell<dyn FnMut(Option<Value>) -> Result<Value, EvalError>>>;

/// Cleanup thunk registered via `on_cleanup`.
pub(crate) type Cleanup = Box<dyn FnOnce()>;

/// Error handler registered via `on_error`/`try_on_error`. A handler that
/// returns `Err` propagates that new error from the owner's parent.
pub(crate) type ErrorHandler = Rc<dyn Fn(&EvalError) -> Result<(), EvalError>>;

/// Handler list shared by reference down the owner tree: a computation aliases
/// its owner's list at creation, so handlers added later at an ancestor are
/// seen by descendants that share the alias.
pub(crate) type HandlerList = Rc<RefCell<Vec<ErrorHandler>>>;

/// Edge list entry: the peer node plus the slot this node occupies in the
/// peer's parallel edge list. Removal is an O(1) swap-pop that patches the
/// moved entry's back-slot.
pub(crate) type EdgeList = SmallVec<[(NodeId, u32); 4]>;

/// Computation-only state.
pub(crate) struct ComputeState {
    /// The evaluation closure.
    pub eval: EvalFn,

    /// Current dirty state.
    pub state: DirtyState,

    /// Pure computations (memos) go to the update queue and are pulled
    /// lazily; impure ones (effects) go to the effect queue.
    pub pure: bool,

    /// User effects run in the second effect tier, after render effects.
    pub user: bool,

    /// Whether this computation is readable (a memo). Commits of a memo's
    /// value route through the signal write path so its own observers are
    /// compared-and-marked.
    pub memo: bool,

    /// Sources read during the last run: (source, slot of this node in the
    /// source's observer list).
    pub sources: EdgeList,

    /// Logical-clock stamp of the last commit. `None` means the computation
    /// has never committed a value.
    pub updated_at: Option<u64>,
}

impl ComputeState {
    /// Mark maybe-dirty, only strengthening from `Clean`.
    pub fn mark_maybe_dirty(&mut self) {
        if self.state == DirtyState::Clean {
            self.state = DirtyState::MaybeDirty;
        }
    }

    /// Mark definitely dirty (overrides `MaybeDirty`).
    pub fn mark_dirty(&mut self) {
        self.state = DirtyState::Dirty;
    }

    pub fn mark_clean(&mut self) {
        self.state = DirtyState::Clean;
    }
}

/// A node in the dependency graph.
pub(crate) struct Node {
    /// Current value (signals and committed computations).
    pub value: Option<Value>,

    /// Equality comparator (signals and memos).
    pub comparator: Option<Comparator>,

    /// Computations reading this node: (observer, slot of this node in the
    /// observer's source list).
    pub observers: EdgeList,

    /// Present iff this node is a computation.
    pub compute: Option<ComputeState>,

    /// Owning node, if any. Roots record their creation context here for
    /// error-handler lookup without being entered into its `owned`.
    pub parent: Option<NodeId>,

    /// Child computations created while this node last ran.
    pub owned: Vec<NodeId>,

    /// Cleanup thunks, run in registration order on teardown.
    pub cleanups: Vec<Cleanup>,

    /// Error handlers, aliased from the owner at creation.
    pub handlers: Option<HandlerList>,

    /// Set while a public handle (`Signal`, `Memo`) to this node is alive.
    /// A pinned node survives owner disposal with its last value intact and
    /// leaves the arena only when the last handle drops.
    pub pinned: bool,
}

impl Node {
    /// A signal node: value plus comparator, no computation.
    pub fn signal(value: Value, comparator: Comparator) -> Self {
        Self {
            value: Some(value),
            comparator: Some(comparator),
            observers: EdgeList::new(),
            compute: None,
            parent: None,
            owned: Vec::new(),
            cleanups: Vec::new(),
            handlers: None,
            pinned: false,
        }
    }

    /// A computation node. `parent` and `handlers` come from the active owner.
    #[allow(clippy::too_many_arguments)]
    pub fn computation(
        eval: EvalFn,
        init: Option<Value>,
        comparator: Option<Comparator>,
        state: DirtyState,
        pure: bool,
        user: bool,
        memo: bool,
        parent: Option<NodeId>,
        handlers: Option<HandlerList>,
    ) -> Self {
        Self {
            value: init,
            comparator,
            observers: EdgeList::new(),
            compute: Some(ComputeState {
                eval,
                state,
                pure,
                user,
                memo,
                sources: EdgeList::new(),
                updated_at: None,
            }),
            parent,
            owned: Vec::new(),
            cleanups: Vec::new(),
            handlers,
            pinned: false,
        }
    }

    /// A plain owner node (root scope).
    pub fn owner(parent: Option<NodeId>, handlers: Option<HandlerList>) -> Self {
        Self {
            value: None,
            comparator: None,
            observers: EdgeList::new(),
            compute: None,
            parent,
            owned: Vec::new(),
            cleanups: Vec::new(),
            handlers,
            pinned: false,
        }
    }

    /// Dirty state, `Clean` for non-computations.
    pub fn state(&self) -> DirtyState {
        self.compute.as_ref().map_or(DirtyState::Clean, |c| c.state)
    }
}
