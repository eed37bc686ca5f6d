//! Dependency Graph
//!
//! This module implements the storage layer for the reactive system: the
//! nodes of the dependency graph and the arena that owns them.
//!
//! # Overview
//!
//! The graph is a DAG over three kinds of participants:
//!
//! - Signals are sources: they have observers but no dependencies.
//! - Memos are both: they observe their sources and are observed in turn.
//! - Effects are sinks: they observe but are never read.
//!
//! # Design Decisions
//!
//! 1. Nodes are stored in a single arena keyed by a monotonically increasing
//!    id rather than reference-counted objects. The graph carries cycles at
//!    the reference level (signal/observer, owner/child back-references), so
//!    id-based edges avoid both `Rc` cycles and unsafe pointer juggling.
//!
//! 2. Edges are id/slot pairs kept in parallel on both endpoints, making
//!    removal an O(1) swap-pop rather than a scan.
//!
//! 3. Ids are never reused, so a dangling edge can be detected and skipped.
//!
//! Scheduling (queues, flush order, batching) lives in
//! [`crate::reactive::runtime`], which drives this storage.

mod arena;
mod node;

pub use node::{DirtyState, NodeId};

pub(crate) use arena::NodeArena;
pub(crate) use node::{Cleanup, Comparator, ErrorHandler, EvalFn, HandlerList, Node, Value};
