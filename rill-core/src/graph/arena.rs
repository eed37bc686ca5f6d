//! Node Arena
//!
//! The arena owns every node in the dependency graph and hands out stable
//! `NodeId` handles. The graph is cyclic at the reference level (signal and
//! observer point at each other, owners and children point at each other), so
//! edges are stored as id/slot pairs instead of pointers.
//!
//! # Edge bookkeeping
//!
//! Every dependency edge is recorded twice:
//!
//! - the reader's `sources` holds `(source, slot)` where `slot` is the
//!   reader's position in the source's observer list
//! - the source's `observers` holds `(reader, slot)` where `slot` is the
//!   source's position in the reader's source list
//!
//! Keeping both slots makes edge removal O(1): pop the last observer entry,
//! move it into the hole, and patch the moved observer's back-slot.
//!
//! Lookups are tolerant of missing ids throughout: a node released while
//! edges to it still exist leaves those entries inert (ids are never reused),
//! and they are discarded the next time the holder re-runs.

use std::collections::HashMap;

use super::node::{Node, NodeId};

/// Storage for all graph nodes, indexed by ID.
pub(crate) struct NodeArena {
    nodes: HashMap<NodeId, Node>,
    next_id: u64,
}

impl NodeArena {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            next_id: 0,
        }
    }

    /// Add a node, returning its freshly allocated id.
    pub fn insert(&mut self, node: Node) -> NodeId {
        let id = NodeId::from_raw(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Remove a node. The caller is responsible for dropping the returned
    /// node outside any arena borrow, since its closures may hold reactive
    /// handles whose release re-enters the arena.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Register `listener` as an observer of `source`, recording both slots.
    /// At most one edge exists per (source, listener) pair per run.
    pub fn connect(&mut self, source: NodeId, listener: NodeId) {
        {
            let Some(node) = self.nodes.get(&listener) else {
                return;
            };
            let Some(compute) = node.compute.as_ref() else {
                return;
            };
            if compute.sources.iter().any(|&(s, _)| s == source) {
                return;
            }
        }

        let observer_slot = match self.nodes.get(&source) {
            Some(src) => src.observers.len() as u32,
            None => return,
        };

        let source_slot = {
            let Some(node) = self.nodes.get_mut(&listener) else {
                return;
            };
            let Some(compute) = node.compute.as_mut() else {
                return;
            };
            compute.sources.push((source, observer_slot));
            (compute.sources.len() - 1) as u32
        };

        if let Some(src) = self.nodes.get_mut(&source) {
            src.observers.push((listener, source_slot));
        }
    }

    /// Tear down every source edge of `id`, leaving its source list empty.
    ///
    /// Each removal swap-pops the matching entry out of the source's observer
    /// list and patches the back-slot of whichever observer got moved into
    /// the hole.
    pub fn detach_sources(&mut self, id: NodeId) {
        let mut sources = {
            let Some(node) = self.nodes.get_mut(&id) else {
                return;
            };
            let Some(compute) = node.compute.as_mut() else {
                return;
            };
            std::mem::take(&mut compute.sources)
        };

        while let Some((source, observer_slot)) = sources.pop() {
            let (moved, moved_slot, hole) = {
                let Some(src) = self.nodes.get_mut(&source) else {
                    continue;
                };
                let Some((moved, moved_slot)) = src.observers.pop() else {
                    continue;
                };
                let hole = observer_slot as usize;
                if hole >= src.observers.len() {
                    // We popped our own entry; nothing to patch.
                    continue;
                }
                src.observers[hole] = (moved, moved_slot);
                (moved, moved_slot, observer_slot)
            };

            // The moved observer's source entry now points at the wrong slot.
            if let Some(node) = self.nodes.get_mut(&moved) {
                if let Some(compute) = node.compute.as_mut() {
                    if let Some(entry) = compute.sources.get_mut(moved_slot as usize) {
                        entry.1 = hole;
                    }
                }
            }
        }
    }
}
