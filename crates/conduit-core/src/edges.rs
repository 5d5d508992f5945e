//! Edge maintenance: manual edges, reconciliation against the adjacency
//! provider, and the bookkeeping every half-edge change triggers.
//!
//! Both halves of an edge are always written together; the half stored on
//! `b` carries `flags.invert()` of the half stored on `a`.

use crate::adjacency::AdjacencyProvider;
use crate::engine::{Engine, EngineError};
use crate::event::GraphEvent;
use crate::flags::{EdgeFlags, NodeFlags};
use crate::id::NodeId;
use crate::node::Edge;
use std::collections::BTreeMap;
use tracing::{trace, warn};

impl Engine {
    // -----------------------------------------------------------------------
    // Manual edges
    // -----------------------------------------------------------------------

    /// Add an externally managed edge from `a` to `b`, overriding any
    /// reconciled edge already there.
    ///
    /// Returns `Ok(false)` if a manual edge already exists.
    pub fn try_add_edge(&mut self, a: NodeId, b: NodeId, flags: EdgeFlags) -> Result<bool, EngineError> {
        self.check_pair(a, b)?;
        let flags = flags & !EdgeFlags::SOURCE_MASK;
        match self.edge_flags(a, b) {
            Some(old) if old.contains(EdgeFlags::MANUAL) => Ok(false),
            Some(old) => {
                self.relink(a, b, flags | EdgeFlags::MANUAL | (old & EdgeFlags::AUTO));
                Ok(true)
            }
            None => {
                self.link(a, b, flags | EdgeFlags::MANUAL);
                Ok(true)
            }
        }
    }

    /// Remove a manual edge. If reconciliation also wants the edge it is
    /// relaxed back to a reconciled edge and `a` is queued for an update.
    ///
    /// Returns `Ok(false)` if there is no manual edge between the nodes.
    pub fn try_remove_edge(&mut self, a: NodeId, b: NodeId) -> Result<bool, EngineError> {
        self.check_pair(a, b)?;
        let Some(old) = self.edge_flags(a, b) else {
            return Ok(false);
        };
        if !old.contains(EdgeFlags::MANUAL) {
            return Ok(false);
        }

        if old.contains(EdgeFlags::AUTO) {
            let mut relaxed = old;
            relaxed.remove(EdgeFlags::MANUAL);
            self.relink(a, b, relaxed);
            self.queue_edge_update(a)?;
        } else {
            self.unlink(a, b);
        }
        Ok(true)
    }

    /// Create a manual edge or re-flag an existing edge as manual with
    /// `flags`.
    pub fn try_set_edge(&mut self, a: NodeId, b: NodeId, flags: EdgeFlags) -> Result<bool, EngineError> {
        self.check_pair(a, b)?;
        let flags = flags & !EdgeFlags::SOURCE_MASK;
        let Some(old) = self.edge_flags(a, b) else {
            self.link(a, b, flags | EdgeFlags::MANUAL);
            return Ok(true);
        };

        let unchanged = ((flags ^ old) & !EdgeFlags::SOURCE_MASK).is_empty();
        if old.contains(EdgeFlags::MANUAL) && unchanged {
            return Ok(true);
        }
        self.relink(a, b, flags | EdgeFlags::MANUAL | (old & EdgeFlags::SOURCE_MASK));
        Ok(true)
    }

    pub fn has_edge(&self, a: NodeId, b: NodeId) -> bool {
        self.nodes.get(a).is_some_and(|n| n.has_edge(b))
    }

    /// Flags of the edge from `a`'s point of view.
    pub fn edge_flags(&self, a: NodeId, b: NodeId) -> Option<EdgeFlags> {
        self.nodes.get(a).and_then(|n| n.edge_flags(b))
    }

    fn check_pair(&self, a: NodeId, b: NodeId) -> Result<(), EngineError> {
        for node in [a, b] {
            if !self.nodes.contains_key(node) {
                return Err(EngineError::UnknownNode(node));
            }
        }
        if a == b {
            return Err(EngineError::SelfEdge(a));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    /// Bring `node`'s reconciled edges in line with what the provider wants.
    ///
    /// An edge exists while either endpoint wants it. Manual edges are never
    /// removed or re-flagged here; only their `AUTO` bit follows the
    /// provider. Edges to nodes that no longer exist are pruned.
    pub(crate) fn reconcile_edges<P>(&mut self, node: NodeId, provider: &P)
    where
        P: AdjacencyProvider + ?Sized,
    {
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        n.flags.remove(NodeFlags::EDGES_DIRTY);
        self.queues.cancel_edge_update(node);

        let mut requested = Vec::new();
        provider.wanted_edges(self, node, &mut requested);

        let mut wanted: BTreeMap<NodeId, EdgeFlags> = BTreeMap::new();
        for (target, flags) in requested {
            if target == node {
                warn!(?node, "adjacency provider asked for a self edge");
                continue;
            }
            if !self.nodes.contains_key(target) {
                warn!(?node, ?target, "adjacency provider asked for an edge to a missing node");
                continue;
            }
            *wanted.entry(target).or_default() |= flags & EdgeFlags::USER_MASK;
        }

        let existing: Vec<Edge> = self
            .nodes
            .get(node)
            .map(|n| n.edges.clone())
            .unwrap_or_default();
        for edge in existing {
            let target = edge.target;
            if !self.nodes.contains_key(target) {
                warn!(?node, ?target, "pruning edge to removed node");
                self.unlink(node, target);
                continue;
            }
            let wanted_out = wanted.remove(&target);
            let wanted_in = provider.check_edge(self, target, node);
            match reconciled_flags(edge.flags, wanted_out, wanted_in) {
                Some(flags) => self.relink(node, target, flags),
                None => {
                    self.unlink(node, target);
                }
            }
        }

        for (target, flags) in wanted {
            let wanted_in = provider.check_edge(self, target, node);
            if let Some(flags) = reconciled_flags(EdgeFlags::NONE, Some(flags), wanted_in) {
                self.link(node, target, flags);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internal: paired half-edge writes
    // -----------------------------------------------------------------------

    /// Add both halves of a new edge. `flags` is from `a`'s point of view.
    pub(crate) fn link(&mut self, a: NodeId, b: NodeId, flags: EdgeFlags) {
        if !self.nodes.contains_key(b) {
            return;
        }
        let Some(na) = self.nodes.get_mut(a) else {
            return;
        };
        debug_assert!(a != b, "node {a:?} attempted to form an edge with itself");
        na.push_half_edge(b, flags);
        self.on_half_edge_changed(a, b, flags, EdgeFlags::NULL_FLAGS);

        if let Some(nb) = self.nodes.get_mut(b) {
            nb.push_half_edge(a, flags.invert());
            self.on_half_edge_changed(b, a, flags.invert(), EdgeFlags::NULL_FLAGS);
        }

        let pass = self.event_pass();
        self.emit(GraphEvent::EdgeAdded { from: a, to: b, flags, pass });
    }

    /// Remove both halves of the edge between `a` and `b`. Tolerates a
    /// missing far half (stale target).
    pub(crate) fn unlink(&mut self, a: NodeId, b: NodeId) -> Option<EdgeFlags> {
        let na = self.nodes.get_mut(a)?;
        let idx = na.edge_index(b)?;
        let old = na.take_half_edge(idx).flags;
        self.on_half_edge_changed(a, b, EdgeFlags::NULL_FLAGS, old);

        if let Some(nb) = self.nodes.get_mut(b)
            && let Some(back) = nb.edge_index(a)
        {
            let back_flags = nb.take_half_edge(back).flags;
            self.on_half_edge_changed(b, a, EdgeFlags::NULL_FLAGS, back_flags);
        }

        let pass = self.event_pass();
        self.emit(GraphEvent::EdgeRemoved { from: a, to: b, flags: old, pass });
        Some(old)
    }

    /// Re-flag both halves of an existing edge. `new` is from `a`'s point of
    /// view.
    pub(crate) fn relink(&mut self, a: NodeId, b: NodeId, new: EdgeFlags) {
        let Some(na) = self.nodes.get_mut(a) else {
            return;
        };
        let Some(idx) = na.edge_index(b) else {
            return;
        };
        let old = na.edges[idx].flags;
        if old == new {
            return;
        }
        na.set_half_edge(idx, new);
        self.on_half_edge_changed(a, b, new, old);

        if let Some(nb) = self.nodes.get_mut(b)
            && let Some(back) = nb.edge_index(a)
        {
            nb.set_half_edge(back, new.invert());
            self.on_half_edge_changed(b, a, new.invert(), old.invert());
        }

        let pass = self.event_pass();
        self.emit(GraphEvent::EdgeChanged { from: a, to: b, new, old, pass });
    }

    /// Bookkeeping for one half edge `from -> to` whose flags went from `old`
    /// to `new`. An absent half reads as [`EdgeFlags::NULL_FLAGS`].
    fn on_half_edge_changed(&mut self, from: NodeId, to: NodeId, new: EdgeFlags, old: EdgeFlags) {
        if !(new ^ old).intersects(EdgeFlags::NO_MERGE) {
            return;
        }

        let (to_graph, to_proto) = match self.nodes.get(to) {
            Some(n) => (n.graph, Some(n.graph_proto)),
            None => (None, None),
        };
        let Some(f) = self.nodes.get_mut(from) else {
            return;
        };
        let from_graph = f.graph;

        if new.contains(EdgeFlags::NO_MERGE) {
            // Lost a mergeable edge.
            f.num_mergeable_edges = f.num_mergeable_edges.saturating_sub(1);
            if f.num_mergeable_edges == 0 {
                self.clear_merge(from);
            }
            if from_graph.is_some() && to_graph == from_graph {
                self.mark_split(from);
            }
            return;
        }

        // Gained a mergeable edge.
        f.num_mergeable_edges += 1;
        let only_edge = f.num_mergeable_edges == 1;
        let from_proto = f.graph_proto;
        let (Some(from_graph), Some(to_graph)) = (from_graph, to_graph) else {
            return;
        };
        if from_graph == to_graph || to_proto != Some(from_proto) {
            return;
        }

        if only_edge {
            // Nothing else holds `from` in its graph; move it without a merge.
            trace!(node = ?from, from = ?from_graph, into = ?to_graph, "node joins neighbour graph");
            self.clear_split(from);
            self.remove_from_graph(from);
            self.add_to_graph(from, to_graph);
        } else {
            self.mark_merge(from);
        }
    }
}

/// Flags a reconciled edge should carry given the old flags and what each
/// endpoint wants. `None` means the edge should not exist.
fn reconciled_flags(
    old: EdgeFlags,
    wanted_out: Option<EdgeFlags>,
    wanted_in: Option<EdgeFlags>,
) -> Option<EdgeFlags> {
    let mut direction = EdgeFlags::NONE;
    let mut user = EdgeFlags::NONE;
    if let Some(flags) = wanted_out {
        direction |= EdgeFlags::OUT;
        user |= flags & EdgeFlags::USER_MASK;
    }
    if let Some(flags) = wanted_in {
        direction |= EdgeFlags::IN;
        user |= flags & EdgeFlags::USER_MASK;
    }

    if old.contains(EdgeFlags::MANUAL) {
        let mut flags = old;
        if direction.is_empty() {
            flags.remove(EdgeFlags::AUTO);
        } else {
            flags.insert(EdgeFlags::AUTO);
        }
        return Some(flags);
    }

    if direction.is_empty() {
        None
    } else {
        Some(direction | user | EdgeFlags::AUTO)
    }
}
