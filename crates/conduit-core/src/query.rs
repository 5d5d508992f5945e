//! Read-only query API for inspecting connectivity state.
//!
//! Snapshot types are owned copies -- no references into internal engine
//! storage -- so debug overlays and domain consumers can hold them across
//! passes. They describe the state as of the last pass.

use crate::engine::Engine;
use crate::graph::DebugColor;
use crate::id::{EntityId, GraphId, GraphProtoId, NodeId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Graph snapshot
// ---------------------------------------------------------------------------

/// A read-only view of one graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub id: GraphId,
    pub proto: GraphProtoId,
    pub color: DebugColor,
    /// Members in id order.
    pub nodes: Vec<NodeId>,
    /// Entities the members physically represent (proxies resolved to their
    /// hosts), deduplicated and in id order.
    pub hosts: Vec<EntityId>,
    pub merge_pending: bool,
    pub split_pending: bool,
}

impl GraphSnapshot {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Engine {
    /// Snapshot one graph.
    pub fn snapshot_graph(&self, graph: GraphId) -> Option<GraphSnapshot> {
        let g = self.graphs.get(graph)?;
        let nodes: Vec<NodeId> = g.nodes.iter().copied().collect();
        let mut hosts: Vec<EntityId> = nodes.iter().filter_map(|&n| self.node_host(n)).collect();
        hosts.sort_unstable();
        hosts.dedup();
        Some(GraphSnapshot {
            id: graph,
            proto: g.proto,
            color: g.color,
            nodes,
            hosts,
            merge_pending: g.has_pending_merges(),
            split_pending: g.has_pending_splits(),
        })
    }

    /// Snapshot every graph, sorted by id.
    pub fn debug_overlay(&self) -> Vec<GraphSnapshot> {
        let mut ids: Vec<GraphId> = self.graphs.keys().collect();
        ids.sort_unstable();
        ids.into_iter().filter_map(|id| self.snapshot_graph(id)).collect()
    }

    /// Snapshot every graph of one prototype, sorted by id.
    pub fn snapshot_proto(&self, proto: GraphProtoId) -> Vec<GraphSnapshot> {
        self.debug_overlay()
            .into_iter()
            .filter(|snapshot| snapshot.proto == proto)
            .collect()
    }

    /// The graph snapshot containing `node`.
    pub fn snapshot_of(&self, node: NodeId) -> Option<GraphSnapshot> {
        self.graph_of(node).and_then(|graph| self.snapshot_graph(graph))
    }
}
