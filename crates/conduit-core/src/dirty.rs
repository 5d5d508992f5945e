use crate::id::{GraphId, NodeId};
use std::collections::BTreeSet;

/// Work queued for the next resolution pass.
///
/// Every set is ordered so that draining it is deterministic across runs.
/// Entries may go stale between passes (a node removed, a graph absorbed);
/// the engine skips those when draining.
#[derive(Debug, Clone, Default)]
pub struct PassQueues {
    edge_updates: BTreeSet<NodeId>,
    inits: BTreeSet<NodeId>,
    merge_graphs: BTreeSet<GraphId>,
    split_graphs: BTreeSet<GraphId>,
}

impl PassQueues {
    /// Create empty queues.
    pub fn new() -> Self {
        Self::default()
    }

    // -- Edge reconciliation --

    pub fn queue_edge_update(&mut self, node: NodeId) -> bool {
        self.edge_updates.insert(node)
    }

    pub fn cancel_edge_update(&mut self, node: NodeId) -> bool {
        self.edge_updates.remove(&node)
    }

    pub fn pop_edge_update(&mut self) -> Option<NodeId> {
        self.edge_updates.pop_first()
    }

    pub fn is_edge_update_queued(&self, node: NodeId) -> bool {
        self.edge_updates.contains(&node)
    }

    pub fn edge_update_count(&self) -> usize {
        self.edge_updates.len()
    }

    // -- Initialisation --

    pub fn queue_init(&mut self, node: NodeId) -> bool {
        self.inits.insert(node)
    }

    pub fn cancel_init(&mut self, node: NodeId) -> bool {
        self.inits.remove(&node)
    }

    pub fn pop_init(&mut self) -> Option<NodeId> {
        self.inits.pop_first()
    }

    pub fn init_count(&self) -> usize {
        self.inits.len()
    }

    // -- Graph resolution --

    pub fn queue_merge(&mut self, graph: GraphId) -> bool {
        self.merge_graphs.insert(graph)
    }

    pub fn pop_merge(&mut self) -> Option<GraphId> {
        self.merge_graphs.pop_first()
    }

    pub fn queue_split(&mut self, graph: GraphId) -> bool {
        self.split_graphs.insert(graph)
    }

    pub fn pop_split(&mut self) -> Option<GraphId> {
        self.split_graphs.pop_first()
    }

    /// Drop a destroyed graph from both resolution queues.
    pub fn forget_graph(&mut self, graph: GraphId) {
        self.merge_graphs.remove(&graph);
        self.split_graphs.remove(&graph);
    }

    /// Drop a removed node from the node queues.
    pub fn forget_node(&mut self, node: NodeId) {
        self.edge_updates.remove(&node);
        self.inits.remove(&node);
    }

    /// Returns `true` if a pass would have anything to do.
    pub fn is_dirty(&self) -> bool {
        !(self.edge_updates.is_empty()
            && self.inits.is_empty()
            && self.merge_graphs.is_empty()
            && self.split_graphs.is_empty())
    }

    pub fn merge_count(&self) -> usize {
        self.merge_graphs.len()
    }

    pub fn split_count(&self) -> usize {
        self.split_graphs.len()
    }
}
