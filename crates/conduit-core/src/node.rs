use crate::flags::{EdgeFlags, NodeFlags};
use crate::id::*;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// One half of an undirected association between two nodes. Each endpoint
/// stores its own half; the two halves always carry mirrored flags
/// (`a.flags == b.flags.invert()`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// The node at the other end.
    pub target: NodeId,
    pub flags: EdgeFlags,
}

impl Edge {
    pub fn new(target: NodeId, flags: EdgeFlags) -> Self {
        Self { target, flags }
    }

    pub fn is_mergeable(&self) -> bool {
        self.flags.is_mergeable()
    }
}

// ---------------------------------------------------------------------------
// GraphNode
// ---------------------------------------------------------------------------

/// Per-participant connectivity state.
///
/// A node belongs to at most one [`NodeGraph`](crate::graph::NodeGraph) and
/// only ever to graphs of its own `graph_proto`. `graph` is `None` before the
/// first resolution pass reaches it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// The entity this node is attached to.
    pub owner: EntityId,
    /// The node prototype it was created from.
    pub node_proto: NodeProtoId,
    /// The graph prototype this node may join.
    pub graph_proto: GraphProtoId,
    /// Owning graph, if initialised.
    pub graph: Option<GraphId>,
    pub flags: NodeFlags,
    /// Half edges stored by this node. Small; searched linearly.
    pub edges: Vec<Edge>,
    /// Cached count of edges without `NO_MERGE`.
    pub num_mergeable_edges: u32,
    /// Stamp of the traversal that last visited this node.
    pub last_update: Option<UpdateIter>,
}

impl GraphNode {
    pub fn new(owner: EntityId, node_proto: NodeProtoId, graph_proto: GraphProtoId) -> Self {
        Self {
            owner,
            node_proto,
            graph_proto,
            graph: None,
            flags: NodeFlags::NONE,
            edges: Vec::new(),
            num_mergeable_edges: 0,
            last_update: None,
        }
    }

    /// Index into `edges` of the half edge pointing at `target`.
    pub fn edge_index(&self, target: NodeId) -> Option<usize> {
        self.edges.iter().position(|e| e.target == target)
    }

    /// Flags of the half edge pointing at `target`, if any.
    pub fn edge_flags(&self, target: NodeId) -> Option<EdgeFlags> {
        self.edge_index(target).map(|i| self.edges[i].flags)
    }

    pub fn has_edge(&self, target: NodeId) -> bool {
        self.edge_index(target).is_some()
    }

    /// Targets of every mergeable edge.
    pub fn mergeable_targets(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.edges
            .iter()
            .filter(|e| e.is_mergeable())
            .map(|e| e.target)
    }

    /// Recount mergeable edges from scratch. Used by validation to check the
    /// cached `num_mergeable_edges`.
    pub fn count_mergeable_edges(&self) -> u32 {
        self.edges.iter().filter(|e| e.is_mergeable()).count() as u32
    }

    /// Whether the traversal stamped `iter` already visited this node.
    pub fn visited_in(&self, iter: UpdateIter) -> bool {
        self.last_update.is_some_and(|last| last >= iter)
    }

    pub fn is_initialized(&self) -> bool {
        self.graph.is_some()
    }

    // -- Half-edge storage (both halves are maintained by the engine) --

    pub(crate) fn push_half_edge(&mut self, target: NodeId, flags: EdgeFlags) {
        self.edges.push(Edge::new(target, flags));
    }

    /// Swap-remove the half edge at `idx`, returning it.
    pub(crate) fn take_half_edge(&mut self, idx: usize) -> Edge {
        self.edges.swap_remove(idx)
    }

    pub(crate) fn set_half_edge(&mut self, idx: usize, flags: EdgeFlags) {
        self.edges[idx].flags = flags;
    }
}
