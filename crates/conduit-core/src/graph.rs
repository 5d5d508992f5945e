use crate::id::*;
use crate::sim::StateHash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Debug color
// ---------------------------------------------------------------------------

/// Overlay color of a graph. Diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DebugColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl DebugColor {
    pub const WHITE: Self = Self::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Deterministic color for the `serial`-th graph ever created, tinted
    /// towards `base`.
    pub fn for_serial(serial: u64, base: DebugColor) -> Self {
        let mut hash = StateHash::new();
        hash.write_u64(serial);
        let bits = hash.finish().to_le_bytes();
        let mix = |channel: u8, noise: u8| ((channel as u16 + noise as u16) / 2) as u8;
        Self {
            r: mix(base.r, bits[0]),
            g: mix(base.g, bits[1]),
            b: mix(base.b, bits[2]),
        }
    }
}

impl Default for DebugColor {
    fn default() -> Self {
        Self::WHITE
    }
}

// ---------------------------------------------------------------------------
// NodeGraph
// ---------------------------------------------------------------------------

/// One maximal connected component (under mergeable edges) of nodes sharing
/// a graph prototype.
///
/// A passive aggregate: the engine keeps `nodes` equal to the transitive
/// closure of any member. `merge_nodes` and `split_nodes` are the members
/// awaiting resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeGraph {
    pub proto: GraphProtoId,
    /// Creation order of this graph; feeds the debug color and tie-breaks.
    pub serial: u64,
    pub color: DebugColor,
    pub nodes: BTreeSet<NodeId>,
    /// Members that may touch a different graph of this prototype.
    pub merge_nodes: BTreeSet<NodeId>,
    /// Members that may have lost connectivity inside this graph.
    pub split_nodes: BTreeSet<NodeId>,
    /// Stamp of the merge traversal that last visited this graph.
    pub last_update: Option<UpdateIter>,
}

impl NodeGraph {
    /// An empty graph. The engine assigns its id when inserting it.
    pub fn empty(proto: GraphProtoId, serial: u64, color: DebugColor) -> Self {
        Self {
            proto,
            serial,
            color,
            nodes: BTreeSet::new(),
            merge_nodes: BTreeSet::new(),
            split_nodes: BTreeSet::new(),
            last_update: None,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    pub fn has_pending_merges(&self) -> bool {
        !self.merge_nodes.is_empty()
    }

    pub fn has_pending_splits(&self) -> bool {
        !self.split_nodes.is_empty()
    }

    /// Whether the merge traversal stamped `iter` already visited this graph.
    pub fn visited_in(&self, iter: UpdateIter) -> bool {
        self.last_update.is_some_and(|last| last >= iter)
    }

    /// Lowest member id; the deterministic tie-break between equal graphs.
    pub fn min_node(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn make_node_ids(count: usize) -> Vec<NodeId> {
        let mut sm = SlotMap::<NodeId, ()>::with_key();
        (0..count).map(|_| sm.insert(())).collect()
    }

    #[test]
    fn empty_graph_has_no_members() {
        let graph = NodeGraph::empty(GraphProtoId(2), 0, DebugColor::WHITE);
        assert!(graph.is_empty());
        assert_eq!(graph.len(), 0);
        assert_eq!(graph.min_node(), None);
        assert!(!graph.has_pending_merges());
        assert!(!graph.has_pending_splits());
    }

    #[test]
    fn min_node_is_lowest_id() {
        let ids = make_node_ids(3);
        let mut graph = NodeGraph::empty(GraphProtoId(0), 0, DebugColor::WHITE);
        graph.nodes.insert(ids[2]);
        graph.nodes.insert(ids[1]);
        assert_eq!(graph.min_node(), Some(ids[1]));
        assert!(graph.contains(ids[2]));
        assert!(!graph.contains(ids[0]));
    }

    #[test]
    fn colors_are_deterministic_per_serial() {
        let base = DebugColor::new(200, 40, 40);
        assert_eq!(DebugColor::for_serial(7, base), DebugColor::for_serial(7, base));
        assert_ne!(DebugColor::for_serial(7, base), DebugColor::for_serial(8, base));
    }
}
