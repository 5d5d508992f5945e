//! Invariant checks and self-healing.
//!
//! [`check`] walks the whole engine and reports every broken invariant. It
//! is linear in nodes plus edges, so the engine only runs it after a pass
//! when [`EngineConfig::validate_after_pass`](crate::config::EngineConfig)
//! is set. [`Engine::heal`] repairs what it can by pushing the nodes involved
//! back through initialisation and reconciliation.

use crate::engine::Engine;
use crate::flags::NodeFlags;
use crate::id::{GraphId, NodeId};
use std::collections::BTreeSet;
use tracing::warn;

// ---------------------------------------------------------------------------
// Violations
// ---------------------------------------------------------------------------

/// One broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("node {node:?} points at missing graph {graph:?}")]
    MissingGraph { node: NodeId, graph: GraphId },
    #[error("node {node:?} points at graph {graph:?} which does not list it")]
    NotListed { node: NodeId, graph: GraphId },
    #[error("graph {graph:?} lists node {node:?} which does not belong to it")]
    StrayMember { graph: GraphId, node: NodeId },
    #[error("node {node:?} sits in graph {graph:?} of another prototype")]
    ProtoMismatch { node: NodeId, graph: GraphId },
    #[error("graph {graph:?} lists candidate {node:?} that is not a flagged member")]
    StaleCandidate { graph: GraphId, node: NodeId },
    #[error("edge {from:?} -> {to:?} has no matching mirror half")]
    AsymmetricEdge { from: NodeId, to: NodeId },
    #[error("node {node:?} caches {cached} mergeable edges but has {actual}")]
    MergeableCount { node: NodeId, cached: u32, actual: u32 },
    #[error("graph {0:?} is empty")]
    EmptyGraph(GraphId),
    #[error("graph {graph:?} has {reachable} of {total} members reachable from its first node")]
    Disconnected { graph: GraphId, reachable: usize, total: usize },
    #[error("mergeable edge {from:?} -> {to:?} crosses graphs")]
    Unmerged { from: NodeId, to: NodeId },
}

// ---------------------------------------------------------------------------
// Check
// ---------------------------------------------------------------------------

/// Report every broken invariant.
///
/// Connectivity is only checked for graphs with no pending split, and
/// crossing edges only between nodes with no pending merge: those are
/// legitimately inconsistent until the next pass.
pub fn check(engine: &Engine) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for (id, node) in engine.nodes() {
        if let Some(graph) = node.graph {
            match engine.graph(graph) {
                None => violations.push(InvariantViolation::MissingGraph { node: id, graph }),
                Some(g) => {
                    if !g.contains(id) {
                        violations.push(InvariantViolation::NotListed { node: id, graph });
                    }
                    if g.proto != node.graph_proto {
                        violations.push(InvariantViolation::ProtoMismatch { node: id, graph });
                    }
                }
            }
        }

        let actual = node.count_mergeable_edges();
        if actual != node.num_mergeable_edges {
            violations.push(InvariantViolation::MergeableCount {
                node: id,
                cached: node.num_mergeable_edges,
                actual,
            });
        }

        for edge in &node.edges {
            let mirrored = engine
                .node(edge.target)
                .and_then(|t| t.edge_flags(id))
                .is_some_and(|back| back == edge.flags.invert());
            if !mirrored {
                violations.push(InvariantViolation::AsymmetricEdge { from: id, to: edge.target });
                continue;
            }

            let Some(target) = engine.node(edge.target) else {
                continue;
            };
            let pending = (node.flags | target.flags).contains(NodeFlags::MERGE);
            if edge.is_mergeable()
                && !pending
                && node.graph_proto == target.graph_proto
                && node.graph.is_some()
                && target.graph.is_some()
                && node.graph != target.graph
            {
                violations.push(InvariantViolation::Unmerged { from: id, to: edge.target });
            }
        }
    }

    for (id, graph) in engine.graphs() {
        if graph.is_empty() {
            violations.push(InvariantViolation::EmptyGraph(id));
            continue;
        }
        for &node in &graph.nodes {
            if engine.node(node).and_then(|n| n.graph) != Some(id) {
                violations.push(InvariantViolation::StrayMember { graph: id, node });
            }
        }
        for (set, flag) in [
            (&graph.merge_nodes, NodeFlags::MERGE),
            (&graph.split_nodes, NodeFlags::SPLIT),
        ] {
            for &node in set {
                let flagged = engine.node(node).is_some_and(|n| n.flags.contains(flag));
                if !graph.contains(node) || !flagged {
                    violations.push(InvariantViolation::StaleCandidate { graph: id, node });
                }
            }
        }

        if graph.has_pending_splits() {
            continue;
        }
        let reachable = reachable_within(engine, id);
        if reachable != graph.len() {
            violations.push(InvariantViolation::Disconnected {
                graph: id,
                reachable,
                total: graph.len(),
            });
        }
    }

    violations
}

/// Members of `graph` reachable over mergeable edges from its lowest member.
fn reachable_within(engine: &Engine, graph: GraphId) -> usize {
    let Some(start) = engine.graph(graph).and_then(|g| g.min_node()) else {
        return 0;
    };
    let mut seen = BTreeSet::from([start]);
    let mut frontier = vec![start];
    while let Some(current) = frontier.pop() {
        let Some(node) = engine.node(current) else {
            continue;
        };
        for target in node.mergeable_targets() {
            if engine.graph_of(target) == Some(graph) && seen.insert(target) {
                frontier.push(target);
            }
        }
    }
    seen.len()
}

// ---------------------------------------------------------------------------
// Heal
// ---------------------------------------------------------------------------

impl Engine {
    /// Repair the given violations. Membership problems send the node back
    /// through initialisation and edge reconciliation; connectivity problems
    /// re-queue the merge or split that should have happened. Returns the
    /// number of repairs made.
    pub fn heal(&mut self, violations: &[InvariantViolation]) -> usize {
        let mut repairs = 0;
        for violation in violations {
            warn!(%violation, "self-healing");
            match *violation {
                InvariantViolation::MissingGraph { node, .. }
                | InvariantViolation::NotListed { node, .. }
                | InvariantViolation::StrayMember { node, .. }
                | InvariantViolation::ProtoMismatch { node, .. } => {
                    self.reinitialize(node);
                }
                InvariantViolation::StaleCandidate { graph, node } => {
                    if let Some(g) = self.graphs.get_mut(graph) {
                        g.merge_nodes.remove(&node);
                        g.split_nodes.remove(&node);
                    }
                }
                InvariantViolation::AsymmetricEdge { from, to } => {
                    for node in [from, to] {
                        if self.nodes.contains_key(node) {
                            let _ = self.queue_edge_update(node);
                        }
                    }
                }
                InvariantViolation::MergeableCount { node, actual, .. } => {
                    if let Some(n) = self.nodes.get_mut(node) {
                        n.num_mergeable_edges = actual;
                    }
                }
                InvariantViolation::EmptyGraph(graph) => self.destroy_graph(graph),
                InvariantViolation::Disconnected { graph, .. } => {
                    if let Some(first) = self.graphs.get(graph).and_then(|g| g.min_node()) {
                        self.mark_split(first);
                    }
                }
                InvariantViolation::Unmerged { from, .. } => self.mark_merge(from),
            }
            repairs += 1;
        }
        repairs
    }

    /// Detach `node` from every graph that claims it and queue it for
    /// initialisation and edge reconciliation. Graphs it leaves behind are
    /// re-checked for splits.
    fn reinitialize(&mut self, node: NodeId) {
        let claimed: Vec<GraphId> = self
            .graphs
            .iter()
            .filter(|(_, g)| g.contains(node))
            .map(|(id, _)| id)
            .collect();
        for graph in claimed {
            let Some(g) = self.graphs.get_mut(graph) else {
                continue;
            };
            g.nodes.remove(&node);
            g.merge_nodes.remove(&node);
            g.split_nodes.remove(&node);
            match g.min_node() {
                Some(first) => self.mark_split(first),
                None => self.destroy_graph(graph),
            }
        }

        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        n.graph = None;
        n.flags.remove(NodeFlags::MERGE | NodeFlags::SPLIT);
        n.flags.insert(NodeFlags::INIT | NodeFlags::EDGES_DIRTY);
        self.queues.queue_init(node);
        self.queues.queue_edge_update(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::EdgeFlags;
    use crate::test_utils::*;

    #[test]
    fn resolved_engine_is_clean() {
        let mut engine = test_engine();
        let mut links = LinkTable::new();
        let pipe = pipe_proto(&engine);
        spawn_chain(&mut engine, &mut links, pipe, 4);
        engine.update(&links);
        assert!(check(&engine).is_empty());
    }

    #[test]
    fn detects_asymmetric_edge() {
        let mut engine = test_engine();
        let pipe = pipe_proto(&engine);
        let a = engine.spawn_node(pipe).unwrap();
        let b = engine.spawn_node(pipe).unwrap();
        engine.try_add_edge(a, b, EdgeFlags::NONE).unwrap();
        let idx = engine.nodes[b].edge_index(a).unwrap();
        engine.nodes[b].edges[idx].flags = EdgeFlags::NO_MERGE;

        let violations = check(&engine);
        assert!(violations.contains(&InvariantViolation::AsymmetricEdge { from: a, to: b }));
    }

    #[test]
    fn detects_and_heals_membership_mismatch() {
        let mut engine = test_engine();
        let mut links = LinkTable::new();
        let pipe = pipe_proto(&engine);
        let nodes = spawn_chain(&mut engine, &mut links, pipe, 3);
        engine.update(&links);
        let graph = engine.graph_of(nodes[2]).unwrap();

        engine.graphs[graph].nodes.remove(&nodes[2]);
        let violations = check(&engine);
        assert!(violations.contains(&InvariantViolation::NotListed { node: nodes[2], graph }));

        assert!(engine.heal(&violations) > 0);
        engine.update(&links);
        assert!(check(&engine).is_empty());
        assert!(engine.are_connected(nodes[0], nodes[2]));
    }

    #[test]
    fn pass_heals_membership_mismatch_when_enabled() {
        let mut engine = healing_test_engine();
        let mut links = LinkTable::new();
        let pipe = pipe_proto(&engine);
        let nodes = spawn_chain(&mut engine, &mut links, pipe, 3);
        engine.update(&links);
        let graph = engine.graph_of(nodes[2]).unwrap();

        engine.graphs[graph].nodes.remove(&nodes[2]);
        engine.update(&links);
        assert!(engine.has_pending_work());
        engine.update(&links);

        assert_invariants(&engine);
        assert!(engine.are_connected(nodes[0], nodes[2]));
    }

    #[test]
    fn pass_leaves_violations_when_healing_disabled() {
        let mut engine = test_engine();
        let mut links = LinkTable::new();
        let pipe = pipe_proto(&engine);
        let nodes = spawn_chain(&mut engine, &mut links, pipe, 3);
        engine.update(&links);
        let graph = engine.graph_of(nodes[2]).unwrap();

        engine.graphs[graph].nodes.remove(&nodes[2]);
        engine.update(&links);
        assert!(check(&engine).contains(&InvariantViolation::NotListed { node: nodes[2], graph }));
        assert!(!engine.has_pending_work());
    }

    #[test]
    fn detects_disconnected_graph() {
        let mut engine = test_engine();
        let mut links = LinkTable::new();
        let pipe = pipe_proto(&engine);
        let nodes = spawn_chain(&mut engine, &mut links, pipe, 3);
        engine.update(&links);
        let graph = engine.graph_of(nodes[0]).unwrap();

        // Drop an edge behind the engine's back: no split gets queued.
        for (a, b) in [(nodes[1], nodes[2]), (nodes[2], nodes[1])] {
            let idx = engine.nodes[a].edge_index(b).unwrap();
            engine.nodes[a].edges.swap_remove(idx);
            engine.nodes[a].num_mergeable_edges -= 1;
        }

        let violations = check(&engine);
        assert!(violations.iter().any(|v| matches!(
            v,
            InvariantViolation::Disconnected { graph: g, reachable: 2, total: 3 } if *g == graph
        )));

        engine.heal(&violations);
        links.unlink(nodes[1], nodes[2]);
        engine.update(&links);
        assert!(check(&engine).is_empty());
        assert!(!engine.are_connected(nodes[1], nodes[2]));
    }
}
