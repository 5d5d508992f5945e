//! Property-based tests for the connectivity engine.
//!
//! Uses proptest to generate random edit sequences (spawns, removals, links,
//! unlinks, passes interleaved arbitrarily), then checks the resolved graphs
//! against a from-scratch union-find over the same adjacency.

use conduit_core::engine::Engine;
use conduit_core::flags::EdgeFlags;
use conduit_core::id::*;
use conduit_core::test_utils::*;
use proptest::prelude::*;
use std::collections::BTreeMap;

// ===========================================================================
// Generators
// ===========================================================================

/// Edit operations applied between passes.
#[derive(Debug, Clone)]
enum EditOp {
    /// Spawn a pipe (`false`) or a wire (`true`).
    Spawn(bool),
    Remove(usize),
    Link(usize, usize, bool),
    Unlink(usize, usize),
    Update,
}

fn arb_edit_sequence(max_ops: usize) -> impl Strategy<Value = Vec<EditOp>> {
    proptest::collection::vec(
        prop_oneof![
            3 => any::<bool>().prop_map(EditOp::Spawn),
            1 => (0..64usize).prop_map(EditOp::Remove),
            4 => (0..64usize, 0..64usize, proptest::bool::weighted(0.2))
                .prop_map(|(a, b, closed)| EditOp::Link(a, b, closed)),
            2 => (0..64usize, 0..64usize).prop_map(|(a, b)| EditOp::Unlink(a, b)),
            1 => Just(EditOp::Update),
        ],
        1..=max_ops,
    )
}

// ===========================================================================
// Harness
// ===========================================================================

/// Live nodes plus the wanted adjacency, mirrored outside the engine.
struct World {
    engine: Engine,
    links: LinkTable,
    nodes: Vec<NodeId>,
    /// Wanted edges keyed by ordered pair, `true` when closed.
    wanted: BTreeMap<(NodeId, NodeId), bool>,
}

impl World {
    fn new() -> Self {
        Self {
            engine: test_engine(),
            links: LinkTable::new(),
            nodes: Vec::new(),
            wanted: BTreeMap::new(),
        }
    }

    fn pick(&self, idx: usize) -> Option<NodeId> {
        (!self.nodes.is_empty()).then(|| self.nodes[idx % self.nodes.len()])
    }

    fn apply(&mut self, op: &EditOp) {
        match *op {
            EditOp::Spawn(wire) => {
                let proto = if wire {
                    wire_proto(&self.engine)
                } else {
                    pipe_proto(&self.engine)
                };
                self.nodes.push(self.engine.spawn_node(proto).unwrap());
            }
            EditOp::Remove(idx) => {
                let Some(node) = self.pick(idx) else { return };
                self.nodes.retain(|&n| n != node);
                self.wanted.retain(|&(a, b), _| a != node && b != node);
                for target in self.links.targets(node) {
                    self.engine.queue_edge_update(target).unwrap();
                }
                self.links.isolate(node);
                self.engine.remove_node(node).unwrap();
            }
            EditOp::Link(a, b, closed) => {
                let (Some(a), Some(b)) = (self.pick(a), self.pick(b)) else { return };
                if a == b {
                    return;
                }
                let flags = if closed { EdgeFlags::NO_MERGE } else { EdgeFlags::NONE };
                self.links.link_with(a, b, flags);
                self.wanted.insert((a.min(b), a.max(b)), closed);
                self.engine.queue_edge_update(a).unwrap();
                self.engine.queue_edge_update(b).unwrap();
            }
            EditOp::Unlink(a, b) => {
                let (Some(a), Some(b)) = (self.pick(a), self.pick(b)) else { return };
                if a == b {
                    return;
                }
                self.wanted.remove(&(a.min(b), a.max(b)));
                disconnect(&mut self.engine, &mut self.links, a, b);
            }
            EditOp::Update => {
                self.engine.update(&self.links);
            }
        }
    }

    /// Component label per live node, computed from scratch.
    fn reference_components(&self) -> BTreeMap<NodeId, NodeId> {
        let mut parent: BTreeMap<NodeId, NodeId> = self.nodes.iter().map(|&n| (n, n)).collect();

        fn find(parent: &mut BTreeMap<NodeId, NodeId>, n: NodeId) -> NodeId {
            let p = parent[&n];
            if p == n {
                return n;
            }
            let root = find(parent, p);
            parent.insert(n, root);
            root
        }

        for (&(a, b), &closed) in &self.wanted {
            let same_proto = self.engine.node(a).unwrap().graph_proto == self.engine.node(b).unwrap().graph_proto;
            if closed || !same_proto {
                continue;
            }
            let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
            if ra != rb {
                parent.insert(ra.max(rb), ra.min(rb));
            }
        }

        self.nodes.iter().map(|&n| (n, find(&mut parent, n))).collect()
    }
}

fn run(ops: &[EditOp]) -> World {
    let mut world = World::new();
    for op in ops {
        world.apply(op);
    }
    world.engine.update(&world.links);
    world
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Resolved membership matches a from-scratch union-find.
    #[test]
    fn graphs_match_reference_components(ops in arb_edit_sequence(120)) {
        let world = run(&ops);
        assert_invariants(&world.engine);

        let reference = world.reference_components();
        for &a in &world.nodes {
            for &b in &world.nodes {
                prop_assert_eq!(
                    world.engine.are_connected(a, b),
                    reference[&a] == reference[&b],
                    "{:?} / {:?}", a, b
                );
            }
        }
    }

    /// Every live node sits in exactly one graph after a pass.
    #[test]
    fn membership_is_conserved(ops in arb_edit_sequence(120)) {
        let world = run(&ops);

        prop_assert_eq!(world.engine.node_count(), world.nodes.len());
        let members: usize = world.engine.graphs().map(|(_, g)| g.len()).sum();
        prop_assert_eq!(members, world.nodes.len());
        for &node in &world.nodes {
            prop_assert!(world.engine.graph_of(node).is_some());
        }
        prop_assert!(world.engine.graphs().all(|(_, g)| !g.is_empty()));
    }

    /// A pass with nothing new queued changes nothing.
    #[test]
    fn resolution_is_idempotent(ops in arb_edit_sequence(80)) {
        let mut world = run(&ops);
        let before = world.engine.state_hash();

        let report = world.engine.update(&world.links);
        prop_assert!(!report.changed_membership());
        prop_assert_eq!(world.engine.state_hash(), before);
    }

    /// Identical edit sequences resolve to identical state.
    #[test]
    fn resolution_is_deterministic(ops in arb_edit_sequence(80)) {
        let a = run(&ops);
        let b = run(&ops);
        prop_assert_eq!(a.engine.state_hash(), b.engine.state_hash());
    }
}
