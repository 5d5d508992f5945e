//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::adjacency::AdjacencyProvider;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::event::{GraphEvent, GraphEventKind};
use crate::flags::{EdgeFlags, NodeFlags};
use crate::graph::DebugColor;
use crate::id::*;
use crate::registry::{Registry, RegistryBuilder};
use crate::validation;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

// ===========================================================================
// Registry
// ===========================================================================

/// Two graph prototypes (`gas`, `power`), three node prototypes (`pipe` on
/// gas; `wire` and `cable` on power) and one poly prototype (`junction`:
/// a pipe served by the host itself plus a wire proxy).
pub fn test_registry() -> Registry {
    let mut b = RegistryBuilder::new();
    let gas = b.register_graph("gas", DebugColor::new(80, 160, 255));
    let power = b.register_graph("power", DebugColor::new(255, 210, 60));
    let pipe = b.register_node("pipe", gas);
    let wire = b.register_node("wire", power);
    b.register_node("cable", power);
    b.register_poly(
        "junction",
        [(ProxyKey::from("pipe"), pipe), (ProxyKey::from("wire"), wire)]
            .into_iter()
            .collect(),
        Some(ProxyKey::from("pipe")),
    );
    b.build().expect("test registry is valid")
}

/// An engine over [`test_registry`] that validates after every pass but
/// never repairs what it finds, so a broken pass stays visible to
/// [`assert_invariants`].
pub fn test_engine() -> Engine {
    Engine::new(
        test_registry(),
        EngineConfig {
            validate_after_pass: true,
            self_heal: false,
            ..Default::default()
        },
    )
}

/// Like [`test_engine`], but repairs violations after each pass.
pub fn healing_test_engine() -> Engine {
    Engine::new(
        test_registry(),
        EngineConfig {
            validate_after_pass: true,
            self_heal: true,
            ..Default::default()
        },
    )
}

pub fn pipe_proto(engine: &Engine) -> NodeProtoId {
    engine.registry().node_id("pipe").expect("pipe registered")
}

pub fn wire_proto(engine: &Engine) -> NodeProtoId {
    engine.registry().node_id("wire").expect("wire registered")
}

pub fn cable_proto(engine: &Engine) -> NodeProtoId {
    engine.registry().node_id("cable").expect("cable registered")
}

// ===========================================================================
// Scriptable adjacency
// ===========================================================================

/// An adjacency provider backed by an explicit table of wanted edges.
///
/// Changing the table does not touch the engine; queue edge updates for the
/// nodes involved (or use [`connect`] / [`disconnect`]).
#[derive(Debug, Clone, Default)]
pub struct LinkTable {
    wants: BTreeMap<NodeId, BTreeMap<NodeId, EdgeFlags>>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both nodes want a plain edge to each other.
    pub fn link(&mut self, a: NodeId, b: NodeId) {
        self.link_with(a, b, EdgeFlags::NONE);
    }

    /// Both nodes want an edge to each other with `flags`.
    pub fn link_with(&mut self, a: NodeId, b: NodeId, flags: EdgeFlags) {
        self.link_one_way(a, b, flags);
        self.link_one_way(b, a, flags);
    }

    /// Only `a` wants the edge.
    pub fn link_one_way(&mut self, a: NodeId, b: NodeId, flags: EdgeFlags) {
        self.wants.entry(a).or_default().insert(b, flags);
    }

    /// Neither node wants the edge any more.
    pub fn unlink(&mut self, a: NodeId, b: NodeId) {
        for (from, to) in [(a, b), (b, a)] {
            if let Some(targets) = self.wants.get_mut(&from) {
                targets.remove(&to);
            }
        }
    }

    /// Forget every edge involving `node`.
    pub fn isolate(&mut self, node: NodeId) {
        self.wants.remove(&node);
        for targets in self.wants.values_mut() {
            targets.remove(&node);
        }
    }

    /// Targets `node` currently wants.
    pub fn targets(&self, node: NodeId) -> Vec<NodeId> {
        self.wants
            .get(&node)
            .map(|targets| targets.keys().copied().collect())
            .unwrap_or_default()
    }
}

impl AdjacencyProvider for LinkTable {
    fn wanted_edges(&self, _engine: &Engine, node: NodeId, out: &mut Vec<(NodeId, EdgeFlags)>) {
        if let Some(targets) = self.wants.get(&node) {
            out.extend(targets.iter().map(|(&target, &flags)| (target, flags)));
        }
    }

    fn check_edge(&self, _engine: &Engine, node: NodeId, target: NodeId) -> Option<EdgeFlags> {
        self.wants.get(&node)?.get(&target).copied()
    }
}

// ===========================================================================
// Builders
// ===========================================================================

/// Spawn `len` nodes of `proto` linked in a line. Nothing is resolved yet.
pub fn spawn_chain(engine: &mut Engine, links: &mut LinkTable, proto: NodeProtoId, len: usize) -> Vec<NodeId> {
    let nodes: Vec<NodeId> = (0..len)
        .map(|_| engine.spawn_node(proto).expect("known prototype"))
        .collect();
    for pair in nodes.windows(2) {
        links.link(pair[0], pair[1]);
    }
    nodes
}

/// Link two existing nodes and queue both for reconciliation.
pub fn connect(engine: &mut Engine, links: &mut LinkTable, a: NodeId, b: NodeId) {
    links.link(a, b);
    engine.queue_edge_update(a).expect("live node");
    engine.queue_edge_update(b).expect("live node");
}

/// Unlink two nodes and queue both for reconciliation.
pub fn disconnect(engine: &mut Engine, links: &mut LinkTable, a: NodeId, b: NodeId) {
    links.unlink(a, b);
    engine.queue_edge_update(a).expect("live node");
    engine.queue_edge_update(b).expect("live node");
}

// ===========================================================================
// Assertions
// ===========================================================================

/// Panic with every violation if any invariant is broken.
///
/// Meant for a fully resolved engine: a merge or split candidate still
/// pending is a failure too, since [`validation::check`] skips the graphs
/// involved.
pub fn assert_invariants(engine: &Engine) {
    let violations = validation::check(engine);
    assert!(
        violations.is_empty(),
        "invariants violated:\n{}",
        violations
            .iter()
            .map(|v| format!("  {v}"))
            .collect::<Vec<_>>()
            .join("\n")
    );

    let pending = NodeFlags::MERGE | NodeFlags::SPLIT;
    let flagged: Vec<NodeId> = engine
        .nodes()
        .filter(|(_, n)| n.flags.intersects(pending))
        .map(|(id, _)| id)
        .collect();
    assert!(flagged.is_empty(), "candidates left after the pass: {flagged:?}");
    for (id, graph) in engine.graphs() {
        assert!(
            !graph.has_pending_merges() && !graph.has_pending_splits(),
            "graph {id:?} still has pending candidates"
        );
    }
}

/// Record every delivered event of `kind`.
pub fn capture_events(engine: &mut Engine, kind: GraphEventKind) -> Rc<RefCell<Vec<GraphEvent>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    engine.subscribe(kind, Box::new(move |event| sink.borrow_mut().push(event.clone())));
    seen
}
