//! The contract between the engine and the world layer that decides which
//! nodes touch.
//!
//! The engine never decides adjacency itself. During edge reconciliation it
//! asks an [`AdjacencyProvider`] which edges a node wants and whether a
//! given neighbour wants an edge back. Providers get read-only access to the
//! engine so they can resolve a node to its host entity, prototype, and so on.

use crate::engine::Engine;
use crate::flags::EdgeFlags;
use crate::id::NodeId;

/// Supplies the edges nodes should have.
///
/// Flags returned by a provider are masked with [`EdgeFlags::USER_MASK`];
/// direction and source bits are owned by the engine.
pub trait AdjacencyProvider {
    /// Push every `(target, flags)` pair `node` wants into `out`.
    ///
    /// Targets that no longer exist or equal `node` are ignored by the
    /// engine (with a warning).
    fn wanted_edges(&self, engine: &Engine, node: NodeId, out: &mut Vec<(NodeId, EdgeFlags)>);

    /// Whether `node` wants an edge to `target`, and with which flags.
    ///
    /// The default scans [`wanted_edges`](Self::wanted_edges). Providers with
    /// a cheaper point query should override it.
    fn check_edge(&self, engine: &Engine, node: NodeId, target: NodeId) -> Option<EdgeFlags> {
        let mut wanted = Vec::new();
        self.wanted_edges(engine, node, &mut wanted);
        wanted
            .into_iter()
            .filter(|(t, _)| *t == target)
            .map(|(_, flags)| flags)
            .reduce(|a, b| a | b)
    }
}

/// A provider that wants nothing. Passes driven with it only resolve
/// initialisation, manual edges, merges, and splits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAdjacency;

impl AdjacencyProvider for NoAdjacency {
    fn wanted_edges(&self, _engine: &Engine, _node: NodeId, _out: &mut Vec<(NodeId, EdgeFlags)>) {}

    fn check_edge(&self, _engine: &Engine, _node: NodeId, _target: NodeId) -> Option<EdgeFlags> {
        None
    }
}

impl<P: AdjacencyProvider + ?Sized> AdjacencyProvider for &P {
    fn wanted_edges(&self, engine: &Engine, node: NodeId, out: &mut Vec<(NodeId, EdgeFlags)>) {
        (**self).wanted_edges(engine, node, out)
    }

    fn check_edge(&self, engine: &Engine, node: NodeId, target: NodeId) -> Option<EdgeFlags> {
        (**self).check_edge(engine, node, target)
    }
}
