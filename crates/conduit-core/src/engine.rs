//! The connectivity engine: owns every node, graph, and poly node, and is the
//! only thing that mutates graph membership.
//!
//! # Architecture
//!
//! The `Engine` owns:
//! - An entity table (hosts, proxies) keyed by [`EntityId`]
//! - Every [`GraphNode`] keyed by [`NodeId`]
//! - Every [`NodeGraph`] keyed by [`GraphId`]
//! - [`PassQueues`] of deferred work (edge reconciliation, initialisation,
//!   pending merges and splits)
//! - A [`PassSchedule`] (tick and pass counters)
//! - An [`EventBus`] for graph events
//!
//! # Resolution pass
//!
//! Each [`update`](Engine::update) runs:
//! 1. **Iteration guard** -- advance the pass counter
//! 2. **Edges** -- reconcile queued nodes against the adjacency provider
//! 3. **Init** -- flood uninitialised nodes into graphs
//! 4. **Merge** -- union graphs joined through merge candidates
//! 5. **Split** -- partition graphs whose split candidates lost connectivity
//! 6. **Bookkeeping** -- validate, deliver events
//!
//! The pass itself lives in `resolve.rs`, edge maintenance in `edges.rs`, and
//! poly/proxy handling in `proxy.rs`; all of them are `impl Engine` blocks.

use crate::config::EngineConfig;
use crate::dirty::PassQueues;
use crate::event::{EventBus, EventFilter, GraphEvent, GraphEventKind, GraphListener, ListenerPriority};
use crate::flags::NodeFlags;
use crate::graph::{DebugColor, NodeGraph};
use crate::id::*;
use crate::node::GraphNode;
use crate::poly::{PolyNode, ProxyNode};
use crate::registry::Registry;
use crate::sim::{PassReport, PassSchedule, StateHash};
use slotmap::{Key, SlotMap};
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Structurally invalid requests. Operations on nodes that merely are not
/// initialised yet succeed and do nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("unknown entity: {0:?}")]
    UnknownEntity(EntityId),
    #[error("unknown node: {0:?}")]
    UnknownNode(NodeId),
    #[error("unknown node prototype: {0:?}")]
    UnknownNodeProto(NodeProtoId),
    #[error("unknown poly prototype: {0:?}")]
    UnknownPolyProto(PolyProtoId),
    #[error("entity {0:?} already carries a node")]
    NodeAlreadyAttached(EntityId),
    #[error("entity {0:?} already carries a poly node")]
    PolyAlreadyAttached(EntityId),
    #[error("node {0:?} cannot form an edge with itself")]
    SelfEdge(NodeId),
    #[error("entity {0:?} carries no poly node")]
    NotPolyNode(EntityId),
    #[error("poly node on {host:?} has no proxy prototype '{key}'")]
    UnknownProxyKey { host: EntityId, key: ProxyKey },
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// What the engine knows about one entity.
#[derive(Debug, Clone, Default)]
pub struct EntityData {
    /// The entity's own node, if it carries one.
    pub node: Option<NodeId>,
    /// Set on hosts that participate in several graphs.
    pub poly: Option<PolyNode>,
    /// Set on proxy entities spawned for a poly host.
    pub proxy: Option<ProxyNode>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The connectivity engine.
#[derive(Debug)]
pub struct Engine {
    pub(crate) registry: Registry,
    pub(crate) config: EngineConfig,

    pub(crate) entities: SlotMap<EntityId, EntityData>,
    pub(crate) nodes: SlotMap<NodeId, GraphNode>,
    pub(crate) graphs: SlotMap<GraphId, NodeGraph>,

    /// Work deferred to the next pass.
    pub(crate) queues: PassQueues,

    /// Tick and pass counters.
    pub schedule: PassSchedule,

    /// Traversal stamp. Advanced once per traversal phase.
    pub(crate) stamp: UpdateIter,

    /// Whether a pass is running.
    pub(crate) in_pass: bool,

    /// Creation counter for graphs; feeds debug colors.
    pub(crate) next_graph_serial: u64,

    /// Counters accumulated since the last pass finished.
    pub(crate) report: PassReport,

    /// Typed event bus for graph events.
    pub event_bus: EventBus,
}

impl Engine {
    /// Create an engine over a frozen registry.
    pub fn new(registry: Registry, config: EngineConfig) -> Self {
        let event_bus = EventBus::new(config.event_buffer_capacity);
        Self {
            registry,
            config,
            entities: SlotMap::with_key(),
            nodes: SlotMap::with_key(),
            graphs: SlotMap::with_key(),
            queues: PassQueues::new(),
            schedule: PassSchedule::new(),
            stamp: UpdateIter::default(),
            in_pass: false,
            next_graph_serial: 0,
            report: PassReport::default(),
            event_bus,
        }
    }

    /// Create an engine with the default configuration.
    pub fn with_registry(registry: Registry) -> Self {
        Self::new(registry, EngineConfig::default())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replace the configuration. The event buffer capacity only applies to
    /// buffers allocated afterwards.
    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config;
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    /// Register a new entity. It carries nothing until a node or poly node is
    /// attached.
    pub fn spawn_entity(&mut self) -> EntityId {
        self.entities.insert(EntityData::default())
    }

    /// Remove an entity together with its node, its proxies, and its
    /// registration on a poly host.
    pub fn despawn_entity(&mut self, entity: EntityId) -> Result<(), EngineError> {
        let data = self
            .entities
            .get_mut(entity)
            .ok_or(EngineError::UnknownEntity(entity))?;
        let poly = data.poly.take();
        let proxy = data.proxy.take();
        let node = data.node;

        if let Some(poly) = poly {
            for (_, proxy_entity) in poly.proxy_nodes {
                if proxy_entity != entity && self.entities.contains_key(proxy_entity) {
                    self.despawn_entity(proxy_entity)?;
                }
            }
        }

        if let Some(node) = node {
            self.remove_node(node)?;
        }

        if let Some(proxy) = proxy
            && let Some(host) = self.entities.get_mut(proxy.proxy_for)
            && let Some(poly) = host.poly.as_mut()
            && poly.proxy(&proxy.proxy_key) == Some(entity)
        {
            poly.proxy_nodes.remove(&proxy.proxy_key);
        }

        self.entities.remove(entity);
        Ok(())
    }

    pub fn entity(&self, entity: EntityId) -> Option<&EntityData> {
        self.entities.get(entity)
    }

    pub fn contains_entity(&self, entity: EntityId) -> bool {
        self.entities.contains_key(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // -----------------------------------------------------------------------
    // Node lifecycle
    // -----------------------------------------------------------------------

    /// Attach a node of prototype `proto` to `entity`.
    ///
    /// The node starts uninitialised with its edges dirty; the next pass
    /// reconciles its edges and floods it into a graph.
    pub fn add_node(&mut self, entity: EntityId, proto: NodeProtoId) -> Result<NodeId, EngineError> {
        let graph_proto = self
            .registry
            .graph_of(proto)
            .ok_or(EngineError::UnknownNodeProto(proto))?;
        let data = self
            .entities
            .get_mut(entity)
            .ok_or(EngineError::UnknownEntity(entity))?;
        if data.node.is_some() {
            return Err(EngineError::NodeAlreadyAttached(entity));
        }

        let mut node = GraphNode::new(entity, proto, graph_proto);
        node.flags = NodeFlags::INIT | NodeFlags::EDGES_DIRTY;
        let id = self.nodes.insert(node);
        data.node = Some(id);

        self.queues.queue_init(id);
        self.queues.queue_edge_update(id);
        Ok(id)
    }

    /// Spawn an entity carrying a single node. Convenience for hosts that
    /// don't track entities separately.
    pub fn spawn_node(&mut self, proto: NodeProtoId) -> Result<NodeId, EngineError> {
        let entity = self.spawn_entity();
        match self.add_node(entity, proto) {
            Ok(node) => Ok(node),
            Err(err) => {
                self.entities.remove(entity);
                Err(err)
            }
        }
    }

    /// Tear a node down: drop every edge (marking the neighbours it shared a
    /// graph with as split candidates), evict it from its graph, and forget
    /// it. The owning entity survives.
    pub fn remove_node(&mut self, node: NodeId) -> Result<(), EngineError> {
        if !self.nodes.contains_key(node) {
            return Err(EngineError::UnknownNode(node));
        }

        while let Some(target) = self
            .nodes
            .get(node)
            .and_then(|n| n.edges.last())
            .map(|edge| edge.target)
        {
            self.unlink(node, target);
        }

        self.remove_from_graph(node);
        self.queues.forget_node(node);

        if let Some(removed) = self.nodes.remove(node)
            && let Some(owner) = self.entities.get_mut(removed.owner)
            && owner.node == Some(node)
        {
            owner.node = None;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Work queues
    // -----------------------------------------------------------------------

    /// Ask for `node`'s edges to be reconciled on the next pass.
    pub fn queue_edge_update(&mut self, node: NodeId) -> Result<(), EngineError> {
        let n = self
            .nodes
            .get_mut(node)
            .ok_or(EngineError::UnknownNode(node))?;
        if !n.flags.contains(NodeFlags::EDGES_DIRTY) {
            n.flags.insert(NodeFlags::EDGES_DIRTY);
            self.queues.queue_edge_update(node);
        }
        Ok(())
    }

    /// Withdraw a pending edge reconciliation.
    pub fn clear_edge_update(&mut self, node: NodeId) -> Result<(), EngineError> {
        let n = self
            .nodes
            .get_mut(node)
            .ok_or(EngineError::UnknownNode(node))?;
        n.flags.remove(NodeFlags::EDGES_DIRTY);
        self.queues.cancel_edge_update(node);
        Ok(())
    }

    /// Whether a pass would have anything to do.
    pub fn has_pending_work(&self) -> bool {
        self.queues.is_dirty()
    }

    pub fn pending_edge_updates(&self) -> usize {
        self.queues.edge_update_count()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn node(&self, node: NodeId) -> Option<&GraphNode> {
        self.nodes.get(node)
    }

    pub fn graph(&self, graph: GraphId) -> Option<&NodeGraph> {
        self.graphs.get(graph)
    }

    /// The node carried directly by `entity`.
    pub fn node_of(&self, entity: EntityId) -> Option<NodeId> {
        self.entities.get(entity).and_then(|data| data.node)
    }

    /// The graph `node` currently belongs to.
    pub fn graph_of(&self, node: NodeId) -> Option<GraphId> {
        self.nodes.get(node).and_then(|n| n.graph)
    }

    /// Members of `graph`. Valid until the next pass.
    pub fn graph_members(&self, graph: GraphId) -> Option<&BTreeSet<NodeId>> {
        self.graphs.get(graph).map(|g| &g.nodes)
    }

    /// Whether two nodes currently share a graph.
    pub fn are_connected(&self, a: NodeId, b: NodeId) -> bool {
        match (self.graph_of(a), self.graph_of(b)) {
            (Some(ga), Some(gb)) => ga == gb,
            _ => false,
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &GraphNode)> {
        self.nodes.iter()
    }

    pub fn graphs(&self) -> impl Iterator<Item = (GraphId, &NodeGraph)> {
        self.graphs.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn graph_count(&self) -> usize {
        self.graphs.len()
    }

    /// The most recent pass number.
    pub fn pass(&self) -> UpdateIter {
        self.schedule.iter
    }

    // -----------------------------------------------------------------------
    // State hash
    // -----------------------------------------------------------------------

    /// Hash of every graph's prototype and membership, in id order.
    pub fn state_hash(&self) -> u64 {
        let mut hash = StateHash::new();
        let mut graphs: Vec<_> = self.graphs.iter().collect();
        graphs.sort_by_key(|(id, _)| *id);
        for (id, graph) in graphs {
            hash.write_u64(id.data().as_ffi());
            hash.write_u32(graph.proto.0);
            hash.write_u64(graph.nodes.len() as u64);
            for node in &graph.nodes {
                hash.write_u64(node.data().as_ffi());
            }
        }
        hash.finish()
    }

    // -----------------------------------------------------------------------
    // Event system
    // -----------------------------------------------------------------------

    /// Suppress an event kind. Suppressed events are never allocated or buffered.
    pub fn suppress_event(&mut self, kind: GraphEventKind) {
        self.event_bus.suppress(kind);
    }

    /// Register a listener for an event kind. Listeners run when a pass ends.
    pub fn subscribe(&mut self, kind: GraphEventKind, listener: GraphListener) {
        self.event_bus.subscribe(kind, listener);
    }

    pub fn subscribe_filtered(
        &mut self,
        kind: GraphEventKind,
        priority: ListenerPriority,
        filter: Option<EventFilter>,
        listener: GraphListener,
    ) {
        self.event_bus.subscribe_filtered(kind, priority, filter, listener);
    }

    /// The pass number stamped on events raised now. Outside a pass that is
    /// the pass that will deliver them.
    pub(crate) fn event_pass(&self) -> UpdateIter {
        if self.in_pass {
            self.schedule.iter
        } else {
            self.schedule.iter.next()
        }
    }

    pub(crate) fn emit(&mut self, event: GraphEvent) {
        self.event_bus.emit(event);
    }

    // -----------------------------------------------------------------------
    // Internal: graph membership
    // -----------------------------------------------------------------------

    pub(crate) fn create_graph(&mut self, proto: GraphProtoId) -> GraphId {
        let serial = self.next_graph_serial;
        self.next_graph_serial += 1;
        let base = self
            .registry
            .get_graph(proto)
            .map(|def| def.color)
            .unwrap_or_default();
        let graph = self.graphs.insert(NodeGraph::empty(
            proto,
            serial,
            DebugColor::for_serial(serial, base),
        ));
        let pass = self.event_pass();
        self.emit(GraphEvent::GraphCreated { graph, proto, pass });
        graph
    }

    pub(crate) fn destroy_graph(&mut self, graph: GraphId) {
        if self.graphs.remove(graph).is_none() {
            return;
        }
        self.queues.forget_graph(graph);
        self.report.graphs_destroyed += 1;
        let pass = self.event_pass();
        self.emit(GraphEvent::GraphDestroyed { graph, pass });
    }

    /// Put an ungraphed node into `graph`, carrying its pending merge/split
    /// flags over to the graph's candidate sets.
    pub(crate) fn add_to_graph(&mut self, node: NodeId, graph: GraphId) {
        let (Some(n), Some(g)) = (self.nodes.get_mut(node), self.graphs.get_mut(graph)) else {
            return;
        };
        debug_assert!(n.graph.is_none(), "node {node:?} added to a second graph");
        n.graph = Some(graph);
        g.nodes.insert(node);
        if n.flags.contains(NodeFlags::MERGE) {
            g.merge_nodes.insert(node);
            self.queues.queue_merge(graph);
        }
        if n.flags.contains(NodeFlags::SPLIT) {
            g.split_nodes.insert(node);
            self.queues.queue_split(graph);
        }
        let pass = self.event_pass();
        self.emit(GraphEvent::NodeAdded { graph, node, pass });
    }

    /// Take a node out of its graph, destroying the graph if that empties it.
    pub(crate) fn remove_from_graph(&mut self, node: NodeId) -> Option<GraphId> {
        let graph = self.nodes.get_mut(node)?.graph.take()?;
        let mut emptied = false;
        if let Some(g) = self.graphs.get_mut(graph) {
            g.nodes.remove(&node);
            g.merge_nodes.remove(&node);
            g.split_nodes.remove(&node);
            emptied = g.is_empty();
        }
        let pass = self.event_pass();
        self.emit(GraphEvent::NodeRemoved { graph, node, pass });
        if emptied {
            self.destroy_graph(graph);
        }
        Some(graph)
    }

    pub(crate) fn mark_merge(&mut self, node: NodeId) {
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        if n.flags.contains(NodeFlags::MERGE) {
            return;
        }
        n.flags.insert(NodeFlags::MERGE);
        if let Some(graph) = n.graph
            && let Some(g) = self.graphs.get_mut(graph)
        {
            g.merge_nodes.insert(node);
            self.queues.queue_merge(graph);
        }
    }

    pub(crate) fn clear_merge(&mut self, node: NodeId) {
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        n.flags.remove(NodeFlags::MERGE);
        if let Some(graph) = n.graph
            && let Some(g) = self.graphs.get_mut(graph)
        {
            g.merge_nodes.remove(&node);
        }
    }

    pub(crate) fn mark_split(&mut self, node: NodeId) {
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        if n.flags.contains(NodeFlags::SPLIT) {
            return;
        }
        n.flags.insert(NodeFlags::SPLIT);
        if let Some(graph) = n.graph
            && let Some(g) = self.graphs.get_mut(graph)
        {
            g.split_nodes.insert(node);
            self.queues.queue_split(graph);
        }
    }

    pub(crate) fn clear_split(&mut self, node: NodeId) {
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        n.flags.remove(NodeFlags::SPLIT);
        if let Some(graph) = n.graph
            && let Some(g) = self.graphs.get_mut(graph)
        {
            g.split_nodes.remove(&node);
        }
    }

    /// Next traversal stamp.
    pub(crate) fn next_stamp(&mut self) -> UpdateIter {
        self.stamp = self.stamp.next();
        self.stamp
    }
}
