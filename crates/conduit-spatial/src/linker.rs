//! [`AdjacencyProvider`] over a [`SpatialIndex`].

use crate::{GridPosition, SpatialError, SpatialIndex};
use conduit_core::adjacency::AdjacencyProvider;
use conduit_core::engine::Engine;
use conduit_core::flags::EdgeFlags;
use conduit_core::id::{EntityId, NodeId};

/// Derives edges from grid placement.
///
/// A node wants an edge to every node of the same graph prototype hosted by
/// an entity on a neighbouring tile, provided both entities have connectors
/// facing each other. Nodes resolve to their host entity first, so proxies
/// of a poly node connect through their host's placement. If either entity
/// is closed the edge is `NO_MERGE`.
#[derive(Debug, Clone, Copy)]
pub struct GridLinker<'a> {
    index: &'a SpatialIndex,
}

impl<'a> GridLinker<'a> {
    pub fn new(index: &'a SpatialIndex) -> Self {
        Self { index }
    }

    /// Queue edge reconciliation for `entity` and everything on the four
    /// tiles around it.
    pub fn queue_neighborhood(&self, engine: &mut Engine, entity: EntityId) -> Result<(), SpatialError> {
        let position = self
            .index
            .position_of(entity)
            .ok_or(SpatialError::NotPlaced(entity))?;
        engine.queue_hosted_edge_updates(entity)?;
        self.queue_around(engine, position)
    }

    /// Queue edge reconciliation for everything on `position` and the four
    /// tiles around it. Use this after removing or moving an entity, with
    /// the tile it left.
    pub fn queue_around(&self, engine: &mut Engine, position: GridPosition) -> Result<(), SpatialError> {
        let tiles = std::iter::once(position)
            .chain(crate::Direction::all().into_iter().map(|dir| position.step(dir)));
        for tile in tiles {
            for &entity in self.index.entities_at(tile) {
                if engine.contains_entity(entity) {
                    engine.queue_hosted_edge_updates(entity)?;
                }
            }
        }
        Ok(())
    }

    fn edge_flags(&self, a: EntityId, b: EntityId) -> EdgeFlags {
        let open = |e| self.index.placement(e).is_some_and(|p| p.open);
        if open(a) && open(b) {
            EdgeFlags::NONE
        } else {
            EdgeFlags::NO_MERGE
        }
    }
}

impl AdjacencyProvider for GridLinker<'_> {
    fn wanted_edges(&self, engine: &Engine, node: NodeId, out: &mut Vec<(NodeId, EdgeFlags)>) {
        let Some(proto) = engine.node(node).map(|n| n.graph_proto) else {
            return;
        };
        let Some(host) = engine.node_host(node) else {
            return;
        };
        for (_, neighbor) in self.index.connected_neighbors(host) {
            let flags = self.edge_flags(host, neighbor);
            for target in engine.hosted_nodes(neighbor) {
                if engine.node(target).is_some_and(|t| t.graph_proto == proto) {
                    out.push((target, flags));
                }
            }
        }
    }

    fn check_edge(&self, engine: &Engine, node: NodeId, target: NodeId) -> Option<EdgeFlags> {
        let (here, there) = (engine.node(node)?, engine.node(target)?);
        if here.graph_proto != there.graph_proto {
            return None;
        }
        let (a, b) = (engine.node_host(node)?, engine.node_host(target)?);
        let (pa, pb) = (self.index.placement(a)?, self.index.placement(b)?);
        let dir = pa.position.direction_to(pb.position)?;
        let facing = pa.effective_connectors().connects(dir)
            && pb.effective_connectors().connects(dir.opposite());
        facing.then(|| self.edge_flags(a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConnectorMask, Direction, Placement};
    use conduit_core::id::{NodeProtoId, ProxyKey};
    use conduit_core::test_utils::*;

    /// Spawn an entity with a node of `proto` and place it.
    fn place(engine: &mut Engine, index: &mut SpatialIndex, proto: NodeProtoId, placement: Placement) -> NodeId {
        let entity = engine.spawn_entity();
        let node = engine.add_node(entity, proto).unwrap();
        index.place(entity, placement).unwrap();
        node
    }

    #[test]
    fn straight_run_forms_one_graph() {
        let mut engine = test_engine();
        let mut index = SpatialIndex::new();
        let pipe = pipe_proto(&engine);
        let nodes: Vec<NodeId> = (0..4)
            .map(|y| place(&mut engine, &mut index, pipe, Placement::new(GridPosition::new(0, y), ConnectorMask::STRAIGHT)))
            .collect();

        engine.update(&GridLinker::new(&index));
        assert_eq!(engine.graph_count(), 1);
        assert!(engine.are_connected(nodes[0], nodes[3]));
        assert_invariants(&engine);
    }

    #[test]
    fn misaligned_connectors_do_not_touch() {
        let mut engine = test_engine();
        let mut index = SpatialIndex::new();
        let pipe = pipe_proto(&engine);
        let a = place(&mut engine, &mut index, pipe, Placement::new(GridPosition::new(0, 0), ConnectorMask::STRAIGHT));
        let b = place(&mut engine, &mut index, pipe, Placement::new(GridPosition::new(1, 0), ConnectorMask::ALL));

        engine.update(&GridLinker::new(&index));
        assert!(!engine.has_edge(a, b));
        assert_eq!(engine.graph_count(), 2);
    }

    #[test]
    fn different_prototypes_never_link() {
        let mut engine = test_engine();
        let mut index = SpatialIndex::new();
        let pipe = pipe_proto(&engine);
        let wire = wire_proto(&engine);
        let a = place(&mut engine, &mut index, pipe, Placement::new(GridPosition::new(0, 0), ConnectorMask::ALL));
        let b = place(&mut engine, &mut index, wire, Placement::new(GridPosition::new(1, 0), ConnectorMask::ALL));

        let linker = GridLinker::new(&index);
        assert_eq!(linker.check_edge(&engine, a, b), None);
        engine.update(&linker);
        assert!(!engine.has_edge(a, b));
    }

    #[test]
    fn closed_valve_keeps_graphs_apart() {
        let mut engine = test_engine();
        let mut index = SpatialIndex::new();
        let pipe = pipe_proto(&engine);
        let left = place(&mut engine, &mut index, pipe, Placement::new(GridPosition::new(0, 0), ConnectorMask::ALL));
        let valve = place(
            &mut engine,
            &mut index,
            pipe,
            Placement::new(GridPosition::new(1, 0), ConnectorMask::STRAIGHT)
                .with_rotation(crate::Rotation::Cw90)
                .closed(),
        );
        let right = place(&mut engine, &mut index, pipe, Placement::new(GridPosition::new(2, 0), ConnectorMask::ALL));

        engine.update(&GridLinker::new(&index));
        assert!(engine.edge_flags(left, valve).is_some_and(|f| !f.is_mergeable()));
        assert!(!engine.are_connected(left, right));
        assert_eq!(engine.graph_count(), 3);

        let valve_entity = engine.node(valve).unwrap().owner;
        index.set_open(valve_entity, true).unwrap();
        GridLinker::new(&index).queue_neighborhood(&mut engine, valve_entity).unwrap();
        engine.update(&GridLinker::new(&index));
        assert!(engine.are_connected(left, right));
        assert_eq!(engine.graph_count(), 1);
        assert_invariants(&engine);
    }

    #[test]
    fn removing_a_segment_splits_the_run() {
        let mut engine = test_engine();
        let mut index = SpatialIndex::new();
        let pipe = pipe_proto(&engine);
        let nodes: Vec<NodeId> = (0..5)
            .map(|x| place(&mut engine, &mut index, pipe, Placement::new(GridPosition::new(x, 0), ConnectorMask::ALL)))
            .collect();
        engine.update(&GridLinker::new(&index));
        assert_eq!(engine.graph_count(), 1);

        let middle = engine.node(nodes[2]).unwrap().owner;
        let left_at = index.remove(middle).unwrap().position;
        engine.despawn_entity(middle).unwrap();
        GridLinker::new(&index).queue_around(&mut engine, left_at).unwrap();
        engine.update(&GridLinker::new(&index));

        assert_eq!(engine.graph_count(), 2);
        assert!(engine.are_connected(nodes[0], nodes[1]));
        assert!(engine.are_connected(nodes[3], nodes[4]));
        assert!(!engine.are_connected(nodes[1], nodes[3]));
        assert_invariants(&engine);
    }

    #[test]
    fn poly_proxies_connect_through_their_host() {
        let mut engine = test_engine();
        let mut index = SpatialIndex::new();
        let junction_proto = engine.registry().poly_id("junction").unwrap();
        let host = engine.spawn_entity();
        engine.add_poly_node(host, junction_proto).unwrap();
        let host_pipe = engine.ensure_proxy(host, &ProxyKey::from("pipe")).unwrap();
        let host_wire = engine.ensure_proxy(host, &ProxyKey::from("wire")).unwrap();
        index.place(host, Placement::new(GridPosition::new(0, 0), ConnectorMask::ALL)).unwrap();

        let (pipe_kind, wire_kind) = (pipe_proto(&engine), wire_proto(&engine));
        let pipe = place(
            &mut engine,
            &mut index,
            pipe_kind,
            Placement::new(GridPosition::new(0, 0).step(Direction::East), ConnectorMask::ALL),
        );
        let wire = place(
            &mut engine,
            &mut index,
            wire_kind,
            Placement::new(GridPosition::new(0, 0).step(Direction::West), ConnectorMask::ALL),
        );

        engine.update(&GridLinker::new(&index));
        assert!(engine.are_connected(host_pipe, pipe));
        assert!(engine.are_connected(host_wire, wire));
        assert!(!engine.has_edge(host_pipe, wire));
        assert_eq!(engine.graph_count(), 2);
        assert_invariants(&engine);
    }
}
