//! Integration test: canonical merge / split scenarios
//!
//! Drives the engine through a scripted adjacency table and checks graph
//! identity, sizes, and the events delivered after each pass.

use conduit_core::event::{GraphEvent, GraphEventKind};
use conduit_core::flags::{EdgeFlags, NodeFlags};
use conduit_core::test_utils::*;

#[test]
fn removing_a_cut_edge_keeps_the_larger_side_in_place() {
    let mut engine = test_engine();
    let mut links = LinkTable::new();
    let pipe = pipe_proto(&engine);
    let line = spawn_chain(&mut engine, &mut links, pipe, 3);
    let (a, b, c) = (line[0], line[1], line[2]);
    engine.update(&links);

    let original = engine.graph_of(a).unwrap();
    assert_eq!(engine.graph_members(original).unwrap().len(), 3);

    let splits = capture_events(&mut engine, GraphEventKind::GraphSplit);
    disconnect(&mut engine, &mut links, b, c);
    let report = engine.update(&links);

    assert_eq!(report.splits, 1);
    assert_eq!(engine.graph_of(a), Some(original));
    assert_eq!(engine.graph_of(b), Some(original));
    assert_eq!(engine.graph_members(original).unwrap().len(), 2);

    let fresh = engine.graph_of(c).unwrap();
    assert_ne!(fresh, original);
    assert_eq!(engine.graph_members(fresh).unwrap().len(), 1);

    let splits = splits.borrow();
    assert_eq!(splits.len(), 1);
    assert!(matches!(
        splits[0],
        GraphEvent::GraphSplit { from, into, moved: 1, .. } if from == original && into == fresh
    ));
    assert_invariants(&engine);
}

#[test]
fn bridging_two_graphs_keeps_the_larger_id() {
    let mut engine = test_engine();
    let mut links = LinkTable::new();
    let pipe = pipe_proto(&engine);
    let small = spawn_chain(&mut engine, &mut links, pipe, 2);
    let large = spawn_chain(&mut engine, &mut links, pipe, 3);
    engine.update(&links);

    let small_id = engine.graph_of(small[0]).unwrap();
    let large_id = engine.graph_of(large[0]).unwrap();
    assert_ne!(small_id, large_id);

    let merges = capture_events(&mut engine, GraphEventKind::GraphMerged);
    let destroyed = capture_events(&mut engine, GraphEventKind::GraphDestroyed);
    connect(&mut engine, &mut links, small[1], large[0]);
    let report = engine.update(&links);

    assert_eq!(report.merges, 1);
    assert_eq!(engine.graph_count(), 1);
    assert_eq!(engine.graph_members(large_id).unwrap().len(), 5);
    assert!(engine.graph(small_id).is_none());
    for node in small.iter().chain(&large) {
        assert_eq!(engine.graph_of(*node), Some(large_id));
    }

    assert!(matches!(
        merges.borrow()[..],
        [GraphEvent::GraphMerged { into, from, .. }] if into == large_id && from == small_id
    ));
    assert!(matches!(
        destroyed.borrow()[..],
        [GraphEvent::GraphDestroyed { graph, .. }] if graph == small_id
    ));
    assert_invariants(&engine);
}

#[test]
fn no_merge_edges_never_union_graphs() {
    let mut engine = test_engine();
    let mut links = LinkTable::new();
    let pipe = pipe_proto(&engine);
    let a = engine.spawn_node(pipe).unwrap();
    let b = engine.spawn_node(pipe).unwrap();
    links.link_with(a, b, EdgeFlags::NO_MERGE);
    engine.update(&links);

    assert!(engine.has_edge(a, b));
    assert!(!engine.are_connected(a, b));
    assert_eq!(engine.graph_count(), 2);

    // Dropping the edge must not queue anything on either side.
    disconnect(&mut engine, &mut links, a, b);
    let report = engine.update(&links);
    assert!(!engine.has_edge(a, b));
    assert!(!report.changed_membership());
    assert_eq!(engine.graph_count(), 2);
    assert_invariants(&engine);
}

#[test]
fn removing_a_manual_no_merge_edge_marks_nothing() {
    let mut engine = test_engine();
    let links = LinkTable::new();
    let pipe = pipe_proto(&engine);
    let a = engine.spawn_node(pipe).unwrap();
    let b = engine.spawn_node(pipe).unwrap();
    engine.update(&links);

    assert!(engine.try_add_edge(a, b, EdgeFlags::NO_MERGE).unwrap());
    assert!(engine.try_remove_edge(a, b).unwrap());

    for node in [a, b] {
        let flags = engine.node(node).unwrap().flags;
        assert!(!flags.intersects(NodeFlags::MERGE | NodeFlags::SPLIT));
    }
    for (_, graph) in engine.graphs() {
        assert!(!graph.has_pending_merges());
        assert!(!graph.has_pending_splits());
    }
}

#[test]
fn opening_a_no_merge_edge_merges() {
    let mut engine = test_engine();
    let mut links = LinkTable::new();
    let pipe = pipe_proto(&engine);
    let left = spawn_chain(&mut engine, &mut links, pipe, 3);
    let right = spawn_chain(&mut engine, &mut links, pipe, 3);
    links.link_with(left[2], right[0], EdgeFlags::NO_MERGE);
    engine.update(&links);
    assert_eq!(engine.graph_count(), 2);

    connect(&mut engine, &mut links, left[2], right[0]);
    engine.update(&links);
    assert_eq!(engine.graph_count(), 1);
    assert!(engine.are_connected(left[0], right[2]));

    // Closing it again splits along the same line.
    links.link_with(left[2], right[0], EdgeFlags::NO_MERGE);
    engine.queue_edge_update(left[2]).unwrap();
    engine.update(&links);
    assert_eq!(engine.graph_count(), 2);
    assert!(engine.has_edge(left[2], right[0]));
    assert!(!engine.are_connected(left[2], right[0]));
    assert_invariants(&engine);
}

#[test]
fn removing_a_non_cut_edge_keeps_one_graph() {
    let mut engine = test_engine();
    let mut links = LinkTable::new();
    let pipe = pipe_proto(&engine);
    let ring = spawn_chain(&mut engine, &mut links, pipe, 6);
    links.link(ring[5], ring[0]);
    engine.update(&links);
    let id = engine.graph_of(ring[0]).unwrap();

    disconnect(&mut engine, &mut links, ring[2], ring[3]);
    let report = engine.update(&links);

    assert_eq!(report.splits, 0);
    assert_eq!(engine.graph_count(), 1);
    assert_eq!(engine.graph_members(id).unwrap().len(), 6);
    assert_invariants(&engine);
}

#[test]
fn removing_a_hub_splits_into_every_arm() {
    let mut engine = test_engine();
    let mut links = LinkTable::new();
    let pipe = pipe_proto(&engine);
    let hub = engine.spawn_node(pipe).unwrap();
    let arms: Vec<_> = (0..4)
        .map(|_| spawn_chain(&mut engine, &mut links, pipe, 2))
        .collect();
    for arm in &arms {
        links.link(hub, arm[0]);
    }
    engine.update(&links);
    assert_eq!(engine.graph_count(), 1);

    for arm in &arms {
        engine.queue_edge_update(arm[0]).unwrap();
    }
    links.isolate(hub);
    engine.remove_node(hub).unwrap();
    engine.update(&links);

    assert_eq!(engine.graph_count(), 4);
    let sizes: usize = engine.graphs().map(|(_, g)| g.len()).sum();
    assert_eq!(sizes, 8);
    assert_invariants(&engine);
}
