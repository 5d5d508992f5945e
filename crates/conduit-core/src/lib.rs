//! Conduit Core -- incremental connectivity for node graphs.
//!
//! Thousands of independent nodes (pipe segments, wires, fittings) attach to,
//! detach from, and re-attach to each other, and the engine keeps every
//! maximal connected component as a [`graph::NodeGraph`] without ever
//! recomputing connectivity from scratch.
//!
//! # Resolution pass
//!
//! Changes are never applied immediately. Hosts queue work, and each call to
//! [`engine::Engine::update`] (or a due [`engine::Engine::tick`]) resolves
//! it in one batch:
//!
//! 1. **Edges** -- Reconcile dirty nodes against the [`adjacency::AdjacencyProvider`].
//! 2. **Init** -- Flood new nodes into the graphs they touch, or new graphs.
//! 3. **Merge** -- Union graphs joined by new mergeable edges, smaller into larger.
//! 4. **Split** -- Re-check graphs that lost mergeable edges, bounded by their size.
//! 5. **Bookkeeping** -- Validate (optional), deliver [`event::GraphEvent`]s.
//!
//! ```rust,ignore
//! let node = engine.spawn_node(pipe)?;
//! engine.queue_edge_update(neighbour)?;
//! let report = engine.update(&world);
//! let members = engine.graph_members(engine.graph_of(node).unwrap());
//! ```
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- Owns nodes, graphs, and entities; runs passes.
//! - [`node::GraphNode`] -- One participant, with its half edges.
//! - [`graph::NodeGraph`] -- One connected component.
//! - [`poly::PolyNode`] / [`poly::ProxyNode`] -- One entity in several graphs.
//! - [`flags::EdgeFlags`] -- Direction, `NO_MERGE`, and edge source bits.
//! - [`registry::Registry`] -- Immutable graph/node/poly prototypes.
//! - [`event::EventBus`] -- Per-kind ring buffers delivered after each pass.

pub mod adjacency;
pub mod config;
pub mod dirty;
mod edges;
pub mod engine;
pub mod event;
pub mod flags;
pub mod graph;
pub mod id;
pub mod node;
pub mod poly;
mod proxy;
pub mod query;
pub mod registry;
mod resolve;
pub mod sim;
pub mod validation;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
