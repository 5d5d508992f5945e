//! The batched resolution pass.
//!
//! Work queued between passes (dirty edges, new nodes, merge and split
//! candidates) is resolved here in a fixed order: edges, initialisation,
//! merges, splits. Merges never traverse nodes; splits traverse at most the
//! members of the graph being split.

use crate::adjacency::AdjacencyProvider;
use crate::engine::Engine;
use crate::event::GraphEvent;
use crate::flags::NodeFlags;
use crate::id::*;
use crate::sim::PassReport;
use crate::validation;
use std::cmp::Reverse;
use std::collections::BTreeSet;
use tracing::{debug, trace, warn};

impl Engine {
    // -----------------------------------------------------------------------
    // Driving passes
    // -----------------------------------------------------------------------

    /// Record one host tick and run a pass if `pass_interval` ticks have
    /// elapsed since the last one.
    pub fn tick<P>(&mut self, provider: &P) -> Option<PassReport>
    where
        P: AdjacencyProvider + ?Sized,
    {
        if self.schedule.advance_tick(self.config.pass_interval) {
            Some(self.update(provider))
        } else {
            None
        }
    }

    /// Run one resolution pass to completion and deliver its events.
    pub fn update<P>(&mut self, provider: &P) -> PassReport
    where
        P: AdjacencyProvider + ?Sized,
    {
        let iter = self.schedule.begin_pass();
        self.in_pass = true;

        self.phase_edges(provider);
        self.phase_init();
        self.phase_merge();
        self.phase_split();
        self.phase_bookkeeping();

        self.in_pass = false;
        let mut report = std::mem::take(&mut self.report);
        report.iter = iter;
        debug!(
            pass = iter.0,
            edge_updates = report.edge_updates,
            deferred = report.deferred_edge_updates,
            initialized = report.initialized_nodes,
            merges = report.merges,
            splits = report.splits,
            graphs = self.graphs.len(),
            "resolution pass finished"
        );
        self.event_bus.deliver();
        report
    }

    // -----------------------------------------------------------------------
    // Phase: edge reconciliation
    // -----------------------------------------------------------------------

    fn phase_edges<P>(&mut self, provider: &P)
    where
        P: AdjacencyProvider + ?Sized,
    {
        // A zero budget would stall reconciliation forever.
        let budget = self.config.edge_update_budget.unwrap_or(usize::MAX).max(1);
        let mut done = 0;
        while done < budget {
            let Some(node) = self.queues.pop_edge_update() else {
                break;
            };
            if !self.nodes.contains_key(node) {
                continue;
            }
            self.reconcile_edges(node, provider);
            done += 1;
        }
        self.report.edge_updates += done;
        self.report.deferred_edge_updates = self.queues.edge_update_count();
    }

    // -----------------------------------------------------------------------
    // Phase: initialisation
    // -----------------------------------------------------------------------

    /// Flood every uninitialised node into a graph. A flood walks mergeable,
    /// same-prototype edges through other uninitialised nodes; the component
    /// found extends the largest graph it touches, or gets a new graph.
    fn phase_init(&mut self) {
        let stamp = self.next_stamp();
        let mut frontier = Vec::new();

        while let Some(seed) = self.queues.pop_init() {
            let Some(n) = self.nodes.get_mut(seed) else {
                continue;
            };
            debug_assert!(!n.visited_in(stamp), "node {seed:?} initialised twice in one pass");
            if n.is_initialized() || n.visited_in(stamp) {
                n.flags.remove(NodeFlags::INIT);
                continue;
            }
            n.last_update = Some(stamp);
            let proto = n.graph_proto;

            let mut component = Vec::new();
            let mut touched = BTreeSet::new();
            frontier.push(seed);
            while let Some(current) = frontier.pop() {
                component.push(current);
                let Some(cn) = self.nodes.get(current) else {
                    continue;
                };
                let targets: Vec<NodeId> = cn.mergeable_targets().collect();
                for target in targets {
                    let Some(tn) = self.nodes.get_mut(target) else {
                        continue;
                    };
                    if tn.graph_proto != proto {
                        continue;
                    }
                    match tn.graph {
                        Some(graph) => {
                            touched.insert(graph);
                        }
                        None if !tn.visited_in(stamp) => {
                            tn.last_update = Some(stamp);
                            frontier.push(target);
                        }
                        None => {}
                    }
                }
            }

            let graph = match self.largest_graph(&touched) {
                Some(graph) => graph,
                None => self.create_graph(proto),
            };
            for &node in &component {
                if let Some(n) = self.nodes.get_mut(node) {
                    n.flags.remove(NodeFlags::INIT);
                }
                self.queues.cancel_init(node);
                self.add_to_graph(node, graph);
            }
            self.report.initialized_nodes += component.len();

            if touched.len() > 1 {
                for &node in &component {
                    if self.borders_other_graph(node) {
                        self.mark_merge(node);
                    }
                }
            }
        }
    }

    /// Whether `node` has a mergeable edge into a different graph of its
    /// prototype.
    fn borders_other_graph(&self, node: NodeId) -> bool {
        let Some(n) = self.nodes.get(node) else {
            return false;
        };
        n.mergeable_targets().any(|target| {
            self.nodes.get(target).is_some_and(|t| {
                t.graph_proto == n.graph_proto && t.graph.is_some() && t.graph != n.graph
            })
        })
    }

    /// Largest of `graphs`; ties go to the lowest id.
    fn largest_graph(&self, graphs: &BTreeSet<GraphId>) -> Option<GraphId> {
        graphs
            .iter()
            .filter_map(|&id| self.graphs.get(id).map(|g| (id, g.len())))
            .max_by_key(|&(id, len)| (len, Reverse(id)))
            .map(|(id, _)| id)
    }

    // -----------------------------------------------------------------------
    // Phase: merges
    // -----------------------------------------------------------------------

    /// Union every group of graphs joined through merge candidates. Each
    /// group is collected in one walk over graphs (not nodes) and merged into
    /// its largest member.
    fn phase_merge(&mut self) {
        let stamp = self.next_stamp();

        while let Some(start) = self.queues.pop_merge() {
            let Some(graph) = self.graphs.get_mut(start) else {
                continue;
            };
            if graph.visited_in(stamp) || !graph.has_pending_merges() {
                continue;
            }
            graph.last_update = Some(stamp);
            let proto = graph.proto;

            let mut group = vec![start];
            let mut frontier = vec![start];
            while let Some(current) = frontier.pop() {
                let candidates = match self.graphs.get_mut(current) {
                    Some(g) => std::mem::take(&mut g.merge_nodes),
                    None => continue,
                };
                for node in candidates {
                    let Some(n) = self.nodes.get_mut(node) else {
                        continue;
                    };
                    n.flags.remove(NodeFlags::MERGE);
                    let targets: Vec<NodeId> = n.mergeable_targets().collect();
                    for target in targets {
                        let Some(other) = self.nodes.get(target).and_then(|t| t.graph) else {
                            continue;
                        };
                        if other == current {
                            continue;
                        }
                        let Some(og) = self.graphs.get_mut(other) else {
                            continue;
                        };
                        if og.proto != proto || og.visited_in(stamp) {
                            continue;
                        }
                        og.last_update = Some(stamp);
                        group.push(other);
                        frontier.push(other);
                    }
                }
            }

            if group.len() < 2 {
                continue;
            }
            let group: BTreeSet<GraphId> = group.into_iter().collect();
            let Some(survivor) = self.largest_graph(&group) else {
                continue;
            };
            for &absorbed in group.iter().filter(|&&g| g != survivor) {
                self.absorb_graph(survivor, absorbed);
            }
        }
    }

    /// Move every node of `from` into `into` and destroy `from`. Pending
    /// candidates carry over.
    pub(crate) fn absorb_graph(&mut self, into: GraphId, from: GraphId) {
        if into == from || !self.graphs.contains_key(into) {
            return;
        }
        let Some(g) = self.graphs.get_mut(from) else {
            return;
        };
        let nodes = std::mem::take(&mut g.nodes);
        let merge_nodes = std::mem::take(&mut g.merge_nodes);
        let split_nodes = std::mem::take(&mut g.split_nodes);

        for &node in &nodes {
            if let Some(n) = self.nodes.get_mut(node) {
                debug_assert_eq!(n.graph, Some(from));
                n.graph = Some(into);
            }
        }
        let moved = nodes.len();
        if let Some(target) = self.graphs.get_mut(into) {
            target.nodes.extend(nodes);
            if !merge_nodes.is_empty() {
                target.merge_nodes.extend(merge_nodes);
                self.queues.queue_merge(into);
            }
            if !split_nodes.is_empty() {
                target.split_nodes.extend(split_nodes);
                self.queues.queue_split(into);
            }
        }

        trace!(?into, ?from, moved, "graphs merged");
        self.report.merges += 1;
        let pass = self.event_pass();
        self.emit(GraphEvent::GraphMerged { into, from, pass });
        self.destroy_graph(from);
    }

    // -----------------------------------------------------------------------
    // Phase: splits
    // -----------------------------------------------------------------------

    /// Re-check connectivity of every graph with split candidates.
    ///
    /// The first traversal starts at the lowest candidate and always runs to
    /// completion, whatever edges the candidates still hold. If it reaches
    /// every member nothing was disconnected. Otherwise the rest of the
    /// members are partitioned too; the largest part keeps the graph (ties:
    /// the part holding the lowest node id) and every other part moves to a
    /// new graph.
    fn phase_split(&mut self) {
        let stamp = self.next_stamp();

        while let Some(graph) = self.queues.pop_split() {
            let Some(g) = self.graphs.get_mut(graph) else {
                continue;
            };
            let seeds = std::mem::take(&mut g.split_nodes);
            let total = g.len();
            for &seed in &seeds {
                if let Some(n) = self.nodes.get_mut(seed) {
                    n.flags.remove(NodeFlags::SPLIT);
                }
            }

            let mut parts: Vec<Vec<NodeId>> = Vec::new();
            let mut seen = 0;
            for &seed in &seeds {
                if let Some(part) = self.collect_component(seed, graph, stamp) {
                    seen += part.len();
                    parts.push(part);
                    if parts.len() == 1 && seen == total {
                        break;
                    }
                }
            }
            if parts.len() <= 1 && seen == total {
                continue;
            }

            let members: Vec<NodeId> = self
                .graphs
                .get(graph)
                .map(|g| g.nodes.iter().copied().collect())
                .unwrap_or_default();
            for node in members {
                if let Some(part) = self.collect_component(node, graph, stamp) {
                    parts.push(part);
                }
            }
            if parts.len() <= 1 {
                continue;
            }

            // Deterministic retention: biggest part, then lowest node id.
            for part in &mut parts {
                part.sort_unstable();
            }
            let keep = parts
                .iter()
                .enumerate()
                .max_by_key(|(_, part)| (part.len(), Reverse(part.first().copied())))
                .map(|(i, _)| i)
                .unwrap_or(0);
            for (i, part) in parts.into_iter().enumerate() {
                if i != keep {
                    self.split_off(graph, part);
                }
            }
        }
    }

    /// Walk mergeable edges from `start` without leaving `graph`. Returns
    /// `None` if `start` was already visited with `stamp` or is not a member.
    fn collect_component(&mut self, start: NodeId, graph: GraphId, stamp: UpdateIter) -> Option<Vec<NodeId>> {
        let n = self.nodes.get_mut(start)?;
        if n.graph != Some(graph) || n.visited_in(stamp) {
            return None;
        }
        n.last_update = Some(stamp);

        let mut part = Vec::new();
        let mut frontier = vec![start];
        while let Some(current) = frontier.pop() {
            part.push(current);
            let targets: Vec<NodeId> = match self.nodes.get(current) {
                Some(cn) => cn.mergeable_targets().collect(),
                None => continue,
            };
            for target in targets {
                let Some(tn) = self.nodes.get_mut(target) else {
                    continue;
                };
                if tn.graph == Some(graph) && !tn.visited_in(stamp) {
                    tn.last_update = Some(stamp);
                    frontier.push(target);
                }
            }
        }
        Some(part)
    }

    /// Move `part` out of `from` into a new graph.
    fn split_off(&mut self, from: GraphId, part: Vec<NodeId>) {
        let Some(proto) = self.graphs.get(from).map(|g| g.proto) else {
            return;
        };
        let into = self.create_graph(proto);
        let moved = part.len();
        for node in part {
            let Some(n) = self.nodes.get_mut(node) else {
                continue;
            };
            debug_assert_eq!(n.graph, Some(from), "node {node:?} split twice in one pass");
            n.graph = Some(into);
            let flags = n.flags;
            if let Some(g) = self.graphs.get_mut(from) {
                g.nodes.remove(&node);
                g.merge_nodes.remove(&node);
                g.split_nodes.remove(&node);
            }
            if let Some(g) = self.graphs.get_mut(into) {
                g.nodes.insert(node);
                if flags.contains(NodeFlags::MERGE) {
                    g.merge_nodes.insert(node);
                    self.queues.queue_merge(into);
                }
                if flags.contains(NodeFlags::SPLIT) {
                    g.split_nodes.insert(node);
                    self.queues.queue_split(into);
                }
            }
        }

        trace!(?from, ?into, moved, "graph split");
        self.report.splits += 1;
        let pass = self.event_pass();
        self.emit(GraphEvent::GraphSplit { from, into, moved, pass });
    }

    // -----------------------------------------------------------------------
    // Phase: bookkeeping
    // -----------------------------------------------------------------------

    fn phase_bookkeeping(&mut self) {
        let empty: Vec<GraphId> = self
            .graphs
            .iter()
            .filter(|(_, g)| g.is_empty())
            .map(|(id, _)| id)
            .collect();
        for graph in empty {
            warn!(?graph, "destroying empty graph left behind by the pass");
            self.destroy_graph(graph);
        }

        if !self.config.validate_after_pass {
            return;
        }
        let violations = validation::check(self);
        if violations.is_empty() {
            return;
        }
        for violation in &violations {
            warn!(%violation, "connectivity invariant violated");
        }
        if self.config.self_heal {
            self.heal(&violations);
        }
    }
}
