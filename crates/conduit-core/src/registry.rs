use crate::graph::DebugColor;
use crate::id::*;
use std::collections::{BTreeMap, HashMap};

/// A graph prototype: the type tag that decides which nodes may share a graph.
#[derive(Debug, Clone)]
pub struct GraphProtoDef {
    pub name: String,
    /// Base tint for the debug overlay colors of graphs of this prototype.
    pub color: DebugColor,
}

/// A node prototype: which graph prototype its nodes join.
#[derive(Debug, Clone)]
pub struct NodeProtoDef {
    pub name: String,
    pub graph: GraphProtoId,
}

/// A poly-node prototype: the proxies a multi-graph host can carry.
#[derive(Debug, Clone)]
pub struct PolyProtoDef {
    pub name: String,
    pub proxies: BTreeMap<ProxyKey, NodeProtoId>,
    pub proxy_self: Option<ProxyKey>,
}

/// Builder for constructing an immutable Registry.
/// Three-phase lifecycle: registration -> mutation -> finalization.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    graphs: Vec<GraphProtoDef>,
    graph_name_to_id: HashMap<String, GraphProtoId>,
    nodes: Vec<NodeProtoDef>,
    node_name_to_id: HashMap<String, NodeProtoId>,
    polys: Vec<PolyProtoDef>,
    poly_name_to_id: HashMap<String, PolyProtoId>,
    duplicates: Vec<String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase 1: Register a graph prototype. Returns its ID.
    pub fn register_graph(&mut self, name: &str, color: DebugColor) -> GraphProtoId {
        let id = GraphProtoId(self.graphs.len() as u32);
        self.graphs.push(GraphProtoDef {
            name: name.to_string(),
            color,
        });
        if self.graph_name_to_id.insert(name.to_string(), id).is_some() {
            self.duplicates.push(name.to_string());
        }
        id
    }

    /// Phase 1: Register a node prototype joining graphs of `graph`.
    pub fn register_node(&mut self, name: &str, graph: GraphProtoId) -> NodeProtoId {
        let id = NodeProtoId(self.nodes.len() as u32);
        self.nodes.push(NodeProtoDef {
            name: name.to_string(),
            graph,
        });
        if self.node_name_to_id.insert(name.to_string(), id).is_some() {
            self.duplicates.push(name.to_string());
        }
        id
    }

    /// Phase 1: Register a poly-node prototype.
    pub fn register_poly(
        &mut self,
        name: &str,
        proxies: BTreeMap<ProxyKey, NodeProtoId>,
        proxy_self: Option<ProxyKey>,
    ) -> PolyProtoId {
        let id = PolyProtoId(self.polys.len() as u32);
        self.polys.push(PolyProtoDef {
            name: name.to_string(),
            proxies,
            proxy_self,
        });
        if self.poly_name_to_id.insert(name.to_string(), id).is_some() {
            self.duplicates.push(name.to_string());
        }
        id
    }

    /// Phase 2: Mutate an existing graph prototype by name.
    pub fn mutate_graph<F>(&mut self, name: &str, f: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut GraphProtoDef),
    {
        let id = self
            .graph_name_to_id
            .get(name)
            .ok_or(RegistryError::NotFound(name.to_string()))?;
        f(&mut self.graphs[id.0 as usize]);
        Ok(())
    }

    /// Lookup graph prototype ID by name.
    pub fn graph_id(&self, name: &str) -> Option<GraphProtoId> {
        self.graph_name_to_id.get(name).copied()
    }

    /// Lookup node prototype ID by name.
    pub fn node_id(&self, name: &str) -> Option<NodeProtoId> {
        self.node_name_to_id.get(name).copied()
    }

    /// Phase 3: Finalize and build the immutable registry.
    pub fn build(self) -> Result<Registry, RegistryError> {
        if let Some(name) = self.duplicates.into_iter().next() {
            return Err(RegistryError::DuplicateName(name));
        }

        for node in &self.nodes {
            if node.graph.0 as usize >= self.graphs.len() {
                return Err(RegistryError::InvalidGraphRef(node.graph));
            }
        }

        for poly in &self.polys {
            for &proto in poly.proxies.values() {
                if proto.0 as usize >= self.nodes.len() {
                    return Err(RegistryError::InvalidNodeRef(proto));
                }
            }
            if let Some(key) = &poly.proxy_self
                && !poly.proxies.contains_key(key)
            {
                return Err(RegistryError::UnknownProxySelf {
                    poly: poly.name.clone(),
                    key: key.clone(),
                });
            }
        }

        Ok(Registry {
            graphs: self.graphs,
            graph_name_to_id: self.graph_name_to_id,
            nodes: self.nodes,
            node_name_to_id: self.node_name_to_id,
            polys: self.polys,
            poly_name_to_id: self.poly_name_to_id,
        })
    }
}

/// Immutable registry. Frozen after build(). Thread-safe to share.
#[derive(Debug, Default)]
pub struct Registry {
    graphs: Vec<GraphProtoDef>,
    graph_name_to_id: HashMap<String, GraphProtoId>,
    nodes: Vec<NodeProtoDef>,
    node_name_to_id: HashMap<String, NodeProtoId>,
    polys: Vec<PolyProtoDef>,
    poly_name_to_id: HashMap<String, PolyProtoId>,
}

impl Registry {
    pub fn get_graph(&self, id: GraphProtoId) -> Option<&GraphProtoDef> {
        self.graphs.get(id.0 as usize)
    }

    pub fn get_node(&self, id: NodeProtoId) -> Option<&NodeProtoDef> {
        self.nodes.get(id.0 as usize)
    }

    pub fn get_poly(&self, id: PolyProtoId) -> Option<&PolyProtoDef> {
        self.polys.get(id.0 as usize)
    }

    pub fn graph_id(&self, name: &str) -> Option<GraphProtoId> {
        self.graph_name_to_id.get(name).copied()
    }

    pub fn node_id(&self, name: &str) -> Option<NodeProtoId> {
        self.node_name_to_id.get(name).copied()
    }

    pub fn poly_id(&self, name: &str) -> Option<PolyProtoId> {
        self.poly_name_to_id.get(name).copied()
    }

    /// Graph prototype joined by nodes of `node`.
    pub fn graph_of(&self, node: NodeProtoId) -> Option<GraphProtoId> {
        self.get_node(node).map(|def| def.graph)
    }

    pub fn graph_count(&self) -> usize {
        self.graphs.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn poly_count(&self) -> usize {
        self.polys.len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("duplicate prototype name: {0}")]
    DuplicateName(String),
    #[error("invalid graph prototype reference: {0:?}")]
    InvalidGraphRef(GraphProtoId),
    #[error("invalid node prototype reference: {0:?}")]
    InvalidNodeRef(NodeProtoId),
    #[error("poly prototype '{poly}' uses unknown proxy_self key '{key}'")]
    UnknownProxySelf { poly: String, key: ProxyKey },
}
