//! Multi-graph membership through proxies.
//!
//! A [`GraphNode`](crate::node::GraphNode) belongs to one graph of one
//! prototype. An entity that must sit in several unrelated graphs (a fitting
//! that is both a pipe joint and a wire junction) carries a [`PolyNode`]
//! instead: a keyed table of proxy entities, each carrying one node plus a
//! [`ProxyNode`] pointing back at the host.

use crate::id::*;
use crate::registry::PolyProtoDef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attached to a host entity that participates in several graphs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolyNode {
    /// Node prototype to instantiate for each proxy key.
    pub proxy_prototypes: BTreeMap<ProxyKey, NodeProtoId>,
    /// Key under which the host itself carries the node, instead of a
    /// separate proxy entity.
    pub proxy_self: Option<ProxyKey>,
    /// Proxies created so far. Populated lazily by `Engine::ensure_proxy`.
    pub proxy_nodes: BTreeMap<ProxyKey, EntityId>,
}

impl PolyNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style: register a proxy prototype under `key`.
    pub fn with_proxy(mut self, key: impl Into<ProxyKey>, proto: NodeProtoId) -> Self {
        self.proxy_prototypes.insert(key.into(), proto);
        self
    }

    /// Builder-style: make the host itself the proxy for `key`.
    pub fn with_proxy_self(mut self, key: impl Into<ProxyKey>) -> Self {
        self.proxy_self = Some(key.into());
        self
    }

    /// Instantiate from a registry prototype. No proxies exist yet.
    pub fn from_proto(def: &PolyProtoDef) -> Self {
        Self {
            proxy_prototypes: def.proxies.clone(),
            proxy_self: def.proxy_self.clone(),
            proxy_nodes: BTreeMap::new(),
        }
    }

    pub fn is_proxy_self(&self, key: &ProxyKey) -> bool {
        self.proxy_self.as_ref() == Some(key)
    }

    pub fn proxy(&self, key: &ProxyKey) -> Option<EntityId> {
        self.proxy_nodes.get(key).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ProxyKey> {
        self.proxy_prototypes.keys()
    }
}

/// Marks an entity as standing in for a poly-node host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyNode {
    /// The poly-node host.
    pub proxy_for: EntityId,
    /// The key it is registered under on the host.
    pub proxy_key: ProxyKey,
}
