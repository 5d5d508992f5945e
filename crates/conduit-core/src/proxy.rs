//! Poly-node hosts and their proxies.
//!
//! A proxy is a lightweight entity carrying exactly one node plus a
//! [`ProxyNode`] marker; the host's [`PolyNode`] maps each proxy key to it.
//! The key named by `proxy_self` is served by the host's own node instead.

use crate::engine::{EngineError, EntityData, Engine};
use crate::id::*;
use crate::poly::{PolyNode, ProxyNode};
use tracing::trace;

impl Engine {
    // -----------------------------------------------------------------------
    // Poly nodes
    // -----------------------------------------------------------------------

    /// Attach a poly node to `entity`.
    pub fn set_poly_node(&mut self, entity: EntityId, poly: PolyNode) -> Result<(), EngineError> {
        let data = self
            .entities
            .get_mut(entity)
            .ok_or(EngineError::UnknownEntity(entity))?;
        if data.poly.is_some() {
            return Err(EngineError::PolyAlreadyAttached(entity));
        }
        data.poly = Some(poly);
        Ok(())
    }

    /// Attach a poly node built from a registry prototype.
    pub fn add_poly_node(&mut self, entity: EntityId, proto: PolyProtoId) -> Result<(), EngineError> {
        let poly = self
            .registry
            .get_poly(proto)
            .map(PolyNode::from_proto)
            .ok_or(EngineError::UnknownPolyProto(proto))?;
        self.set_poly_node(entity, poly)
    }

    pub fn poly_node(&self, entity: EntityId) -> Option<&PolyNode> {
        self.entities.get(entity).and_then(|data| data.poly.as_ref())
    }

    // -----------------------------------------------------------------------
    // Proxies
    // -----------------------------------------------------------------------

    /// Make sure the proxy for `key` exists on `host` and return its node.
    ///
    /// The `proxy_self` key attaches a node to the host itself; every other
    /// key spawns a proxy entity on first use.
    pub fn ensure_proxy(&mut self, host: EntityId, key: &ProxyKey) -> Result<NodeId, EngineError> {
        let poly = self
            .entities
            .get(host)
            .ok_or(EngineError::UnknownEntity(host))?
            .poly
            .as_ref()
            .ok_or(EngineError::NotPolyNode(host))?;
        let proto = *poly
            .proxy_prototypes
            .get(key)
            .ok_or_else(|| EngineError::UnknownProxyKey {
                host,
                key: key.clone(),
            })?;
        let existing = poly.proxy(key).filter(|&e| self.entities.contains_key(e));

        let proxy_entity = if poly.is_proxy_self(key) {
            host
        } else if let Some(entity) = existing {
            entity
        } else {
            let entity = self.entities.insert(EntityData {
                proxy: Some(ProxyNode {
                    proxy_for: host,
                    proxy_key: key.clone(),
                }),
                ..Default::default()
            });
            trace!(?host, %key, proxy = ?entity, "spawned proxy");
            entity
        };

        let node = match self.node_of(proxy_entity) {
            Some(node) => {
                // A host node of another prototype cannot serve this key.
                if self.nodes.get(node).is_some_and(|n| n.node_proto != proto) {
                    return Err(EngineError::NodeAlreadyAttached(proxy_entity));
                }
                node
            }
            None => self.add_node(proxy_entity, proto)?,
        };
        if let Some(poly) = self.entities.get_mut(host).and_then(|d| d.poly.as_mut()) {
            poly.proxy_nodes.insert(key.clone(), proxy_entity);
        }
        Ok(node)
    }

    /// Ensure every proxy the host's poly node declares. Returns the nodes in
    /// key order.
    pub fn ensure_proxies(&mut self, host: EntityId) -> Result<Vec<NodeId>, EngineError> {
        let keys: Vec<ProxyKey> = self
            .poly_node(host)
            .ok_or(EngineError::NotPolyNode(host))?
            .keys()
            .cloned()
            .collect();
        keys.iter().map(|key| self.ensure_proxy(host, key)).collect()
    }

    /// Tear down the proxy for `key`: the proxy entity is despawned, or for
    /// the `proxy_self` key only the host's node is removed. Either way the
    /// node's graph re-checks its connectivity on the next pass.
    ///
    /// Returns `Ok(false)` if no such proxy exists.
    pub fn remove_proxy(&mut self, host: EntityId, key: &ProxyKey) -> Result<bool, EngineError> {
        let poly = self
            .entities
            .get_mut(host)
            .ok_or(EngineError::UnknownEntity(host))?
            .poly
            .as_mut()
            .ok_or(EngineError::NotPolyNode(host))?;
        let Some(entity) = poly.proxy_nodes.remove(key) else {
            return Ok(false);
        };

        if entity == host {
            if let Some(node) = self.node_of(host) {
                self.remove_node(node)?;
            }
        } else if self.entities.contains_key(entity) {
            self.despawn_entity(entity)?;
        }
        Ok(true)
    }

    /// The node serving `key` on `host`, if the proxy exists.
    pub fn proxy_node(&self, host: EntityId, key: &ProxyKey) -> Option<NodeId> {
        let entity = self.poly_node(host)?.proxy(key)?;
        self.node_of(entity)
    }

    // -----------------------------------------------------------------------
    // Host resolution
    // -----------------------------------------------------------------------

    /// The entity a node physically represents: a proxy's host, otherwise
    /// the node's owner.
    pub fn node_host(&self, node: NodeId) -> Option<EntityId> {
        let owner = self.nodes.get(node)?.owner;
        match self.entities.get(owner).and_then(|data| data.proxy.as_ref()) {
            Some(proxy) => Some(proxy.proxy_for),
            None => Some(owner),
        }
    }

    /// Every node standing for `entity`: its own node and its proxies'
    /// nodes, in key order.
    pub fn hosted_nodes(&self, entity: EntityId) -> Vec<NodeId> {
        let Some(data) = self.entities.get(entity) else {
            return Vec::new();
        };
        let mut nodes: Vec<NodeId> = data.node.into_iter().collect();
        if let Some(poly) = &data.poly {
            for &proxy in poly.proxy_nodes.values() {
                if let Some(node) = self.node_of(proxy)
                    && !nodes.contains(&node)
                {
                    nodes.push(node);
                }
            }
        }
        nodes
    }

    /// Queue edge reconciliation for every node standing for `entity`.
    pub fn queue_hosted_edge_updates(&mut self, entity: EntityId) -> Result<(), EngineError> {
        if !self.entities.contains_key(entity) {
            return Err(EngineError::UnknownEntity(entity));
        }
        for node in self.hosted_nodes(entity) {
            self.queue_edge_update(node)?;
        }
        Ok(())
    }
}
