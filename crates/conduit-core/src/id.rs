use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a physical entity known to the engine (a pipe segment, a
    /// wire, a fitting, or a proxy spawned on behalf of one).
    pub struct EntityId;

    /// Identifies a graph node. One node belongs to exactly one graph of one
    /// prototype.
    pub struct NodeId;

    /// Identifies a node graph (one connected component).
    pub struct GraphId;
}

/// Identifies a graph prototype in the registry. Graphs of different
/// prototypes never merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GraphProtoId(pub u32);

/// Identifies a node prototype in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeProtoId(pub u32);

/// Identifies a poly-node prototype in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PolyProtoId(pub u32);

/// Logical key under which a poly node registers one of its proxies.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProxyKey(pub String);

impl ProxyKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProxyKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl std::fmt::Display for ProxyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Monotonic update counter.
///
/// Used both for pass numbers and for traversal stamps: each traversal phase
/// of a pass draws a fresh stamp, and nodes and graphs record the stamp of
/// the traversal that last visited them so no phase visits them twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UpdateIter(pub u64);

impl UpdateIter {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn proto_id_equality() {
        assert_eq!(GraphProtoId(0), GraphProtoId(0));
        assert_ne!(GraphProtoId(0), GraphProtoId(1));
        assert!(NodeProtoId(1) < NodeProtoId(2));
    }

    #[test]
    fn proxy_key_from_str() {
        let key = ProxyKey::from("pipe");
        assert_eq!(key.as_str(), "pipe");
        assert_eq!(key, ProxyKey::new(String::from("pipe")));
        assert_eq!(key.to_string(), "pipe");
    }

    #[test]
    fn update_iter_advances() {
        let iter = UpdateIter::default();
        assert_eq!(iter.next(), UpdateIter(1));
        assert!(iter.next() > iter);
    }

    #[test]
    fn stale_key_does_not_alias_new_slot() {
        let mut sm: SlotMap<NodeId, u32> = SlotMap::with_key();
        let old = sm.insert(1);
        sm.remove(old);
        let new = sm.insert(2);
        assert_ne!(old, new);
        assert!(sm.get(old).is_none());
        assert_eq!(sm.get(new), Some(&2));
    }
}
