//! Serde data file structs for prototype definitions.
//!
//! These structs define the on-disk format for graph, node, and poly
//! prototypes. They are deserialized from RON, JSON, or TOML data files and
//! then resolved into a [`Registry`](conduit_core::registry::Registry) by the
//! loader. Cross-references are by name.

use serde::Deserialize;
use std::collections::BTreeMap;

/// A graph prototype definition.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphProtoData {
    pub name: String,
    /// Base overlay tint as `[r, g, b]`. White if omitted.
    #[serde(default)]
    pub color: Option<[u8; 3]>,
}

/// A node prototype definition.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeProtoData {
    pub name: String,
    /// Name of the graph prototype its nodes join.
    pub graph: String,
}

/// A poly-node prototype definition.
#[derive(Debug, Clone, Deserialize)]
pub struct PolyProtoData {
    pub name: String,
    /// Proxy key -> node prototype name.
    pub proxies: BTreeMap<String, String>,
    /// The key served by the host's own node, if any.
    #[serde(default)]
    pub proxy_self: Option<String>,
}

/// Contents of a `prototypes` data file. Every section may be omitted.
///
/// RON: `(graphs: [...], nodes: [...], polys: [...])`; TOML: `[[graphs]]`,
/// `[[nodes]]`, `[[polys]]` tables; JSON: an object with the same keys.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PrototypeFile {
    pub graphs: Vec<GraphProtoData>,
    pub nodes: Vec<NodeProtoData>,
    pub polys: Vec<PolyProtoData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ron_prototypes() {
        let file: PrototypeFile = ron::from_str(
            r#"(
                graphs: [(name: "gas", color: Some((80, 160, 255)))],
                nodes: [(name: "pipe", graph: "gas")],
                polys: [(name: "tank", proxies: {"in": "pipe", "out": "pipe"}, proxy_self: Some("in"))],
            )"#,
        )
        .unwrap();

        assert_eq!(file.graphs[0].color, Some([80, 160, 255]));
        assert_eq!(file.nodes[0].graph, "gas");
        assert_eq!(file.polys[0].proxies.len(), 2);
        assert_eq!(file.polys[0].proxy_self.as_deref(), Some("in"));
    }

    #[test]
    fn toml_prototypes() {
        let file: PrototypeFile = toml::from_str(
            r#"
[[graphs]]
name = "power"

[[nodes]]
name = "wire"
graph = "power"

[[polys]]
name = "pole"
proxies = { wire = "wire" }
"#,
        )
        .unwrap();

        assert_eq!(file.graphs[0].color, None);
        assert_eq!(file.polys[0].proxies["wire"], "wire");
        assert!(file.polys[0].proxy_self.is_none());
    }

    #[test]
    fn sections_default_to_empty() {
        let file: PrototypeFile = serde_json::from_str(r#"{"graphs": [{"name": "gas"}]}"#).unwrap();
        assert_eq!(file.graphs.len(), 1);
        assert!(file.nodes.is_empty());
        assert!(file.polys.is_empty());
    }
}
