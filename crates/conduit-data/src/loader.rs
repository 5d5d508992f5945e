//! Resolution pipeline: reads data files, resolves cross-references, builds
//! the registry and engine config.
//!
//! Provides format detection (RON/JSON/TOML), file discovery, and
//! deserialization helpers used by [`load_dir`].

use crate::schema::PrototypeFile;
use conduit_core::config::EngineConfig;
use conduit_core::graph::DebugColor;
use conduit_core::id::{GraphProtoId, NodeProtoId, PolyProtoId, ProxyKey};
use conduit_core::registry::{Registry, RegistryBuilder, RegistryError};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Base name of the prototype file.
pub const PROTOTYPES_FILE: &str = "prototypes";
/// Base name of the optional engine config file.
pub const CONFIG_FILE: &str = "config";

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    /// A duplicate name was found.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// The resolved prototypes were rejected by the registry.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a data file with the given base name (without extension).
///
/// Looks for `{base_name}.ron`, `{base_name}.toml`, and `{base_name}.json`.
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// multiple formats exist for the same base name.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;

    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing,
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

/// Like [`find_data_file`], but returns an error if no file is found.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let parse_error = |detail: String| DataLoadError::Parse {
        file: path.to_path_buf(),
        detail,
    };

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(e.to_string())),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string())),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(e.to_string())),
    }
}

// ===========================================================================
// Name resolution helpers
// ===========================================================================

/// Look up a name in a map, returning an `UnresolvedRef` error if not found.
pub fn resolve_name<'a, V>(
    map: &'a HashMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<&'a V, DataLoadError> {
    map.get(name).ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    })
}

/// Check whether a name already exists in a map, returning a `DuplicateName`
/// error if so.
pub fn check_duplicate<V>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

// ===========================================================================
// Pipeline
// ===========================================================================

/// Everything loaded from a data directory.
#[derive(Debug)]
pub struct LoadedData {
    pub registry: Registry,
    pub config: EngineConfig,
}

/// Resolve prototype definitions into a registry. `file` is only used in
/// error messages.
pub fn build_registry(data: &PrototypeFile, file: &Path) -> Result<Registry, DataLoadError> {
    let mut builder = RegistryBuilder::new();

    let mut graphs: HashMap<String, GraphProtoId> = HashMap::new();
    for graph in &data.graphs {
        check_duplicate(&graphs, &graph.name, file)?;
        let color = graph
            .color
            .map(|[r, g, b]| DebugColor::new(r, g, b))
            .unwrap_or_default();
        graphs.insert(graph.name.clone(), builder.register_graph(&graph.name, color));
    }

    let mut nodes: HashMap<String, NodeProtoId> = HashMap::new();
    for node in &data.nodes {
        check_duplicate(&nodes, &node.name, file)?;
        let graph = *resolve_name(&graphs, &node.graph, file, "graph prototype")?;
        nodes.insert(node.name.clone(), builder.register_node(&node.name, graph));
    }

    let mut polys: HashMap<String, PolyProtoId> = HashMap::new();
    for poly in &data.polys {
        check_duplicate(&polys, &poly.name, file)?;
        let proxies = poly
            .proxies
            .iter()
            .map(|(key, node)| {
                let proto = *resolve_name(&nodes, node, file, "node prototype")?;
                Ok((ProxyKey::new(key.as_str()), proto))
            })
            .collect::<Result<_, DataLoadError>>()?;
        let proxy_self = poly.proxy_self.as_deref().map(ProxyKey::new);
        polys.insert(
            poly.name.clone(),
            builder.register_poly(&poly.name, proxies, proxy_self),
        );
    }

    Ok(builder.build()?)
}

/// Load `prototypes.{ron,toml,json}` (required) and `config.{ron,toml,json}`
/// (optional; defaults apply) from `dir`.
pub fn load_dir(dir: &Path) -> Result<LoadedData, DataLoadError> {
    let prototypes_path = require_data_file(dir, PROTOTYPES_FILE)?;
    let prototypes: PrototypeFile = deserialize_file(&prototypes_path)?;
    let registry = build_registry(&prototypes, &prototypes_path)?;

    let config = match find_data_file(dir, CONFIG_FILE)? {
        Some(path) => deserialize_file(&path)?,
        None => EngineConfig::default(),
    };

    Ok(LoadedData { registry, config })
}

// ===========================================================================
// Tests
// ===========================================================================
