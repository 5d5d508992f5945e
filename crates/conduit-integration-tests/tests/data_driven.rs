//! Integration test: data-driven setup
//!
//! Loads prototypes and engine config from a data directory, then runs a
//! small grid through the loaded engine.

use conduit_core::engine::Engine;
use conduit_core::id::ProxyKey;
use conduit_data::load_dir;
use conduit_spatial::{ConnectorMask, GridLinker, GridPosition, Placement, SpatialIndex};
use std::fs;
use std::path::PathBuf;

fn make_test_dir(suffix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "conduit_integration_{suffix}_{}",
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

const PROTOTYPES: &str = r#"
[[graphs]]
name = "water"
color = [40, 120, 255]

[[graphs]]
name = "steam"

[[nodes]]
name = "water_pipe"
graph = "water"

[[nodes]]
name = "steam_pipe"
graph = "steam"

[[polys]]
name = "boiler"
proxy_self = "water"
proxies = { water = "water_pipe", steam = "steam_pipe" }
"#;

#[test]
fn loaded_registry_drives_a_boiler_network() {
    let dir = make_test_dir("boiler");
    fs::write(dir.join("prototypes.toml"), PROTOTYPES).unwrap();
    fs::write(
        dir.join("config.json"),
        r#"{"validate_after_pass": true, "edge_update_budget": 64}"#,
    )
    .unwrap();

    let loaded = load_dir(&dir).unwrap();
    assert_eq!(loaded.config.edge_update_budget, Some(64));
    let water_pipe = loaded.registry.node_id("water_pipe").unwrap();
    let steam_pipe = loaded.registry.node_id("steam_pipe").unwrap();
    let boiler = loaded.registry.poly_id("boiler").unwrap();
    let mut engine = Engine::new(loaded.registry, loaded.config);
    let mut index = SpatialIndex::new();

    let host = engine.spawn_entity();
    engine.add_poly_node(host, boiler).unwrap();
    engine.ensure_proxies(host).unwrap();
    index
        .place(host, Placement::new(GridPosition::new(0, 0), ConnectorMask::ALL))
        .unwrap();

    let mut place = |proto, x| {
        let entity = engine.spawn_entity();
        let node = engine.add_node(entity, proto).unwrap();
        index
            .place(entity, Placement::new(GridPosition::new(x, 0), ConnectorMask::ALL))
            .unwrap();
        node
    };
    let inlet = place(water_pipe, -1);
    let outlet = place(steam_pipe, 1);

    engine.update(&GridLinker::new(&index));

    let water = engine.proxy_node(host, &ProxyKey::from("water")).unwrap();
    let steam = engine.proxy_node(host, &ProxyKey::from("steam")).unwrap();
    assert!(engine.are_connected(inlet, water));
    assert!(engine.are_connected(outlet, steam));
    assert!(!engine.are_connected(water, steam));
    assert_eq!(engine.graph_count(), 2);
    assert!(conduit_core::validation::check(&engine).is_empty());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn conflicting_prototype_files_are_rejected() {
    let dir = make_test_dir("conflict");
    fs::write(dir.join("prototypes.toml"), PROTOTYPES).unwrap();
    fs::write(dir.join("prototypes.json"), "{}").unwrap();

    assert!(matches!(
        load_dir(&dir),
        Err(conduit_data::DataLoadError::ConflictingFormats { .. })
    ));

    let _ = fs::remove_dir_all(&dir);
}
