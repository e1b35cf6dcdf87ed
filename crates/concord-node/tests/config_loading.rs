//! Node Configuration Loading Tests

#![allow(clippy::unwrap_used)]

use concord_core::{ConcordError, ConfigValidation};
use concord_node::{telemetry, NodeConfig};
use std::io::Write;

fn write_config(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn loads_toml_file() {
    let file = write_config(
        ".toml",
        r#"
node_id = "alpha"
log_filter = "concord=debug"
dispose_timeout_ms = 250
"#,
    );

    let config = NodeConfig::load_from_file(file.path()).unwrap();

    assert_eq!(config.node_id.as_deref(), Some("alpha"));
    assert_eq!(config.log_filter, "concord=debug");
    assert_eq!(config.dispose_timeout_ms, 250);
    assert!(config.validate().is_ok());
}

#[test]
fn loads_json_file() {
    let file = write_config(".json", r#"{"node_id": "beta"}"#);

    let config = NodeConfig::load_from_file(file.path()).unwrap();

    assert_eq!(config.node_id.as_deref(), Some("beta"));
    assert_eq!(config.dispose_timeout_ms, NodeConfig::default().dispose_timeout_ms);
}

#[test]
fn rejects_unknown_extension_and_missing_file() {
    let file = write_config(".yaml", "node_id: gamma");

    assert!(matches!(
        NodeConfig::load_from_file(file.path()),
        Err(ConcordError::Configuration { .. })
    ));
    assert!(matches!(
        NodeConfig::load_from_file("/definitely/not/here.toml"),
        Err(ConcordError::Configuration { .. })
    ));
}

#[test]
fn rejects_malformed_toml() {
    let file = write_config(".toml", "node_id = ");

    assert!(matches!(
        NodeConfig::load_from_file(file.path()),
        Err(ConcordError::Configuration { .. })
    ));
}

#[test]
fn loaded_node_id_is_validated() {
    let file = write_config(".toml", r#"node_id = "a:b""#);
    let config = NodeConfig::load_from_file(file.path()).unwrap();

    assert!(matches!(
        config.validate(),
        Err(ConcordError::Configuration { .. })
    ));
}

#[test]
fn tracing_init_is_idempotent() {
    let config = NodeConfig::default();
    let _ = telemetry::init_tracing(&config);

    assert!(!telemetry::init_tracing(&config));
}
