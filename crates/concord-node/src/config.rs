//! Node configuration.
//!
//! Loaded from TOML or JSON, then overlaid with `CONCORD_*` environment
//! variables. Validation runs in `Node::run` before any adapter I/O.

use concord_core::{ConcordError, ConfigValidation, ConfigValidator, NodeId, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding `node_id`
pub const ENV_NODE_ID: &str = "CONCORD_NODE_ID";
/// Environment variable overriding `log_filter`
pub const ENV_LOG: &str = "CONCORD_LOG";
/// Environment variable overriding `dispose_timeout_ms`
pub const ENV_DISPOSE_TIMEOUT_MS: &str = "CONCORD_DISPOSE_TIMEOUT_MS";

/// Configuration of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Stable node id; a random one is generated when absent
    pub node_id: Option<String>,
    /// `tracing_subscriber::EnvFilter` directive
    pub log_filter: String,
    /// Bound on each context/protocol teardown during shutdown; 0 disables
    pub dispose_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            log_filter: "info".to_string(),
            dispose_timeout_ms: 5_000,
        }
    }
}

impl NodeConfig {
    /// Configuration with a fixed node id
    pub fn with_node_id(node_id: impl Into<String>) -> Self {
        Self {
            node_id: Some(node_id.into()),
            ..Self::default()
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ConcordError::configuration(format!("Invalid TOML: {e}")))
    }

    /// Load from a `.toml` or `.json` file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConcordError::configuration(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| ConcordError::configuration(format!("Invalid JSON: {e}"))),
            _ => Err(ConcordError::configuration(format!(
                "Unsupported config file format: {}",
                path.display()
            ))),
        }
    }

    /// Overlay `CONCORD_*` environment variables
    pub fn merge_with_env(&mut self) -> Result<()> {
        self.merge_with_lookup(|name| std::env::var(name).ok())
    }

    /// Overlay values produced by `lookup`, keyed by environment variable name
    pub fn merge_with_lookup<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(node_id) = lookup(ENV_NODE_ID) {
            self.node_id = Some(node_id);
        }
        if let Some(filter) = lookup(ENV_LOG) {
            self.log_filter = filter;
        }
        if let Some(timeout) = lookup(ENV_DISPOSE_TIMEOUT_MS) {
            self.dispose_timeout_ms = timeout.parse().map_err(|_| {
                ConcordError::configuration(format!(
                    "Invalid timeout in {ENV_DISPOSE_TIMEOUT_MS}: {timeout}"
                ))
            })?;
        }
        Ok(())
    }

    /// Node id to run under, generating one when unset
    pub fn resolve_node_id(&self) -> NodeId {
        match &self.node_id {
            Some(id) => NodeId::new(id.clone()),
            None => NodeId::generate(),
        }
    }

    /// Per-resource teardown bound, if enabled
    pub fn dispose_timeout(&self) -> Option<Duration> {
        (self.dispose_timeout_ms > 0).then(|| Duration::from_millis(self.dispose_timeout_ms))
    }
}

impl ConfigValidation for NodeConfig {
    fn validate(&self) -> Result<()> {
        let mut validator = ConfigValidator::new();
        if let Some(node_id) = &self.node_id {
            validator
                .non_empty("node_id", node_id)
                .excludes("node_id", node_id, &[':']);
        }
        validator.non_empty("log_filter", &self.log_filter).custom(
            "log_filter",
            self.log_filter.as_str(),
            |filter| EnvFilter::try_new(filter).is_ok(),
            "not a valid tracing filter directive",
        );
        validator.result().map_err(Into::into)
    }
}
