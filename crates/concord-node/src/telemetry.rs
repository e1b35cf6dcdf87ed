//! Tracing initialisation.

use crate::config::NodeConfig;
use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `config.log_filter`.
///
/// `RUST_LOG` takes precedence when set. Returns `false` when a global
/// subscriber was already installed, which is not an error.
pub fn init_tracing(config: &NodeConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
