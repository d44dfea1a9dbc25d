//! `tracing` subscriber setup.
//!
//! Library code only emits events; binaries and tests call [`init`] once to
//! print them. `RUST_LOG` takes precedence over the configured directive.

use tracing_subscriber::EnvFilter;

use crate::executor::EngineConfig;

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (and then to `info` if that does not parse).
///
/// Returns `false` if a global subscriber was already installed, in which
/// case nothing changes. Safe to call more than once.
pub fn init(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// [`init`] with the directive from `config.log_filter`.
pub fn init_from_config(config: &EngineConfig) -> bool {
    init(&config.log_filter)
}
