//! Process-wide `tracing` subscriber setup.
//!
//! The level comes from `RUST_LOG` when set. Otherwise it is `info` with
//! `topology.debug` enabled and `warn` without.

use crate::config::TopologyConfig;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Installs a formatting subscriber. Returns false when one was already set.
pub fn init(debug: bool) -> bool {
  let default_level = if debug {
    LevelFilter::INFO
  } else {
    LevelFilter::WARN
  };
  let filter = EnvFilter::builder()
    .with_default_directive(default_level.into())
    .from_env_lossy();
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(true)
    .try_init()
    .is_ok()
}

/// Installs a subscriber for `config`.
pub fn init_for(config: &TopologyConfig) -> bool {
  init(config.debug)
}
