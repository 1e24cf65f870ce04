//! Runtime configuration shared by every task of a topology.
//!
//! Keys follow the dotted names used by topology configuration files:
//!
//! ```rust
//! use stormweave::config::TopologyConfig;
//!
//! let config = TopologyConfig::from_json_str(
//!   r#"{ "topology.acker.executors": 2, "topology.message.timeout.secs": 10 }"#,
//! ).unwrap();
//! assert_eq!(config.ackers, 2);
//! assert!(config.reliability_enabled());
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_ackers() -> u32 {
  1
}

fn default_message_timeout_secs() -> u64 {
  30
}

fn default_tick_interval_millis() -> u64 {
  100
}

/// Read-only configuration consulted when tasks are constructed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyConfig {
  /// Number of completion tracker tasks. Zero disables reliability.
  #[serde(rename = "topology.acker.executors", default = "default_ackers")]
  pub ackers: u32,
  /// Seconds a tuple tree may stay incomplete before it is failed.
  #[serde(
    rename = "topology.message.timeout.secs",
    default = "default_message_timeout_secs"
  )]
  pub message_timeout_secs: u64,
  /// Logs every emission and immediate ack at `info`.
  #[serde(rename = "topology.debug", default)]
  pub debug: bool,
  /// Upper bound on in-flight reliable emissions per source task.
  #[serde(rename = "topology.max.spout.pending", default)]
  pub max_spout_pending: Option<usize>,
  /// How often executors evict timed out entries.
  #[serde(
    rename = "topology.tick.interval.millis",
    default = "default_tick_interval_millis"
  )]
  pub tick_interval_millis: u64,
}

impl Default for TopologyConfig {
  fn default() -> Self {
    Self {
      ackers: default_ackers(),
      message_timeout_secs: default_message_timeout_secs(),
      debug: false,
      max_spout_pending: None,
      tick_interval_millis: default_tick_interval_millis(),
    }
  }
}

impl TopologyConfig {
  /// Parses and validates a JSON configuration document.
  pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
    let config: TopologyConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
  }

  /// Sets the tracker task count.
  pub fn with_ackers(mut self, ackers: u32) -> Self {
    self.ackers = ackers;
    self
  }

  /// Sets the message timeout in whole seconds.
  pub fn with_message_timeout_secs(mut self, secs: u64) -> Self {
    self.message_timeout_secs = secs;
    self
  }

  /// Enables or disables debug logging of emissions.
  pub fn with_debug(mut self, debug: bool) -> Self {
    self.debug = debug;
    self
  }

  /// Bounds the number of in-flight reliable emissions per source task.
  pub fn with_max_spout_pending(mut self, max: Option<usize>) -> Self {
    self.max_spout_pending = max;
    self
  }

  /// Sets the eviction tick interval in milliseconds.
  pub fn with_tick_interval_millis(mut self, millis: u64) -> Self {
    self.tick_interval_millis = millis;
    self
  }

  /// Returns true when at least one tracker task is configured.
  pub fn reliability_enabled(&self) -> bool {
    self.ackers > 0
  }

  /// Message timeout as a duration.
  pub fn message_timeout(&self) -> Duration {
    Duration::from_secs(self.message_timeout_secs)
  }

  /// Eviction tick interval as a duration.
  pub fn tick_interval(&self) -> Duration {
    Duration::from_millis(self.tick_interval_millis)
  }

  /// Checks value ranges.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.message_timeout_secs == 0 {
      return Err(ConfigError::Invalid {
        key: "topology.message.timeout.secs",
        reason: "must be greater than zero".to_string(),
      });
    }
    if self.tick_interval_millis == 0 {
      return Err(ConfigError::Invalid {
        key: "topology.tick.interval.millis",
        reason: "must be greater than zero".to_string(),
      });
    }
    if self.max_spout_pending == Some(0) {
      return Err(ConfigError::Invalid {
        key: "topology.max.spout.pending",
        reason: "must be greater than zero when set".to_string(),
      });
    }
    Ok(())
  }
}
