use crate::config::TopologyConfig;
use crate::error::ConfigError;
use crate::logging;
use std::time::Duration;

#[test]
fn test_defaults() {
  let config = TopologyConfig::default();
  assert_eq!(config.ackers, 1);
  assert_eq!(config.message_timeout(), Duration::from_secs(30));
  assert_eq!(config.tick_interval(), Duration::from_millis(100));
  assert!(!config.debug);
  assert_eq!(config.max_spout_pending, None);
  assert!(config.validate().is_ok());
}

#[test]
fn test_from_json_uses_dotted_keys() {
  let config = TopologyConfig::from_json_str(
    r#"{
      "topology.acker.executors": 0,
      "topology.debug": true,
      "topology.max.spout.pending": 16
    }"#,
  )
  .unwrap();
  assert_eq!(config.ackers, 0);
  assert!(!config.reliability_enabled());
  assert!(config.debug);
  assert_eq!(config.max_spout_pending, Some(16));
  assert_eq!(config.message_timeout_secs, 30);
}

#[test]
fn test_empty_document_is_default() {
  assert_eq!(
    TopologyConfig::from_json_str("{}").unwrap(),
    TopologyConfig::default()
  );
}

#[test]
fn test_rejects_zero_timeout() {
  let err = TopologyConfig::from_json_str(r#"{ "topology.message.timeout.secs": 0 }"#).unwrap_err();
  assert!(matches!(
    err,
    ConfigError::Invalid {
      key: "topology.message.timeout.secs",
      ..
    }
  ));
}

#[test]
fn test_rejects_zero_max_pending_and_tick() {
  assert!(
    TopologyConfig::default()
      .with_max_spout_pending(Some(0))
      .validate()
      .is_err()
  );
  assert!(
    TopologyConfig::default()
      .with_tick_interval_millis(0)
      .validate()
      .is_err()
  );
}

#[test]
fn test_rejects_malformed_json() {
  let err = TopologyConfig::from_json_str(r#"{ "topology.acker.executors": "two" }"#).unwrap_err();
  assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_serializes_back_to_dotted_keys() {
  let json = serde_json::to_value(TopologyConfig::default().with_ackers(3)).unwrap();
  assert_eq!(json["topology.acker.executors"], 3);
  assert_eq!(json["topology.message.timeout.secs"], 30);
}

#[test]
fn test_logging_installs_once() {
  logging::init_for(&TopologyConfig::default().with_debug(true));
  assert!(!logging::init(false));
}
