//! Per-task counters.
//!
//! Collectors and the tracker update a [`TaskStats`] in place as records move
//! through them. Aggregation across tasks is left to whoever reads the
//! snapshots.

use std::collections::BTreeMap;
use std::time::Duration;

/// Counters kept by one task, keyed by stream where it matters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskStats {
  emitted: BTreeMap<String, u64>,
  transferred: BTreeMap<String, u64>,
  acked: BTreeMap<String, u64>,
  failed: BTreeMap<String, u64>,
  complete_latency_total: Duration,
  complete_latency_count: u64,
}

impl TaskStats {
  /// Creates zeroed counters.
  pub fn new() -> Self {
    Self::default()
  }

  pub(crate) fn record_emit(&mut self, stream: &str, destinations: usize) {
    *self.emitted.entry(stream.to_string()).or_default() += 1;
    *self.transferred.entry(stream.to_string()).or_default() += destinations as u64;
  }

  pub(crate) fn record_ack(&mut self, stream: &str, latency: Option<Duration>) {
    *self.acked.entry(stream.to_string()).or_default() += 1;
    if let Some(latency) = latency {
      self.complete_latency_total += latency;
      self.complete_latency_count += 1;
    }
  }

  pub(crate) fn record_fail(&mut self, stream: &str) {
    *self.failed.entry(stream.to_string()).or_default() += 1;
  }

  /// Records emitted on `stream`.
  pub fn emitted(&self, stream: &str) -> u64 {
    self.emitted.get(stream).copied().unwrap_or(0)
  }

  /// Tuples transferred for records emitted on `stream` (one per destination).
  pub fn transferred(&self, stream: &str) -> u64 {
    self.transferred.get(stream).copied().unwrap_or(0)
  }

  /// Acks observed on `stream`.
  pub fn acked(&self, stream: &str) -> u64 {
    self.acked.get(stream).copied().unwrap_or(0)
  }

  /// Failures observed on `stream`.
  pub fn failed(&self, stream: &str) -> u64 {
    self.failed.get(stream).copied().unwrap_or(0)
  }

  /// Total records emitted across streams.
  pub fn total_emitted(&self) -> u64 {
    self.emitted.values().sum()
  }

  /// Mean time from reliable emission to ack callback.
  pub fn average_complete_latency(&self) -> Option<Duration> {
    if self.complete_latency_count == 0 {
      return None;
    }
    let count = u32::try_from(self.complete_latency_count).unwrap_or(u32::MAX);
    Some(self.complete_latency_total / count)
  }
}
