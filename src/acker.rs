//! # Completion Tracker
//!
//! The tracker keeps one 64-bit accumulator per in-flight root id and XORs
//! every contribution it receives into it:
//!
//! - the source's init record adds the XOR of the edges it issued;
//! - each ack adds `edge ^ children`, removing the acked tuple's edge and
//!   adding the edges of the children anchored on it.
//!
//! Every edge is therefore added exactly twice once the whole tree has been
//! acked, and the accumulator is zero. A stray or missing ack leaves a random
//! residue, which is non-zero with overwhelming probability. Memory use is
//! one entry per root no matter how large or deep the tree is.
//!
//! Records may arrive in any order: an ack from a downstream task can beat
//! the source's init. An accumulator only completes after its init has been
//! seen, since that is what names the task to call back.
//!
//! Resolved roots are remembered for one timeout period. Acks and fails
//! arriving for them in that window are dropped, so the stragglers of a
//! failed tree never reopen an accumulator.
//!
//! The timeout counts from the last record applied to an accumulator, not
//! from the init. A tree that keeps receiving acks stays open at the
//! tracker; the source's own pending registry, which never refreshes,
//! still fails it on time.

use crate::config::TopologyConfig;
use crate::error::{ErrorReporter, ReportedError};
use crate::expiring::ExpiringMap;
use crate::stats::TaskStats;
use crate::topology::TopologyContext;
use crate::tracking::{Outcome, TrackerCallback, TrackingRecord};
use crate::transfer::Transfer;
use crate::tuple::{ACKER_ACK_STREAM_ID, ACKER_FAIL_STREAM_ID, RootId, TaskId, Tuple};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Running state of one tuple tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Accumulator {
  /// XOR of every contribution received so far.
  pub checksum: u64,
  /// Source task, known once the init record arrived.
  pub spout_task: Option<TaskId>,
  /// A fail arrived before the init record.
  pub failed: bool,
}

/// One tracker task.
pub struct Acker {
  context: Arc<TopologyContext>,
  transfer: Arc<dyn Transfer>,
  reporter: Arc<dyn ErrorReporter>,
  pending: ExpiringMap<RootId, Accumulator>,
  resolved: ExpiringMap<RootId, ()>,
  stats: TaskStats,
}

impl Acker {
  /// Creates a tracker with the configured message timeout.
  pub fn new(
    context: Arc<TopologyContext>,
    transfer: Arc<dyn Transfer>,
    reporter: Arc<dyn ErrorReporter>,
    config: &TopologyConfig,
  ) -> Self {
    Self {
      context,
      transfer,
      reporter,
      pending: ExpiringMap::new(config.message_timeout()),
      resolved: ExpiringMap::new(config.message_timeout()),
      stats: TaskStats::new(),
    }
  }

  /// Handles one tuple received on an acking stream.
  pub fn process(&mut self, tuple: &Tuple, now: Instant) {
    match TrackingRecord::from_tuple(tuple) {
      Some(record) => self.handle(record, now),
      None => {
        let error = ReportedError::new(
          self.context.task_id(),
          self.context.component_id(),
          format!(
            "malformed tracking tuple on stream `{}` from task {}",
            tuple.stream(),
            tuple.source_task()
          ),
        );
        self.reporter.report(&error);
      }
    }
  }

  /// Folds `record` into its accumulator and calls back the source when the
  /// tree is resolved.
  pub fn handle(&mut self, record: TrackingRecord, now: Instant) {
    let root = record.root();
    let late =
      !matches!(record, TrackingRecord::Init { .. }) && self.resolved.contains_key(&root);
    if late {
      debug!(root, ?record, "record for resolved tree dropped");
      return;
    }
    let entry = self.pending.upsert_with(root, now, Accumulator::default);
    match record {
      TrackingRecord::Init {
        ack_val,
        spout_task,
        ..
      } => {
        entry.checksum ^= ack_val;
        entry.spout_task = Some(spout_task);
      }
      TrackingRecord::Ack { ack_val, .. } => {
        entry.checksum ^= ack_val;
      }
      TrackingRecord::Fail { .. } => {
        entry.failed = true;
      }
    }
    let state = *entry;
    debug!(root, ?state, "tracking record applied");

    let Some(spout_task) = state.spout_task else {
      return;
    };
    if state.failed {
      self.pending.remove(&root);
      self.callback(spout_task, root, Outcome::Failed, now);
    } else if state.checksum == 0 {
      self.pending.remove(&root);
      self.callback(spout_task, root, Outcome::Acked, now);
    }
  }

  /// Evicts trees that did not complete within the timeout and fails them.
  pub fn expire(&mut self, now: Instant) -> usize {
    self.resolved.expire(now);
    let expired = self.pending.expire(now);
    let count = expired.len();
    for (root, state) in expired {
      match state.spout_task {
        Some(spout_task) => {
          debug!(root, spout_task, "tuple tree timed out");
          self.callback(spout_task, root, Outcome::Failed, now);
        }
        None => debug!(root, "dropping tuple tree that was never initialised"),
      }
    }
    count
  }

  fn callback(&mut self, spout_task: TaskId, root: RootId, outcome: Outcome, now: Instant) {
    self.resolved.insert(root, (), now);
    match outcome {
      Outcome::Acked => self.stats.record_ack(ACKER_ACK_STREAM_ID, None),
      Outcome::Failed => self.stats.record_fail(ACKER_FAIL_STREAM_ID),
    }
    let tuple = TrackerCallback { root, outcome }.into_tuple(self.context.task_id());
    self.transfer.transfer(spout_task, tuple);
  }

  /// Accumulator for `root`, if it is still in flight.
  pub fn accumulator(&self, root: RootId) -> Option<&Accumulator> {
    self.pending.get(&root)
  }

  /// Roots currently tracked.
  pub fn pending_count(&self) -> usize {
    self.pending.len()
  }

  /// Returns true when `root` resolved within the last timeout period.
  pub fn is_resolved(&self, root: RootId) -> bool {
    self.resolved.contains_key(&root)
  }

  /// Counters of this task.
  pub fn stats(&self) -> &TaskStats {
    &self.stats
  }

  /// Context of this tracker task.
  pub fn context(&self) -> &TopologyContext {
    &self.context
  }
}

impl fmt::Debug for Acker {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Acker")
      .field("task_id", &self.context.task_id())
      .field("pending", &self.pending.len())
      .finish()
  }
}
