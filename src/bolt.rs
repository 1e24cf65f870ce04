//! # Intermediate Operators
//!
//! A [`Bolt`] processes input tuples and may emit new ones anchored on them.
//! Its [`OutputCollector`] keeps the checksum tree balanced:
//!
//! - emitting a child anchored on an input issues a fresh edge id per
//!   destination, stores it in the child's message id under each of the
//!   input's roots, and XORs it into the input's `ack_val`;
//! - acking the input sends `edge ^ ack_val` to the tracker for each root,
//!   which cancels the input's own edge and adds every child edge at once.
//!
//! The tracker's accumulator therefore returns to zero only after every
//! descendant has been acked, whatever order the acks arrive in.

use crate::config::TopologyConfig;
use crate::error::{ErrorReporter, ReportedError};
use crate::send_targets::TaskSendTargets;
use crate::stats::TaskStats;
use crate::topology::TopologyContext;
use crate::tracking::TrackingRecord;
use crate::transfer::Transfer;
use crate::tuple::{MessageId, RootId, TaskId, Tuple, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// A task processing tuples from upstream components.
pub trait Bolt: Send + 'static {
  /// Called once before the first `execute`.
  fn prepare(&mut self, _context: &TopologyContext) {}

  /// Processes one input. Implementations ack or fail `input` through
  /// `collector` once they are done with it.
  fn execute(&mut self, input: Tuple, collector: &mut OutputCollector);

  /// Called once when the task shuts down.
  fn cleanup(&mut self) {}
}

/// Emission coordinator owned by one operator task.
pub struct OutputCollector {
  context: Arc<TopologyContext>,
  targets: TaskSendTargets,
  transfer: Arc<dyn Transfer>,
  reporter: Arc<dyn ErrorReporter>,
  ackers: u32,
  rng: StdRng,
  stats: TaskStats,
}

impl OutputCollector {
  /// Creates a collector for the task in `targets`' context.
  pub fn new(
    targets: TaskSendTargets,
    transfer: Arc<dyn Transfer>,
    reporter: Arc<dyn ErrorReporter>,
    config: &TopologyConfig,
  ) -> Self {
    Self {
      context: Arc::clone(targets.context()),
      targets,
      transfer,
      reporter,
      ackers: config.ackers,
      rng: StdRng::from_entropy(),
      stats: TaskStats::new(),
    }
  }

  /// Reseeds the generator used for edge ids.
  pub fn with_seed(mut self, seed: u64) -> Self {
    self.rng = StdRng::seed_from_u64(seed);
    self
  }

  /// Context of the owning task.
  pub fn context(&self) -> &TopologyContext {
    &self.context
  }

  /// Routes and sends `values` on `stream`, anchored on `anchors`.
  pub fn emit(
    &mut self,
    stream: &str,
    anchors: &mut [&mut Tuple],
    values: Vec<Value>,
  ) -> Vec<TaskId> {
    match self.targets.get(stream, &values) {
      Ok(out_tasks) => {
        self.send(stream, anchors, values, &out_tasks);
        out_tasks
      }
      Err(e) => {
        self.report_error(e);
        Vec::new()
      }
    }
  }

  /// Sends `values` on `stream` to `task`, anchored on `anchors`.
  pub fn emit_direct(
    &mut self,
    task: TaskId,
    stream: &str,
    anchors: &mut [&mut Tuple],
    values: Vec<Value>,
  ) {
    match self.targets.get_direct(task, stream, &values) {
      Ok(out_tasks) => self.send(stream, anchors, values, &out_tasks),
      Err(e) => self.report_error(e),
    }
  }

  fn send(
    &mut self,
    stream: &str,
    anchors: &mut [&mut Tuple],
    values: Vec<Value>,
    out_tasks: &[TaskId],
  ) {
    if out_tasks.is_empty() {
      return;
    }
    for &out_task in out_tasks {
      let mut anchors_to_ids: BTreeMap<RootId, u64> = BTreeMap::new();
      if self.ackers > 0 {
        for anchor in anchors.iter_mut() {
          if !anchor.message_id().is_anchored() {
            continue;
          }
          let edge = self.rng.r#gen::<u64>();
          anchor.update_ack_val(edge);
          for root in anchor.message_id().roots() {
            *anchors_to_ids.entry(root).or_insert(0) ^= edge;
          }
        }
      }
      let tuple = Tuple::new(
        self.context.task_id(),
        stream,
        values.clone(),
        MessageId::from_anchors(anchors_to_ids),
      );
      self.transfer.transfer(out_task, tuple);
    }
    self.stats.record_emit(stream, out_tasks.len());
    trace!(task_id = self.context.task_id(), stream, tasks = ?out_tasks, "emitting");
  }

  /// Marks `input` fully processed, including every child anchored on it.
  pub fn ack(&mut self, input: &Tuple) {
    if self.ackers == 0 {
      return;
    }
    for (&root, &edge) in input.message_id().anchors() {
      self.send_tracking(TrackingRecord::Ack {
        root,
        ack_val: edge ^ input.ack_val(),
      });
    }
    self.stats.record_ack(input.stream(), None);
  }

  /// Fails every tree `input` belongs to.
  pub fn fail(&mut self, input: &Tuple) {
    if self.ackers == 0 {
      return;
    }
    for root in input.message_id().roots() {
      self.send_tracking(TrackingRecord::Fail { root });
    }
    self.stats.record_fail(input.stream());
  }

  fn send_tracking(&mut self, record: TrackingRecord) {
    if let Err(e) = self.targets.send_tracking(self.transfer.as_ref(), record) {
      self.report_error(e);
    }
  }

  /// Counters of this task.
  pub fn stats(&self) -> &TaskStats {
    &self.stats
  }

  /// Hands `cause` to the error-reporting capability.
  pub fn report_error(&self, cause: impl ToString) {
    let error = ReportedError::new(self.context.task_id(), self.context.component_id(), cause);
    self.reporter.report(&error);
  }
}

impl fmt::Debug for OutputCollector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("OutputCollector")
      .field("task_id", &self.context.task_id())
      .field("ackers", &self.ackers)
      .finish()
  }
}
