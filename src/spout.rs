//! # Source Tasks and the Emission Coordinator
//!
//! A [`Spout`] originates tuples. It emits through a [`SpoutCollector`], which
//! routes every record, builds its envelope and, when the caller supplies a
//! message id and trackers are configured, turns the emission into a tracked
//! tuple tree:
//!
//! 1. a fresh root id is minted;
//! 2. each destination gets its own random edge id, anchored under the root;
//! 3. the emission is parked in the pending registry under the root id;
//! 4. an init record carrying the XOR of all edge ids goes to the tracker.
//!
//! The tree resolves exactly once, by whichever comes first: the tracker's
//! ack callback, its fail callback, or local expiry of the pending entry.
//! Resolutions queue up as [`Completion`]s that the executor hands back to
//! the spout's [`ack`](Spout::ack) and [`fail`](Spout::fail) on the spout's
//! own task.
//!
//! With a message id but no trackers configured, the emission is acked
//! immediately instead. Without a message id the tuple is unanchored and no
//! bookkeeping happens at all.

use crate::config::TopologyConfig;
use crate::error::{EmitError, ErrorReporter, ReportedError};
use crate::expiring::ExpiringMap;
use crate::send_targets::TaskSendTargets;
use crate::stats::TaskStats;
use crate::topology::TopologyContext;
use crate::tracking::{Outcome, TrackerCallback, TrackingRecord};
use crate::transfer::Transfer;
use crate::tuple::{MessageId, RootId, TaskId, Tuple, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// A task originating tuples.
pub trait Spout: Send + 'static {
  /// User message id echoed back through `ack` and `fail`.
  type MessageId: Clone + fmt::Debug + Send + 'static;

  /// Called once before the first `next_tuple`.
  fn open(&mut self, _context: &TopologyContext) {}

  /// Emits zero or more tuples through `collector`.
  fn next_tuple(&mut self, collector: &mut SpoutCollector<Self::MessageId>);

  /// The tuple tree started with `msg_id` was fully processed.
  fn ack(&mut self, _msg_id: Self::MessageId) {}

  /// The tuple tree started with `msg_id` failed or timed out.
  fn fail(&mut self, _msg_id: Self::MessageId) {}

  /// Called once when the task shuts down.
  fn close(&mut self) {}
}

/// A reliable emission awaiting resolution.
#[derive(Clone, Debug)]
pub struct PendingTuple<M> {
  /// Caller-supplied message id.
  pub message_id: M,
  /// Stream emitted on.
  pub stream: String,
  /// Emitted values, kept for replay decisions.
  pub values: Vec<Value>,
  /// When the emission happened.
  pub emitted_at: Instant,
}

/// A resolved emission ready to be handed back to the spout.
///
/// Completions are queued, never delivered from inside `emit`. The executor
/// drains them on its next pass, so an immediate ack for an emission made
/// without trackers reaches [`Spout::ack`] after `next_tuple` returns,
/// whatever the debug flag says; the flag only raises its log level.
#[derive(Clone, Debug, PartialEq)]
pub struct Completion<M> {
  /// Caller-supplied message id.
  pub message_id: M,
  /// Root id, absent for immediate acks.
  pub root: Option<RootId>,
  /// How the tree ended.
  pub outcome: Outcome,
  /// Stream emitted on.
  pub stream: String,
  /// Emitted values.
  pub values: Vec<Value>,
  /// Time between emission and resolution.
  pub latency: Duration,
}

/// Emission coordinator owned by one source task.
pub struct SpoutCollector<M> {
  context: Arc<TopologyContext>,
  targets: TaskSendTargets,
  transfer: Arc<dyn Transfer>,
  reporter: Arc<dyn ErrorReporter>,
  pending: ExpiringMap<RootId, PendingTuple<M>>,
  completions: VecDeque<Completion<M>>,
  ackers: u32,
  debug: bool,
  rng: StdRng,
  stats: TaskStats,
}

impl<M> SpoutCollector<M>
where
  M: Clone + fmt::Debug + Send + 'static,
{
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
      pending: ExpiringMap::new(config.message_timeout()),
      completions: VecDeque::new(),
      ackers: config.ackers,
      debug: config.debug,
      rng: StdRng::from_entropy(),
      stats: TaskStats::new(),
    }
  }

  /// Reseeds the generator used for root and edge ids.
  pub fn with_seed(mut self, seed: u64) -> Self {
    self.rng = StdRng::seed_from_u64(seed);
    self
  }

  /// Context of the owning task.
  pub fn context(&self) -> &TopologyContext {
    &self.context
  }

  /// Routes and sends `values` on `stream`.
  ///
  /// Returns the destination tasks; empty when nobody subscribes or when the
  /// emission was rejected and reported.
  pub fn emit(&mut self, stream: &str, values: Vec<Value>, message_id: Option<M>) -> Vec<TaskId> {
    match self.targets.get(stream, &values) {
      Ok(out_tasks) => self.send(stream, values, message_id, out_tasks),
      Err(e) => {
        self.report_emit_error(e);
        Vec::new()
      }
    }
  }

  /// Sends `values` on `stream` to `task`, which must subscribe directly.
  pub fn emit_direct(
    &mut self,
    task: TaskId,
    stream: &str,
    values: Vec<Value>,
    message_id: Option<M>,
  ) {
    match self.targets.get_direct(task, stream, &values) {
      Ok(out_tasks) => {
        self.send(stream, values, message_id, out_tasks);
      }
      Err(e) => self.report_emit_error(e),
    }
  }

  fn send(
    &mut self,
    stream: &str,
    values: Vec<Value>,
    message_id: Option<M>,
    out_tasks: Vec<TaskId>,
  ) -> Vec<TaskId> {
    if out_tasks.is_empty() {
      return out_tasks;
    }
    let task_id = self.context.task_id();
    let root = match message_id {
      Some(_) if self.ackers > 0 => Some(self.mint_root()),
      _ => None,
    };

    let mut ack_val = 0u64;
    for &out_task in &out_tasks {
      let msg_id = match root {
        Some(root) => {
          let edge = self.rng.r#gen::<u64>();
          ack_val ^= edge;
          MessageId::root(root, edge)
        }
        None => MessageId::unanchored(),
      };
      let tuple = Tuple::new(task_id, stream, values.clone(), msg_id);
      self.transfer.transfer(out_task, tuple);
    }
    self.stats.record_emit(stream, out_tasks.len());
    if self.debug {
      info!(task_id, stream, ?values, tasks = ?out_tasks, root = ?root, "emitting");
    } else {
      trace!(task_id, stream, tasks = ?out_tasks, root = ?root, "emitting");
    }

    let now = Instant::now();
    match (root, message_id) {
      (Some(root), Some(message_id)) => {
        self.pending.insert(
          root,
          PendingTuple {
            message_id,
            stream: stream.to_string(),
            values,
            emitted_at: now,
          },
          now,
        );
        let init = TrackingRecord::Init {
          root,
          ack_val,
          spout_task: task_id,
        };
        self.send_tracking(init);
      }
      (None, Some(message_id)) => {
        if self.debug {
          info!(task_id, stream, ?message_id, "acking unreliable emission");
        }
        self.stats.record_ack(stream, None);
        self.completions.push_back(Completion {
          message_id,
          root: None,
          outcome: Outcome::Acked,
          stream: stream.to_string(),
          values,
          latency: Duration::ZERO,
        });
      }
      _ => {}
    }
    out_tasks
  }

  fn mint_root(&mut self) -> RootId {
    loop {
      let root = self.rng.r#gen::<u64>();
      if !self.pending.contains_key(&root) {
        return root;
      }
    }
  }

  fn send_tracking(&mut self, record: TrackingRecord) {
    if let Err(e) = self.targets.send_tracking(self.transfer.as_ref(), record) {
      self.report_emit_error(e);
    }
  }

  /// Applies a tracker callback tuple. Callbacks for roots that already
  /// resolved are ignored.
  pub fn on_tracker_callback(&mut self, tuple: &Tuple, now: Instant) {
    match TrackerCallback::from_tuple(tuple) {
      Some(callback) => self.resolve(callback.root, callback.outcome, now),
      None => self.report_error(format!(
        "unexpected tuple on stream `{}` from task {}",
        tuple.stream(),
        tuple.source_task()
      )),
    }
  }

  /// Resolves the pending emission under `root`, if it is still pending.
  pub fn resolve(&mut self, root: RootId, outcome: Outcome, now: Instant) {
    let Some(pending) = self.pending.remove(&root) else {
      debug!(root, ?outcome, "callback for resolved root ignored");
      return;
    };
    self.complete(root, pending, outcome, now);
  }

  /// Fails every pending emission older than the message timeout.
  pub fn expire(&mut self, now: Instant) -> usize {
    let expired = self.pending.expire(now);
    let count = expired.len();
    for (root, pending) in expired {
      debug!(root, "pending emission timed out");
      self.complete(root, pending, Outcome::Failed, now);
    }
    count
  }

  fn complete(&mut self, root: RootId, pending: PendingTuple<M>, outcome: Outcome, now: Instant) {
    let latency = now.saturating_duration_since(pending.emitted_at);
    match outcome {
      Outcome::Acked => self.stats.record_ack(&pending.stream, Some(latency)),
      Outcome::Failed => self.stats.record_fail(&pending.stream),
    }
    self.completions.push_back(Completion {
      message_id: pending.message_id,
      root: Some(root),
      outcome,
      stream: pending.stream,
      values: pending.values,
      latency,
    });
  }

  /// Takes every resolution queued since the last call, oldest first.
  pub fn drain_completions(&mut self) -> Vec<Completion<M>> {
    self.completions.drain(..).collect()
  }

  /// Emissions awaiting a tracker verdict.
  pub fn pending_count(&self) -> usize {
    self.pending.len()
  }

  /// Returns true when `root` is still pending.
  pub fn is_pending(&self, root: RootId) -> bool {
    self.pending.contains_key(&root)
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

  fn report_emit_error(&self, error: EmitError) {
    self.report_error(error);
  }
}

impl<M> fmt::Debug for SpoutCollector<M> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SpoutCollector")
      .field("task_id", &self.context.task_id())
      .field("pending", &self.pending.len())
      .field("ackers", &self.ackers)
      .finish()
  }
}
