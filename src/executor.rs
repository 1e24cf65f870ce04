//! # Task Executors
//!
//! Each task runs its processing loop on one dedicated tokio task and owns
//! all of its state: collector, groupers, pending registry or accumulators.
//! Nothing is shared between tasks except the inboxes fed by [`Transfer`].
//!
//! User callbacks run under `catch_unwind`; a panic is handed to the error
//! reporter and the loop keeps going.
//!
//! [`Transfer`]: crate::transfer::Transfer

use crate::acker::Acker;
use crate::bolt::{Bolt, OutputCollector};
use crate::config::TopologyConfig;
use crate::spout::{Spout, SpoutCollector};
use crate::tracking::Outcome;
use crate::tuple::Tuple;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const SPOUT_IDLE_WAIT: Duration = Duration::from_millis(1);

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "non-string panic payload".to_string()
  }
}

/// Drives one source task.
pub struct SpoutExecutor<S: Spout> {
  spout: S,
  collector: SpoutCollector<S::MessageId>,
  inbox: mpsc::UnboundedReceiver<Tuple>,
  max_pending: Option<usize>,
  tick: Duration,
}

impl<S: Spout> SpoutExecutor<S> {
  /// Binds `spout` to its collector and callback inbox.
  pub fn new(
    spout: S,
    collector: SpoutCollector<S::MessageId>,
    inbox: mpsc::UnboundedReceiver<Tuple>,
    config: &TopologyConfig,
  ) -> Self {
    Self {
      spout,
      collector,
      inbox,
      max_pending: config.max_spout_pending,
      tick: config.tick_interval(),
    }
  }

  /// Runs until `shutdown` fires, then returns the spout.
  pub async fn run(mut self, shutdown: CancellationToken) -> S {
    self.spout.open(self.collector.context());
    let mut next_expiry = Instant::now() + self.tick;
    let mut inbox_open = true;

    loop {
      if shutdown.is_cancelled() {
        break;
      }
      while let Ok(tuple) = self.inbox.try_recv() {
        self.collector.on_tracker_callback(&tuple, Instant::now());
      }
      let now = Instant::now();
      if now >= next_expiry {
        self.collector.expire(now);
        next_expiry = now + self.tick;
      }
      self.deliver_completions();

      let emitted = self.can_emit() && self.call_next_tuple();
      self.deliver_completions();
      if emitted {
        tokio::task::yield_now().await;
        continue;
      }

      tokio::select! {
        _ = shutdown.cancelled() => break,
        received = self.inbox.recv(), if inbox_open => match received {
          Some(tuple) => self.collector.on_tracker_callback(&tuple, Instant::now()),
          None => inbox_open = false,
        },
        _ = tokio::time::sleep(SPOUT_IDLE_WAIT) => {}
      }
    }

    debug!(task_id = self.collector.context().task_id(), "spout stopping");
    self.spout.close();
    self.spout
  }

  fn can_emit(&self) -> bool {
    self
      .max_pending
      .is_none_or(|max| self.collector.pending_count() < max)
  }

  fn call_next_tuple(&mut self) -> bool {
    let before = self.collector.stats().total_emitted();
    let spout = &mut self.spout;
    let collector = &mut self.collector;
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| spout.next_tuple(collector))) {
      self
        .collector
        .report_error(format!("next_tuple panicked: {}", panic_message(&*payload)));
    }
    self.collector.stats().total_emitted() > before
  }

  fn deliver_completions(&mut self) {
    for completion in self.collector.drain_completions() {
      trace!(message_id = ?completion.message_id, outcome = ?completion.outcome, "delivering");
      let spout = &mut self.spout;
      let result = catch_unwind(AssertUnwindSafe(|| match completion.outcome {
        Outcome::Acked => spout.ack(completion.message_id),
        Outcome::Failed => spout.fail(completion.message_id),
      }));
      if let Err(payload) = result {
        self
          .collector
          .report_error(format!("ack/fail callback panicked: {}", panic_message(&*payload)));
      }
    }
  }
}

/// Drives one operator task.
pub struct BoltExecutor<B: Bolt> {
  bolt: B,
  collector: OutputCollector,
  inbox: mpsc::UnboundedReceiver<Tuple>,
}

impl<B: Bolt> BoltExecutor<B> {
  /// Binds `bolt` to its collector and input inbox.
  pub fn new(bolt: B, collector: OutputCollector, inbox: mpsc::UnboundedReceiver<Tuple>) -> Self {
    Self {
      bolt,
      collector,
      inbox,
    }
  }

  /// Runs until `shutdown` fires or the inbox closes, then returns the bolt.
  pub async fn run(mut self, shutdown: CancellationToken) -> B {
    self.bolt.prepare(self.collector.context());
    loop {
      tokio::select! {
        biased;
        _ = shutdown.cancelled() => break,
        received = self.inbox.recv() => match received {
          Some(tuple) => self.execute(tuple),
          None => break,
        },
      }
    }
    debug!(task_id = self.collector.context().task_id(), "bolt stopping");
    self.bolt.cleanup();
    self.bolt
  }

  fn execute(&mut self, tuple: Tuple) {
    let bolt = &mut self.bolt;
    let collector = &mut self.collector;
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| bolt.execute(tuple, collector))) {
      self
        .collector
        .report_error(format!("execute panicked: {}", panic_message(&*payload)));
    }
  }
}

/// Drives one tracker task.
pub struct AckerExecutor {
  acker: Acker,
  inbox: mpsc::UnboundedReceiver<Tuple>,
  tick: Duration,
}

impl AckerExecutor {
  /// Binds `acker` to its inbox.
  pub fn new(acker: Acker, inbox: mpsc::UnboundedReceiver<Tuple>, config: &TopologyConfig) -> Self {
    Self {
      acker,
      inbox,
      tick: config.tick_interval(),
    }
  }

  /// Runs until `shutdown` fires or the inbox closes, then returns the tracker.
  pub async fn run(mut self, shutdown: CancellationToken) -> Acker {
    let mut ticker = tokio::time::interval(self.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
      tokio::select! {
        biased;
        _ = shutdown.cancelled() => break,
        _ = ticker.tick() => {
          let expired = self.acker.expire(Instant::now());
          if expired > 0 {
            debug!(task_id = self.acker.context().task_id(), expired, "expired tuple trees");
          }
        }
        received = self.inbox.recv() => match received {
          Some(tuple) => self.acker.process(&tuple, Instant::now()),
          None => break,
        },
      }
    }
    self.acker
  }
}
