//! Delivery of tuples to other tasks.
//!
//! [`Transfer`] is the send primitive the collectors and the tracker depend
//! on. It is fire-and-forget: a tuple that never arrives is noticed only when
//! its tree times out at the tracker.

use crate::tuple::{TaskId, Tuple};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// Asynchronous send primitive towards a destination task.
pub trait Transfer: Send + Sync {
  /// Hands `tuple` to `task`. Must not block.
  fn transfer(&self, task: TaskId, tuple: Tuple);
}

impl<T: Transfer + ?Sized> Transfer for Arc<T> {
  fn transfer(&self, task: TaskId, tuple: Tuple) {
    (**self).transfer(task, tuple)
  }
}

/// Routes tuples into per-task tokio channels.
///
/// Each destination has one unbounded FIFO channel, so two tuples sent by the
/// same source to the same task arrive in send order.
#[derive(Debug, Default)]
pub struct ChannelTransfer {
  senders: HashMap<TaskId, mpsc::UnboundedSender<Tuple>>,
  dropped: AtomicU64,
}

impl ChannelTransfer {
  /// Creates a transfer with no registered tasks.
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers a new inbox for `task` and returns its receiving end.
  pub fn register(&mut self, task: TaskId) -> mpsc::UnboundedReceiver<Tuple> {
    let (tx, rx) = mpsc::unbounded_channel();
    self.senders.insert(task, tx);
    rx
  }

  /// Tuples that could not be handed to their destination.
  pub fn dropped(&self) -> u64 {
    self.dropped.load(Ordering::Relaxed)
  }
}

impl Transfer for ChannelTransfer {
  fn transfer(&self, task: TaskId, tuple: Tuple) {
    let Some(sender) = self.senders.get(&task) else {
      warn!(task, stream = tuple.stream(), "no inbox registered, dropping tuple");
      self.dropped.fetch_add(1, Ordering::Relaxed);
      return;
    };
    trace!(task, stream = tuple.stream(), "transfer");
    if sender.send(tuple).is_err() {
      warn!(task, "inbox closed, dropping tuple");
      self.dropped.fetch_add(1, Ordering::Relaxed);
    }
  }
}
