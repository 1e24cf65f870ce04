//! Typed views of the records exchanged with the completion tracker.
//!
//! On the wire these are ordinary tuples on the reserved acking streams; the
//! enums here give them names and checked shapes.

use crate::tuple::{
  ACKER_ACK_STREAM_ID, ACKER_FAIL_STREAM_ID, ACKER_INIT_STREAM_ID, MessageId, RootId, TaskId,
  Tuple, Value,
};

/// Record sent by sources and operators to the tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackingRecord {
  /// First record of a tree: the XOR of every edge the source issued.
  Init {
    /// Root tracking id.
    root: RootId,
    /// XOR of the source's edge ids.
    ack_val: u64,
    /// Task to call back on completion.
    spout_task: TaskId,
  },
  /// A task finished a tuple: its own edge XOR the edges of its children.
  Ack {
    /// Root tracking id.
    root: RootId,
    /// Contribution to fold into the accumulator.
    ack_val: u64,
  },
  /// A task reported that processing failed.
  Fail {
    /// Root tracking id.
    root: RootId,
  },
}

impl TrackingRecord {
  /// Root this record refers to.
  pub fn root(&self) -> RootId {
    match self {
      TrackingRecord::Init { root, .. }
      | TrackingRecord::Ack { root, .. }
      | TrackingRecord::Fail { root } => *root,
    }
  }

  /// Reserved stream the record travels on.
  pub fn stream(&self) -> &'static str {
    match self {
      TrackingRecord::Init { .. } => ACKER_INIT_STREAM_ID,
      TrackingRecord::Ack { .. } => ACKER_ACK_STREAM_ID,
      TrackingRecord::Fail { .. } => ACKER_FAIL_STREAM_ID,
    }
  }

  /// Field values in the stream's schema order.
  pub fn to_values(&self) -> Vec<Value> {
    match *self {
      TrackingRecord::Init {
        root,
        ack_val,
        spout_task,
      } => vec![
        Value::UInt(root),
        Value::UInt(ack_val),
        Value::UInt(u64::from(spout_task)),
      ],
      TrackingRecord::Ack { root, ack_val } => vec![Value::UInt(root), Value::UInt(ack_val)],
      TrackingRecord::Fail { root } => vec![Value::UInt(root)],
    }
  }

  /// Parses a tuple received by a tracker task.
  pub fn from_tuple(tuple: &Tuple) -> Option<Self> {
    let field = |i: usize| tuple.value(i).and_then(Value::as_u64);
    match tuple.stream() {
      ACKER_INIT_STREAM_ID => Some(TrackingRecord::Init {
        root: field(0)?,
        ack_val: field(1)?,
        spout_task: TaskId::try_from(field(2)?).ok()?,
      }),
      ACKER_ACK_STREAM_ID => Some(TrackingRecord::Ack {
        root: field(0)?,
        ack_val: field(1)?,
      }),
      ACKER_FAIL_STREAM_ID => Some(TrackingRecord::Fail { root: field(0)? }),
      _ => None,
    }
  }
}

/// Outcome of a tuple tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
  /// Every descendant was acknowledged.
  Acked,
  /// A descendant failed or the tree timed out.
  Failed,
}

/// Signal sent from a tracker back to the source task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackerCallback {
  /// Root tracking id being resolved.
  pub root: RootId,
  /// Whether the tree completed.
  pub outcome: Outcome,
}

impl TrackerCallback {
  /// Wraps the callback in an unanchored tuple from `tracker_task`.
  pub fn into_tuple(self, tracker_task: TaskId) -> Tuple {
    let stream = match self.outcome {
      Outcome::Acked => ACKER_ACK_STREAM_ID,
      Outcome::Failed => ACKER_FAIL_STREAM_ID,
    };
    Tuple::new(
      tracker_task,
      stream,
      vec![Value::UInt(self.root)],
      MessageId::unanchored(),
    )
  }

  /// Parses a tuple received by a source task.
  pub fn from_tuple(tuple: &Tuple) -> Option<Self> {
    let outcome = match tuple.stream() {
      ACKER_ACK_STREAM_ID => Outcome::Acked,
      ACKER_FAIL_STREAM_ID => Outcome::Failed,
      _ => return None,
    };
    let root = tuple.value(0).and_then(Value::as_u64)?;
    Some(Self { root, outcome })
  }
}
