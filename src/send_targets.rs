//! Per-task routing table.
//!
//! [`TaskSendTargets`] holds, for every stream the task emits, one
//! [`Grouper`] per subscribing component. Resolving a record's destinations
//! validates the record against the stream schema and concatenates the
//! choices of every subscriber.

use crate::error::{EmitError, GroupingError};
use crate::grouping::{Grouper, Grouping, GroupingRegistry};
use crate::topology::TopologyContext;
use crate::tracking::TrackingRecord;
use crate::transfer::Transfer;
use crate::tuple::{
  ACKER_ACK_STREAM_ID, ACKER_COMPONENT_ID, ACKER_FAIL_STREAM_ID, ACKER_INIT_STREAM_ID, MessageId,
  TaskId, Tuple, Value, is_system_stream,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Stream → subscriber groupers for one emitting task.
#[derive(Debug)]
pub struct TaskSendTargets {
  context: Arc<TopologyContext>,
  groupers: HashMap<String, Vec<(String, Grouper)>>,
}

impl TaskSendTargets {
  /// Creates an empty table for the task described by `context`.
  pub fn new(context: Arc<TopologyContext>) -> Self {
    Self {
      context,
      groupers: HashMap::new(),
    }
  }

  /// Resolves `grouping` for `target_component` subscribing to `stream`.
  pub fn subscribe(
    &mut self,
    stream: &str,
    target_component: &str,
    grouping: &Grouping,
    registry: &GroupingRegistry,
  ) -> Result<(), GroupingError> {
    let out_fields = self
      .context
      .output_fields(stream)
      .cloned()
      .unwrap_or_default();
    let targets = self.context.component_tasks(target_component);
    let grouper = Grouper::new(
      &self.context,
      stream,
      &out_fields,
      grouping,
      targets,
      registry,
    )?;
    self.add(stream, target_component, grouper);
    Ok(())
  }

  /// Routes the acking streams to the tracker tasks by root id.
  ///
  /// Every record of one tree therefore reaches the same tracker task.
  pub fn subscribe_acker(&mut self) -> Result<(), GroupingError> {
    let registry = GroupingRegistry::new();
    let by_id = Grouping::fields(["id"]);
    for stream in [
      ACKER_INIT_STREAM_ID,
      ACKER_ACK_STREAM_ID,
      ACKER_FAIL_STREAM_ID,
    ] {
      self.subscribe(stream, ACKER_COMPONENT_ID, &by_id, &registry)?;
    }
    Ok(())
  }

  /// Adds an already resolved grouper.
  pub fn add(&mut self, stream: &str, target_component: &str, grouper: Grouper) {
    self
      .groupers
      .entry(stream.to_string())
      .or_default()
      .push((target_component.to_string(), grouper));
  }

  /// Context of the owning task.
  pub fn context(&self) -> &Arc<TopologyContext> {
    &self.context
  }

  /// Returns true when somebody subscribes to `stream`.
  pub fn has_subscribers(&self, stream: &str) -> bool {
    self.groupers.get(stream).is_some_and(|g| !g.is_empty())
  }

  fn check_schema(&self, stream: &str, values: &[Value]) -> Result<(), EmitError> {
    let fields = self
      .context
      .output_fields(stream)
      .ok_or_else(|| EmitError::UndeclaredStream(stream.to_string()))?;
    if fields.len() != values.len() {
      return Err(EmitError::ArityMismatch {
        stream: stream.to_string(),
        expected: fields.len(),
        found: values.len(),
      });
    }
    Ok(())
  }

  fn check_user_stream(&self, stream: &str) -> Result<(), EmitError> {
    if is_system_stream(stream) {
      return Err(EmitError::ReservedStream(stream.to_string()));
    }
    Ok(())
  }

  /// Destination tasks for a regular emission.
  ///
  /// An empty result means nobody subscribes to `stream`. The acking
  /// streams are rejected; tracking records go through the collectors.
  pub fn get(&mut self, stream: &str, values: &[Value]) -> Result<Vec<TaskId>, EmitError> {
    self.check_user_stream(stream)?;
    self.route(stream, values)
  }

  fn route(&mut self, stream: &str, values: &[Value]) -> Result<Vec<TaskId>, EmitError> {
    self.check_schema(stream, values)?;
    let Some(groupers) = self.groupers.get_mut(stream) else {
      return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for (component, grouper) in groupers.iter_mut() {
      if grouper.is_direct() {
        return Err(EmitError::RegularEmitOnDirectStream(stream.to_string()));
      }
      let chosen = grouper
        .choose(values)
        .map_err(|reason| EmitError::CustomGrouping {
          stream: stream.to_string(),
          reason,
        })?;
      trace!(stream, component = %component, tasks = ?chosen, "grouped");
      out.extend(chosen);
    }
    Ok(out)
  }

  /// Destination for a direct emission to `task`.
  pub fn get_direct(
    &mut self,
    task: TaskId,
    stream: &str,
    values: &[Value],
  ) -> Result<Vec<TaskId>, EmitError> {
    self.check_user_stream(stream)?;
    self.check_schema(stream, values)?;
    let target_component = self
      .context
      .component_for(task)
      .ok_or_else(|| EmitError::UnknownTargetTask {
        task,
        stream: stream.to_string(),
      })?;
    let subscriber = self
      .groupers
      .get(stream)
      .and_then(|groupers| groupers.iter().find(|(c, _)| c == target_component))
      .map(|(_, grouper)| grouper)
      .ok_or_else(|| EmitError::UnknownTargetTask {
        task,
        stream: stream.to_string(),
      })?;
    if !subscriber.is_direct() {
      return Err(EmitError::DirectEmitOnNonDirectStream {
        task,
        stream: stream.to_string(),
      });
    }
    if !subscriber.accepts_direct(task) {
      return Err(EmitError::UnknownTargetTask {
        task,
        stream: stream.to_string(),
      });
    }
    Ok(vec![task])
  }

  /// Sends `record` unanchored to the tracker task responsible for its root.
  pub(crate) fn send_tracking(
    &mut self,
    transfer: &dyn Transfer,
    record: TrackingRecord,
  ) -> Result<(), EmitError> {
    let values = record.to_values();
    for tracker in self.route(record.stream(), &values)? {
      let tuple = Tuple::new(
        self.context.task_id(),
        record.stream(),
        values.clone(),
        MessageId::unanchored(),
      );
      transfer.transfer(tracker, tuple);
    }
    Ok(())
  }
}
