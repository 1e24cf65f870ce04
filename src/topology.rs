//! # Topology Metadata
//!
//! [`TopologyLayout`] records which tasks belong to which component and the
//! output schema of every declared stream. Each task receives a
//! [`TopologyContext`]: a cheap, read-only view of the layout bound to the
//! task's own id and the set of tasks co-located with it.
//!
//! ```rust
//! use std::sync::Arc;
//! use stormweave::topology::{TopologyContext, TopologyLayout};
//! use stormweave::tuple::Fields;
//!
//! let layout = TopologyLayout::new()
//!   .with_component("words", [1, 2], [("default", Fields::new(["word"]).unwrap())])
//!   .with_component("count", [3, 4], std::iter::empty::<(&str, Fields)>());
//! let ctx = TopologyContext::new(Arc::new(layout), 1, vec![1, 3]).unwrap();
//! assert_eq!(ctx.component_id(), "words");
//! assert_eq!(ctx.component_tasks("count"), vec![3, 4]);
//! ```

use crate::error::TopologyError;
use crate::tuple::{
  ACKER_ACK_STREAM_ID, ACKER_FAIL_STREAM_ID, ACKER_INIT_STREAM_ID, Fields, TaskId,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};

/// Component ids, task assignment and stream schemas of a whole topology.
#[derive(Clone, Debug, Default)]
pub struct TopologyLayout {
  task_to_component: BTreeMap<TaskId, String>,
  streams: HashMap<String, BTreeMap<String, Fields>>,
}

impl TopologyLayout {
  /// Creates an empty layout.
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds a component running on `tasks` that declares `streams`.
  pub fn with_component<T, S, N>(mut self, component: &str, tasks: T, streams: S) -> Self
  where
    T: IntoIterator<Item = TaskId>,
    S: IntoIterator<Item = (N, Fields)>,
    N: Into<String>,
  {
    self.add_component(component, tasks, streams);
    self
  }

  /// Adds a component in place.
  pub fn add_component<T, S, N>(&mut self, component: &str, tasks: T, streams: S)
  where
    T: IntoIterator<Item = TaskId>,
    S: IntoIterator<Item = (N, Fields)>,
    N: Into<String>,
  {
    for task in tasks {
      self.task_to_component.insert(task, component.to_string());
    }
    let declared = self.streams.entry(component.to_string()).or_default();
    for (name, fields) in streams {
      declared.insert(name.into(), fields);
    }
  }

  /// Component owning `task`.
  pub fn component_for(&self, task: TaskId) -> Option<&str> {
    self.task_to_component.get(&task).map(String::as_str)
  }

  /// Sorted task ids of `component`.
  pub fn component_tasks(&self, component: &str) -> Vec<TaskId> {
    self
      .task_to_component
      .iter()
      .filter(|(_, c)| c.as_str() == component)
      .map(|(task, _)| *task)
      .collect()
  }

  /// Every task id in the topology, sorted.
  pub fn task_ids(&self) -> Vec<TaskId> {
    self.task_to_component.keys().copied().collect()
  }

  /// Schema of `stream` as declared by `component`.
  ///
  /// The acking streams are implicitly declared by every component.
  pub fn fields_for(&self, component: &str, stream: &str) -> Option<&Fields> {
    system_fields(stream).or_else(|| self.streams.get(component)?.get(stream))
  }

  /// Streams declared by `component`, excluding system streams.
  pub fn streams_of(&self, component: &str) -> Vec<&str> {
    self
      .streams
      .get(component)
      .map(|s| s.keys().map(String::as_str).collect())
      .unwrap_or_default()
  }
}

/// Schema of the acking streams, `None` for user streams.
pub fn system_fields(stream: &str) -> Option<&'static Fields> {
  static INIT: OnceLock<Fields> = OnceLock::new();
  static ACK: OnceLock<Fields> = OnceLock::new();
  static FAIL: OnceLock<Fields> = OnceLock::new();
  let fixed = |names: &[&str]| Fields::new(names.iter().copied()).unwrap_or_default();
  match stream {
    ACKER_INIT_STREAM_ID => Some(INIT.get_or_init(|| fixed(&["id", "ack_val", "spout_task"]))),
    ACKER_ACK_STREAM_ID => Some(ACK.get_or_init(|| fixed(&["id", "ack_val"]))),
    ACKER_FAIL_STREAM_ID => Some(FAIL.get_or_init(|| fixed(&["id"]))),
    _ => None,
  }
}

/// Read-only per-task view of the topology.
#[derive(Clone, Debug)]
pub struct TopologyContext {
  task_id: TaskId,
  component_id: String,
  layout: Arc<TopologyLayout>,
  local_tasks: Arc<Vec<TaskId>>,
}

impl TopologyContext {
  /// Binds `layout` to `task_id`. `local_tasks` are the tasks sharing the
  /// task's process.
  pub fn new(
    layout: Arc<TopologyLayout>,
    task_id: TaskId,
    mut local_tasks: Vec<TaskId>,
  ) -> Result<Self, TopologyError> {
    let component_id = layout
      .component_for(task_id)
      .ok_or_else(|| TopologyError::UnknownComponent(format!("task {}", task_id)))?
      .to_string();
    local_tasks.sort_unstable();
    local_tasks.dedup();
    Ok(Self {
      task_id,
      component_id,
      layout,
      local_tasks: Arc::new(local_tasks),
    })
  }

  /// Id of this task.
  pub fn task_id(&self) -> TaskId {
    self.task_id
  }

  /// Component this task runs.
  pub fn component_id(&self) -> &str {
    &self.component_id
  }

  /// Tasks co-located with this one, sorted.
  pub fn local_task_ids(&self) -> &[TaskId] {
    &self.local_tasks
  }

  /// Schema of `stream` as emitted by this task's component.
  pub fn output_fields(&self, stream: &str) -> Option<&Fields> {
    self.layout.fields_for(&self.component_id, stream)
  }

  /// Component owning `task`.
  pub fn component_for(&self, task: TaskId) -> Option<&str> {
    self.layout.component_for(task)
  }

  /// Sorted task ids of `component`.
  pub fn component_tasks(&self, component: &str) -> Vec<TaskId> {
    self.layout.component_tasks(component)
  }

  /// The layout this context views.
  pub fn layout(&self) -> &TopologyLayout {
    &self.layout
  }
}
