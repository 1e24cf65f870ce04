//! # Error Handling
//!
//! Errors fall into two groups:
//!
//! - **Setup errors** ([`GroupingError`], [`ConfigError`], [`TopologyError`]):
//!   malformed grouping descriptors, bad configuration, or inconsistent
//!   topology declarations. These are fatal and surface as `Err` from the
//!   constructors.
//! - **Emission errors** ([`EmitError`]): problems with a single record, such
//!   as an undeclared stream or a custom grouper returning a foreign task id.
//!   These never cross the emission boundary. Collectors hand them to the
//!   task's [`ErrorReporter`] and keep processing.
//!
//! Delivery loss is not an error kind here; it is observed only as a tracker
//! timeout and reaches the source as a fail callback.

use crate::tuple::TaskId;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Raised while resolving a grouping descriptor into a grouper.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupingError {
  /// Fields grouping names a field the source stream does not declare.
  #[error("grouping field `{field}` is not declared on stream `{stream}`")]
  UnknownField {
    /// Offending field name.
    field: String,
    /// Stream whose schema was consulted.
    stream: String,
  },
  /// Fields grouping with no fields selected.
  #[error("fields grouping on stream `{stream}` selects no fields")]
  EmptyFields {
    /// Stream the grouping was declared on.
    stream: String,
  },
  /// A grouping that must pick a task was given no target tasks.
  #[error("{grouping} grouping on stream `{stream}` has no target tasks")]
  NoTargetTasks {
    /// Strategy name.
    grouping: &'static str,
    /// Stream the grouping was declared on.
    stream: String,
  },
  /// Serialized custom grouping names a factory that is not registered.
  #[error("custom grouping `{0}` is not registered")]
  UnknownCustomGrouping(String),
  /// A registered custom grouping factory rejected its arguments.
  #[error("custom grouping `{name}` could not be constructed: {reason}")]
  CustomGroupingInit {
    /// Registered factory name.
    name: String,
    /// Factory-provided reason.
    reason: String,
  },
  /// The descriptor itself could not be parsed.
  #[error("malformed grouping descriptor: {0}")]
  Malformed(String),
}

/// Raised for a single emission; reported, never propagated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
  /// The emitting component never declared this stream.
  #[error("stream `{0}` is not declared by this component")]
  UndeclaredStream(String),
  /// User emission on a stream reserved for the acking protocol.
  #[error("stream `{0}` is reserved for tuple tracking")]
  ReservedStream(String),
  /// Value count does not match the stream schema.
  #[error("stream `{stream}` declares {expected} fields but {found} values were emitted")]
  ArityMismatch {
    /// Stream emitted on.
    stream: String,
    /// Declared field count.
    expected: usize,
    /// Emitted value count.
    found: usize,
  },
  /// Regular emit on a stream that has a direct subscriber.
  #[error("cannot do a regular emit on stream `{0}`, a subscriber uses direct grouping")]
  RegularEmitOnDirectStream(String),
  /// Direct emit on a stream whose target is not subscribed directly.
  #[error("cannot emit direct to task {task} on stream `{stream}` without direct grouping")]
  DirectEmitOnNonDirectStream {
    /// Requested task.
    task: TaskId,
    /// Stream emitted on.
    stream: String,
  },
  /// Direct emit to a task that does not subscribe to the stream.
  #[error("task {task} does not subscribe to stream `{stream}`")]
  UnknownTargetTask {
    /// Requested task.
    task: TaskId,
    /// Stream emitted on.
    stream: String,
  },
  /// A custom grouping failed or returned a task outside its target set.
  #[error("custom grouping failed on stream `{stream}`: {reason}")]
  CustomGrouping {
    /// Stream emitted on.
    stream: String,
    /// What went wrong.
    reason: String,
  },
}

/// Raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
  /// JSON could not be parsed into a configuration.
  #[error("invalid configuration: {0}")]
  Parse(#[from] serde_json::Error),
  /// A field holds a value outside its allowed range.
  #[error("invalid configuration value for `{key}`: {reason}")]
  Invalid {
    /// Configuration key.
    key: &'static str,
    /// Why the value is rejected.
    reason: String,
  },
}

/// Raised while declaring or submitting a topology.
#[derive(Error, Debug)]
pub enum TopologyError {
  /// Two components share an id.
  #[error("component `{0}` is declared twice")]
  DuplicateComponent(String),
  /// A subscription or lookup references an unknown component.
  #[error("component `{0}` is not declared")]
  UnknownComponent(String),
  /// A subscription references a stream the source never declared.
  #[error("component `{component}` does not declare stream `{stream}`")]
  UnknownStream {
    /// Source component.
    component: String,
    /// Missing stream.
    stream: String,
  },
  /// Ids starting with `__` are reserved for system components.
  #[error("component id `{0}` is reserved")]
  ReservedComponent(String),
  /// Parallelism must be at least one.
  #[error("component `{0}` must have parallelism of at least 1")]
  ZeroParallelism(String),
  /// Invalid output field schema.
  #[error("component `{component}` stream `{stream}`: {reason}")]
  InvalidFields {
    /// Declaring component.
    component: String,
    /// Declared stream.
    stream: String,
    /// Schema problem.
    reason: String,
  },
  /// Grouping resolution failed.
  #[error(transparent)]
  Grouping(#[from] GroupingError),
  /// Configuration failed validation.
  #[error(transparent)]
  Config(#[from] ConfigError),
}

/// A failure handed to the error-reporting capability.
#[derive(Clone, Debug, PartialEq)]
pub struct ReportedError {
  /// When the failure was observed.
  pub timestamp: DateTime<Utc>,
  /// Task that observed the failure.
  pub task_id: TaskId,
  /// Component of that task.
  pub component_id: String,
  /// Rendered cause.
  pub message: String,
}

impl ReportedError {
  /// Captures `cause` with the current time.
  pub fn new(task_id: TaskId, component_id: impl Into<String>, cause: impl ToString) -> Self {
    Self {
      timestamp: Utc::now(),
      task_id,
      component_id: component_id.into(),
      message: cause.to_string(),
    }
  }
}

/// Capability consumed by an external collaborator that records failures.
pub trait ErrorReporter: Send + Sync {
  /// Records one failure.
  fn report(&self, error: &ReportedError);
}

/// Reporter that writes every failure to the `tracing` error level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
  fn report(&self, error: &ReportedError) {
    tracing::error!(
      task_id = error.task_id,
      component = %error.component_id,
      at = %error.timestamp,
      "{}",
      error.message
    );
  }
}

/// Reporter that keeps every failure in a shared list.
#[derive(Clone, Debug, Default)]
pub struct CollectingReporter {
  errors: Arc<Mutex<Vec<ReportedError>>>,
}

impl CollectingReporter {
  /// Creates an empty reporter.
  pub fn new() -> Self {
    Self::default()
  }

  /// Snapshot of everything reported so far.
  pub fn errors(&self) -> Vec<ReportedError> {
    match self.errors.lock() {
      Ok(errors) => errors.clone(),
      Err(poisoned) => poisoned.into_inner().clone(),
    }
  }

  /// Number of reported failures.
  pub fn len(&self) -> usize {
    self.errors().len()
  }

  /// Returns true when nothing was reported.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl ErrorReporter for CollectingReporter {
  fn report(&self, error: &ReportedError) {
    tracing::debug!(task_id = error.task_id, "{}", error.message);
    match self.errors.lock() {
      Ok(mut errors) => errors.push(error.clone()),
      Err(poisoned) => poisoned.into_inner().push(error.clone()),
    }
  }
}
