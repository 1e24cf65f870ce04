//! User-supplied grouping strategies.
//!
//! A custom grouping is anything implementing [`CustomStreamGrouping`]. It is
//! attached to a subscription either directly, through a factory closure
//! ([`Grouping::custom`](super::Grouping::custom)), or in serialized form as a
//! registered name plus JSON arguments resolved through a [`GroupingRegistry`].

use crate::error::GroupingError;
use crate::topology::TopologyContext;
use crate::tuple::{TaskId, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Capability computing destination tasks for one record.
pub trait CustomStreamGrouping: Send {
  /// Called once when the grouper is built for a source task.
  fn prepare(
    &mut self,
    _context: &TopologyContext,
    _stream: &str,
    _target_tasks: &[TaskId],
  ) -> Result<(), String> {
    Ok(())
  }

  /// Returns the tasks that must receive a record with `values`.
  ///
  /// Every returned id must belong to the target set passed to `prepare`.
  fn choose_tasks(&mut self, values: &[Value]) -> Result<Vec<TaskId>, String>;
}

type FactoryFn = dyn Fn() -> Box<dyn CustomStreamGrouping> + Send + Sync;

/// Produces a fresh custom grouping instance for every source task.
#[derive(Clone)]
pub struct CustomFactory(Arc<FactoryFn>);

impl CustomFactory {
  /// Wraps a factory closure.
  pub fn new<F>(factory: F) -> Self
  where
    F: Fn() -> Box<dyn CustomStreamGrouping> + Send + Sync + 'static,
  {
    Self(Arc::new(factory))
  }

  pub(crate) fn instantiate(&self) -> Box<dyn CustomStreamGrouping> {
    (self.0)()
  }
}

impl fmt::Debug for CustomFactory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "CustomFactory")
  }
}

type RegisteredFn =
  dyn Fn(&serde_json::Value) -> Result<Box<dyn CustomStreamGrouping>, String> + Send + Sync;

/// Named factories used to reconstruct serialized custom groupings.
#[derive(Clone, Default)]
pub struct GroupingRegistry {
  factories: HashMap<String, Arc<RegisteredFn>>,
}

impl GroupingRegistry {
  /// Creates an empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers `factory` under `name`, replacing any previous entry.
  pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
  where
    F: Fn(&serde_json::Value) -> Result<Box<dyn CustomStreamGrouping>, String>
      + Send
      + Sync
      + 'static,
  {
    self.factories.insert(name.into(), Arc::new(factory));
    self
  }

  /// Returns true when `name` is registered.
  pub fn contains(&self, name: &str) -> bool {
    self.factories.contains_key(name)
  }

  /// Reconstructs the grouping registered under `name` from `args`.
  pub fn build(
    &self,
    name: &str,
    args: &serde_json::Value,
  ) -> Result<Box<dyn CustomStreamGrouping>, GroupingError> {
    let factory = self
      .factories
      .get(name)
      .ok_or_else(|| GroupingError::UnknownCustomGrouping(name.to_string()))?;
    factory(args).map_err(|reason| GroupingError::CustomGroupingInit {
      name: name.to_string(),
      reason,
    })
  }
}

impl fmt::Debug for GroupingRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut names: Vec<&String> = self.factories.keys().collect();
    names.sort();
    f.debug_struct("GroupingRegistry").field("names", &names).finish()
  }
}

/// Grouper state for the custom strategy.
pub struct CustomGrouper {
  name: String,
  inner: Box<dyn CustomStreamGrouping>,
  targets: Vec<TaskId>,
}

impl CustomGrouper {
  pub(crate) fn new(
    name: impl Into<String>,
    mut inner: Box<dyn CustomStreamGrouping>,
    context: &TopologyContext,
    stream: &str,
    targets: Vec<TaskId>,
  ) -> Result<Self, GroupingError> {
    let name = name.into();
    inner
      .prepare(context, stream, &targets)
      .map_err(|reason| GroupingError::CustomGroupingInit {
        name: name.clone(),
        reason,
      })?;
    Ok(Self {
      name,
      inner,
      targets,
    })
  }

  pub(crate) fn choose(&mut self, values: &[Value]) -> Result<Vec<TaskId>, String> {
    let chosen = self.inner.choose_tasks(values)?;
    if let Some(stray) = chosen
      .iter()
      .find(|task| self.targets.binary_search(task).is_err())
    {
      return Err(format!(
        "`{}` chose task {} outside its target set",
        self.name, stray
      ));
    }
    Ok(chosen)
  }
}

impl fmt::Debug for CustomGrouper {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CustomGrouper")
      .field("name", &self.name)
      .field("targets", &self.targets)
      .finish()
  }
}
