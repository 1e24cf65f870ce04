//! # Stream Groupings
//!
//! A grouping decides which tasks of a subscribing component receive each
//! record emitted on a stream. The [`Grouping`] descriptor is declared once per
//! subscription; [`Grouper::new`] resolves it eagerly into a [`Grouper`] owned
//! by the emitting task, and [`Grouper::choose`] is evaluated on the hot path
//! for every record.
//!
//! ## Strategies
//!
//! - **global**: the lowest-numbered target task.
//! - **fields**: a stable hash of the selected field values picks one task.
//! - **all**: every target task.
//! - **shuffle**: round-robin over a random permutation of the targets.
//! - **none**: an independent uniform random pick per record.
//! - **direct**: the emitter names the task explicitly.
//! - **local_or_shuffle**: a random co-located target, else shuffle.
//! - **custom**: a user-supplied [`CustomStreamGrouping`].
//!
//! ## Descriptors in JSON
//!
//! ```rust
//! use stormweave::grouping::Grouping;
//!
//! let g: Grouping = serde_json::from_str(r#"{ "fields": ["user"] }"#).unwrap();
//! assert!(matches!(g, Grouping::Fields(ref f) if f == &["user".to_string()]));
//! let g: Grouping = serde_json::from_str(r#""local_or_shuffle""#).unwrap();
//! assert!(matches!(g, Grouping::LocalOrShuffle));
//! ```

/// User-supplied grouping strategies and their registry.
pub mod custom;
/// Hash-by-fields strategy.
pub mod fields;
/// Shuffle and local-or-shuffle strategies.
pub mod shuffle;

pub use custom::{CustomFactory, CustomGrouper, CustomStreamGrouping, GroupingRegistry};
pub use fields::FieldsGrouper;
pub use shuffle::{LocalOrShuffleGrouper, ShuffleGrouper};

use crate::error::GroupingError;
use crate::topology::TopologyContext;
use crate::tuple::{Fields, TaskId, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Grouping descriptor attached to one subscription.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
  /// Route to the lowest-numbered target task.
  Global,
  /// Route by a stable hash of the named fields.
  Fields(Vec<String>),
  /// Route to every target task.
  All,
  /// Round-robin over a shuffled permutation.
  Shuffle,
  /// Uniform random pick per record.
  None,
  /// The emitter supplies the task id.
  Direct,
  /// Random co-located target, shuffle otherwise.
  LocalOrShuffle,
  /// Custom grouping reconstructed from a registered name and arguments.
  CustomSerialized {
    /// Registry name.
    name: String,
    /// Factory arguments.
    #[serde(default)]
    args: serde_json::Value,
  },
  /// Custom grouping instantiated directly from a factory.
  #[serde(skip)]
  CustomObject(CustomFactory),
}

impl Grouping {
  /// Fields grouping over `fields`.
  pub fn fields<I, S>(fields: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Grouping::Fields(fields.into_iter().map(Into::into).collect())
  }

  /// Custom grouping built by `factory` once per source task.
  pub fn custom<F>(factory: F) -> Self
  where
    F: Fn() -> Box<dyn CustomStreamGrouping> + Send + Sync + 'static,
  {
    Grouping::CustomObject(CustomFactory::new(factory))
  }

  /// Custom grouping reconstructed through a [`GroupingRegistry`].
  pub fn custom_serialized(name: impl Into<String>, args: serde_json::Value) -> Self {
    Grouping::CustomSerialized {
      name: name.into(),
      args,
    }
  }

  /// Parses a JSON descriptor.
  pub fn from_json_str(json: &str) -> Result<Self, GroupingError> {
    serde_json::from_str(json).map_err(|e| GroupingError::Malformed(e.to_string()))
  }

  /// Strategy tag of this descriptor.
  pub fn kind(&self) -> GroupingKind {
    match self {
      Grouping::Global => GroupingKind::Global,
      Grouping::Fields(_) => GroupingKind::Fields,
      Grouping::All => GroupingKind::All,
      Grouping::Shuffle => GroupingKind::Shuffle,
      Grouping::None => GroupingKind::None,
      Grouping::Direct => GroupingKind::Direct,
      Grouping::LocalOrShuffle => GroupingKind::LocalOrShuffle,
      Grouping::CustomSerialized { .. } => GroupingKind::CustomSerialized,
      Grouping::CustomObject(_) => GroupingKind::CustomObject,
    }
  }
}

/// Strategy tag, available on both descriptors and groupers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GroupingKind {
  /// See [`Grouping::Global`].
  Global,
  /// See [`Grouping::Fields`].
  Fields,
  /// See [`Grouping::All`].
  All,
  /// See [`Grouping::Shuffle`].
  Shuffle,
  /// See [`Grouping::None`].
  None,
  /// See [`Grouping::Direct`].
  Direct,
  /// See [`Grouping::LocalOrShuffle`].
  LocalOrShuffle,
  /// See [`Grouping::CustomObject`].
  CustomObject,
  /// See [`Grouping::CustomSerialized`].
  CustomSerialized,
}

impl GroupingKind {
  /// Lower-case strategy name.
  pub fn name(self) -> &'static str {
    match self {
      GroupingKind::Global => "global",
      GroupingKind::Fields => "fields",
      GroupingKind::All => "all",
      GroupingKind::Shuffle => "shuffle",
      GroupingKind::None => "none",
      GroupingKind::Direct => "direct",
      GroupingKind::LocalOrShuffle => "local_or_shuffle",
      GroupingKind::CustomObject => "custom_object",
      GroupingKind::CustomSerialized => "custom_serialized",
    }
  }
}

impl fmt::Display for GroupingKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Resolved routing policy for one (source task, target component, stream).
///
/// Immutable after construction except for the shuffle cursor and random
/// generators, which are owned by the grouper and advanced by `&mut self`
/// calls from the owning task only.
#[derive(Debug)]
pub enum Grouper {
  /// Always the lowest target task.
  Global(TaskId),
  /// Hash of the grouping fields.
  Fields(FieldsGrouper),
  /// Every target task, sorted.
  All(Vec<TaskId>),
  /// Round-robin cursor over a shuffled permutation.
  Shuffle(ShuffleGrouper),
  /// Independent random pick.
  None {
    /// Sorted target tasks.
    targets: Vec<TaskId>,
    /// Per-grouper generator.
    rng: StdRng,
  },
  /// Emitter-chosen task; `targets` are the valid choices.
  Direct(Vec<TaskId>),
  /// Local targets first, shuffle otherwise.
  LocalOrShuffle {
    /// Local subset and shuffle fallback.
    grouper: LocalOrShuffleGrouper,
    /// Per-grouper generator.
    rng: StdRng,
  },
  /// User-supplied strategy.
  Custom {
    /// Prepared custom grouping.
    grouper: CustomGrouper,
    /// Whether it came from the registry.
    serialized: bool,
  },
}

impl Grouper {
  /// Resolves `grouping` for records emitted on `stream` with schema
  /// `out_fields`, routed among `target_tasks`.
  pub fn new(
    context: &TopologyContext,
    stream: &str,
    out_fields: &Fields,
    grouping: &Grouping,
    target_tasks: Vec<TaskId>,
    registry: &GroupingRegistry,
  ) -> Result<Self, GroupingError> {
    Self::with_rng(
      context,
      stream,
      out_fields,
      grouping,
      target_tasks,
      registry,
      StdRng::from_entropy(),
    )
  }

  /// Like [`new`](Self::new) with an explicit generator.
  pub fn with_rng(
    context: &TopologyContext,
    stream: &str,
    out_fields: &Fields,
    grouping: &Grouping,
    mut target_tasks: Vec<TaskId>,
    registry: &GroupingRegistry,
    mut rng: StdRng,
  ) -> Result<Self, GroupingError> {
    target_tasks.sort_unstable();
    target_tasks.dedup();

    let kind = grouping.kind();
    let needs_targets = !matches!(kind, GroupingKind::Direct | GroupingKind::All);
    if needs_targets && target_tasks.is_empty() {
      return Err(GroupingError::NoTargetTasks {
        grouping: kind.name(),
        stream: stream.to_string(),
      });
    }

    let grouper = match grouping {
      Grouping::Global => Grouper::Global(target_tasks[0]),
      Grouping::Fields(fields) => {
        Grouper::Fields(FieldsGrouper::new(stream, out_fields, fields, target_tasks)?)
      }
      Grouping::All => Grouper::All(target_tasks),
      Grouping::Shuffle => Grouper::Shuffle(ShuffleGrouper::new(&target_tasks, &mut rng)),
      Grouping::None => Grouper::None {
        targets: target_tasks,
        rng,
      },
      Grouping::Direct => Grouper::Direct(target_tasks),
      Grouping::LocalOrShuffle => Grouper::LocalOrShuffle {
        grouper: LocalOrShuffleGrouper::new(&target_tasks, context.local_task_ids(), &mut rng),
        rng,
      },
      Grouping::CustomObject(factory) => Grouper::Custom {
        grouper: CustomGrouper::new(
          "custom_object",
          factory.instantiate(),
          context,
          stream,
          target_tasks,
        )?,
        serialized: false,
      },
      Grouping::CustomSerialized { name, args } => Grouper::Custom {
        grouper: CustomGrouper::new(
          name.clone(),
          registry.build(name, args)?,
          context,
          stream,
          target_tasks,
        )?,
        serialized: true,
      },
    };
    Ok(grouper)
  }

  /// Strategy tag of this grouper.
  pub fn kind(&self) -> GroupingKind {
    match self {
      Grouper::Global(_) => GroupingKind::Global,
      Grouper::Fields(_) => GroupingKind::Fields,
      Grouper::All(_) => GroupingKind::All,
      Grouper::Shuffle(_) => GroupingKind::Shuffle,
      Grouper::None { .. } => GroupingKind::None,
      Grouper::Direct(_) => GroupingKind::Direct,
      Grouper::LocalOrShuffle { .. } => GroupingKind::LocalOrShuffle,
      Grouper::Custom {
        serialized: true, ..
      } => GroupingKind::CustomSerialized,
      Grouper::Custom { .. } => GroupingKind::CustomObject,
    }
  }

  /// Returns true when the emitter must pick the task explicitly.
  pub fn is_direct(&self) -> bool {
    matches!(self, Grouper::Direct(_))
  }

  /// Returns true when a direct emission may target `task`.
  pub fn accepts_direct(&self, task: TaskId) -> bool {
    match self {
      Grouper::Direct(targets) => targets.binary_search(&task).is_ok(),
      _ => false,
    }
  }

  /// Destination tasks for a record with `values`.
  ///
  /// Fails only for custom groupings and for direct groupers, which have no
  /// policy of their own.
  pub fn choose(&mut self, values: &[Value]) -> Result<Vec<TaskId>, String> {
    match self {
      Grouper::Global(task) => Ok(vec![*task]),
      Grouper::Fields(grouper) => Ok(vec![grouper.choose(values)]),
      Grouper::All(targets) => Ok(targets.clone()),
      Grouper::Shuffle(grouper) => Ok(vec![grouper.next_task()]),
      Grouper::None { targets, rng } => Ok(vec![targets[rng.gen_range(0..targets.len())]]),
      Grouper::Direct(_) => Err("direct grouping requires an explicit task".to_string()),
      Grouper::LocalOrShuffle { grouper, rng } => Ok(vec![grouper.next_task(rng)]),
      Grouper::Custom { grouper, .. } => grouper.choose(values),
    }
  }
}
