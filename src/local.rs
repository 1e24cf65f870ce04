//! # In-Process Topologies
//!
//! [`TopologyBuilder`] declares components, their output streams and their
//! subscriptions with a fluent API. [`LocalCluster::submit`] validates the
//! declaration, assigns task ids, wires every task to a [`ChannelTransfer`]
//! inbox and spawns one executor per task on the current tokio runtime.
//!
//! Task ids start at 1 and are assigned component by component in id order,
//! with the tracker tasks last. Every task of a local cluster is co-located,
//! so local-or-shuffle groupings always stay local.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stormweave::config::TopologyConfig;
//! use stormweave::error::LogReporter;
//! use stormweave::grouping::Grouping;
//! use stormweave::local::{LocalCluster, TopologyBuilder};
//! # use stormweave::bolt::{Bolt, OutputCollector};
//! # use stormweave::spout::{Spout, SpoutCollector};
//! # use stormweave::tuple::Tuple;
//! # struct Words;
//! # impl Spout for Words {
//! #   type MessageId = u64;
//! #   fn next_tuple(&mut self, _c: &mut SpoutCollector<u64>) {}
//! # }
//! # struct Count;
//! # impl Bolt for Count {
//! #   fn execute(&mut self, input: Tuple, c: &mut OutputCollector) { c.ack(&input) }
//! # }
//!
//! # async fn run() -> Result<(), stormweave::error::TopologyError> {
//! let mut builder = TopologyBuilder::new();
//! builder.set_spout("words", 2, || Words).output("default", &["word"]);
//! builder
//!   .set_bolt("count", 4, || Count)
//!   .input("words", "default", Grouping::fields(["word"]));
//!
//! let cluster = LocalCluster::submit(builder, TopologyConfig::default(), Arc::new(LogReporter))?;
//! cluster.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::acker::Acker;
use crate::bolt::{Bolt, OutputCollector};
use crate::config::TopologyConfig;
use crate::error::{ErrorReporter, TopologyError};
use crate::executor::{AckerExecutor, BoltExecutor, SpoutExecutor};
use crate::grouping::{Grouping, GroupingRegistry};
use crate::send_targets::TaskSendTargets;
use crate::spout::{Spout, SpoutCollector};
use crate::topology::{TopologyContext, TopologyLayout};
use crate::transfer::{ChannelTransfer, Transfer};
use crate::tuple::{ACKER_COMPONENT_ID, DEFAULT_STREAM_ID, Fields, TaskId, Tuple, is_system_stream};
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Everything a task executor needs, handed to the component's spawner.
struct TaskWiring {
  targets: TaskSendTargets,
  transfer: Arc<dyn Transfer>,
  reporter: Arc<dyn ErrorReporter>,
  inbox: mpsc::UnboundedReceiver<Tuple>,
  config: TopologyConfig,
  shutdown: CancellationToken,
}

type Spawner = Box<dyn Fn(TaskWiring) -> JoinHandle<()> + Send + Sync>;

#[derive(Clone, Debug)]
struct InputDecl {
  source: String,
  stream: String,
  grouping: Grouping,
}

struct ComponentDecl {
  id: String,
  parallelism: u32,
  outputs: Vec<(String, Vec<String>)>,
  inputs: Vec<InputDecl>,
  spawner: Spawner,
}

/// Fluent declaration of a topology.
pub struct TopologyBuilder {
  components: Vec<ComponentDecl>,
  registry: GroupingRegistry,
}

impl Default for TopologyBuilder {
  fn default() -> Self {
    Self::new()
  }
}

impl TopologyBuilder {
  /// Creates an empty topology.
  pub fn new() -> Self {
    Self {
      components: Vec::new(),
      registry: GroupingRegistry::new(),
    }
  }

  /// Registry consulted for serialized custom groupings.
  pub fn registry_mut(&mut self) -> &mut GroupingRegistry {
    &mut self.registry
  }

  /// Declares a source component; `factory` builds one spout per task.
  pub fn set_spout<S, F>(&mut self, id: &str, parallelism: u32, factory: F) -> ComponentDeclarer<'_>
  where
    S: Spout,
    F: Fn() -> S + Send + Sync + 'static,
  {
    let spawner: Spawner = Box::new(move |wiring: TaskWiring| {
      let collector = SpoutCollector::new(
        wiring.targets,
        wiring.transfer,
        wiring.reporter,
        &wiring.config,
      );
      let executor = SpoutExecutor::new(factory(), collector, wiring.inbox, &wiring.config);
      let shutdown = wiring.shutdown;
      tokio::spawn(async move {
        executor.run(shutdown).await;
      })
    });
    self.declare(id, parallelism, spawner)
  }

  /// Declares an operator component; `factory` builds one bolt per task.
  pub fn set_bolt<B, F>(&mut self, id: &str, parallelism: u32, factory: F) -> ComponentDeclarer<'_>
  where
    B: Bolt,
    F: Fn() -> B + Send + Sync + 'static,
  {
    let spawner: Spawner = Box::new(move |wiring: TaskWiring| {
      let collector = OutputCollector::new(
        wiring.targets,
        wiring.transfer,
        wiring.reporter,
        &wiring.config,
      );
      let executor = BoltExecutor::new(factory(), collector, wiring.inbox);
      let shutdown = wiring.shutdown;
      tokio::spawn(async move {
        executor.run(shutdown).await;
      })
    });
    self.declare(id, parallelism, spawner)
  }

  fn declare(&mut self, id: &str, parallelism: u32, spawner: Spawner) -> ComponentDeclarer<'_> {
    self.components.push(ComponentDecl {
      id: id.to_string(),
      parallelism,
      outputs: Vec::new(),
      inputs: Vec::new(),
      spawner,
    });
    let index = self.components.len() - 1;
    ComponentDeclarer {
      decl: &mut self.components[index],
    }
  }
}

/// Adds output streams and subscriptions to the component just declared.
pub struct ComponentDeclarer<'a> {
  decl: &'a mut ComponentDecl,
}

impl ComponentDeclarer<'_> {
  /// Declares an output stream with the given field names.
  pub fn output(self, stream: &str, fields: &[&str]) -> Self {
    self.decl.outputs.push((
      stream.to_string(),
      fields.iter().map(|f| f.to_string()).collect(),
    ));
    self
  }

  /// Subscribes to `stream` of `source` using `grouping`.
  pub fn input(self, source: &str, stream: &str, grouping: Grouping) -> Self {
    self.decl.inputs.push(InputDecl {
      source: source.to_string(),
      stream: stream.to_string(),
      grouping,
    });
    self
  }

  /// Shuffle subscription to the default stream of `source`.
  pub fn shuffle_grouping(self, source: &str) -> Self {
    self.input(source, DEFAULT_STREAM_ID, Grouping::Shuffle)
  }

  /// Fields subscription to the default stream of `source`.
  pub fn fields_grouping(self, source: &str, fields: &[&str]) -> Self {
    self.input(
      source,
      DEFAULT_STREAM_ID,
      Grouping::fields(fields.iter().copied()),
    )
  }

  /// Broadcast subscription to the default stream of `source`.
  pub fn all_grouping(self, source: &str) -> Self {
    self.input(source, DEFAULT_STREAM_ID, Grouping::All)
  }
}

/// A running in-process topology.
pub struct LocalCluster {
  shutdown: CancellationToken,
  handles: Vec<JoinHandle<()>>,
  transfer: Arc<ChannelTransfer>,
  layout: Arc<TopologyLayout>,
}

impl LocalCluster {
  /// Validates `builder`, wires every task and starts the executors.
  ///
  /// Must be called from within a tokio runtime.
  pub fn submit(
    builder: TopologyBuilder,
    config: TopologyConfig,
    reporter: Arc<dyn ErrorReporter>,
  ) -> Result<Self, TopologyError> {
    config.validate()?;
    let TopologyBuilder {
      mut components,
      registry,
    } = builder;
    components.sort_by(|a, b| a.id.cmp(&b.id));

    let schemas = validate(&components)?;
    let (layout, assignment) = assign_tasks(&components, schemas, config.ackers);
    let layout = Arc::new(layout);
    let all_tasks = layout.task_ids();

    let mut transfer = ChannelTransfer::new();
    let mut inboxes: HashMap<TaskId, mpsc::UnboundedReceiver<Tuple>> = all_tasks
      .iter()
      .map(|&task| (task, transfer.register(task)))
      .collect();
    let transfer = Arc::new(transfer);
    let shared: Arc<dyn Transfer> = transfer.clone();
    let shutdown = CancellationToken::new();

    // Nothing is spawned until every task is wired.
    let mut wirings: Vec<(usize, TaskWiring)> = Vec::new();
    for (index, component) in components.iter().enumerate() {
      for &task in &assignment[&component.id] {
        let context = Arc::new(TopologyContext::new(
          Arc::clone(&layout),
          task,
          all_tasks.clone(),
        )?);
        let mut targets = TaskSendTargets::new(context);
        for subscriber in &components {
          for input in subscriber.inputs.iter().filter(|i| i.source == component.id) {
            targets.subscribe(&input.stream, &subscriber.id, &input.grouping, &registry)?;
          }
        }
        if config.reliability_enabled() {
          targets.subscribe_acker()?;
        }
        let wiring = TaskWiring {
          targets,
          transfer: Arc::clone(&shared),
          reporter: Arc::clone(&reporter),
          inbox: take_inbox(&mut inboxes, task)?,
          config: config.clone(),
          shutdown: shutdown.child_token(),
        };
        wirings.push((index, wiring));
      }
    }
    let mut ackers = Vec::new();
    for &task in &assignment[ACKER_COMPONENT_ID] {
      let context = Arc::new(TopologyContext::new(
        Arc::clone(&layout),
        task,
        all_tasks.clone(),
      )?);
      let acker = Acker::new(context, Arc::clone(&shared), Arc::clone(&reporter), &config);
      let executor = AckerExecutor::new(acker, take_inbox(&mut inboxes, task)?, &config);
      ackers.push(executor);
    }

    let mut handles = Vec::with_capacity(all_tasks.len());
    for executor in ackers {
      let token = shutdown.child_token();
      handles.push(tokio::spawn(async move {
        executor.run(token).await;
      }));
    }
    for (index, wiring) in wirings {
      handles.push((components[index].spawner)(wiring));
    }

    info!(
      components = components.len(),
      tasks = all_tasks.len(),
      ackers = config.ackers,
      "topology submitted"
    );
    Ok(Self {
      shutdown,
      handles,
      transfer,
      layout,
    })
  }

  /// Task ids assigned to `component`.
  pub fn component_tasks(&self, component: &str) -> Vec<TaskId> {
    self.layout.component_tasks(component)
  }

  /// Layout of the running topology.
  pub fn layout(&self) -> &TopologyLayout {
    &self.layout
  }

  /// Tuples that could not be delivered to an inbox.
  pub fn dropped_transfers(&self) -> u64 {
    self.transfer.dropped()
  }

  /// Stops every executor and waits for them to finish.
  pub async fn shutdown(self) {
    self.shutdown.cancel();
    for result in join_all(self.handles).await {
      if let Err(e) = result {
        warn!(error = %e, "task executor ended abnormally");
      }
    }
    info!("topology stopped");
  }
}

fn take_inbox(
  inboxes: &mut HashMap<TaskId, mpsc::UnboundedReceiver<Tuple>>,
  task: TaskId,
) -> Result<mpsc::UnboundedReceiver<Tuple>, TopologyError> {
  inboxes
    .remove(&task)
    .ok_or_else(|| TopologyError::UnknownComponent(format!("task {}", task)))
}

fn validate(
  components: &[ComponentDecl],
) -> Result<BTreeMap<String, Vec<(String, Fields)>>, TopologyError> {
  let mut schemas: BTreeMap<String, Vec<(String, Fields)>> = BTreeMap::new();
  for component in components {
    if component.id.starts_with("__") {
      return Err(TopologyError::ReservedComponent(component.id.clone()));
    }
    if component.parallelism == 0 {
      return Err(TopologyError::ZeroParallelism(component.id.clone()));
    }
    if schemas.contains_key(&component.id) {
      return Err(TopologyError::DuplicateComponent(component.id.clone()));
    }
    let mut streams = Vec::with_capacity(component.outputs.len());
    for (stream, names) in &component.outputs {
      if is_system_stream(stream) {
        return Err(TopologyError::InvalidFields {
          component: component.id.clone(),
          stream: stream.clone(),
          reason: "stream id is reserved".to_string(),
        });
      }
      let fields =
        Fields::new(names.iter().cloned()).map_err(|reason| TopologyError::InvalidFields {
          component: component.id.clone(),
          stream: stream.clone(),
          reason,
        })?;
      streams.push((stream.clone(), fields));
    }
    schemas.insert(component.id.clone(), streams);
  }

  for component in components {
    for input in &component.inputs {
      let streams = schemas
        .get(&input.source)
        .ok_or_else(|| TopologyError::UnknownComponent(input.source.clone()))?;
      if !streams.iter().any(|(name, _)| name == &input.stream) {
        return Err(TopologyError::UnknownStream {
          component: input.source.clone(),
          stream: input.stream.clone(),
        });
      }
    }
  }
  Ok(schemas)
}

fn assign_tasks(
  components: &[ComponentDecl],
  mut schemas: BTreeMap<String, Vec<(String, Fields)>>,
  ackers: u32,
) -> (TopologyLayout, HashMap<String, Vec<TaskId>>) {
  let mut layout = TopologyLayout::new();
  let mut assignment = HashMap::new();
  let mut next: TaskId = 1;
  let mut allocate = |count: u32| {
    let tasks: Vec<TaskId> = (next..next + count).collect();
    next += count;
    tasks
  };
  for component in components {
    let tasks = allocate(component.parallelism);
    let streams = schemas.remove(&component.id).unwrap_or_default();
    layout.add_component(&component.id, tasks.iter().copied(), streams);
    assignment.insert(component.id.clone(), tasks);
  }
  let acker_tasks = allocate(ackers);
  layout.add_component(
    ACKER_COMPONENT_ID,
    acker_tasks.iter().copied(),
    std::iter::empty::<(&str, Fields)>(),
  );
  assignment.insert(ACKER_COMPONENT_ID.to_string(), acker_tasks);
  (layout, assignment)
}
