//! Shared fixtures for unit tests.

use crate::acker::Acker;
use crate::bolt::OutputCollector;
use crate::config::TopologyConfig;
use crate::error::CollectingReporter;
use crate::grouping::{Grouping, GroupingRegistry};
use crate::send_targets::TaskSendTargets;
use crate::spout::SpoutCollector;
use crate::topology::{TopologyContext, TopologyLayout};
use crate::transfer::Transfer;
use crate::tuple::{ACKER_COMPONENT_ID, Fields, TaskId, Tuple};
use std::sync::{Arc, Mutex};

pub(crate) const SPOUT_TASK: TaskId = 1;
pub(crate) const BOLT_TASKS: [TaskId; 3] = [2, 3, 4];
pub(crate) const SINK_TASK: TaskId = 5;
pub(crate) const ACKER_TASK: TaskId = 6;

/// Transfer that keeps every sent tuple in memory.
#[derive(Debug, Default)]
pub(crate) struct RecordingTransfer {
  sent: Mutex<Vec<(TaskId, Tuple)>>,
}

impl RecordingTransfer {
  pub(crate) fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  /// Removes and returns everything sent so far.
  pub(crate) fn take(&self) -> Vec<(TaskId, Tuple)> {
    std::mem::take(&mut *self.sent.lock().unwrap())
  }

  pub(crate) fn sent(&self) -> Vec<(TaskId, Tuple)> {
    self.sent.lock().unwrap().clone()
  }

  pub(crate) fn on_stream(&self, stream: &str) -> Vec<(TaskId, Tuple)> {
    self
      .sent()
      .into_iter()
      .filter(|(_, t)| t.stream() == stream)
      .collect()
  }
}

impl Transfer for RecordingTransfer {
  fn transfer(&self, task: TaskId, tuple: Tuple) {
    self.sent.lock().unwrap().push((task, tuple));
  }
}

pub(crate) fn fields(names: &[&str]) -> Fields {
  Fields::new(names.iter().copied()).unwrap()
}

/// spout(1) -> bolt(2,3,4) -> sink(5), one tracker task (6).
pub(crate) fn layout() -> Arc<TopologyLayout> {
  Arc::new(
    TopologyLayout::new()
      .with_component("spout", [SPOUT_TASK], [("default", fields(&["word", "n"]))])
      .with_component("bolt", BOLT_TASKS, [("default", fields(&["word"]))])
      .with_component("sink", [SINK_TASK], std::iter::empty::<(&str, Fields)>())
      .with_component(
        ACKER_COMPONENT_ID,
        [ACKER_TASK],
        std::iter::empty::<(&str, Fields)>(),
      ),
  )
}

pub(crate) fn context(layout: &Arc<TopologyLayout>, task: TaskId) -> Arc<TopologyContext> {
  Arc::new(TopologyContext::new(Arc::clone(layout), task, layout.task_ids()).unwrap())
}

pub(crate) fn config(ackers: u32) -> TopologyConfig {
  TopologyConfig::default()
    .with_ackers(ackers)
    .with_message_timeout_secs(30)
}

fn targets(
  layout: &Arc<TopologyLayout>,
  task: TaskId,
  subscriber: &str,
  grouping: &Grouping,
  ackers: u32,
) -> TaskSendTargets {
  let mut targets = TaskSendTargets::new(context(layout, task));
  targets
    .subscribe("default", subscriber, grouping, &GroupingRegistry::new())
    .unwrap();
  if ackers > 0 {
    targets.subscribe_acker().unwrap();
  }
  targets
}

pub(crate) fn spout_collector(
  transfer: &Arc<RecordingTransfer>,
  reporter: &CollectingReporter,
  grouping: Grouping,
  ackers: u32,
) -> SpoutCollector<&'static str> {
  let layout = layout();
  SpoutCollector::new(
    targets(&layout, SPOUT_TASK, "bolt", &grouping, ackers),
    transfer.clone(),
    Arc::new(reporter.clone()),
    &config(ackers),
  )
  .with_seed(7)
}

pub(crate) fn bolt_collector(
  task: TaskId,
  transfer: &Arc<RecordingTransfer>,
  reporter: &CollectingReporter,
  ackers: u32,
) -> OutputCollector {
  let layout = layout();
  OutputCollector::new(
    targets(&layout, task, "sink", &Grouping::Global, ackers),
    transfer.clone(),
    Arc::new(reporter.clone()),
    &config(ackers),
  )
  .with_seed(u64::from(task))
}

pub(crate) fn acker(transfer: &Arc<RecordingTransfer>, reporter: &CollectingReporter) -> Acker {
  let layout = layout();
  Acker::new(
    context(&layout, ACKER_TASK),
    transfer.clone(),
    Arc::new(reporter.clone()),
    &config(1),
  )
}
