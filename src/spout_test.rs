use crate::error::CollectingReporter;
use crate::grouping::Grouping;
use crate::send_targets::TaskSendTargets;
use crate::spout::SpoutCollector;
use crate::test_support::{
  ACKER_TASK, BOLT_TASKS, RecordingTransfer, SPOUT_TASK, config, context, layout,
  spout_collector,
};
use crate::tracking::{Outcome, TrackerCallback, TrackingRecord};
use crate::tuple::{ACKER_FAIL_STREAM_ID, ACKER_INIT_STREAM_ID, MessageId, RootId, Tuple, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn word(w: &str) -> Vec<Value> {
  vec![Value::from(w), Value::UInt(1)]
}

fn user_tuples(transfer: &RecordingTransfer) -> Vec<(u32, Tuple)> {
  transfer.on_stream("default")
}

fn init_record(transfer: &RecordingTransfer) -> TrackingRecord {
  let inits = transfer.on_stream(ACKER_INIT_STREAM_ID);
  assert_eq!(inits.len(), 1);
  assert_eq!(inits[0].0, ACKER_TASK);
  TrackingRecord::from_tuple(&inits[0].1).unwrap()
}

#[test]
fn test_unanchored_emission_has_no_bookkeeping() {
  let transfer = RecordingTransfer::new();
  let reporter = CollectingReporter::new();
  let mut collector = spout_collector(&transfer, &reporter, Grouping::All, 1);

  let mut tasks = collector.emit("default", word("a"), None);
  tasks.sort_unstable();
  assert_eq!(tasks, BOLT_TASKS.to_vec());

  let sent = transfer.sent();
  assert_eq!(sent.len(), 3);
  assert!(sent.iter().all(|(_, t)| !t.message_id().is_anchored()));
  assert_eq!(collector.pending_count(), 0);
  assert!(collector.drain_completions().is_empty());
  assert!(reporter.is_empty());
}

#[test]
fn test_reliable_emission_starts_a_tree() {
  let transfer = RecordingTransfer::new();
  let reporter = CollectingReporter::new();
  let mut collector = spout_collector(&transfer, &reporter, Grouping::All, 1);

  collector.emit("default", word("a"), Some("m1"));

  let tuples = user_tuples(&transfer);
  assert_eq!(tuples.len(), 3);
  let root: RootId = *tuples[0].1.message_id().anchors().keys().next().unwrap();
  let mut edges = Vec::new();
  for (_, tuple) in &tuples {
    let anchors = tuple.message_id().anchors();
    assert_eq!(anchors.len(), 1);
    edges.push(anchors[&root]);
  }
  edges.sort_unstable();
  edges.dedup();
  assert_eq!(edges.len(), 3, "each destination gets its own edge");

  assert_eq!(
    init_record(&transfer),
    TrackingRecord::Init {
      root,
      ack_val: edges.iter().fold(0, |acc, e| acc ^ e),
      spout_task: SPOUT_TASK,
    }
  );
  assert!(collector.is_pending(root));
  assert_eq!(collector.pending_count(), 1);
}

#[test]
fn test_empty_destinations_short_circuit() {
  let transfer = RecordingTransfer::new();
  let reporter = CollectingReporter::new();
  let mut targets = TaskSendTargets::new(context(&layout(), SPOUT_TASK));
  targets.subscribe_acker().unwrap();
  let mut collector: SpoutCollector<&str> = SpoutCollector::new(
    targets,
    transfer.clone(),
    Arc::new(reporter.clone()),
    &config(1),
  );

  assert!(collector.emit("default", word("a"), Some("m1")).is_empty());
  assert!(transfer.sent().is_empty());
  assert_eq!(collector.pending_count(), 0);
  assert!(collector.drain_completions().is_empty());
  assert_eq!(collector.stats().total_emitted(), 0);
}

#[test]
fn test_without_trackers_acks_immediately() {
  let transfer = RecordingTransfer::new();
  let reporter = CollectingReporter::new();
  let mut collector = spout_collector(&transfer, &reporter, Grouping::Shuffle, 0);

  let tasks = collector.emit("default", word("a"), Some("m1"));
  assert_eq!(tasks.len(), 1);

  let sent = transfer.sent();
  assert_eq!(sent.len(), 1);
  assert_eq!(sent[0].1.message_id(), &MessageId::unanchored());
  assert_eq!(collector.pending_count(), 0);

  let completions = collector.drain_completions();
  assert_eq!(completions.len(), 1);
  assert_eq!(completions[0].message_id, "m1");
  assert_eq!(completions[0].outcome, Outcome::Acked);
  assert_eq!(completions[0].root, None);
  assert!(collector.drain_completions().is_empty());
}

#[test]
fn test_ack_callback_resolves_once() {
  let transfer = RecordingTransfer::new();
  let reporter = CollectingReporter::new();
  let mut collector = spout_collector(&transfer, &reporter, Grouping::All, 1);
  collector.emit("default", word("a"), Some("m1"));
  let root = init_record(&transfer).root();

  let ack = TrackerCallback {
    root,
    outcome: Outcome::Acked,
  }
  .into_tuple(ACKER_TASK);
  collector.on_tracker_callback(&ack, Instant::now());
  collector.on_tracker_callback(&ack, Instant::now());

  let completions = collector.drain_completions();
  assert_eq!(completions.len(), 1);
  assert_eq!(completions[0].message_id, "m1");
  assert_eq!(completions[0].root, Some(root));
  assert_eq!(completions[0].values, word("a"));
  assert!(!collector.is_pending(root));
  assert_eq!(collector.stats().acked("default"), 1);
  assert!(collector.stats().average_complete_latency().is_some());
}

#[test]
fn test_local_expiry_fails_and_wins() {
  let transfer = RecordingTransfer::new();
  let reporter = CollectingReporter::new();
  let mut collector = spout_collector(&transfer, &reporter, Grouping::All, 1);
  collector.emit("default", word("a"), Some("m1"));
  collector.emit("default", word("b"), None);
  let root = init_record(&transfer).root();

  let later = Instant::now() + Duration::from_secs(31);
  assert_eq!(collector.expire(later), 1);
  collector.resolve(root, Outcome::Acked, later);

  let completions = collector.drain_completions();
  assert_eq!(completions.len(), 1);
  assert_eq!(completions[0].outcome, Outcome::Failed);
  assert_eq!(collector.stats().failed("default"), 1);
  assert_eq!(collector.stats().acked("default"), 0);
}

#[test]
fn test_emission_errors_are_reported() {
  let transfer = RecordingTransfer::new();
  let reporter = CollectingReporter::new();
  let mut collector = spout_collector(&transfer, &reporter, Grouping::All, 1);

  assert!(collector.emit("nope", word("a"), Some("m1")).is_empty());
  collector.emit_direct(2, "default", word("a"), None);

  let errors = reporter.errors();
  assert_eq!(errors.len(), 2);
  assert_eq!(errors[0].task_id, SPOUT_TASK);
  assert_eq!(errors[0].component_id, "spout");
  assert!(errors[0].message.contains("nope"));
  assert!(transfer.sent().is_empty());
  assert_eq!(collector.pending_count(), 0);
}

#[test]
fn test_unexpected_callback_is_reported() {
  let transfer = RecordingTransfer::new();
  let reporter = CollectingReporter::new();
  let mut collector = spout_collector(&transfer, &reporter, Grouping::All, 1);
  let stray = Tuple::new(9, "default", word("a"), MessageId::unanchored());
  collector.on_tracker_callback(&stray, Instant::now());
  assert_eq!(reporter.len(), 1);
}

#[test]
fn test_stats_count_emissions_and_transfers() {
  let transfer = RecordingTransfer::new();
  let reporter = CollectingReporter::new();
  let mut collector = spout_collector(&transfer, &reporter, Grouping::All, 1);
  collector.emit("default", word("a"), None);
  collector.emit("default", word("b"), Some("m2"));
  assert_eq!(collector.stats().emitted("default"), 2);
  assert_eq!(collector.stats().transferred("default"), 6);
}

#[test]
fn test_user_emits_on_tracking_streams_are_rejected() {
  let transfer = RecordingTransfer::new();
  let reporter = CollectingReporter::new();
  let mut collector = spout_collector(&transfer, &reporter, Grouping::All, 1);

  assert!(
    collector
      .emit(ACKER_FAIL_STREAM_ID, vec![Value::UInt(42)], None)
      .is_empty()
  );
  assert!(transfer.sent().is_empty());
  assert_eq!(reporter.len(), 1);
  assert!(reporter.errors()[0].message.contains(ACKER_FAIL_STREAM_ID));

  collector.emit("default", word("a"), Some("m1"));
  assert_eq!(transfer.on_stream(ACKER_INIT_STREAM_ID).len(), 1);
}
