use crate::error::CollectingReporter;
use crate::test_support::{ACKER_TASK, RecordingTransfer, SINK_TASK, bolt_collector};
use crate::tracking::TrackingRecord;
use crate::tuple::{
  ACKER_ACK_STREAM_ID, ACKER_FAIL_STREAM_ID, ACKER_INIT_STREAM_ID, MessageId, RootId, Tuple,
  Value,
};
use std::collections::BTreeMap;

fn input(anchors: &[(RootId, u64)]) -> Tuple {
  Tuple::new(
    1,
    "default",
    vec![Value::from("w"), Value::UInt(1)],
    MessageId::from_anchors(anchors.iter().copied().collect::<BTreeMap<_, _>>()),
  )
}

fn records(transfer: &RecordingTransfer, stream: &str) -> Vec<TrackingRecord> {
  transfer
    .on_stream(stream)
    .into_iter()
    .map(|(task, tuple)| {
      assert_eq!(task, ACKER_TASK);
      TrackingRecord::from_tuple(&tuple).unwrap()
    })
    .collect()
}

#[test]
fn test_anchored_emit_links_child_to_roots() {
  let transfer = RecordingTransfer::new();
  let reporter = CollectingReporter::new();
  let mut collector = bolt_collector(2, &transfer, &reporter, 1);
  let mut parent = input(&[(100, 0xa), (200, 0xb)]);

  let tasks = collector.emit("default", &mut [&mut parent], vec![Value::from("x")]);
  assert_eq!(tasks, vec![SINK_TASK]);

  let sent = transfer.on_stream("default");
  assert_eq!(sent.len(), 1);
  let child = &sent[0].1;
  let anchors = child.message_id().anchors();
  assert_eq!(anchors.keys().copied().collect::<Vec<_>>(), vec![100, 200]);
  let edge = anchors[&100];
  assert_eq!(anchors[&200], edge);
  assert_eq!(parent.ack_val(), edge);
}

#[test]
fn test_ack_cancels_own_edge_and_adds_children() {
  let transfer = RecordingTransfer::new();
  let reporter = CollectingReporter::new();
  let mut collector = bolt_collector(2, &transfer, &reporter, 1);
  let mut parent = input(&[(100, 0xa)]);

  collector.emit("default", &mut [&mut parent], vec![Value::from("x")]);
  collector.emit("default", &mut [&mut parent], vec![Value::from("y")]);
  let children: Vec<u64> = transfer
    .on_stream("default")
    .iter()
    .map(|(_, t)| t.message_id().anchors()[&100])
    .collect();
  assert_eq!(children.len(), 2);

  collector.ack(&parent);
  assert_eq!(
    records(&transfer, ACKER_ACK_STREAM_ID),
    vec![TrackingRecord::Ack {
      root: 100,
      ack_val: 0xa ^ children[0] ^ children[1],
    }]
  );
}

#[test]
fn test_multiple_anchors_on_same_root_xor_together() {
  let transfer = RecordingTransfer::new();
  let reporter = CollectingReporter::new();
  let mut collector = bolt_collector(2, &transfer, &reporter, 1);
  let mut left = input(&[(100, 0x1)]);
  let mut right = input(&[(100, 0x2)]);

  collector.emit("default", &mut [&mut left, &mut right], vec![Value::from("j")]);
  let child = transfer.on_stream("default").remove(0).1;
  assert_eq!(
    child.message_id().anchors()[&100],
    left.ack_val() ^ right.ack_val()
  );
  assert_ne!(left.ack_val(), right.ack_val());
}

#[test]
fn test_unanchored_input_stays_untracked() {
  let transfer = RecordingTransfer::new();
  let reporter = CollectingReporter::new();
  let mut collector = bolt_collector(2, &transfer, &reporter, 1);
  let mut parent = input(&[]);

  collector.emit("default", &mut [&mut parent], vec![Value::from("x")]);
  collector.ack(&parent);
  collector.fail(&parent);

  let sent = transfer.sent();
  assert_eq!(sent.len(), 1);
  assert!(!sent[0].1.message_id().is_anchored());
}

#[test]
fn test_without_trackers_ack_and_fail_are_noops() {
  let transfer = RecordingTransfer::new();
  let reporter = CollectingReporter::new();
  let mut collector = bolt_collector(2, &transfer, &reporter, 0);
  let mut parent = input(&[(100, 0xa)]);

  collector.emit("default", &mut [&mut parent], vec![Value::from("x")]);
  collector.ack(&parent);
  collector.fail(&parent);

  let sent = transfer.sent();
  assert_eq!(sent.len(), 1);
  assert!(!sent[0].1.message_id().is_anchored());
  assert_eq!(parent.ack_val(), 0);
  assert!(reporter.is_empty());
}

#[test]
fn test_fail_reports_every_root() {
  let transfer = RecordingTransfer::new();
  let reporter = CollectingReporter::new();
  let mut collector = bolt_collector(2, &transfer, &reporter, 1);
  collector.fail(&input(&[(100, 0xa), (200, 0xb)]));
  assert_eq!(
    records(&transfer, ACKER_FAIL_STREAM_ID),
    vec![
      TrackingRecord::Fail { root: 100 },
      TrackingRecord::Fail { root: 200 }
    ]
  );
  assert_eq!(collector.stats().failed("default"), 1);
}

#[test]
fn test_emit_errors_leave_anchors_untouched() {
  let transfer = RecordingTransfer::new();
  let reporter = CollectingReporter::new();
  let mut collector = bolt_collector(2, &transfer, &reporter, 1);
  let mut parent = input(&[(100, 0xa)]);

  let tasks = collector.emit("default", &mut [&mut parent], vec![]);
  assert!(tasks.is_empty());
  collector.emit_direct(SINK_TASK, "default", &mut [&mut parent], vec![Value::from("x")]);

  assert_eq!(parent.ack_val(), 0);
  assert!(transfer.sent().is_empty());
  assert_eq!(reporter.len(), 2);
  assert_eq!(reporter.errors()[0].component_id, "bolt");
}

#[test]
fn test_user_emits_on_tracking_streams_are_rejected() {
  let transfer = RecordingTransfer::new();
  let reporter = CollectingReporter::new();
  let mut collector = bolt_collector(2, &transfer, &reporter, 1);

  let forged = collector.emit(ACKER_FAIL_STREAM_ID, &mut [], vec![Value::UInt(42)]);
  assert!(forged.is_empty());
  collector.emit(
    ACKER_ACK_STREAM_ID,
    &mut [],
    vec![Value::UInt(42), Value::UInt(7)],
  );
  collector.emit_direct(
    ACKER_TASK,
    ACKER_INIT_STREAM_ID,
    &mut [],
    vec![Value::UInt(42), Value::UInt(7), Value::UInt(1)],
  );

  assert!(transfer.sent().is_empty());
  let errors = reporter.errors();
  assert_eq!(errors.len(), 3);
  assert!(errors.iter().all(|e| e.message.contains("reserved")));

  // The collector's own tracking traffic still flows.
  collector.fail(&input(&[(100, 0xa)]));
  assert_eq!(
    records(&transfer, ACKER_FAIL_STREAM_ID),
    vec![TrackingRecord::Fail { root: 100 }]
  );
}
