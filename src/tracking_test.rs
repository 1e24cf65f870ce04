use crate::tracking::{Outcome, TrackerCallback, TrackingRecord};
use crate::tuple::{
  ACKER_ACK_STREAM_ID, ACKER_FAIL_STREAM_ID, ACKER_INIT_STREAM_ID, MessageId, Tuple, Value,
};

fn as_tuple(record: TrackingRecord) -> Tuple {
  Tuple::new(9, record.stream(), record.to_values(), MessageId::unanchored())
}

#[test]
fn test_records_parse_from_their_streams() {
  let records = [
    TrackingRecord::Init {
      root: 1,
      ack_val: 0xdead,
      spout_task: 4,
    },
    TrackingRecord::Ack {
      root: 2,
      ack_val: 0xbeef,
    },
    TrackingRecord::Fail { root: 3 },
  ];
  for record in records {
    assert_eq!(TrackingRecord::from_tuple(&as_tuple(record)), Some(record));
  }
}

#[test]
fn test_record_streams() {
  assert_eq!(
    TrackingRecord::Fail { root: 1 }.stream(),
    ACKER_FAIL_STREAM_ID
  );
  assert_eq!(
    TrackingRecord::Ack { root: 1, ack_val: 0 }.stream(),
    ACKER_ACK_STREAM_ID
  );
}

#[test]
fn test_malformed_records_are_rejected() {
  let short = Tuple::new(
    9,
    ACKER_INIT_STREAM_ID,
    vec![Value::UInt(1)],
    MessageId::unanchored(),
  );
  assert_eq!(TrackingRecord::from_tuple(&short), None);

  let wrong_type = Tuple::new(
    9,
    ACKER_ACK_STREAM_ID,
    vec![Value::from("x"), Value::UInt(1)],
    MessageId::unanchored(),
  );
  assert_eq!(TrackingRecord::from_tuple(&wrong_type), None);

  let user = Tuple::new(9, "default", vec![Value::UInt(1)], MessageId::unanchored());
  assert_eq!(TrackingRecord::from_tuple(&user), None);
}

#[test]
fn test_callback_tuple() {
  let tuple = TrackerCallback {
    root: 77,
    outcome: Outcome::Failed,
  }
  .into_tuple(6);
  assert_eq!(tuple.source_task(), 6);
  assert_eq!(tuple.stream(), ACKER_FAIL_STREAM_ID);
  assert!(!tuple.message_id().is_anchored());
  assert_eq!(
    TrackerCallback::from_tuple(&tuple),
    Some(TrackerCallback {
      root: 77,
      outcome: Outcome::Failed
    })
  );
}
