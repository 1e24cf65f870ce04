//! # Records and Their Envelope
//!
//! A [`Tuple`] is one unit of data flowing along a named stream between
//! tasks. Besides its field [`Value`]s it carries the id of the task that
//! emitted it, the stream it was emitted on, and a [`MessageId`] describing
//! its ancestry for reliability tracking.
//!
//! ## Ancestry
//!
//! A [`MessageId`] maps every root tracking id the tuple belongs to onto the
//! edge id issued for this particular tuple. An empty map means the tuple is
//! unanchored: its failure is never tracked.
//!
//! ```rust
//! use stormweave::tuple::{MessageId, Tuple, Value};
//!
//! let tuple = Tuple::new(7, "words", vec![Value::from("storm")], MessageId::root(42, 9));
//! assert!(tuple.message_id().is_anchored());
//! assert_eq!(tuple.message_id().anchors().get(&42), Some(&9));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Identifier of one task instance in the topology.
pub type TaskId = u32;

/// Root tracking id minted once per reliable top-level emission.
pub type RootId = u64;

/// Default stream name used when a component declares a single output.
pub const DEFAULT_STREAM_ID: &str = "default";

/// Reserved component id of the completion tracker tasks.
pub const ACKER_COMPONENT_ID: &str = "__acker";

/// Stream carrying the first tracking record of a tuple tree.
pub const ACKER_INIT_STREAM_ID: &str = "__ack_init";

/// Stream carrying edge acknowledgements, and tracker → source ack callbacks.
pub const ACKER_ACK_STREAM_ID: &str = "__ack_ack";

/// Stream carrying explicit failures, and tracker → source fail callbacks.
pub const ACKER_FAIL_STREAM_ID: &str = "__ack_fail";

/// Returns true for the streams reserved by the acking protocol.
pub fn is_system_stream(stream: &str) -> bool {
  matches!(
    stream,
    ACKER_INIT_STREAM_ID | ACKER_ACK_STREAM_ID | ACKER_FAIL_STREAM_ID
  )
}

/// A single typed field value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
  /// Absent value.
  Null,
  /// Boolean value.
  Bool(bool),
  /// Signed integer.
  Int(i64),
  /// Unsigned integer; tracking ids travel in this form.
  UInt(u64),
  /// Floating point value, hashed by bit pattern.
  Float(f64),
  /// UTF-8 string.
  Str(String),
  /// Raw bytes.
  Bytes(Vec<u8>),
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

fn fnv1a(mut hash: u64, bytes: &[u8]) -> u64 {
  for byte in bytes {
    hash ^= u64::from(*byte);
    hash = hash.wrapping_mul(FNV_PRIME);
  }
  hash
}

impl Value {
  /// Returns the unsigned payload, if this is a `UInt`.
  pub fn as_u64(&self) -> Option<u64> {
    match self {
      Value::UInt(v) => Some(*v),
      Value::Int(v) if *v >= 0 => Some(*v as u64),
      _ => None,
    }
  }

  /// Returns the string payload, if this is a `Str`.
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::Str(s) => Some(s),
      _ => None,
    }
  }

  /// Folds this value into a running FNV-1a digest.
  ///
  /// The encoding is a type tag followed by a fixed-width or length-prefixed
  /// payload, so the digest is stable across processes and toolchains.
  pub fn digest_into(&self, hash: u64) -> u64 {
    match self {
      Value::Null => fnv1a(hash, &[0]),
      Value::Bool(b) => fnv1a(fnv1a(hash, &[1]), &[u8::from(*b)]),
      Value::Int(v) => fnv1a(fnv1a(hash, &[2]), &v.to_le_bytes()),
      Value::UInt(v) => fnv1a(fnv1a(hash, &[3]), &v.to_le_bytes()),
      Value::Float(v) => fnv1a(fnv1a(hash, &[4]), &v.to_bits().to_le_bytes()),
      Value::Str(s) => {
        let hash = fnv1a(fnv1a(hash, &[5]), &(s.len() as u64).to_le_bytes());
        fnv1a(hash, s.as_bytes())
      }
      Value::Bytes(b) => {
        let hash = fnv1a(fnv1a(hash, &[6]), &(b.len() as u64).to_le_bytes());
        fnv1a(hash, b)
      }
    }
  }
}

/// Stable digest of a sequence of values.
pub fn digest_values<'a>(values: impl IntoIterator<Item = &'a Value>) -> u64 {
  values
    .into_iter()
    .fold(FNV_OFFSET_BASIS, |hash, value| value.digest_into(hash))
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Value::Str(s.to_string())
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Value::Str(s)
  }
}

impl From<i64> for Value {
  fn from(v: i64) -> Self {
    Value::Int(v)
  }
}

impl From<u64> for Value {
  fn from(v: u64) -> Self {
    Value::UInt(v)
  }
}

impl From<bool> for Value {
  fn from(v: bool) -> Self {
    Value::Bool(v)
  }
}

impl From<f64> for Value {
  fn from(v: f64) -> Self {
    Value::Float(v)
  }
}

impl Display for Value {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      Value::Null => write!(f, "null"),
      Value::Bool(b) => write!(f, "{}", b),
      Value::Int(v) => write!(f, "{}", v),
      Value::UInt(v) => write!(f, "{}", v),
      Value::Float(v) => write!(f, "{}", v),
      Value::Str(s) => write!(f, "{:?}", s),
      Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
    }
  }
}

/// Ordered output field schema of one stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Fields {
  names: Vec<String>,
}

impl Fields {
  /// Creates a schema, rejecting duplicate field names.
  pub fn new<I, S>(names: I) -> Result<Self, String>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let names: Vec<String> = names.into_iter().map(Into::into).collect();
    for (i, name) in names.iter().enumerate() {
      if names[..i].contains(name) {
        return Err(format!("duplicate field name `{}`", name));
      }
    }
    Ok(Self { names })
  }

  /// Number of fields.
  pub fn len(&self) -> usize {
    self.names.len()
  }

  /// Returns true when the schema declares no fields.
  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  /// Position of `name` within the schema.
  pub fn index_of(&self, name: &str) -> Option<usize> {
    self.names.iter().position(|n| n == name)
  }

  /// Returns true when `name` is declared.
  pub fn contains(&self, name: &str) -> bool {
    self.index_of(name).is_some()
  }

  /// Field names in declaration order.
  pub fn names(&self) -> &[String] {
    &self.names
  }

  /// Resolves `selector` into positions within this schema.
  ///
  /// Returns the first name that is not declared as the error.
  pub fn positions(&self, selector: &Fields) -> Result<Vec<usize>, String> {
    selector
      .names
      .iter()
      .map(|name| self.index_of(name).ok_or_else(|| name.clone()))
      .collect()
  }

  /// Projects `values`, laid out by this schema, onto `selector`.
  pub fn select(&self, selector: &Fields, values: &[Value]) -> Result<Vec<Value>, String> {
    Ok(
      self
        .positions(selector)?
        .into_iter()
        .map(|i| values.get(i).cloned().unwrap_or(Value::Null))
        .collect(),
    )
  }
}

impl TryFrom<Vec<String>> for Fields {
  type Error = String;

  fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
    Fields::new(names)
  }
}

impl From<Fields> for Vec<String> {
  fn from(fields: Fields) -> Self {
    fields.names
  }
}

/// Ancestry of a tuple: root tracking id → edge id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageId {
  anchors: BTreeMap<RootId, u64>,
}

impl MessageId {
  /// A message id with no ancestry; failures are untracked.
  pub fn unanchored() -> Self {
    Self::default()
  }

  /// A message id belonging to a single tuple tree.
  pub fn root(root: RootId, edge: u64) -> Self {
    let mut anchors = BTreeMap::new();
    anchors.insert(root, edge);
    Self { anchors }
  }

  /// Builds a message id from an explicit anchor map.
  pub fn from_anchors(anchors: BTreeMap<RootId, u64>) -> Self {
    Self { anchors }
  }

  /// Returns true when the tuple belongs to at least one tuple tree.
  pub fn is_anchored(&self) -> bool {
    !self.anchors.is_empty()
  }

  /// Root → edge map.
  pub fn anchors(&self) -> &BTreeMap<RootId, u64> {
    &self.anchors
  }

  /// Root tracking ids this tuple belongs to.
  pub fn roots(&self) -> impl Iterator<Item = RootId> + '_ {
    self.anchors.keys().copied()
  }
}

impl Display for MessageId {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    if self.anchors.is_empty() {
      return write!(f, "unanchored");
    }
    write!(f, "{{")?;
    for (i, (root, edge)) in self.anchors.iter().enumerate() {
      if i > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{:016x}:{:016x}", root, edge)?;
    }
    write!(f, "}}")
  }
}

/// One record flowing between tasks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
  source_task: TaskId,
  stream: String,
  values: Vec<Value>,
  message_id: MessageId,
  /// XOR of the edge ids of every child anchored on this tuple. Local to the
  /// task that received the tuple; never travels with it.
  #[serde(skip)]
  ack_val: u64,
}

impl Tuple {
  /// Creates a tuple emitted by `source_task` on `stream`.
  pub fn new(
    source_task: TaskId,
    stream: impl Into<String>,
    values: Vec<Value>,
    message_id: MessageId,
  ) -> Self {
    Self {
      source_task,
      stream: stream.into(),
      values,
      message_id,
      ack_val: 0,
    }
  }

  /// Task that emitted this tuple.
  pub fn source_task(&self) -> TaskId {
    self.source_task
  }

  /// Stream this tuple was emitted on.
  pub fn stream(&self) -> &str {
    &self.stream
  }

  /// Field values in schema order.
  pub fn values(&self) -> &[Value] {
    &self.values
  }

  /// Value at position `index`.
  pub fn value(&self, index: usize) -> Option<&Value> {
    self.values.get(index)
  }

  /// Ancestry of this tuple.
  pub fn message_id(&self) -> &MessageId {
    &self.message_id
  }

  /// Consumes the tuple, returning its values.
  pub fn into_values(self) -> Vec<Value> {
    self.values
  }

  pub(crate) fn ack_val(&self) -> u64 {
    self.ack_val
  }

  pub(crate) fn update_ack_val(&mut self, edge: u64) {
    self.ack_val ^= edge;
  }
}
