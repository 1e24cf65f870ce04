//! # StormWeave
//!
//! Stream grouping and guaranteed-delivery tracking for a distributed
//! stream-processing data plane.
//!
//! A topology is a graph of **spouts** (sources) and **bolts** (operators),
//! each running as one or more tasks. Every record a task emits is routed by
//! the **grouping** its subscribers declared, and every record a spout emits
//! with a message id is tracked by an **acker** task until its whole tree of
//! descendants has been processed, at which point the spout is told whether
//! the tree succeeded or failed.
//!
//! ## Key Features
//!
//! - **Groupings**: global, fields, all, shuffle, none, direct,
//!   local-or-shuffle and user-supplied custom strategies
//! - **XOR acking**: constant memory per tuple tree, whatever its size
//! - **Timeouts**: incomplete trees fail after a configurable timeout
//! - **Local runtime**: every task on its own tokio task, wired by channels
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stormweave::bolt::{Bolt, OutputCollector};
//! use stormweave::config::TopologyConfig;
//! use stormweave::error::LogReporter;
//! use stormweave::local::{LocalCluster, TopologyBuilder};
//! use stormweave::spout::{Spout, SpoutCollector};
//! use stormweave::tuple::{Tuple, Value};
//!
//! struct Numbers(u64);
//!
//! impl Spout for Numbers {
//!   type MessageId = u64;
//!   fn next_tuple(&mut self, collector: &mut SpoutCollector<u64>) {
//!     self.0 += 1;
//!     collector.emit("default", vec![Value::UInt(self.0)], Some(self.0));
//!   }
//! }
//!
//! struct Sink;
//!
//! impl Bolt for Sink {
//!   fn execute(&mut self, input: Tuple, collector: &mut OutputCollector) {
//!     collector.ack(&input);
//!   }
//! }
//!
//! # async fn run() -> Result<(), stormweave::error::TopologyError> {
//! let mut builder = TopologyBuilder::new();
//! builder.set_spout("numbers", 1, || Numbers(0)).output("default", &["n"]);
//! builder.set_bolt("sink", 2, || Sink).shuffle_grouping("numbers");
//! let cluster = LocalCluster::submit(builder, TopologyConfig::default(), Arc::new(LogReporter))?;
//! cluster.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

/// Acking-protocol tracker tasks.
pub mod acker;
/// Operator tasks and their output collector.
pub mod bolt;
/// Topology configuration.
pub mod config;
/// Error types and the error-reporting capability.
pub mod error;
/// Task processing loops.
pub mod executor;
/// Key-value map with per-entry timeouts.
pub mod expiring;
/// Grouping descriptors and resolved groupers.
pub mod grouping;
/// In-process topology builder and cluster.
pub mod local;
/// `tracing` subscriber setup.
pub mod logging;
/// Per-task routing table.
pub mod send_targets;
/// Source tasks and their emission coordinator.
pub mod spout;
/// Per-task counters.
pub mod stats;
/// Component layout and per-task context.
pub mod topology;
/// Acking-protocol records.
pub mod tracking;
/// Point-to-point tuple delivery.
pub mod transfer;
/// Records, schemas and message ids.
pub mod tuple;

pub use acker::Acker;
pub use bolt::{Bolt, OutputCollector};
pub use config::TopologyConfig;
pub use error::{EmitError, ErrorReporter, GroupingError, ReportedError, TopologyError};
pub use grouping::{Grouper, Grouping};
pub use local::{LocalCluster, TopologyBuilder};
pub use spout::{Spout, SpoutCollector};
pub use topology::{TopologyContext, TopologyLayout};
pub use tuple::{Fields, MessageId, TaskId, Tuple, Value};

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod bolt_test;
#[cfg(test)]
mod config_test;
#[cfg(test)]
mod spout_test;
#[cfg(test)]
mod tracking_test;
