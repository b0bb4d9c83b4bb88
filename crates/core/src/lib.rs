//! The sensorgraph engine.
//!
//! A sensor graph is a directed acyclic graph of [`Node`]s. Readings arrive
//! on input streams, are persisted into the raw sensor log and propagate
//! breadth-first through the graph: each triggered node runs its processing
//! function over its input walkers and pushes the results onto its output
//! stream, waking the nodes downstream. [`Streamer`]s watch selected streams
//! and report when the readings they cover should be assembled into an
//! outbound report.
//!
//! Graphs are built from line-oriented node descriptors:
//!
//! ```text
//! (input 1) when count >= 1 => copy => buffered 2
//! ```

pub mod config;
pub mod descriptor;
pub mod error;
pub mod graph;
pub mod node;
pub mod processors;
pub mod streamer;

pub use crate::{
    error::GraphError,
    graph::SensorGraph,
    node::{Node, Trigger},
    processors::{NoRpc, ProcessingFunction, ProcessorRegistry, RpcExecutor},
    streamer::{Report, ReportFormat, ReportType, Streamer, StreamerTrigger},
};

pub use sensorgraph_log::{SensorLog, Walker};
pub use sensorgraph_primitives::{DeviceModel, Reading, Selector, Slot, StreamId, StreamType};
