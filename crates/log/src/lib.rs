//! The raw sensor log: durable in-memory storage for stream readings.
//!
//! Readings are appended to one of two fixed-capacity ring buffers
//! (`storage` for important data, `streaming` for data that may rotate
//! freely) and consumed through [`Walker`]s, cursors that observe all
//! readings matching a selector and stay valid across pushes, rollovers and
//! clears.
//!
//! [`SensorLog`] is a cheaply cloneable handle; all shared state lives behind
//! one mutex with bounded critical sections, so a separate thread may inject
//! readings while graph processing is underway.

mod engine;
mod error;
mod sensor_log;
mod snapshot;
mod walker;

pub use crate::{
    engine::{BufferKind, Pushed, StorageEngine},
    error::Error,
    sensor_log::SensorLog,
    snapshot::Snapshot,
    walker::{SeekTarget, Walker},
};

#[cfg(test)]
mod tests;
