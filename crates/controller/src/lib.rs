//! The emulated controller's raw sensor log surface.
//!
//! Exposes the sensor log to a remote host the way the device firmware
//! does: a fixed table of RPC handlers whose results carry packed 32-bit
//! error words instead of raised errors. Transport and serialization of RPC
//! payloads are out of scope; handlers are plain typed methods.

mod error;
pub mod rpc;
mod subsystem;

pub use crate::{
    error::{pack_error, PackedError, SensorLogError, Subsystem},
    rpc::RawSensorLog,
    subsystem::{data_cleared_stream, ResetConfig, SensorLogSubsystem},
};
