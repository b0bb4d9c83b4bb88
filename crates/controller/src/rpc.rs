//! RPC handlers of the raw sensor log.
//!
//! Each handler mirrors one firmware RPC: inputs are the decoded argument
//! tuple, outputs are the response tuple, and the first element is always a
//! packed error word. Handlers never raise; every failure is translated
//! into a code.

use sensorgraph_log::SensorLog;
use sensorgraph_primitives::{Selector, StreamId};

use crate::error::{pack_error, PackedError, SensorLogError, Subsystem};
use crate::subsystem::{ResetConfig, SensorLogSubsystem};

/// Command ids of the raw sensor log RPCs.
pub mod rpc_ids {
    pub const PUSH_READING: u16 = 0x2000;
    pub const PUSH_MANY_READINGS: u16 = 0x2001;
    pub const COUNT_READINGS: u16 = 0x2002;
    pub const CLEAR_READINGS: u16 = 0x2003;
    pub const INSPECT_VIRTUAL_STREAM: u16 = 0x2004;
    pub const DUMP_STREAM_BEGIN: u16 = 0x2005;
    pub const DUMP_STREAM_SEEK: u16 = 0x2006;
    pub const DUMP_STREAM_NEXT: u16 = 0x2007;
    pub const HIGHEST_READING_ID: u16 = 0x2008;
}

/// The reading layout a host may request from `dump_stream_next`. Only the
/// 20-byte format is supported.
const DUMP_FORMAT_EXTENDED: u8 = 1;

fn sensor_log_error(code: SensorLogError) -> PackedError {
    pack_error(Subsystem::SensorLog, code)
}

/// The controller-side implementation of the raw sensor log RPC table.
///
/// Readings pushed through this surface are stamped with the controller's
/// uptime, which the embedding emulator advances.
#[derive(Debug)]
pub struct RawSensorLog {
    subsystem: SensorLogSubsystem,
    uptime: u32,
}

impl RawSensorLog {
    pub fn new(log: SensorLog) -> Self {
        Self {
            subsystem: SensorLogSubsystem::new(log),
            uptime: 0,
        }
    }

    pub fn subsystem(&self) -> &SensorLogSubsystem {
        &self.subsystem
    }

    /// Advance the controller uptime used to stamp pushed readings.
    pub fn set_uptime(&mut self, seconds: u32) {
        self.uptime = seconds;
    }

    /// Apply reset-time configuration, destroying all walkers.
    pub fn clear_to_reset(&mut self, config: ResetConfig) {
        self.subsystem.clear_to_reset(config);
    }

    /// Push a reading to the sensor log directly.
    pub fn push_reading(&mut self, value: u32, stream_id: u16) -> PackedError {
        let stream = match StreamId::from_encoded(stream_id) {
            Ok(stream) => stream,
            Err(_) => return sensor_log_error(SensorLogError::InvalidStreamId),
        };
        match self.subsystem.push(stream, self.uptime, value) {
            Ok(()) => PackedError::NO_ERROR,
            Err(err) => err.into(),
        }
    }

    /// Push `count` copies of a reading, stopping at the first full buffer.
    /// Returns the number of readings actually stored.
    pub fn push_many_readings(&mut self, value: u32, count: u32, stream_id: u16) -> (PackedError, u32) {
        for stored in 0..count {
            let err = self.push_reading(value, stream_id);
            if !err.is_ok() {
                return (err, stored);
            }
        }
        (PackedError::NO_ERROR, count)
    }

    /// Count the readings in the storage and streaming buffers.
    pub fn count_readings(&self) -> (PackedError, u32, u32) {
        let (storage, streaming) = self.subsystem.count();
        (PackedError::NO_ERROR, storage as u32, streaming as u32)
    }

    /// Clear all stored readings, pushing the data-cleared marker.
    pub fn clear_readings(&mut self) -> PackedError {
        match self.subsystem.clear(self.uptime) {
            Ok(()) => PackedError::NO_ERROR,
            Err(err) => err.into(),
        }
    }

    /// Inspect the last value written to a virtual stream.
    pub fn inspect_virtual_stream(&self, stream_id: u16) -> (PackedError, u32) {
        let not_found = sensor_log_error(SensorLogError::VirtualStreamNotFound);
        let Ok(stream) = StreamId::from_encoded(stream_id) else {
            return (not_found, 0);
        };
        if stream.buffered() {
            return (not_found, 0);
        }
        match self.subsystem.inspect_virtual(stream) {
            Ok(reading) => (PackedError::NO_ERROR, reading.value),
            Err(sensorgraph_log::Error::StreamEmpty) => (PackedError::NO_ERROR, 0),
            Err(_) => (not_found, 0),
        }
    }

    /// Begin dumping the contents of a stream selector. The previous dump
    /// walker, if any, is destroyed.
    pub fn dump_stream_begin(&mut self, selector_id: u16) -> (PackedError, PackedError, u32, u32) {
        let Ok(selector) = Selector::from_encoded(selector_id) else {
            return (
                sensor_log_error(SensorLogError::InvalidStreamId),
                PackedError::NO_ERROR,
                0,
                self.uptime,
            );
        };
        let count = self.subsystem.dump_begin(selector);
        (PackedError::NO_ERROR, PackedError::NO_ERROR, count, self.uptime)
    }

    /// Seek the running dump to a reading id.
    ///
    /// Reports `ID_FOUND_FOR_ANOTHER_STREAM` when the id exists but belongs
    /// to a stream outside the dump selector, and `NO_MORE_READINGS` when
    /// no stored reading has the id or a later one.
    pub fn dump_stream_seek(&mut self, reading_id: u32) -> (PackedError, PackedError, u32) {
        match self.subsystem.dump_seek(reading_id) {
            None => (
                sensor_log_error(SensorLogError::StreamWalkerNotInitialized),
                PackedError::NO_ERROR,
                0,
            ),
            Some(Err(_)) => (
                sensor_log_error(SensorLogError::NoMoreReadings),
                PackedError::NO_ERROR,
                0,
            ),
            Some(Ok((exact, remaining))) => {
                let err = if exact {
                    PackedError::NO_ERROR
                } else {
                    sensor_log_error(SensorLogError::IdFoundForAnotherStream)
                };
                (err, PackedError::NO_ERROR, remaining)
            }
        }
    }

    /// Pop the next reading from the running dump.
    ///
    /// Response layout: `(err, raw_time, value, reading_id, stream_id, 0)`.
    pub fn dump_stream_next(&mut self, format: u8) -> (PackedError, u32, u32, u32, u16, u32) {
        if format != DUMP_FORMAT_EXTENDED {
            return (
                sensor_log_error(SensorLogError::UnsupportedOutputFormat),
                0,
                0,
                0,
                0,
                0,
            );
        }
        match self.subsystem.dump_next() {
            None => (
                sensor_log_error(SensorLogError::StreamWalkerNotInitialized),
                0,
                0,
                0,
                0,
                0,
            ),
            Some(Err(_)) => (sensor_log_error(SensorLogError::NoMoreReadings), 0, 0, 0, 0, 0),
            Some(Ok(reading)) => (
                PackedError::NO_ERROR,
                reading.raw_time,
                reading.value,
                reading.reading_id,
                reading.stream.encoded(),
                0,
            ),
        }
    }

    /// The highest reading id stored in either buffer.
    pub fn highest_reading_id(&self) -> (PackedError, u32) {
        (PackedError::NO_ERROR, self.subsystem.highest_stored_id())
    }
}
