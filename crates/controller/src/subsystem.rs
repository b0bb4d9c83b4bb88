use log::debug;

use sensorgraph::config::config_ids;
use sensorgraph::{SensorGraph, Slot};
use sensorgraph_log::{BufferKind, Error, SeekTarget, SensorLog, Walker};
use sensorgraph_primitives::{Reading, Selector, StreamId, StreamType};

/// The system stream that records the id high-water mark when storage is
/// cleared.
pub fn data_cleared_stream() -> StreamId {
    StreamId::system(StreamType::Buffered, 1).unwrap()
}

/// Volatile config applied to the sensor log across an emulated reset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResetConfig {
    pub storage_fillstop: bool,
    pub streaming_fillstop: bool,
}

impl ResetConfig {
    /// Read the fill-stop config variables declared on the controller slot.
    pub fn from_graph(graph: &SensorGraph) -> Self {
        let flag = |config_id| {
            graph
                .get_config(Slot::Controller, config_id)
                .ok()
                .and_then(|value| value.as_bool())
                .unwrap_or(false)
        };
        Self {
            storage_fillstop: flag(config_ids::STORAGE_FILLSTOP),
            streaming_fillstop: flag(config_ids::STREAMING_FILLSTOP),
        }
    }
}

/// Container for the controller's raw sensor log state.
///
/// Wraps the shared [`SensorLog`] with the pieces the RPC surface needs: the
/// host-driven dump walker and the reset behavior.
#[derive(Debug)]
pub struct SensorLogSubsystem {
    log: SensorLog,
    dump_walker: Option<Walker>,
}

impl SensorLogSubsystem {
    pub fn new(log: SensorLog) -> Self {
        Self { log, dump_walker: None }
    }

    pub fn log(&self) -> &SensorLog {
        &self.log
    }

    /// Clear all stored readings, then store a single marker reading so the
    /// highest allocated id to date survives the clear.
    pub fn clear(&mut self, timestamp: u32) -> Result<(), Error> {
        self.log.clear();
        let marker = data_cleared_stream();
        self.log.push(marker, Reading::new(marker, timestamp, 1))
    }

    /// Clear all volatile state across an emulated reset.
    pub fn clear_to_reset(&mut self, config: ResetConfig) {
        debug!("sensor log reset with {config:?}");
        self.log.destroy_all_walkers();
        self.dump_walker = None;

        if config.storage_fillstop {
            self.log.set_rollover(BufferKind::Storage, false);
        }
        if config.streaming_fillstop {
            self.log.set_rollover(BufferKind::Streaming, false);
        }
    }

    /// Number of persistently stored readings, `(storage, streaming)`.
    pub fn count(&self) -> (usize, usize) {
        self.log.count()
    }

    pub fn push(&self, stream: StreamId, timestamp: u32, value: u32) -> Result<(), Error> {
        self.log.push(stream, Reading::new(stream, timestamp, value))
    }

    /// The last value written to a virtual stream.
    pub fn inspect_virtual(&self, stream: StreamId) -> Result<Reading, Error> {
        self.log.inspect_last(stream, true)
    }

    /// Begin dumping the readings matching `selector`, replacing any dump
    /// already underway. Returns the number of available readings.
    pub fn dump_begin(&mut self, selector: Selector) -> u32 {
        if let Some(walker) = self.dump_walker.take() {
            self.log.destroy_walker(walker);
        }
        let walker = self.log.create_walker(selector, false);
        let count = walker.count();
        self.dump_walker = Some(walker);
        count
    }

    /// Seek the dump to a reading id. `Ok((exact, remaining))`.
    pub fn dump_seek(&mut self, reading_id: u32) -> Option<Result<(bool, u32), Error>> {
        let walker = self.dump_walker.as_ref()?;
        Some(
            walker
                .seek(reading_id, SeekTarget::Id)
                .map(|exact| (exact, walker.count())),
        )
    }

    /// The next reading of the running dump; `None` if no dump was begun.
    pub fn dump_next(&mut self) -> Option<Result<Reading, Error>> {
        self.dump_walker.as_ref().map(Walker::pop)
    }

    /// Scan both buffers for the highest stored reading id.
    pub fn highest_stored_id(&self) -> u32 {
        self.log.highest_stored_id()
    }
}

impl Drop for SensorLogSubsystem {
    fn drop(&mut self) {
        if let Some(walker) = self.dump_walker.take() {
            self.log.destroy_walker(walker);
        }
    }
}
