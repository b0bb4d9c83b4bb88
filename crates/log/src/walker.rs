use sensorgraph_primitives::{Reading, Selector, StreamId};

use crate::engine::BufferKind;
use crate::error::Error;
use crate::sensor_log::SensorLog;

/// What [`Walker::seek`] positions on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekTarget {
    /// A reading id, as allocated by the sensor log.
    Id,
    /// A raw storage sequence number.
    Seq,
}

/// Arena index of a walker inside the sensor log.
pub(crate) type WalkerId = usize;

/// Internal walker state, owned by the sensor log's arena.
#[derive(Debug)]
pub(crate) enum WalkerState {
    /// Cursor over one ring buffer with an incrementally maintained count of
    /// matching readings at or after the cursor.
    Buffered {
        selector: Selector,
        buffer: BufferKind,
        cursor: u64,
        count: u32,
    },
    /// Holds the last unconsumed reading of an unbuffered stream.
    Virtual { selector: Selector, reading: Option<Reading> },
    /// Inexhaustible: popping never drains the cached constant.
    Constant { selector: Selector, reading: Reading },
}

/// A cursor over the readings matching one selector.
///
/// Walkers are handles; the state they point at lives in the sensor log and
/// every operation reacquires the log's lock, so walkers may be used freely
/// from processing code that runs outside the lock.
///
/// Walker destruction is explicit via [`SensorLog::destroy_walker`]; a handle
/// whose state was destroyed behaves as permanently empty.
#[derive(Debug)]
pub struct Walker {
    log: SensorLog,
    id: WalkerId,
    selector: Selector,
}

impl Walker {
    pub(crate) fn new(log: SensorLog, id: WalkerId, selector: Selector) -> Self {
        Self { log, id, selector }
    }

    pub(crate) fn id(&self) -> WalkerId {
        self.id
    }

    pub fn selector(&self) -> Selector {
        self.selector
    }

    pub fn matches(&self, stream: StreamId) -> bool {
        self.selector.matches(stream)
    }

    /// Remove and return the next matching reading.
    ///
    /// Constant walkers return their cached reading forever.
    pub fn pop(&self) -> Result<Reading, Error> {
        self.log.walker_pop(self.id)
    }

    /// Like [`Walker::pop`], without advancing.
    pub fn peek(&self) -> Result<Reading, Error> {
        self.log.walker_peek(self.id)
    }

    /// Number of matching readings currently visible to this walker.
    pub fn count(&self) -> u32 {
        self.log.walker_count(self.id)
    }

    /// Position the cursor so the next pop returns the first reading at or
    /// past `target`.
    ///
    /// Returns `Ok(true)` iff a reading with exactly the target id exists
    /// and matches the walker's selector; `Ok(false)` when the cursor landed
    /// on a later or non-matching reading.
    pub fn seek(&self, target: u32, by: SeekTarget) -> Result<bool, Error> {
        self.log.walker_seek(self.id, target, by)
    }
}
