use std::collections::VecDeque;
use std::fmt;

use sensorgraph_primitives::{DeviceModel, Reading, StreamId, StreamType};

use crate::error::Error;

/// Which of the engine's two ring buffers a reading lives in.
///
/// Important readings go to `storage` so they survive until acknowledged;
/// everything else buffered goes to `streaming` and may rotate freely.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BufferKind {
    Storage,
    Streaming,
}

impl BufferKind {
    /// The buffer a stream's readings are routed to, `None` for virtual
    /// streams. Routing is decided by the stream type, not by the caller.
    pub fn for_stream(stream: StreamId) -> Option<Self> {
        match stream.stream_type() {
            StreamType::Input | StreamType::Counter => Some(Self::Storage),
            StreamType::Buffered => Some(Self::Streaming),
            StreamType::Unbuffered | StreamType::Constant | StreamType::Output => None,
        }
    }
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage => f.write_str("storage"),
            Self::Streaming => f.write_str("streaming"),
        }
    }
}

/// Result of a successful [`StorageEngine::push`].
#[derive(Debug, PartialEq, Eq)]
pub struct Pushed {
    /// Sequence number assigned to the new reading.
    pub seq: u64,
    /// The reading evicted by rollover, if the buffer was full.
    pub dropped: Option<Reading>,
}

/// A fixed-capacity sequence of readings addressed by ever-increasing
/// sequence numbers.
///
/// `base_seq` is the sequence number of the oldest live reading; rollover and
/// clear advance it but never rewind, so cursors held by walkers remain
/// meaningful for the lifetime of the engine.
#[derive(Debug)]
struct RingBuffer {
    readings: VecDeque<Reading>,
    base_seq: u64,
    capacity: usize,
    rollover: bool,
}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            readings: VecDeque::with_capacity(capacity.min(4096)),
            base_seq: 0,
            capacity,
            rollover: true,
        }
    }

    fn next_seq(&self) -> u64 {
        self.base_seq + self.readings.len() as u64
    }

    fn push(&mut self, kind: BufferKind, reading: Reading) -> Result<Pushed, Error> {
        let mut dropped = None;
        if self.readings.len() >= self.capacity {
            if !self.rollover {
                return Err(Error::StorageFull { buffer: kind });
            }
            dropped = self.readings.pop_front();
            self.base_seq += 1;
        }
        let seq = self.next_seq();
        self.readings.push_back(reading);
        Ok(Pushed { seq, dropped })
    }

    fn read(&self, seq: u64) -> Option<Reading> {
        seq.checked_sub(self.base_seq)
            .and_then(|off| self.readings.get(off as usize))
            .copied()
    }

    fn clear(&mut self) {
        self.base_seq = self.next_seq();
        self.readings.clear();
    }
}

/// Two independent ring buffers of readings.
///
/// Writes are O(1) amortized; readings are never mutated after insertion.
#[derive(Debug)]
pub struct StorageEngine {
    storage: RingBuffer,
    streaming: RingBuffer,
}

impl StorageEngine {
    pub fn new(model: &DeviceModel) -> Self {
        Self {
            storage: RingBuffer::new(model.max_storage_buffer),
            streaming: RingBuffer::new(model.max_streaming_buffer),
        }
    }

    fn buffer(&self, kind: BufferKind) -> &RingBuffer {
        match kind {
            BufferKind::Storage => &self.storage,
            BufferKind::Streaming => &self.streaming,
        }
    }

    fn buffer_mut(&mut self, kind: BufferKind) -> &mut RingBuffer {
        match kind {
            BufferKind::Storage => &mut self.storage,
            BufferKind::Streaming => &mut self.streaming,
        }
    }

    /// Append a reading, assigning it the buffer's next sequence number.
    ///
    /// A full buffer either rotates out its oldest reading (returned in
    /// [`Pushed::dropped`]) or, with rollover disabled, rejects the push.
    pub fn push(&mut self, kind: BufferKind, reading: Reading) -> Result<Pushed, Error> {
        self.buffer_mut(kind).push(kind, reading)
    }

    pub fn count(&self, kind: BufferKind) -> usize {
        self.buffer(kind).readings.len()
    }

    /// Sequence number of the oldest live reading (equal to the next
    /// sequence number when the buffer is empty).
    pub fn oldest(&self, kind: BufferKind) -> u64 {
        self.buffer(kind).base_seq
    }

    pub(crate) fn next_seq(&self, kind: BufferKind) -> u64 {
        self.buffer(kind).next_seq()
    }

    pub fn read(&self, kind: BufferKind, seq: u64) -> Option<Reading> {
        self.buffer(kind).read(seq)
    }

    /// Visit every live reading in insertion order.
    pub fn scan(&self, kind: BufferKind, mut visit: impl FnMut(u64, &Reading)) {
        let buffer = self.buffer(kind);
        for (off, reading) in buffer.readings.iter().enumerate() {
            visit(buffer.base_seq + off as u64, reading);
        }
    }

    /// First `(seq, reading)` at or past `from` satisfying `pred`.
    pub(crate) fn find_from(
        &self,
        kind: BufferKind,
        from: u64,
        mut pred: impl FnMut(&Reading) -> bool,
    ) -> Option<(u64, Reading)> {
        let buffer = self.buffer(kind);
        let skip = from.saturating_sub(buffer.base_seq) as usize;
        buffer
            .readings
            .iter()
            .enumerate()
            .skip(skip)
            .find(|(_, r)| pred(r))
            .map(|(off, r)| (buffer.base_seq + off as u64, *r))
    }

    /// Number of readings at or past `from` satisfying `pred`.
    pub(crate) fn count_from(&self, kind: BufferKind, from: u64, mut pred: impl FnMut(&Reading) -> bool) -> u32 {
        let buffer = self.buffer(kind);
        let skip = from.saturating_sub(buffer.base_seq) as usize;
        buffer.readings.iter().skip(skip).filter(|r| pred(r)).count() as u32
    }

    /// Switch between drop-oldest (`true`, the default) and fill-stop
    /// behavior when the buffer is at capacity.
    pub fn set_rollover(&mut self, kind: BufferKind, rollover: bool) {
        self.buffer_mut(kind).rollover = rollover;
    }

    pub(crate) fn capacity(&self, kind: BufferKind) -> usize {
        self.buffer(kind).capacity
    }

    /// Empty both buffers. Sequence numbers keep counting from where they
    /// were, so existing walker cursors stay valid.
    pub fn clear(&mut self) {
        self.storage.clear();
        self.streaming.clear();
    }

    pub(crate) fn restore(&mut self, kind: BufferKind, base_seq: u64, readings: Vec<Reading>) -> Result<(), Error> {
        if readings.len() > self.capacity(kind) {
            return Err(Error::StorageFull { buffer: kind });
        }
        let buffer = self.buffer_mut(kind);
        buffer.base_seq = base_seq;
        buffer.readings = readings.into();
        Ok(())
    }

    pub(crate) fn dump(&self, kind: BufferKind) -> (u64, Vec<Reading>) {
        let buffer = self.buffer(kind);
        (buffer.base_seq, buffer.readings.iter().copied().collect())
    }
}
