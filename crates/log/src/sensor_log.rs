use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::Mutex;
use slab::Slab;

use sensorgraph_primitives::{DeviceModel, Reading, Selector, StreamId, StreamType};

use crate::engine::{BufferKind, StorageEngine};
use crate::error::Error;
use crate::snapshot::Snapshot;
use crate::walker::{SeekTarget, Walker, WalkerId, WalkerState};

/// Raw time stamped on a constant walker's initial reading.
const CONSTANT_INIT_TIME: u32 = 0xFFFF_FFFF;

/// The typed façade over the storage engine.
///
/// Routes pushes by stream type (ring buffer, last-value slot or constant
/// database), allocates reading ids, duplicates important readings into
/// their associated output stream and keeps every live walker's cursor and
/// count consistent across pushes, rollovers and clears.
///
/// `SensorLog` is a cheap handle; clones share one state. All operations
/// take the internal lock for a bounded amount of work and never invoke
/// user code while holding it.
#[derive(Clone, Debug)]
pub struct SensorLog {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug)]
struct Inner {
    engine: StorageEngine,
    walkers: Slab<WalkerState>,
    /// Last value pushed to each unbuffered stream.
    virtual_values: HashMap<StreamId, Reading>,
    /// Configured value of each constant stream.
    constants: HashMap<StreamId, Reading>,
    /// Monotone reading id allocator; starts at 1, survives clears.
    next_id: u32,
}

impl SensorLog {
    pub fn new(engine: StorageEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                engine,
                walkers: Slab::new(),
                virtual_values: HashMap::new(),
                constants: HashMap::new(),
                next_id: 1,
            })),
        }
    }

    /// A log with buffer capacities taken from the device model.
    pub fn open(model: &DeviceModel) -> Self {
        Self::new(StorageEngine::new(model))
    }

    /// Store one reading on `stream`.
    ///
    /// Virtual streams overwrite their last-value slot and never touch a
    /// buffer. Buffered streams are allocated a reading id (when the reading
    /// carries none) and routed to `storage` or `streaming` by type.
    /// Important streams additionally store a copy, under its own id, on
    /// their associated output stream.
    pub fn push(&self, stream: StreamId, reading: Reading) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        inner.push_one(stream, reading)?;
        if let Some(output) = stream.associated_output() {
            inner.push_one(output, Reading::new(output, reading.raw_time, reading.value))?;
        }
        Ok(())
    }

    /// Create a walker over `selector`.
    ///
    /// With `skip_all`, the walker starts at the current tail and only
    /// observes future readings. Constant walkers start out holding a
    /// reading of value 0 at raw time `0xFFFFFFFF` until a constant is
    /// pushed.
    pub fn create_walker(&self, selector: Selector, skip_all: bool) -> Walker {
        let mut inner = self.inner.lock();
        let state = inner.new_walker_state(selector, skip_all);
        let id = inner.walkers.insert(state);
        trace!("created walker {id} over `{selector}`");
        Walker::new(self.clone(), id, selector)
    }

    /// Remove a walker from the live set.
    pub fn destroy_walker(&self, walker: Walker) {
        let mut inner = self.inner.lock();
        if inner.walkers.try_remove(walker.id()).is_none() {
            warn!("walker {} destroyed twice", walker.id());
        }
    }

    /// Remove every walker. Outstanding handles become permanently empty.
    pub fn destroy_all_walkers(&self) {
        self.inner.lock().walkers.clear();
    }

    /// The most recent reading stored on `stream`, or its virtual slot.
    pub fn inspect_last(&self, stream: StreamId, only_allocated: bool) -> Result<Reading, Error> {
        let inner = self.inner.lock();
        match stream.stream_type() {
            StreamType::Constant => inner
                .constants
                .get(&stream)
                .copied()
                .ok_or(Error::UnresolvedStream { stream }),
            StreamType::Unbuffered | StreamType::Output => inner
                .virtual_values
                .get(&stream)
                .copied()
                .ok_or(Error::UnresolvedStream { stream }),
            _ => {
                let buffer = BufferKind::for_stream(stream).unwrap();
                let mut last = None;
                inner.engine.scan(buffer, |_, r| {
                    if r.stream == stream && (!only_allocated || r.is_allocated()) {
                        last = Some(*r);
                    }
                });
                last.ok_or(Error::StreamEmpty)
            }
        }
    }

    /// Empty both ring buffers.
    ///
    /// Walker count caches drop to zero, cursors move to the (empty) tail
    /// and the reading id allocator keeps counting, so walkers and ids stay
    /// valid. Virtual slots and constants are untouched.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        debug!("clearing sensor log");
        inner.engine.clear();
        let storage_tail = inner.engine.next_seq(BufferKind::Storage);
        let streaming_tail = inner.engine.next_seq(BufferKind::Streaming);
        for (_, state) in inner.walkers.iter_mut() {
            if let WalkerState::Buffered { buffer, cursor, count, .. } = state {
                *cursor = match buffer {
                    BufferKind::Storage => storage_tail,
                    BufferKind::Streaming => streaming_tail,
                };
                *count = 0;
            }
        }
    }

    /// Readings currently stored, as `(storage, streaming)`.
    pub fn count(&self) -> (usize, usize) {
        let inner = self.inner.lock();
        (
            inner.engine.count(BufferKind::Storage),
            inner.engine.count(BufferKind::Streaming),
        )
    }

    /// Claim the next unique reading id.
    pub fn allocate_id(&self) -> u32 {
        self.inner.lock().allocate_id()
    }

    /// The id the next allocation will return.
    pub fn next_reading_id(&self) -> u32 {
        self.inner.lock().next_id
    }

    /// Largest reading id stored in either buffer, 0 when both are empty.
    pub fn highest_stored_id(&self) -> u32 {
        let inner = self.inner.lock();
        let mut highest = 0;
        for kind in [BufferKind::Storage, BufferKind::Streaming] {
            inner.engine.scan(kind, |_, r| highest = highest.max(r.reading_id));
        }
        highest
    }

    /// Visit every live reading of one buffer in insertion order.
    pub fn scan(&self, kind: BufferKind, visit: impl FnMut(u64, &Reading)) {
        self.inner.lock().engine.scan(kind, visit);
    }

    pub fn set_rollover(&self, kind: BufferKind, rollover: bool) {
        debug!("rollover for `{kind}` set to {rollover}");
        self.inner.lock().engine.set_rollover(kind, rollover);
    }

    /// Capture buffers, virtual slots, constants and the id allocator.
    /// Walkers are not part of a snapshot; graphs recreate them.
    pub fn snapshot(&self) -> Snapshot {
        self.inner.lock().snapshot()
    }

    /// Replace the log's contents with a previously captured snapshot.
    ///
    /// All walkers are destroyed, as their cursors refer to the replaced
    /// state. Fails with [`Error::StorageFull`] if a snapshot buffer exceeds
    /// this engine's capacity.
    pub fn restore(&self, snapshot: Snapshot) -> Result<(), Error> {
        self.inner.lock().restore(snapshot)
    }

    pub(crate) fn walker_pop(&self, id: WalkerId) -> Result<Reading, Error> {
        let mut inner = self.inner.lock();
        let Some(state) = inner.walkers.get(id) else {
            return Err(Error::StreamEmpty);
        };
        match *state {
            WalkerState::Buffered {
                selector, buffer, cursor, ..
            } => {
                let found = inner.engine.find_from(buffer, cursor, |r| selector.matches(r.stream));
                let tail = inner.engine.next_seq(buffer);
                let Some(WalkerState::Buffered { cursor, count, .. }) = inner.walkers.get_mut(id) else {
                    unreachable!()
                };
                match found {
                    Some((seq, reading)) => {
                        *cursor = seq + 1;
                        *count = count.saturating_sub(1);
                        Ok(reading)
                    }
                    None => {
                        *cursor = tail;
                        *count = 0;
                        Err(Error::StreamEmpty)
                    }
                }
            }
            WalkerState::Constant { reading, .. } => Ok(reading),
            WalkerState::Virtual { .. } => {
                let Some(WalkerState::Virtual { reading, .. }) = inner.walkers.get_mut(id) else {
                    unreachable!()
                };
                reading.take().ok_or(Error::StreamEmpty)
            }
        }
    }

    pub(crate) fn walker_peek(&self, id: WalkerId) -> Result<Reading, Error> {
        let inner = self.inner.lock();
        let Some(state) = inner.walkers.get(id) else {
            return Err(Error::StreamEmpty);
        };
        match *state {
            WalkerState::Buffered {
                selector, buffer, cursor, ..
            } => inner
                .engine
                .find_from(buffer, cursor, |r| selector.matches(r.stream))
                .map(|(_, reading)| reading)
                .ok_or(Error::StreamEmpty),
            WalkerState::Constant { reading, .. } => Ok(reading),
            WalkerState::Virtual { reading, .. } => reading.ok_or(Error::StreamEmpty),
        }
    }

    pub(crate) fn walker_count(&self, id: WalkerId) -> u32 {
        let inner = self.inner.lock();
        match inner.walkers.get(id) {
            Some(WalkerState::Buffered { count, .. }) => *count,
            Some(WalkerState::Virtual { reading, .. }) => reading.is_some() as u32,
            Some(WalkerState::Constant { .. }) => u32::MAX,
            None => 0,
        }
    }

    pub(crate) fn walker_seek(&self, id: WalkerId, target: u32, by: SeekTarget) -> Result<bool, Error> {
        let mut inner = self.inner.lock();
        let Some(state) = inner.walkers.get(id) else {
            return Err(Error::UnresolvedReadingId { target });
        };
        let WalkerState::Buffered { selector, buffer, .. } = *state else {
            return Err(Error::UnresolvedReadingId { target });
        };

        let oldest = inner.engine.oldest(buffer);
        let landing = match by {
            // Reading ids are allocated monotonically, so within one buffer
            // they ascend with the sequence number.
            SeekTarget::Id => inner.engine.find_from(buffer, oldest, |r| r.reading_id >= target),
            SeekTarget::Seq => inner.engine.find_from(buffer, oldest.max(u64::from(target)), |_| true),
        };
        let Some((seq, reading)) = landing else {
            return Err(Error::UnresolvedReadingId { target });
        };

        let exact = selector.matches(reading.stream)
            && match by {
                SeekTarget::Id => reading.reading_id == target,
                SeekTarget::Seq => seq == u64::from(target),
            };
        let remaining = inner.engine.count_from(buffer, seq, |r| selector.matches(r.stream));
        let Some(WalkerState::Buffered { cursor, count, .. }) = inner.walkers.get_mut(id) else {
            unreachable!()
        };
        *cursor = seq;
        *count = remaining;
        Ok(exact)
    }
}

impl Inner {
    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn push_one(&mut self, stream: StreamId, mut reading: Reading) -> Result<(), Error> {
        reading.stream = stream;
        match stream.stream_type() {
            StreamType::Constant => {
                trace!("constant `{stream}` set to {}", reading.value);
                self.constants.insert(stream, reading);
                for (_, state) in self.walkers.iter_mut() {
                    if let WalkerState::Constant { selector, reading: held } = state {
                        if selector.matches(stream) {
                            *held = reading;
                        }
                    }
                }
                Ok(())
            }
            StreamType::Unbuffered | StreamType::Output => {
                self.virtual_values.insert(stream, reading);
                for (_, state) in self.walkers.iter_mut() {
                    if let WalkerState::Virtual { selector, reading: held } = state {
                        if selector.matches(stream) {
                            *held = Some(reading);
                        }
                    }
                }
                Ok(())
            }
            _ => {
                if !reading.is_allocated() {
                    reading.reading_id = self.allocate_id();
                }
                let buffer = BufferKind::for_stream(stream).unwrap();
                let pushed = self.engine.push(buffer, reading)?;
                trace!("stored {reading} in `{buffer}` at seq {}", pushed.seq);

                for (_, state) in self.walkers.iter_mut() {
                    let WalkerState::Buffered {
                        selector,
                        buffer: walker_buffer,
                        cursor,
                        count,
                    } = state
                    else {
                        continue;
                    };
                    if *walker_buffer != buffer {
                        continue;
                    }
                    // A rollover drops the oldest reading; cursors at or
                    // before it slide past, and counts shed the drop if it
                    // matched.
                    if let Some(dropped) = &pushed.dropped {
                        let dropped_seq = pushed.seq - self.engine.capacity(buffer) as u64;
                        if *cursor <= dropped_seq {
                            *cursor = dropped_seq + 1;
                            if selector.matches(dropped.stream) {
                                *count = count.saturating_sub(1);
                            }
                        }
                    }
                    if selector.matches(stream) {
                        *count += 1;
                    }
                }
                Ok(())
            }
        }
    }

    fn new_walker_state(&self, selector: Selector, skip_all: bool) -> WalkerState {
        if selector.inexhaustible() {
            let reading = self
                .constants
                .iter()
                .find(|(stream, _)| selector.matches(**stream))
                .map(|(_, reading)| *reading)
                .unwrap_or_else(|| Reading::new(selector.as_stream(), CONSTANT_INIT_TIME, 0));
            WalkerState::Constant { selector, reading }
        } else if selector.buffered() {
            let buffer = match selector.stream_type() {
                StreamType::Buffered => BufferKind::Streaming,
                _ => BufferKind::Storage,
            };
            let (cursor, count) = if skip_all {
                (self.engine.next_seq(buffer), 0)
            } else {
                let oldest = self.engine.oldest(buffer);
                (oldest, self.engine.count_from(buffer, oldest, |r| selector.matches(r.stream)))
            };
            WalkerState::Buffered {
                selector,
                buffer,
                cursor,
                count,
            }
        } else {
            let reading = (!skip_all)
                .then(|| {
                    self.virtual_values
                        .iter()
                        .find(|(stream, _)| selector.matches(**stream))
                        .map(|(_, reading)| *reading)
                })
                .flatten();
            WalkerState::Virtual { selector, reading }
        }
    }

    fn snapshot(&self) -> Snapshot {
        let (storage_base, storage) = self.engine.dump(BufferKind::Storage);
        let (streaming_base, streaming) = self.engine.dump(BufferKind::Streaming);
        Snapshot {
            next_id: self.next_id,
            storage_base,
            storage,
            streaming_base,
            streaming,
            virtual_values: self.virtual_values.iter().map(|(s, r)| (*s, *r)).collect(),
            constants: self.constants.iter().map(|(s, r)| (*s, *r)).collect(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) -> Result<(), Error> {
        self.engine.restore(BufferKind::Storage, snapshot.storage_base, snapshot.storage)?;
        self.engine
            .restore(BufferKind::Streaming, snapshot.streaming_base, snapshot.streaming)?;
        self.virtual_values = snapshot.virtual_values.into_iter().collect();
        self.constants = snapshot.constants.into_iter().collect();
        self.next_id = snapshot.next_id;
        self.walkers.clear();
        Ok(())
    }
}
