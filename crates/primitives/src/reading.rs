use std::fmt;

use crate::stream::StreamId;

/// One sample on a stream.
///
/// `reading_id == 0` means the reading was never allocated a persistent id,
/// which is the case for readings on virtual streams.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reading {
    pub stream: StreamId,
    pub raw_time: u32,
    pub value: u32,
    pub reading_id: u32,
}

impl Reading {
    pub const UNALLOCATED: u32 = 0;

    /// A reading with no allocated id; the sensor log assigns one on push
    /// when the stream is buffered.
    pub fn new(stream: StreamId, raw_time: u32, value: u32) -> Self {
        Self {
            stream,
            raw_time,
            value,
            reading_id: Self::UNALLOCATED,
        }
    }

    pub fn with_id(stream: StreamId, raw_time: u32, value: u32, reading_id: u32) -> Self {
        Self {
            stream,
            raw_time,
            value,
            reading_id,
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.reading_id != Self::UNALLOCATED
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} @ {}", self.stream, self.value, self.raw_time)?;
        if self.is_allocated() {
            write!(f, " (id {})", self.reading_id)?;
        }
        Ok(())
    }
}
