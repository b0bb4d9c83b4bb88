use sensorgraph_primitives::{Reading, StreamId};

/// A point-in-time copy of a sensor log's contents.
///
/// Captures both ring buffers (with their base sequence numbers), the
/// virtual last-value slots, the constant database and the reading id
/// allocator, so a restored log continues allocating ids where the captured
/// one left off. Walkers are deliberately excluded; they are recreated by
/// whatever graph is rebuilt on top of the restored log.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    pub next_id: u32,
    pub storage_base: u64,
    pub storage: Vec<Reading>,
    pub streaming_base: u64,
    pub streaming: Vec<Reading>,
    pub virtual_values: Vec<(StreamId, Reading)>,
    pub constants: Vec<(StreamId, Reading)>,
}
