/// Resource limits of the controller a graph is built for.
///
/// Limits are enforced while a graph is constructed, never during tick
/// processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceModel {
    /// Maximum number of graph nodes.
    pub max_nodes: usize,
    /// Maximum number of streamers.
    pub max_streamers: usize,
    /// Capacity of the `storage` ring buffer, in readings.
    pub max_storage_buffer: usize,
    /// Capacity of the `streaming` ring buffer, in readings.
    pub max_streaming_buffer: usize,
}

impl Default for DeviceModel {
    fn default() -> Self {
        Self {
            max_nodes: 32,
            max_streamers: 8,
            max_storage_buffer: 16128,
            max_streaming_buffer: 48896,
        }
    }
}
