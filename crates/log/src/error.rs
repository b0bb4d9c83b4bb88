use sensorgraph_primitives::StreamId;
use thiserror::Error;

use crate::engine::BufferKind;

/// Error raised by sensor log and walker operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A fill-stop ring buffer reached capacity.
    #[error("the `{buffer}` ring buffer is full")]
    StorageFull { buffer: BufferKind },

    /// The walker has no further matching readings.
    #[error("no readings are available on the selected stream")]
    StreamEmpty,

    /// A seek target past the newest stored reading.
    #[error("no stored reading at or past id {target}")]
    UnresolvedReadingId { target: u32 },

    /// A virtual stream that has never been written.
    #[error("virtual stream `{stream}` is unknown")]
    UnresolvedStream { stream: StreamId },
}
