use thiserror::Error;

use sensorgraph_primitives::{Selector, Slot, StreamError, StreamId};

/// A graph build step exceeded the device model's limits.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("maximum node count {max} exceeded")]
    TooManyNodes { max: usize },
    #[error("maximum streamer count {max} exceeded")]
    TooManyStreamers { max: usize },
}

/// The graph's structure cannot be built or serialized.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("input {index} (`{selector}`) refers to a node that has not been created yet")]
    MissingPredecessor { selector: Selector, index: usize },
    #[error("graph contains a dependency cycle")]
    Cycle,
    #[error("a root node sorted to position {position}, outside the leading root block")]
    RootsNotFirst { position: usize },
}

/// A node descriptor that does not follow the DSL.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("descriptor `{descriptor}` is not of the form `(inputs) when trigger => processor => stream`")]
    Malformed { descriptor: String },
    #[error("descriptor `{descriptor}` declares no inputs")]
    NoInputs { descriptor: String },
    #[error("unrecognized trigger clause `{clause}`")]
    BadTrigger { clause: String },
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Any error surfaced while building or driving a sensor graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("no processing function named `{name}` is registered")]
    UnknownProcessor { name: String },
    #[error("streamer index {index} is out of range ({count} streamers)")]
    InvalidStreamerIndex { index: usize, count: usize },
    #[error("streamer {index} is not linked to a sensor log")]
    UnlinkedStreamer { index: usize },
    #[error("constant `{stream}` is already assigned")]
    DuplicateConstant { stream: StreamId },
    #[error("metadata `{name}` is already set")]
    DuplicateMetadata { name: String },
    #[error("config variable {config_id:#06x} has not been set on `{slot}`")]
    MissingConfig { slot: Slot, config_id: u16 },
    #[error("unknown tick `{name}`")]
    UnknownTick { name: String },
    #[error(transparent)]
    Log(#[from] sensorgraph_log::Error),
}
