use thiserror::Error;

/// Error decoding or parsing a stream identifier, selector or slot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("stream type code {code:#x} is reserved")]
    ReservedType { code: u8 },
    #[error("stream number {number:#x} does not fit in 12 bits")]
    NumberOutOfRange { number: u16 },
    #[error("unrecognized stream type `{word}`")]
    UnknownTypeWord { word: String },
    #[error("malformed stream designator `{text}`")]
    MalformedStream { text: String },
    #[error("malformed stream selector `{text}`")]
    MalformedSelector { text: String },
    #[error("malformed slot identifier `{text}`")]
    MalformedSlot { text: String },
}
