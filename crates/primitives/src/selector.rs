use std::fmt;
use std::str::FromStr;

use crate::error::StreamError;
use crate::stream::{StreamId, StreamType};

/// A total predicate over stream identifiers.
///
/// Either an exact match on one stream, or a wildcard over every stream of
/// one type within one scope (the system bit of a wildcard restricts its
/// scope, so `all inputs` and `all system inputs` are distinct selectors).
///
/// Selectors share the 16-bit encoding of [`StreamId`]; a wildcard is encoded
/// with a zero stream number, which means exact selectors cannot address
/// stream number zero in encoded form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Selector {
    Exact(StreamId),
    Wildcard { stream_type: StreamType, system: bool },
}

impl Selector {
    pub fn from_encoded(raw: u16) -> Result<Self, StreamError> {
        let stream = StreamId::from_encoded(raw)?;
        if stream.number() == 0 {
            Ok(Self::Wildcard {
                stream_type: stream.stream_type(),
                system: stream.is_system(),
            })
        } else {
            Ok(Self::Exact(stream))
        }
    }

    pub fn encoded(&self) -> u16 {
        self.as_stream().encoded()
    }

    pub fn matches(&self, stream: StreamId) -> bool {
        match *self {
            Self::Exact(exact) => exact == stream,
            Self::Wildcard { stream_type, system } => {
                stream.stream_type() == stream_type && stream.is_system() == system
            }
        }
    }

    pub fn stream_type(&self) -> StreamType {
        match *self {
            Self::Exact(stream) => stream.stream_type(),
            Self::Wildcard { stream_type, .. } => stream_type,
        }
    }

    /// Whether every matching stream is buffered.
    pub fn buffered(&self) -> bool {
        self.stream_type().buffered()
    }

    /// Whether this selects constant streams, whose walkers never drain.
    pub fn inexhaustible(&self) -> bool {
        self.stream_type() == StreamType::Constant
    }

    /// Whether this selects buffered input streams, i.e. graph entry points.
    pub fn input(&self) -> bool {
        self.stream_type() == StreamType::Input
    }

    /// The representative stream of this selector: the stream itself for an
    /// exact selector, the zero-numbered stream for a wildcard (matching the
    /// encoded form).
    pub fn as_stream(&self) -> StreamId {
        match *self {
            Self::Exact(stream) => stream,
            Self::Wildcard { stream_type, system } => StreamId::with_system(stream_type, 0, system).unwrap(),
        }
    }
}

impl From<StreamId> for Selector {
    fn from(stream: StreamId) -> Self {
        Self::Exact(stream)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Exact(stream) => write!(f, "{stream}"),
            Self::Wildcard { stream_type, system } => {
                f.write_str("all ")?;
                if system {
                    f.write_str("system ")?;
                }
                write!(f, "{}s", stream_type.word())
            }
        }
    }
}

impl FromStr for Selector {
    type Err = StreamError;

    /// Parse `"all [system] <type>s"`, a stream designator like `"input 1"`,
    /// or an encoded hex value like `"0x1001"`.
    fn from_str(s: &str) -> Result<Self, StreamError> {
        let s = s.trim();

        if let Some(rest) = s.strip_prefix("all ") {
            let mut words = rest.split_whitespace();
            let mut word = words.next().ok_or_else(|| StreamError::MalformedSelector { text: s.into() })?;
            let system = word == "system";
            if system {
                word = words.next().ok_or_else(|| StreamError::MalformedSelector { text: s.into() })?;
            }
            if words.next().is_some() {
                return Err(StreamError::MalformedSelector { text: s.into() });
            }
            let stream_type = StreamType::from_word(word)?;
            return Ok(Self::Wildcard { stream_type, system });
        }

        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            let raw =
                u16::from_str_radix(hex, 16).map_err(|_| StreamError::MalformedSelector { text: s.into() })?;
            return Self::from_encoded(raw);
        }

        s.parse::<StreamId>().map(Self::Exact)
    }
}
