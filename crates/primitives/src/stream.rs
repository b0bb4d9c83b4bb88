use std::fmt;
use std::str::FromStr;

use crate::error::StreamError;

/// The processing class of a stream, stored in bits 14..12 of the encoded id.
///
/// Codes 0 and 7 are reserved and rejected when decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum StreamType {
    /// Buffered input; external data enters the graph here.
    Input = 1,
    /// Unbuffered input; only the last value is retained.
    Unbuffered = 2,
    /// Constant; reads never drain the configured value.
    Constant = 3,
    /// Buffered counter.
    Counter = 4,
    /// Buffered output, retained in long-term storage order.
    Buffered = 5,
    /// Unbuffered output; only the last value is retained.
    Output = 6,
}

impl StreamType {
    pub fn from_code(code: u8) -> Result<Self, StreamError> {
        match code {
            1 => Ok(Self::Input),
            2 => Ok(Self::Unbuffered),
            3 => Ok(Self::Constant),
            4 => Ok(Self::Counter),
            5 => Ok(Self::Buffered),
            6 => Ok(Self::Output),
            code => Err(StreamError::ReservedType { code }),
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether readings of this type are retained in a ring buffer.
    pub fn buffered(self) -> bool {
        matches!(self, Self::Input | Self::Counter | Self::Buffered)
    }

    /// Important streams duplicate every push into their associated output
    /// stream so the copy survives until it is streamed out.
    pub fn important(self) -> bool {
        matches!(self, Self::Input | Self::Counter)
    }

    /// Whether only the last value is retained (no ring buffer).
    pub fn virtual_stream(self) -> bool {
        !self.buffered()
    }

    pub(crate) fn word(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Unbuffered => "unbuffered",
            Self::Constant => "constant",
            Self::Counter => "counter",
            Self::Buffered => "buffered",
            Self::Output => "output",
        }
    }

    pub(crate) fn from_word(word: &str) -> Result<Self, StreamError> {
        // Accept the plural forms used by wildcard selectors.
        match word.strip_suffix('s').unwrap_or(word) {
            "input" => Ok(Self::Input),
            "unbuffered" => Ok(Self::Unbuffered),
            "constant" => Ok(Self::Constant),
            "counter" => Ok(Self::Counter),
            "buffered" => Ok(Self::Buffered),
            "output" => Ok(Self::Output),
            _ => Err(StreamError::UnknownTypeWord { word: word.into() }),
        }
    }
}

/// A 16-bit encoded stream identifier.
///
/// Layout, MSB to LSB: `system (1) | stream type (3) | stream number (12)`.
///
/// The identifier is kept in encoded form; accessors decode on demand. Only
/// validated values can be constructed, so accessors are infallible.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamId(u16);

impl StreamId {
    pub const NUMBER_MASK: u16 = 0x0FFF;
    const TYPE_SHIFT: u16 = 12;
    const SYSTEM_BIT: u16 = 1 << 15;

    /// A user stream of the given type and number.
    pub fn new(stream_type: StreamType, number: u16) -> Result<Self, StreamError> {
        Self::with_system(stream_type, number, false)
    }

    /// A system stream of the given type and number.
    pub fn system(stream_type: StreamType, number: u16) -> Result<Self, StreamError> {
        Self::with_system(stream_type, number, true)
    }

    pub fn with_system(stream_type: StreamType, number: u16, system: bool) -> Result<Self, StreamError> {
        if number > Self::NUMBER_MASK {
            return Err(StreamError::NumberOutOfRange { number });
        }
        let mut raw = u16::from(stream_type.code()) << Self::TYPE_SHIFT | number;
        if system {
            raw |= Self::SYSTEM_BIT;
        }
        Ok(Self(raw))
    }

    /// Decode a 16-bit wire value, rejecting reserved type codes.
    pub fn from_encoded(raw: u16) -> Result<Self, StreamError> {
        StreamType::from_code(((raw >> Self::TYPE_SHIFT) & 0x7) as u8)?;
        Ok(Self(raw))
    }

    pub fn encoded(self) -> u16 {
        self.0
    }

    pub fn stream_type(self) -> StreamType {
        // Only validated codes are constructible.
        StreamType::from_code(((self.0 >> Self::TYPE_SHIFT) & 0x7) as u8).unwrap()
    }

    pub fn number(self) -> u16 {
        self.0 & Self::NUMBER_MASK
    }

    pub fn is_system(self) -> bool {
        self.0 & Self::SYSTEM_BIT != 0
    }

    pub fn buffered(self) -> bool {
        self.stream_type().buffered()
    }

    pub fn important(self) -> bool {
        self.stream_type().important()
    }

    /// The buffered output stream that retains copies of an important
    /// stream's readings. Number and system bit are preserved, so e.g.
    /// input `0x100B` maps to buffered `0x500B`.
    ///
    /// Returns `None` for streams that are not important.
    pub fn associated_output(self) -> Option<StreamId> {
        self.important()
            .then(|| Self::with_system(StreamType::Buffered, self.number(), self.is_system()).unwrap())
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamId({:#06x})", self.0)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_system() {
            f.write_str("system ")?;
        }
        write!(f, "{} {}", self.stream_type().word(), self.number())
    }
}

impl FromStr for StreamId {
    type Err = StreamError;

    /// Parse either a designator like `"system output 2"` or an encoded hex
    /// value like `"0x5001"`.
    fn from_str(s: &str) -> Result<Self, StreamError> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            let raw = u16::from_str_radix(hex, 16).map_err(|_| StreamError::MalformedStream { text: s.into() })?;
            return Self::from_encoded(raw);
        }

        let mut words = s.split_whitespace();
        let mut word = words.next().ok_or_else(|| StreamError::MalformedStream { text: s.into() })?;
        let system = word == "system";
        if system {
            word = words.next().ok_or_else(|| StreamError::MalformedStream { text: s.into() })?;
        }
        let stream_type = StreamType::from_word(word)?;
        let number = words
            .next()
            .and_then(|n| parse_number(n))
            .ok_or_else(|| StreamError::MalformedStream { text: s.into() })?;
        if words.next().is_some() {
            return Err(StreamError::MalformedStream { text: s.into() });
        }

        Self::with_system(stream_type, number, system)
    }
}

pub(crate) fn parse_number(s: &str) -> Option<u16> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn encoding_matches_wire_layout() {
        let stream = StreamId::new(StreamType::Input, 1).unwrap();
        assert_eq!(stream.encoded(), 0x1001);
        let stream = StreamId::new(StreamType::Buffered, 0xB).unwrap();
        assert_eq!(stream.encoded(), 0x500B);
        let stream = StreamId::system(StreamType::Buffered, 1).unwrap();
        assert_eq!(stream.encoded(), 0xD001);
    }

    #[test]
    fn reserved_types_are_rejected() {
        assert_eq!(
            StreamId::from_encoded(0x0001),
            Err(StreamError::ReservedType { code: 0 })
        );
        assert_eq!(
            StreamId::from_encoded(0x7001),
            Err(StreamError::ReservedType { code: 7 })
        );
    }

    #[test]
    fn important_streams_map_to_buffered_outputs() {
        let input = StreamId::from_encoded(0x100B).unwrap();
        assert!(input.important());
        assert_eq!(input.associated_output().unwrap().encoded(), 0x500B);

        let counter = StreamId::new(StreamType::Counter, 9).unwrap();
        assert_eq!(
            counter.associated_output().unwrap(),
            StreamId::new(StreamType::Buffered, 9).unwrap()
        );

        let output = StreamId::from_encoded(0x5001).unwrap();
        assert_eq!(output.associated_output(), None);
    }

    #[test]
    fn designators_round_trip_through_display() {
        for text in ["input 1", "system buffered 2048", "unbuffered 10", "constant 1"] {
            let stream: StreamId = text.parse().unwrap();
            assert_eq!(stream.to_string(), text);
        }
        assert_eq!("0x5001".parse::<StreamId>().unwrap().encoded(), 0x5001);
        assert!("input".parse::<StreamId>().is_err());
        assert!("input 0x1000".parse::<StreamId>().is_err());
    }
}
