use std::fmt;
use std::str::FromStr;

use crate::error::StreamError;

/// Address of a subsystem against which config variables are recorded:
/// either the controller itself or a numbered peripheral module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Slot {
    Controller,
    Module(u8),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Controller => f.write_str("controller"),
            Self::Module(n) => write!(f, "slot {n}"),
        }
    }
}

impl FromStr for Slot {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, StreamError> {
        let s = s.trim();
        if s == "controller" {
            return Ok(Self::Controller);
        }
        s.strip_prefix("slot ")
            .and_then(|n| n.trim().parse().ok())
            .map(Self::Module)
            .ok_or_else(|| StreamError::MalformedSlot { text: s.into() })
    }
}
