//! Parser for the line-oriented node descriptor DSL.
//!
//! A descriptor names a node's inputs, the trigger gating them, its
//! processing function and its output stream:
//!
//! ```text
//! (input 1, constant 1) when count >= 1 => call_rpc => buffered 2
//! ```
//!
//! Inputs are stream selectors (designators, wildcards or encoded hex ids);
//! the trigger applies to every input and all of them must be satisfied for
//! the node to fire.

use sensorgraph_primitives::{Selector, StreamId};

use crate::error::DescriptorError;
use crate::node::Trigger;

/// Parsed form of one node descriptor line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub inputs: Vec<(Selector, Trigger)>,
    pub processor: String,
    pub output: StreamId,
}

/// Parse a node descriptor line.
pub fn parse_node_descriptor(descriptor: &str) -> Result<NodeDescriptor, DescriptorError> {
    let malformed = || DescriptorError::Malformed {
        descriptor: descriptor.into(),
    };

    let mut parts = descriptor.split("=>");
    let head = parts.next().ok_or_else(malformed)?.trim();
    let processor = parts.next().ok_or_else(malformed)?.trim();
    let output = parts.next().ok_or_else(malformed)?.trim();
    if parts.next().is_some() || processor.is_empty() {
        return Err(malformed());
    }

    let inner = head
        .strip_prefix('(')
        .ok_or_else(malformed)?;
    let (inputs, clause) = inner.split_once(')').ok_or_else(malformed)?;
    let trigger: Trigger = clause
        .trim()
        .strip_prefix("when ")
        .ok_or_else(malformed)?
        .parse()?;

    let inputs: Vec<(Selector, Trigger)> = inputs
        .split(',')
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.parse::<Selector>().map(|selector| (selector, trigger)))
        .collect::<Result<_, _>>()?;
    if inputs.is_empty() {
        return Err(DescriptorError::NoInputs {
            descriptor: descriptor.into(),
        });
    }

    Ok(NodeDescriptor {
        inputs,
        processor: processor.into(),
        output: output.parse()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sensorgraph_primitives::StreamType;

    #[test]
    fn parses_a_single_input_node() {
        let parsed = parse_node_descriptor("(0x1001) when count >= 1 => copy => 0x5002").unwrap();
        assert_eq!(parsed.processor, "copy");
        assert_eq!(parsed.output.encoded(), 0x5002);
        assert_eq!(
            parsed.inputs,
            vec![(Selector::Exact("input 1".parse().unwrap()), Trigger::CountAtLeast(1))]
        );
    }

    #[test]
    fn parses_multiple_inputs_and_wildcards() {
        let parsed =
            parse_node_descriptor("(all system inputs, constant 1) when whenever => call_rpc => output 2").unwrap();
        assert_eq!(parsed.inputs.len(), 2);
        assert_eq!(
            parsed.inputs[0].0,
            Selector::Wildcard {
                stream_type: StreamType::Input,
                system: true
            }
        );
        assert_eq!(parsed.inputs[1].0, Selector::Exact("constant 1".parse().unwrap()));
        assert_eq!(parsed.output, "output 2".parse().unwrap());
    }

    #[test]
    fn rejects_malformed_descriptors() {
        for bad in [
            "input 1 => copy => output 1",
            "(input 1) => copy",
            "(input 1) when sometimes => copy => output 1",
            "() when always => copy => output 1",
            "(input 1) when always => copy => nonsense",
        ] {
            assert!(parse_node_descriptor(bad).is_err(), "accepted `{bad}`");
        }
    }
}
