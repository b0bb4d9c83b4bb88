use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use smallvec::SmallVec;

use sensorgraph_log::Walker;
use sensorgraph_primitives::{Reading, Selector, StreamId};

use crate::error::DescriptorError;
use crate::processors::{ProcessingFunction, RpcExecutor};

/// Gate deciding whether a node input is satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// The input is always satisfied, even without readings.
    Always,
    /// At least one reading is available.
    WheneverReadings,
    CountAtLeast(u32),
    CountExactly(u32),
}

impl Trigger {
    pub fn satisfied(&self, count: u32) -> bool {
        match *self {
            Self::Always => true,
            Self::WheneverReadings => count >= 1,
            Self::CountAtLeast(n) => count >= n,
            Self::CountExactly(n) => count == n,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("always"),
            Self::WheneverReadings => f.write_str("whenever"),
            Self::CountAtLeast(n) => write!(f, "count >= {n}"),
            Self::CountExactly(n) => write!(f, "count == {n}"),
        }
    }
}

impl FromStr for Trigger {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, DescriptorError> {
        let s = s.trim();
        if s == "always" {
            return Ok(Self::Always);
        }
        if s == "whenever" {
            return Ok(Self::WheneverReadings);
        }
        if let Some(rest) = s.strip_prefix("count") {
            let rest = rest.trim_start();
            let (constructor, operand): (fn(u32) -> Self, &str) = if let Some(n) = rest.strip_prefix(">=") {
                (Self::CountAtLeast, n)
            } else if let Some(n) = rest.strip_prefix("==") {
                (Self::CountExactly, n)
            } else {
                return Err(DescriptorError::BadTrigger { clause: s.into() });
            };
            return operand
                .trim()
                .parse()
                .map(constructor)
                .map_err(|_| DescriptorError::BadTrigger { clause: s.into() });
        }
        Err(DescriptorError::BadTrigger { clause: s.into() })
    }
}

/// One input slot of a node: what it selects and when it is satisfied.
#[derive(Clone, Copy, Debug)]
pub struct InputSpec {
    pub selector: Selector,
    pub trigger: Trigger,
}

/// A single processing step in the graph.
///
/// A node owns one walker per input, a processing function and the stream
/// its results are pushed to. `outputs` are indices of downstream nodes
/// within the owning graph; the graph owns both endpoints so the
/// cross-reference carries no lifetime of its own.
pub struct Node {
    stream: StreamId,
    inputs: SmallVec<[InputSpec; 2]>,
    walkers: SmallVec<[Walker; 2]>,
    func_name: String,
    func: ProcessingFunction,
    outputs: Vec<usize>,
}

impl Node {
    pub(crate) fn new(stream: StreamId, func_name: impl Into<String>, func: ProcessingFunction) -> Self {
        Self {
            stream,
            inputs: SmallVec::new(),
            walkers: SmallVec::new(),
            func_name: func_name.into(),
            func,
            outputs: Vec::new(),
        }
    }

    /// The node's output stream.
    pub fn stream(&self) -> StreamId {
        self.stream
    }

    pub fn func_name(&self) -> &str {
        &self.func_name
    }

    pub fn inputs(&self) -> &[InputSpec] {
        &self.inputs
    }

    pub(crate) fn outputs(&self) -> &[usize] {
        &self.outputs
    }

    pub(crate) fn outputs_mut(&mut self) -> &mut [usize] {
        &mut self.outputs
    }

    pub(crate) fn connect_input(&mut self, slot: usize, walker: Walker, trigger: Trigger) {
        debug_assert_eq!(slot, self.inputs.len(), "inputs must be connected in slot order");
        self.inputs.push(InputSpec {
            selector: walker.selector(),
            trigger,
        });
        self.walkers.push(walker);
    }

    pub(crate) fn connect_output(&mut self, node: usize) {
        if !self.outputs.contains(&node) {
            self.outputs.push(node);
        }
    }

    pub(crate) fn take_walkers(&mut self) -> SmallVec<[Walker; 2]> {
        std::mem::take(&mut self.walkers)
    }

    /// Whether every input's trigger is currently satisfied.
    pub fn triggered(&self) -> bool {
        self.inputs
            .iter()
            .zip(&self.walkers)
            .all(|(input, walker)| input.trigger.satisfied(walker.count()))
    }

    /// Run the node's processing function over its input walkers.
    ///
    /// The function consumes readings as its semantics require and returns
    /// the readings to push onto the node's output stream; the caller stamps
    /// their `raw_time` with the originating tick.
    pub(crate) fn process(
        &mut self,
        rpc: &mut dyn RpcExecutor,
        mark_streamer: &mut dyn FnMut(u32),
    ) -> anyhow::Result<Vec<Reading>> {
        (self.func)(&mut self.walkers, rpc, mark_streamer)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inputs = self
            .inputs
            .iter()
            .map(|input| format!("{} when {}", input.selector, input.trigger))
            .join(", ");
        write!(f, "({inputs}) => {} => {}", self.func_name, self.stream)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("stream", &self.stream)
            .field("inputs", &self.inputs)
            .field("func", &self.func_name)
            .field("outputs", &self.outputs)
            .finish()
    }
}
