//! The processing-function registry and the built-in function catalogue.
//!
//! Processing functions are plain function pointers resolved by name while
//! the graph is built; an unknown name is a constructor error, never a tick
//! error. Functions receive their node's input walkers, an [`RpcExecutor`]
//! and a callback for manually marking streamers. They run outside the
//! sensor log lock and any error they return is isolated by the graph tick.

use std::collections::HashMap;

use anyhow::{bail, Context};

use sensorgraph_log::Walker;
use sensorgraph_primitives::Reading;

/// Capability to execute RPCs against other modules from node code.
pub trait RpcExecutor {
    /// Execute the RPC `rpc_id` on the module at `address`, returning its
    /// 32-bit result.
    fn call_rpc(&mut self, address: u8, rpc_id: u16) -> anyhow::Result<u32>;
}

/// Executor for graphs whose nodes never call RPCs; every call fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRpc;

impl RpcExecutor for NoRpc {
    fn call_rpc(&mut self, address: u8, rpc_id: u16) -> anyhow::Result<u32> {
        bail!("rpc execution is unavailable (address {address}, rpc {rpc_id:#06x})")
    }
}

/// A node's processing step.
///
/// Returns the readings to push to the node's output stream. The graph
/// stamps each result's `raw_time` with the tick being processed.
pub type ProcessingFunction =
    fn(&mut [Walker], &mut dyn RpcExecutor, &mut dyn FnMut(u32)) -> anyhow::Result<Vec<Reading>>;

/// Name-keyed registry of processing functions.
///
/// Passed explicitly to graph construction; [`ProcessorRegistry::default`]
/// carries the built-in catalogue.
#[derive(Clone)]
pub struct ProcessorRegistry {
    functions: HashMap<String, ProcessingFunction>,
}

impl ProcessorRegistry {
    /// An empty registry, for callers that want full control.
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, func: ProcessingFunction) {
        self.functions.insert(name.into(), func);
    }

    pub fn find(&self, name: &str) -> Option<ProcessingFunction> {
        self.functions.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("copy", copy_latest_a);
        registry.register("copy_latest_a", copy_latest_a);
        registry.register("copy_all_a", copy_all_a);
        registry.register("copy_count_a", copy_count_a);
        registry.register("call_rpc", call_rpc);
        registry.register("trigger_streamer", trigger_streamer);
        registry
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Drain input a, emitting only its newest reading.
pub fn copy_latest_a(
    inputs: &mut [Walker],
    _rpc: &mut dyn RpcExecutor,
    _mark: &mut dyn FnMut(u32),
) -> anyhow::Result<Vec<Reading>> {
    let input = first_input(inputs)?;
    Ok(drain(input)?.pop().into_iter().collect())
}

/// Drain input a, emitting every reading in order.
pub fn copy_all_a(
    inputs: &mut [Walker],
    _rpc: &mut dyn RpcExecutor,
    _mark: &mut dyn FnMut(u32),
) -> anyhow::Result<Vec<Reading>> {
    let input = first_input(inputs)?;
    drain(input)
}

/// Emit the number of readings available on input a, draining it.
pub fn copy_count_a(
    inputs: &mut [Walker],
    _rpc: &mut dyn RpcExecutor,
    _mark: &mut dyn FnMut(u32),
) -> anyhow::Result<Vec<Reading>> {
    let input = first_input(inputs)?;
    let count = input.count();
    let template = drain(input)?.pop();
    let stream = template.map_or_else(|| input.selector().as_stream(), |r| r.stream);
    Ok(vec![Reading::new(stream, 0, count)])
}

/// Execute the RPC encoded in input b's value as `(address << 16) | rpc_id`,
/// emitting the result. Input a is drained as the trigger source.
pub fn call_rpc(
    inputs: &mut [Walker],
    rpc: &mut dyn RpcExecutor,
    _mark: &mut dyn FnMut(u32),
) -> anyhow::Result<Vec<Reading>> {
    let [trigger, descriptor] = inputs else {
        bail!("call_rpc requires exactly two inputs");
    };
    drain(trigger)?;

    let encoded = descriptor.peek().context("call_rpc has no rpc descriptor")?;
    let address = (encoded.value >> 16) as u8;
    let rpc_id = (encoded.value & 0xFFFF) as u16;
    let result = rpc.call_rpc(address, rpc_id)?;
    Ok(vec![Reading::new(encoded.stream, 0, result)])
}

/// Manually mark the streamer whose index is input b's value. Emits nothing,
/// so propagation stops here.
pub fn trigger_streamer(
    inputs: &mut [Walker],
    _rpc: &mut dyn RpcExecutor,
    mark: &mut dyn FnMut(u32),
) -> anyhow::Result<Vec<Reading>> {
    let [trigger, index] = inputs else {
        bail!("trigger_streamer requires exactly two inputs");
    };
    drain(trigger)?;

    let index = index.peek().context("trigger_streamer has no index input")?;
    mark(index.value);
    Ok(Vec::new())
}

fn first_input<'a>(inputs: &'a mut [Walker]) -> anyhow::Result<&'a mut Walker> {
    inputs.first_mut().context("processing function requires an input")
}

/// Pop everything currently visible on a walker.
///
/// Inexhaustible walkers never drain, so they contribute a single reading.
fn drain(walker: &mut Walker) -> anyhow::Result<Vec<Reading>> {
    if walker.selector().inexhaustible() {
        return Ok(vec![walker.pop()?]);
    }
    let mut readings = Vec::with_capacity(walker.count() as usize);
    while let Ok(reading) = walker.pop() {
        readings.push(reading);
    }
    Ok(readings)
}
