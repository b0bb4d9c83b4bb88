use std::collections::{BTreeMap, BTreeSet, VecDeque};

use log::{debug, error, warn};
use petgraph::graph::DiGraph;
use petgraph::Direction;

use sensorgraph_log::SensorLog;
use sensorgraph_primitives::{DeviceModel, Reading, Selector, Slot, StreamId, StreamType};

use crate::config::{config_ids, ConfigValue};
use crate::descriptor::parse_node_descriptor;
use crate::error::{ConnectionError, GraphError, ResourceError};
use crate::node::Node;
use crate::processors::{ProcessorRegistry, RpcExecutor};
use crate::streamer::{Report, Streamer};

#[derive(Clone, Copy, Debug)]
struct Limits {
    max_nodes: usize,
    max_streamers: usize,
}

/// A graph-based data processing engine.
///
/// The graph owns its nodes, streamers and the sensor log handle; nodes
/// refer to each other by index. External readings enter through
/// [`SensorGraph::process_input`] and propagate breadth-first from the root
/// nodes; [`SensorGraph::check_streamers`] then surfaces the streamers whose
/// reports should be assembled.
#[derive(Debug)]
pub struct SensorGraph {
    log: SensorLog,
    registry: ProcessorRegistry,
    limits: Option<Limits>,
    roots: Vec<usize>,
    nodes: Vec<Node>,
    streamers: Vec<Streamer>,
    constant_database: BTreeMap<StreamId, u32>,
    metadata_database: BTreeMap<String, String>,
    config_database: BTreeMap<(Slot, u16), ConfigValue>,
    marked: BTreeSet<usize>,
}

impl SensorGraph {
    /// A graph without device-model limits.
    pub fn new(log: SensorLog, registry: ProcessorRegistry) -> Self {
        Self {
            log,
            registry,
            limits: None,
            roots: Vec::new(),
            nodes: Vec::new(),
            streamers: Vec::new(),
            constant_database: BTreeMap::new(),
            metadata_database: BTreeMap::new(),
            config_database: BTreeMap::new(),
            marked: BTreeSet::new(),
        }
    }

    /// A graph that enforces the node and streamer limits of `model` while
    /// it is built. Useful for failing early on graphs that cannot fit the
    /// targeted device.
    pub fn with_limits(log: SensorLog, registry: ProcessorRegistry, model: &DeviceModel) -> Self {
        let mut graph = Self::new(log, registry);
        graph.limits = Some(Limits {
            max_nodes: model.max_nodes,
            max_streamers: model.max_streamers,
        });
        graph
    }

    pub fn sensor_log(&self) -> &SensorLog {
        &self.log
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn streamers(&self) -> &[Streamer] {
        &self.streamers
    }

    pub fn streamer(&self, index: usize) -> Option<&Streamer> {
        self.streamers.get(index)
    }

    /// Add a node described in the descriptor DSL.
    ///
    /// Walkers are created against the sensor log for every input, the node
    /// is wired to existing nodes producing its inputs (and to existing
    /// nodes consuming its output), and it joins the root set iff any input
    /// selects an input-type stream.
    pub fn add_node(&mut self, descriptor: &str) -> Result<(), GraphError> {
        if let Some(limits) = self.limits {
            if self.nodes.len() >= limits.max_nodes {
                return Err(ResourceError::TooManyNodes {
                    max: limits.max_nodes,
                }
                .into());
            }
        }

        let parsed = parse_node_descriptor(descriptor)?;
        let func = self
            .registry
            .find(&parsed.processor)
            .ok_or_else(|| GraphError::UnknownProcessor {
                name: parsed.processor.clone(),
            })?;

        // Validate before wiring anything, so a failed add leaves no trace.
        for (index, (selector, _)) in parsed.inputs.iter().enumerate() {
            if selector.input() {
                continue;
            }
            let found = self.nodes.iter().any(|other| selector.matches(other.stream()));
            if !found && selector.buffered() {
                return Err(ConnectionError::MissingPredecessor {
                    selector: *selector,
                    index,
                }
                .into());
            }
        }

        let new_index = self.nodes.len();
        let mut node = Node::new(parsed.output, parsed.processor, func);
        let mut in_root = false;
        for (slot, (selector, trigger)) in parsed.inputs.iter().enumerate() {
            let walker = self.log.create_walker(*selector, false);
            node.connect_input(slot, walker, *trigger);

            if selector.input() {
                if !in_root {
                    self.roots.push(new_index);
                    in_root = true;
                }
                continue;
            }
            for other in &mut self.nodes {
                if selector.matches(other.stream()) {
                    other.connect_output(new_index);
                }
            }
        }

        // The new node may feed inputs of nodes added earlier; constant
        // streams in particular can be written from multiple places.
        for existing in 0..self.nodes.len() {
            let feeds = self.nodes[existing]
                .inputs()
                .iter()
                .any(|input| input.selector.matches(node.stream()));
            if feeds {
                node.connect_output(existing);
            }
        }

        debug!("added node {new_index}: {node}");
        self.nodes.push(node);
        Ok(())
    }

    /// Add a streamer, linking it to the sensor log and assigning its index.
    pub fn add_streamer(&mut self, mut streamer: Streamer) -> Result<usize, GraphError> {
        if let Some(limits) = self.limits {
            if self.streamers.len() >= limits.max_streamers {
                return Err(ResourceError::TooManyStreamers {
                    max: limits.max_streamers,
                }
                .into());
            }
        }
        let index = self.streamers.len();
        streamer.link_to_storage(&self.log, index);
        self.streamers.push(streamer);
        Ok(index)
    }

    /// Record a constant value to be loaded into its stream.
    pub fn add_constant(&mut self, stream: StreamId, value: u32) -> Result<(), GraphError> {
        if self.constant_database.contains_key(&stream) {
            return Err(GraphError::DuplicateConstant { stream });
        }
        self.constant_database.insert(stream, value);
        Ok(())
    }

    /// Push every recorded constant into the sensor log, updating all
    /// constant walkers.
    pub fn load_constants(&self) -> Result<(), GraphError> {
        for (stream, value) in &self.constant_database {
            self.log.push(*stream, Reading::new(*stream, 0, *value))?;
        }
        Ok(())
    }

    /// Assign `default` to every constant stream referenced by a node but
    /// never given an explicit value, returning the streams so initialized.
    pub fn initialize_remaining_constants(&mut self, default: u32) -> Vec<StreamId> {
        let mut initialized = Vec::new();
        let mut streams = Vec::new();
        for node in &self.nodes {
            for input in node.inputs() {
                if let Selector::Exact(stream) = input.selector {
                    streams.push(stream);
                }
            }
            streams.push(node.stream());
        }
        for stream in streams {
            if stream.stream_type() == StreamType::Constant && !self.constant_database.contains_key(&stream) {
                self.constant_database.insert(stream, default);
                initialized.push(stream);
            }
        }
        initialized
    }

    /// Attach a piece of metadata. Metadata plays no part in processing but
    /// travels with the graph, e.g. for code generation.
    pub fn add_metadata(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<(), GraphError> {
        let name = name.into();
        if self.metadata_database.contains_key(&name) {
            return Err(GraphError::DuplicateMetadata { name });
        }
        self.metadata_database.insert(name, value.into());
        Ok(())
    }

    pub fn metadata(&self, name: &str) -> Option<&str> {
        self.metadata_database.get(name).map(String::as_str)
    }

    /// Record a config variable assignment against a slot.
    pub fn add_config(&mut self, slot: Slot, config_id: u16, value: ConfigValue) {
        self.config_database.insert((slot, config_id), value);
    }

    pub fn get_config(&self, slot: Slot, config_id: u16) -> Result<&ConfigValue, GraphError> {
        self.config_database
            .get(&(slot, config_id))
            .ok_or(GraphError::MissingConfig { slot, config_id })
    }

    /// The configured interval of one of the `fast`, `user1` or `user2`
    /// ticks, in seconds. 0 means the tick is disabled.
    pub fn get_tick(&self, name: &str) -> Result<u32, GraphError> {
        let config_id = match name {
            "fast" => config_ids::FAST_TICK_SECS,
            "user1" => config_ids::USER_TICK1_SECS,
            "user2" => config_ids::USER_TICK2_SECS,
            _ => return Err(GraphError::UnknownTick { name: name.into() }),
        };
        match self.get_config(Slot::Controller, config_id) {
            Ok(value) => Ok(value.as_u32().unwrap_or(0)),
            Err(_) => Ok(0),
        }
    }

    /// Whether some streamer selects `stream`, i.e. the stream leaves the
    /// device.
    pub fn is_output(&self, stream: StreamId) -> bool {
        self.streamers.iter().any(|s| s.selector().matches(stream))
    }

    /// Process one external reading through the graph.
    ///
    /// The reading is pushed into the sensor log (important streams also
    /// store their associated-output copy), then every triggered node is
    /// evaluated breadth-first from the roots. All readings derived in this
    /// tick carry the input's `raw_time`. Errors from processing functions
    /// are logged and swallowed; the tick never aborts.
    pub fn process_input(
        &mut self,
        stream: StreamId,
        reading: Reading,
        rpc: &mut dyn RpcExecutor,
    ) -> Result<(), GraphError> {
        self.log.push(stream, reading)?;

        let log = self.log.clone();
        let mut queue: VecDeque<usize> = self.roots.iter().copied().collect();
        let mut marks: Vec<u32> = Vec::new();

        while let Some(index) = queue.pop_front() {
            if !self.nodes[index].triggered() {
                continue;
            }
            let node_stream = self.nodes[index].stream();
            let results = match self.nodes[index].process(rpc, &mut |streamer| marks.push(streamer)) {
                Ok(results) => results,
                Err(err) => {
                    error!(
                        "unhandled error in processing function of `{}`: {err:#}",
                        self.nodes[index]
                    );
                    continue;
                }
            };
            if results.is_empty() {
                continue;
            }
            for mut result in results {
                // Derived readings belong to this tick and get fresh ids.
                result.raw_time = reading.raw_time;
                result.reading_id = Reading::UNALLOCATED;
                if let Err(err) = log.push(node_stream, result) {
                    warn!("dropping tick result for `{node_stream}`: {err}");
                }
            }
            queue.extend(self.nodes[index].outputs().iter().copied());
        }

        for index in marks {
            let index = index as usize;
            if index < self.streamers.len() {
                self.marked.insert(index);
            } else {
                warn!("node marked nonexistent streamer {index}");
            }
        }
        Ok(())
    }

    /// Manually mark a streamer to trigger on the next
    /// [`SensorGraph::check_streamers`] call.
    pub fn mark_streamer(&mut self, index: usize) -> Result<(), GraphError> {
        if index >= self.streamers.len() {
            return Err(GraphError::InvalidStreamerIndex {
                index,
                count: self.streamers.len(),
            });
        }
        debug!("streamer {index} marked manually");
        self.marked.insert(index);
        Ok(())
    }

    /// Indices of the streamers that should fire now, in index order.
    ///
    /// Manual marks are consumed by this call whether or not they fire.
    /// A selected streamer pulls in every later streamer coupled to it via
    /// with-other that has data of its own. Selected streamers stay armed
    /// (and are not reported again) until their report is built.
    pub fn check_streamers(&mut self, blacklist: Option<&BTreeSet<usize>>) -> Vec<usize> {
        let mut ready = Vec::new();
        let mut selected = BTreeSet::new();

        for leader in 0..self.streamers.len() {
            if blacklist.is_some_and(|b| b.contains(&leader)) {
                continue;
            }
            // Marks are drained even for streamers that already fired this
            // call as with-other followers.
            let manual = self.marked.remove(&leader);
            if selected.contains(&leader) {
                continue;
            }
            self.streamers[leader].advance_tick();
            if !self.streamers[leader].triggered(manual) {
                continue;
            }
            debug!("streamer {leader} triggered (manual={manual})");
            self.streamers[leader].arm();
            ready.push(leader);
            selected.insert(leader);

            for follower in leader + 1..self.streamers.len() {
                if self.streamers[follower].leader() == Some(leader)
                    && !selected.contains(&follower)
                    && self.streamers[follower].triggered(true)
                {
                    debug!("streamer {follower} triggered due to with-other on {leader}");
                    self.streamers[follower].arm();
                    ready.push(follower);
                    selected.insert(follower);
                }
            }
        }
        ready
    }

    /// Drain a ready streamer's readings into a report.
    pub fn build_report(&mut self, index: usize) -> Result<Report, GraphError> {
        let count = self.streamers.len();
        self.streamers
            .get_mut(index)
            .ok_or(GraphError::InvalidStreamerIndex { index, count })?
            .build_report()
    }

    /// Topologically sort the node list in place.
    ///
    /// The sorted order is a storage ordering for programming the graph into
    /// an embedded device; runtime propagation stays breadth-first. After
    /// sorting, every root must occupy the leading positions of the node
    /// list, or the graph is rejected.
    pub fn sort_nodes(&mut self) -> Result<(), GraphError> {
        let mut dag = DiGraph::<usize, ()>::new();
        let dag_index: Vec<_> = (0..self.nodes.len()).map(|i| dag.add_node(i)).collect();
        for (i, node) in self.nodes.iter().enumerate() {
            for input in node.inputs() {
                for (j, other) in self.nodes.iter().enumerate() {
                    if i != j && input.selector.matches(other.stream()) {
                        dag.add_edge(dag_index[j], dag_index[i], ());
                    }
                }
            }
        }

        let order = kahn_order(&dag).ok_or(ConnectionError::Cycle)?;
        let mut new_pos = vec![0usize; order.len()];
        for (pos, &old) in order.iter().enumerate() {
            new_pos[old] = pos;
        }

        let mut slots: Vec<Option<Node>> = self.nodes.drain(..).map(Some).collect();
        self.nodes = order.iter().map(|&old| slots[old].take().unwrap()).collect();
        for node in &mut self.nodes {
            for output in node.outputs_mut() {
                *output = new_pos[*output];
            }
        }
        for root in &mut self.roots {
            *root = new_pos[*root];
        }

        let root_block = self.roots.len();
        if let Some(&position) = self.roots.iter().find(|&&root| root >= root_block) {
            return Err(ConnectionError::RootsNotFirst { position }.into());
        }
        Ok(())
    }

    /// Node descriptors in storage order, suitable for reprogramming.
    pub fn dump_nodes(&self) -> Vec<String> {
        self.nodes.iter().map(ToString::to_string).collect()
    }

    pub fn dump_streamers(&self) -> Vec<String> {
        self.streamers.iter().map(ToString::to_string).collect()
    }

    /// Remove every node, streamer and database entry, releasing their
    /// walkers. Equivalent to building a fresh graph over the same log;
    /// stored readings are untouched.
    pub fn clear(&mut self) {
        self.release_walkers();
        self.roots.clear();
        self.constant_database.clear();
        self.metadata_database.clear();
        self.config_database.clear();
        self.marked.clear();
    }

    fn release_walkers(&mut self) {
        for mut node in self.nodes.drain(..) {
            for walker in node.take_walkers() {
                self.log.destroy_walker(walker);
            }
        }
        for mut streamer in self.streamers.drain(..) {
            streamer.unlink(&self.log);
        }
    }
}

impl Drop for SensorGraph {
    fn drop(&mut self) {
        self.release_walkers();
    }
}

/// Kahn's algorithm over the dependency graph.
///
/// Nodes become ready in FIFO order seeded by insertion order, so
/// dependency-free nodes keep their relative positions; this is what lets
/// the roots-first check distinguish a misordered graph from a sorted one.
/// Returns `None` if a cycle prevents a complete ordering.
fn kahn_order(dag: &DiGraph<usize, ()>) -> Option<Vec<usize>> {
    let mut indegree: Vec<usize> = dag
        .node_indices()
        .map(|ix| dag.neighbors_directed(ix, Direction::Incoming).count())
        .collect();
    let mut queue: VecDeque<_> = dag.node_indices().filter(|ix| indegree[ix.index()] == 0).collect();

    let mut order = Vec::with_capacity(dag.node_count());
    while let Some(ix) = queue.pop_front() {
        order.push(dag[ix]);
        for succ in dag.neighbors_directed(ix, Direction::Outgoing) {
            indegree[succ.index()] -= 1;
            if indegree[succ.index()] == 0 {
                queue.push_back(succ);
            }
        }
    }
    (order.len() == dag.node_count()).then_some(order)
}
