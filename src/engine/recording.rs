use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::{
    engine::RenderEngine,
    graph::node::{FilterKind, FilterSettings, NodeId, NodeParam, Waveform},
};

/*
Recording Engine
================

An in-memory stand-in for a real audio backend. It keeps the node graph
(nodes, signal edges, modulation edges, parameter values) and appends every
call to an operation log, so callers can ask both "what does the graph look
like now" and "what was done to get here":

    engine.is_connected(gain, panner)            // current topology
    engine.reaches_sink(generator)               // is this voice audible?
    engine.param(filter, NodeParam::Frequency)   // last written value
    engine.start_count(generator)                // how often start() was called
    engine.count_ops(|op| matches!(op, EngineOp::Disconnect { .. }))

Disconnecting an edge that does not exist is logged like any other call and
leaves the graph untouched.

The log is unbounded. Long-running drivers (the monitor, benchmarks) build
the engine with without_log(), which keeps the graph but records nothing.
*/

/// What a node was created as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Sink,
    Generator,
    Amplitude,
    Position,
    Filter,
}

/// One call made against the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOp {
    Create { node: NodeId, kind: NodeKind },
    Connect { src: NodeId, dst: NodeId },
    Disconnect { src: NodeId, dst: NodeId },
    ConnectParam { src: NodeId, dst: NodeId, param: NodeParam },
    DisconnectParam { src: NodeId, dst: NodeId, param: NodeParam },
    Start { node: NodeId },
    Stop { node: NodeId },
    SetParam { node: NodeId, param: NodeParam, value: f64 },
    SetWaveform { node: NodeId, waveform: Waveform },
    SetFilterKind { node: NodeId, kind: FilterKind },
    Release { node: NodeId },
}

#[derive(Debug, Clone)]
struct NodeRecord {
    kind: NodeKind,
    params: BTreeMap<NodeParam, f64>,
    waveform: Option<Waveform>,
    filter_kind: Option<FilterKind>,
    starts: u32,
    running: bool,
    released: bool,
}

impl NodeRecord {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            params: BTreeMap::new(),
            waveform: None,
            filter_kind: None,
            starts: 0,
            running: false,
            released: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordingEngine {
    nodes: Vec<NodeRecord>,
    edges: BTreeSet<(NodeId, NodeId)>,
    param_edges: BTreeSet<(NodeId, NodeId, NodeParam)>,
    ops: Vec<EngineOp>,
    logging: bool,
    sink: NodeId,
}

impl RecordingEngine {
    pub fn new() -> Self {
        let mut engine = Self {
            nodes: Vec::new(),
            edges: BTreeSet::new(),
            param_edges: BTreeSet::new(),
            ops: Vec::new(),
            logging: true,
            sink: NodeId(0),
        };
        engine.sink = engine.push_node(NodeRecord::new(NodeKind::Sink));
        engine
    }

    /// Track the graph only; `ops()` stays empty.
    pub fn without_log() -> Self {
        let mut engine = Self::new();
        engine.ops.clear();
        engine.logging = false;
        engine
    }

    fn record(&mut self, op: EngineOp) {
        if self.logging {
            self.ops.push(op);
        }
    }

    fn push_node(&mut self, record: NodeRecord) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let kind = record.kind;
        self.nodes.push(record);
        self.record(EngineOp::Create { node: id, kind });
        trace!(%id, ?kind, "node created");
        id
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeRecord> {
        self.nodes.get_mut(id.0 as usize)
    }

    fn node(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(id.0 as usize)
    }

    /// Every call made so far, oldest first.
    pub fn ops(&self) -> &[EngineOp] {
        &self.ops
    }

    pub fn count_ops(&self, predicate: impl Fn(&EngineOp) -> bool) -> usize {
        self.ops.iter().filter(|op| predicate(op)).count()
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| !n.released).count()
    }

    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.node(node).map(|n| n.kind)
    }

    /// Last value written to a parameter.
    pub fn param(&self, node: NodeId, param: NodeParam) -> Option<f64> {
        self.node(node).and_then(|n| n.params.get(&param).copied())
    }

    pub fn waveform(&self, node: NodeId) -> Option<Waveform> {
        self.node(node).and_then(|n| n.waveform)
    }

    pub fn filter_kind(&self, node: NodeId) -> Option<FilterKind> {
        self.node(node).and_then(|n| n.filter_kind)
    }

    pub fn start_count(&self, node: NodeId) -> u32 {
        self.node(node).map_or(0, |n| n.starts)
    }

    pub fn is_running(&self, node: NodeId) -> bool {
        self.node(node).is_some_and(|n| n.running)
    }

    pub fn is_released(&self, node: NodeId) -> bool {
        self.node(node).is_some_and(|n| n.released)
    }

    pub fn is_connected(&self, src: NodeId, dst: NodeId) -> bool {
        self.edges.contains(&(src, dst))
    }

    pub fn is_param_connected(&self, src: NodeId, dst: NodeId, param: NodeParam) -> bool {
        self.param_edges.contains(&(src, dst, param))
    }

    /// Nodes `src` feeds directly.
    pub fn outputs(&self, src: NodeId) -> Vec<NodeId> {
        self.edges
            .range((src, NodeId(0))..=(src, NodeId(u32::MAX)))
            .map(|&(_, dst)| dst)
            .collect()
    }

    /// Whether a signal path leads from `node` to the sink.
    pub fn reaches_sink(&self, node: NodeId) -> bool {
        let mut seen = BTreeSet::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if current == self.sink {
                return true;
            }
            if seen.insert(current) {
                stack.extend(self.outputs(current));
            }
        }
        false
    }
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderEngine for RecordingEngine {
    fn create_generator(&mut self, waveform: Waveform, frequency: f64) -> NodeId {
        let mut record = NodeRecord::new(NodeKind::Generator);
        record.waveform = Some(waveform);
        record.params.insert(NodeParam::Frequency, frequency);
        record.params.insert(NodeParam::Detune, 0.0);
        self.push_node(record)
    }

    fn create_amplitude_stage(&mut self, gain: f64) -> NodeId {
        let mut record = NodeRecord::new(NodeKind::Amplitude);
        record.params.insert(NodeParam::Gain, gain);
        self.push_node(record)
    }

    fn create_position_stage(&mut self, pan: f64) -> NodeId {
        let mut record = NodeRecord::new(NodeKind::Position);
        record.params.insert(NodeParam::Pan, pan);
        self.push_node(record)
    }

    fn create_filter_stage(&mut self, settings: &FilterSettings) -> NodeId {
        let mut record = NodeRecord::new(NodeKind::Filter);
        record.filter_kind = Some(settings.kind);
        record.params.insert(NodeParam::Frequency, settings.frequency);
        record.params.insert(NodeParam::Q, settings.q);
        record.params.insert(NodeParam::Detune, settings.detune);
        record.params.insert(NodeParam::Gain, settings.gain_db);
        self.push_node(record)
    }

    fn sink(&self) -> NodeId {
        self.sink
    }

    fn connect(&mut self, src: NodeId, dst: NodeId) {
        self.record(EngineOp::Connect { src, dst });
        self.edges.insert((src, dst));
    }

    fn disconnect(&mut self, src: NodeId, dst: NodeId) {
        self.record(EngineOp::Disconnect { src, dst });
        self.edges.remove(&(src, dst));
    }

    fn connect_param(&mut self, src: NodeId, dst: NodeId, param: NodeParam) {
        self.record(EngineOp::ConnectParam { src, dst, param });
        self.param_edges.insert((src, dst, param));
    }

    fn disconnect_param(&mut self, src: NodeId, dst: NodeId, param: NodeParam) {
        self.record(EngineOp::DisconnectParam { src, dst, param });
        self.param_edges.remove(&(src, dst, param));
    }

    fn start(&mut self, generator: NodeId) {
        self.record(EngineOp::Start { node: generator });
        if let Some(node) = self.node_mut(generator) {
            node.starts += 1;
            node.running = true;
        }
    }

    fn stop(&mut self, generator: NodeId) {
        self.record(EngineOp::Stop { node: generator });
        if let Some(node) = self.node_mut(generator) {
            node.running = false;
        }
    }

    fn set_param(&mut self, node: NodeId, param: NodeParam, value: f64) {
        self.record(EngineOp::SetParam { node, param, value });
        if let Some(record) = self.node_mut(node) {
            record.params.insert(param, value);
        }
    }

    fn set_waveform(&mut self, node: NodeId, waveform: Waveform) {
        self.record(EngineOp::SetWaveform { node, waveform });
        if let Some(record) = self.node_mut(node) {
            record.waveform = Some(waveform);
        }
    }

    fn set_filter_kind(&mut self, node: NodeId, kind: FilterKind) {
        self.record(EngineOp::SetFilterKind { node, kind });
        if let Some(record) = self.node_mut(node) {
            record.filter_kind = Some(kind);
        }
    }

    fn release(&mut self, node: NodeId) {
        self.record(EngineOp::Release { node });
        self.edges.retain(|&(src, dst)| src != node && dst != node);
        self.param_edges
            .retain(|&(src, dst, _)| src != node && dst != node);
        if let Some(record) = self.node_mut(node) {
            record.released = true;
            record.running = false;
        }
    }
}
