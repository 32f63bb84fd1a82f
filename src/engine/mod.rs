//! Seams to the outside world: the rendering engine that owns real audio
//! nodes, and the timer that drives ramp ticks.
//!
//! Nothing in this crate renders samples. Voices, filter specs and LFOs only
//! create nodes, wire them and write parameters through [`RenderEngine`].

pub mod recording;
pub mod timer;

use std::{cell::RefCell, rc::Rc};

use crate::graph::node::{FilterKind, FilterSettings, NodeId, NodeParam, Waveform};

pub use recording::{EngineOp, NodeKind, RecordingEngine};
pub use timer::{IntervalId, ManualClock, TickOutcome, TickTask, Timer, TimerRef};

/// Shared handle to the rendering engine.
pub type EngineRef = Rc<RefCell<dyn RenderEngine>>;

/// Audio graph operations consumed by this crate.
///
/// Parameter writes are immediate; the engine is not expected to ramp
/// anything on its own.
pub trait RenderEngine {
    fn create_generator(&mut self, waveform: Waveform, frequency: f64) -> NodeId;

    fn create_amplitude_stage(&mut self, gain: f64) -> NodeId;

    fn create_position_stage(&mut self, pan: f64) -> NodeId;

    fn create_filter_stage(&mut self, settings: &FilterSettings) -> NodeId;

    /// The output every chain ends in.
    fn sink(&self) -> NodeId;

    fn connect(&mut self, src: NodeId, dst: NodeId);

    fn disconnect(&mut self, src: NodeId, dst: NodeId);

    /// Route a signal into a parameter input of `dst` (modulation).
    fn connect_param(&mut self, src: NodeId, dst: NodeId, param: NodeParam);

    fn disconnect_param(&mut self, src: NodeId, dst: NodeId, param: NodeParam);

    /// Start a generator. Generators are single-use: callers start each one at most once.
    fn start(&mut self, generator: NodeId);

    fn stop(&mut self, generator: NodeId);

    fn set_param(&mut self, node: NodeId, param: NodeParam, value: f64);

    fn set_waveform(&mut self, node: NodeId, waveform: Waveform);

    fn set_filter_kind(&mut self, node: NodeId, kind: FilterKind);

    /// Drop every connection touching `node` and free it.
    fn release(&mut self, node: NodeId);
}

/// Everything an entity needs to talk to the outside world.
///
/// Cloning is cheap; clones share the same engine and timer.
#[derive(Clone)]
pub struct Context {
    engine: EngineRef,
    timer: TimerRef,
}

impl Context {
    pub fn new(engine: EngineRef, timer: TimerRef) -> Self {
        Self { engine, timer }
    }

    pub fn engine(&self) -> &EngineRef {
        &self.engine
    }

    pub fn timer(&self) -> &TimerRef {
        &self.timer
    }
}
