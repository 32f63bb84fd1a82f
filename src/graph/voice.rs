use std::{cell::RefCell, rc::Rc};

use tracing::{debug, warn};

use crate::{
    automation::{self, Automatable, Automation, RampParam, RampStatus, PAN_SCALE},
    engine::{Context, EngineRef},
    error::{Error, Result},
    graph::{
        filter::{FilterSpec, FilterStage},
        lfo::{Lfo, LfoDestination},
        node::{NodeId, NodeParam, Waveform},
    },
    pitch::{clamp_octave, octave_multiplier, PitchName},
};

/*
Voice
=====

A voice is one pitched sound source wired as a chain:

    generator → amplitude → position → [filter stage]* → sink
                         ↑
                   amplitude path

Filter stages are spliced at the tail: the current tail is disconnected from
the sink, connected to the new stage, and the stage becomes the tail.


Play / Pause
------------

The generator is started by the first play() and never again. pause() cuts
the amplitude path (amplitude → position), which silences the whole chain
while the generator keeps running. play() on a paused voice reconnects it.

    play()   → start generator            (first time only)
    pause()  → disconnect amplitude path  (no-op if already paused)
    play()   → reconnect amplitude path   (no second start)


Frequency
---------

The voice's frequency is derived, never set directly:

    frequency = base_frequency(pitch) × 2^(octave - 4)

The generator holds the live frequency, which only differs from the derived
one while a frequency ramp is running. Changing pitch or octave mid-ramp
rescales the ramp by new/old frequency so it keeps its shape.
A retune staged into a ramp that is never committed is rolled back.


Input ranges
------------

    set_pan(v)        clamp(v, -50, 50) / 50        → [-1, 1]
    set_amplitude(v)  clamp(v, 0, 100) / 100        → [0, 1], text is an error
    set_octave(n)     clamp(n, 0, 8)
    set_pitch(name)   unknown names fall back to C
*/

/// Gain of a freshly built voice.
pub const DEFAULT_AMPLITUDE: f64 = 0.1;
/// Amplitude input range.
pub const AMPLITUDE_INPUT_MAX: f64 = 100.0;

/// Input to setters that validate their argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamInput {
    Number(f64),
    Text(String),
}

impl ParamInput {
    /// Finite or infinite numbers; NaN and text are not numeric.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamInput::Number(value) if !value.is_nan() => Some(*value),
            _ => None,
        }
    }
}

impl From<f64> for ParamInput {
    fn from(value: f64) -> Self {
        ParamInput::Number(value)
    }
}

impl From<f32> for ParamInput {
    fn from(value: f32) -> Self {
        ParamInput::Number(f64::from(value))
    }
}

impl From<i32> for ParamInput {
    fn from(value: i32) -> Self {
        ParamInput::Number(f64::from(value))
    }
}

impl From<&str> for ParamInput {
    fn from(value: &str) -> Self {
        ParamInput::Text(value.to_string())
    }
}

impl From<String> for ParamInput {
    fn from(value: String) -> Self {
        ParamInput::Text(value)
    }
}

#[derive(Debug, Clone, Copy)]
struct ChainNodes {
    generator: NodeId,
    amplitude: NodeId,
    position: NodeId,
}

struct VoiceInner {
    engine: EngineRef,
    nodes: ChainNodes,
    tail: NodeId,
    stages: Vec<Rc<FilterStage>>,
    lfos: Vec<Lfo>,
    pitch: PitchName,
    octave: i32,
    waveform: Waveform,
    live_frequency: f64,
    amplitude: f64,
    pan: f64,
    muted: bool,
    started: bool,
    /// Pitch and octave before the first retune of the open staging set.
    staged_from: Option<(PitchName, i32)>,
    automation: Automation,
}

impl VoiceInner {
    fn frequency(&self) -> f64 {
        self.pitch.base_frequency() * octave_multiplier(self.octave)
    }

    fn write(&self, node: NodeId, param: NodeParam, value: f64) {
        self.engine.borrow_mut().set_param(node, param, value);
    }

    fn write_frequency(&self) {
        self.write(self.nodes.generator, NodeParam::Frequency, self.live_frequency);
    }

    fn retune(&mut self, pitch: PitchName, octave: i32) {
        let previous = self.frequency();
        let before = (self.pitch, self.octave);
        self.pitch = pitch;
        self.octave = octave;
        let frequency = self.frequency();

        if self.automation.stage(RampParam::Frequency, frequency) {
            self.staged_from.get_or_insert(before);
            return;
        }
        if self.automation.is_ramping(RampParam::Frequency) {
            let ratio = frequency / previous;
            self.automation.rescale(RampParam::Frequency, ratio);
            self.live_frequency *= ratio;
            debug!(ratio, "frequency ramp rescaled");
        } else {
            self.live_frequency = frequency;
        }
        self.write_frequency();
    }

    /// Undo a staged retune whose ramp will never run.
    fn discard_staged_tune(&mut self) {
        if let Some((pitch, octave)) = self.staged_from.take() {
            self.pitch = pitch;
            self.octave = octave;
            debug!(%pitch, octave, "staged retune discarded");
        }
    }

    /// The node the amplitude stage feeds.
    fn amplitude_downstream(&self) -> NodeId {
        self.nodes.position
    }

    fn chain_nodes(&self) -> Vec<NodeId> {
        let mut nodes = vec![
            self.nodes.generator,
            self.nodes.amplitude,
            self.nodes.position,
        ];
        nodes.extend(self.stages.iter().map(|stage| stage.node()));
        nodes
    }
}

impl Automatable for VoiceInner {
    fn automation(&mut self) -> &mut Automation {
        &mut self.automation
    }

    fn live_value(&self, param: RampParam) -> Option<f64> {
        match param {
            RampParam::Pan => Some(self.pan),
            RampParam::Frequency => Some(self.live_frequency),
            RampParam::Gain => Some(self.amplitude),
            RampParam::Resonance | RampParam::Detune => None,
        }
    }

    fn apply_delta(&mut self, param: RampParam, delta: f64) {
        match param {
            RampParam::Pan => {
                self.pan += delta;
                self.write(self.nodes.position, NodeParam::Pan, self.pan);
            }
            RampParam::Frequency => {
                self.live_frequency += delta;
                self.write_frequency();
            }
            RampParam::Gain => {
                self.amplitude += delta;
                self.write(self.nodes.amplitude, NodeParam::Gain, self.amplitude);
            }
            RampParam::Resonance | RampParam::Detune => {}
        }
    }
}

/// One pitched sound source and its signal chain.
pub struct Voice {
    inner: Rc<RefCell<VoiceInner>>,
}

impl Voice {
    /// Build generator → amplitude → position → sink.
    ///
    /// Unknown pitch names fall back to C; octave is clamped to [0, 8].
    pub fn new(ctx: &Context, pitch: &str, waveform: Waveform, octave: i32) -> Self {
        let engine = EngineRef::clone(ctx.engine());
        let pitch = PitchName::resolve(pitch);
        let octave = clamp_octave(octave);
        let frequency = pitch.base_frequency() * octave_multiplier(octave);

        let nodes = {
            let mut e = engine.borrow_mut();
            let generator = e.create_generator(waveform, frequency);
            let amplitude = e.create_amplitude_stage(DEFAULT_AMPLITUDE);
            let position = e.create_position_stage(0.0);
            let sink = e.sink();
            e.connect(generator, amplitude);
            e.connect(amplitude, position);
            e.connect(position, sink);
            ChainNodes {
                generator,
                amplitude,
                position,
            }
        };
        debug!(%pitch, octave, %waveform, generator = %nodes.generator, "voice created");

        let inner = VoiceInner {
            engine,
            nodes,
            tail: nodes.position,
            stages: Vec::new(),
            lfos: Vec::new(),
            pitch,
            octave,
            waveform,
            live_frequency: frequency,
            amplitude: DEFAULT_AMPLITUDE,
            pan: 0.0,
            muted: false,
            started: false,
            staged_from: None,
            automation: Automation::new(ctx.timer().clone()),
        };
        Self {
            inner: Rc::new(RefCell::new(inner)),
        }
    }

    /// Set the pitch class; unknown names fall back to C.
    pub fn set_pitch(&mut self, name: &str) -> &mut Self {
        let pitch = PitchName::resolve(name);
        let mut inner = self.inner.borrow_mut();
        let octave = inner.octave;
        inner.retune(pitch, octave);
        drop(inner);
        self
    }

    /// Set the octave, clamped to [0, 8].
    pub fn set_octave(&mut self, octave: i32) -> &mut Self {
        let mut inner = self.inner.borrow_mut();
        let pitch = inner.pitch;
        inner.retune(pitch, clamp_octave(octave));
        drop(inner);
        self
    }

    pub fn set_waveform(&mut self, waveform: Waveform) -> &mut Self {
        let mut inner = self.inner.borrow_mut();
        inner.waveform = waveform;
        inner
            .engine
            .borrow_mut()
            .set_waveform(inner.nodes.generator, waveform);
        drop(inner);
        self
    }

    /// Stereo position in [-50, 50] (clamped), stored as [-1, 1].
    pub fn set_pan(&mut self, pan: f64) -> &mut Self {
        let pan = pan.clamp(-PAN_SCALE, PAN_SCALE);
        let mut inner = self.inner.borrow_mut();
        if !inner.automation.stage(RampParam::Pan, pan) {
            inner.pan = pan / PAN_SCALE;
            inner.write(inner.nodes.position, NodeParam::Pan, inner.pan);
        }
        drop(inner);
        self
    }

    /// Amplitude in [0, 100] (clamped), stored as [0, 1].
    ///
    /// Fails with [`Error::Validation`] when the input is not a number.
    pub fn set_amplitude(&mut self, amplitude: impl Into<ParamInput>) -> Result<&mut Self> {
        let input = amplitude.into();
        let Some(value) = input.as_number() else {
            return Err(Error::Validation {
                param: "amplitude",
                reason: format!("expected a number, got {input:?}"),
            });
        };
        let amplitude = value.clamp(0.0, AMPLITUDE_INPUT_MAX) / AMPLITUDE_INPUT_MAX;

        let mut inner = self.inner.borrow_mut();
        if !inner.automation.stage(RampParam::Gain, amplitude) {
            inner.amplitude = amplitude;
            inner.write(inner.nodes.amplitude, NodeParam::Gain, amplitude);
        }
        drop(inner);
        Ok(self)
    }

    /// Start the generator the first time; reconnect the amplitude path if paused.
    pub fn play(&mut self) -> &mut Self {
        let mut inner = self.inner.borrow_mut();
        let was_muted = inner.muted;
        let (amplitude, downstream) = (inner.nodes.amplitude, inner.amplitude_downstream());
        let generator = inner.nodes.generator;
        let start = !inner.started;

        {
            let mut engine = inner.engine.borrow_mut();
            if was_muted {
                engine.connect(amplitude, downstream);
            }
            if start {
                engine.start(generator);
            }
        }

        if was_muted {
            inner.muted = false;
            debug!(%generator, "voice unmuted");
        }
        if start {
            inner.started = true;
            debug!(%generator, "voice started");
        } else if !was_muted {
            warn!(%generator, "play on a running voice ignored");
        }
        drop(inner);
        self
    }

    /// Disconnect the amplitude path; the generator keeps running.
    pub fn pause(&mut self) -> &mut Self {
        let mut inner = self.inner.borrow_mut();
        if !inner.muted {
            let (amplitude, downstream) = (inner.nodes.amplitude, inner.amplitude_downstream());
            inner.engine.borrow_mut().disconnect(amplitude, downstream);
            inner.muted = true;
            debug!(generator = %inner.nodes.generator, "voice muted");
        }
        drop(inner);
        self
    }

    /// Realize a stage from `spec` and splice it at the chain tail.
    pub fn attach_filter(&mut self, spec: &FilterSpec) -> &mut Self {
        let stage = spec.realize();
        let mut inner = self.inner.borrow_mut();
        let tail = inner.tail;
        let node = stage.node();
        {
            let mut engine = inner.engine.borrow_mut();
            let sink = engine.sink();
            engine.disconnect(tail, sink);
            engine.connect(tail, node);
            engine.connect(node, sink);
        }
        inner.tail = node;
        inner.stages.push(stage);
        debug!(%node, previous_tail = %tail, "filter stage spliced");
        drop(inner);
        self
    }

    /// Route `lfo` into one of this voice's parameters and start it.
    ///
    /// Depth is rescaled for the destination using the current frequency.
    pub fn attach_lfo(&mut self, lfo: &Lfo, destination: LfoDestination) -> &mut Self {
        let mut inner = self.inner.borrow_mut();
        let node = match destination {
            LfoDestination::Frequency => inner.nodes.generator,
            LfoDestination::Gain => inner.nodes.amplitude,
            LfoDestination::Pan => inner.nodes.position,
        };
        lfo.route_to(node, destination, inner.frequency());
        if !inner.lfos.iter().any(|held| held.ptr_eq(lfo)) {
            inner.lfos.push(lfo.clone());
        }
        drop(inner);
        self
    }

    /// Open a staging area, cancelling any running ramp.
    ///
    /// A retune staged in an earlier, uncommitted set is undone.
    pub fn begin_ramp(&mut self) -> &mut Self {
        let mut inner = self.inner.borrow_mut();
        inner.discard_staged_tune();
        inner.automation.begin();
        drop(inner);
        self
    }

    /// Ramp every staged value from its live value over `duration_ms`.
    pub fn commit_ramp(&mut self, duration_ms: f64) -> &mut Self {
        automation::commit(&self.inner, duration_ms);
        self.inner.borrow_mut().staged_from = None;
        self
    }

    pub fn pitch(&self) -> PitchName {
        self.inner.borrow().pitch
    }

    pub fn octave(&self) -> i32 {
        self.inner.borrow().octave
    }

    pub fn waveform(&self) -> Waveform {
        self.inner.borrow().waveform
    }

    /// Derived frequency: base frequency × octave multiplier.
    pub fn frequency(&self) -> f64 {
        self.inner.borrow().frequency()
    }

    /// Frequency currently on the generator.
    pub fn live_frequency(&self) -> f64 {
        self.inner.borrow().live_frequency
    }

    /// Live amplitude in [0, 1].
    pub fn amplitude(&self) -> f64 {
        self.inner.borrow().amplitude
    }

    /// Live pan in [-1, 1].
    pub fn pan(&self) -> f64 {
        self.inner.borrow().pan
    }

    pub fn is_muted(&self) -> bool {
        self.inner.borrow().muted
    }

    pub fn is_started(&self) -> bool {
        self.inner.borrow().started
    }

    pub fn ramp_status(&self) -> RampStatus {
        self.inner.borrow().automation.status()
    }

    pub fn is_ramping(&self) -> bool {
        self.ramp_status() == RampStatus::Running
    }

    /// Ticks left in the running ramp.
    pub fn remaining_ticks(&self) -> u32 {
        self.inner.borrow().automation.remaining_ticks()
    }

    pub fn generator(&self) -> NodeId {
        self.inner.borrow().nodes.generator
    }

    pub fn amplitude_node(&self) -> NodeId {
        self.inner.borrow().nodes.amplitude
    }

    pub fn position_node(&self) -> NodeId {
        self.inner.borrow().nodes.position
    }

    /// Last node in the chain (feeds the sink).
    pub fn tail(&self) -> NodeId {
        self.inner.borrow().tail
    }

    /// Engine nodes of the spliced filter stages, in chain order.
    pub fn filter_nodes(&self) -> Vec<NodeId> {
        self.inner
            .borrow()
            .stages
            .iter()
            .map(|stage| stage.node())
            .collect()
    }

    pub fn filter_count(&self) -> usize {
        self.inner.borrow().stages.len()
    }

    /// Tear the chain down: cancel any ramp, unhook LFOs routed here, stop the
    /// generator and release every node. Filter specs prune the dropped stages.
    pub fn dispose(self) {
        let mut inner = self.inner.borrow_mut();
        inner.discard_staged_tune();
        inner.automation.cancel();

        let nodes = inner.chain_nodes();
        for lfo in inner.lfos.drain(..) {
            lfo.unroute_from(&nodes);
        }

        {
            let mut engine = inner.engine.borrow_mut();
            if inner.started {
                engine.stop(inner.nodes.generator);
            }
            for &node in &nodes {
                engine.release(node);
            }
        }
        inner.stages.clear();
        debug!(released = nodes.len(), "voice disposed");
    }
}
