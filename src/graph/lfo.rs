use std::{cell::RefCell, fmt, rc::Rc, str::FromStr};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    engine::{Context, EngineRef},
    error::Error,
    graph::node::{NodeId, NodeParam, Waveform},
};

/*
LFO (Low Frequency Oscillator)
==============================

An LFO is a generator running at sub-audio rates whose output is scaled and
routed into a parameter input of a voice instead of to the speakers:

    generator ──→ scaler ──→ voice parameter (frequency, gain or pan)

  rate     Oscillation speed in Hz (e.g. 5 Hz vibrato, 0.2 Hz slow sweep).
  depth    How far the parameter swings, as a percentage in [0, 100].


Depth Is Destination-Relative
-----------------------------

The same depth means different things for different parameters, so it is
rescaled into the destination's native range when the LFO is attached:

    Frequency   depth% × voice frequency (Hz)   50% on A4 → ±220 Hz
    Gain        depth% × 1.0, clamped to [0,1]  50%       → ±0.5
    Pan         depth% × 1.0, clamped to [0,1]  50%       → ±0.5

The scaled value becomes the scaler's gain. Changing depth later rescales
against the same destination.

Attaching starts the generator. It is started once; attaching the LFO again
re-routes the scaler to the new destination without restarting it.

LFOs have no ramps; set_rate, set_waveform and set_depth apply immediately.
*/

/// Default modulation rate.
pub const DEFAULT_RATE_HZ: f64 = 5.0;
/// Default depth, percent.
pub const DEFAULT_DEPTH: f64 = 50.0;
/// Depth input range, percent.
pub const MAX_DEPTH: f64 = 100.0;

/// Voice parameter an LFO can modulate.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LfoDestination {
    Frequency,
    Gain,
    Pan,
}

impl LfoDestination {
    pub fn node_param(self) -> NodeParam {
        match self {
            LfoDestination::Frequency => NodeParam::Frequency,
            LfoDestination::Gain => NodeParam::Gain,
            LfoDestination::Pan => NodeParam::Pan,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LfoDestination::Frequency => "frequency",
            LfoDestination::Gain => "gain",
            LfoDestination::Pan => "pan",
        }
    }
}

impl fmt::Display for LfoDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LfoDestination {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "frequency" => Ok(LfoDestination::Frequency),
            "gain" => Ok(LfoDestination::Gain),
            "pan" => Ok(LfoDestination::Pan),
            _ => Err(Error::UnknownDestination(s.to_string())),
        }
    }
}

/// Depth in [0, 100] percent scaled into the destination's range.
///
/// `reference_hz` is the modulated voice's frequency; only `Frequency` uses it.
pub fn scale_depth(depth: f64, destination: LfoDestination, reference_hz: f64) -> f64 {
    let fraction = depth / MAX_DEPTH;
    match destination {
        LfoDestination::Frequency => fraction * reference_hz,
        LfoDestination::Gain | LfoDestination::Pan => fraction.clamp(0.0, 1.0),
    }
}

#[derive(Debug, Clone, Copy)]
struct Route {
    node: NodeId,
    destination: LfoDestination,
    reference_hz: f64,
}

struct LfoInner {
    engine: EngineRef,
    waveform: Waveform,
    rate: f64,
    depth: f64,
    generator: NodeId,
    scaler: NodeId,
    route: Option<Route>,
    started: bool,
    disposed: bool,
}

impl LfoInner {
    fn scaled_depth(&self) -> Option<f64> {
        self.route
            .map(|route| scale_depth(self.depth, route.destination, route.reference_hz))
    }

    fn disconnect_route(&mut self) {
        if let Some(route) = self.route.take() {
            self.engine.borrow_mut().disconnect_param(
                self.scaler,
                route.node,
                route.destination.node_param(),
            );
        }
    }
}

/// A periodic modulation source routed into one voice parameter.
///
/// Cloning yields another handle to the same LFO.
#[derive(Clone)]
pub struct Lfo {
    inner: Rc<RefCell<LfoInner>>,
}

impl Lfo {
    /// Sine at 5 Hz, depth 50%.
    pub fn new(ctx: &Context) -> Self {
        let engine = EngineRef::clone(ctx.engine());
        let (generator, scaler) = {
            let mut e = engine.borrow_mut();
            let generator = e.create_generator(Waveform::Sine, DEFAULT_RATE_HZ);
            let scaler = e.create_amplitude_stage(0.0);
            e.connect(generator, scaler);
            (generator, scaler)
        };

        let inner = LfoInner {
            engine,
            waveform: Waveform::Sine,
            rate: DEFAULT_RATE_HZ,
            depth: DEFAULT_DEPTH,
            generator,
            scaler,
            route: None,
            started: false,
            disposed: false,
        };
        Self {
            inner: Rc::new(RefCell::new(inner)),
        }
    }

    pub fn set_waveform(&mut self, waveform: Waveform) -> &mut Self {
        let mut inner = self.inner.borrow_mut();
        inner.waveform = waveform;
        let generator = inner.generator;
        inner.engine.borrow_mut().set_waveform(generator, waveform);
        drop(inner);
        self
    }

    /// Oscillation rate in Hz.
    pub fn set_rate(&mut self, rate_hz: f64) -> &mut Self {
        let mut inner = self.inner.borrow_mut();
        inner.rate = rate_hz;
        let generator = inner.generator;
        inner
            .engine
            .borrow_mut()
            .set_param(generator, NodeParam::Frequency, rate_hz);
        drop(inner);
        self
    }

    /// Depth in percent, clamped to [0, 100].
    pub fn set_depth(&mut self, depth: f64) -> &mut Self {
        let mut inner = self.inner.borrow_mut();
        inner.depth = depth.clamp(0.0, MAX_DEPTH);
        if let Some(scaled) = inner.scaled_depth() {
            let scaler = inner.scaler;
            inner
                .engine
                .borrow_mut()
                .set_param(scaler, NodeParam::Gain, scaled);
        }
        drop(inner);
        self
    }

    pub fn waveform(&self) -> Waveform {
        self.inner.borrow().waveform
    }

    pub fn rate(&self) -> f64 {
        self.inner.borrow().rate
    }

    pub fn depth(&self) -> f64 {
        self.inner.borrow().depth
    }

    pub fn destination(&self) -> Option<LfoDestination> {
        self.inner.borrow().route.map(|route| route.destination)
    }

    /// Depth in the destination's unit, once attached.
    pub fn scaled_depth(&self) -> Option<f64> {
        self.inner.borrow().scaled_depth()
    }

    pub fn generator(&self) -> NodeId {
        self.inner.borrow().generator
    }

    pub fn scaler(&self) -> NodeId {
        self.inner.borrow().scaler
    }

    pub fn is_started(&self) -> bool {
        self.inner.borrow().started
    }

    pub fn ptr_eq(&self, other: &Lfo) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Route the scaler into `node` and start the generator if needed.
    pub(crate) fn route_to(&self, node: NodeId, destination: LfoDestination, reference_hz: f64) {
        let mut inner = self.inner.borrow_mut();
        if inner.disposed {
            warn!("attach of a disposed LFO ignored");
            return;
        }
        inner.disconnect_route();
        inner.route = Some(Route {
            node,
            destination,
            reference_hz,
        });

        let scaled = inner.scaled_depth().unwrap_or_default();
        let (generator, scaler) = (inner.generator, inner.scaler);
        let start = !inner.started;
        inner.started = true;

        let mut engine = inner.engine.borrow_mut();
        engine.set_param(scaler, NodeParam::Gain, scaled);
        engine.connect_param(scaler, node, destination.node_param());
        if start {
            engine.start(generator);
        }
        debug!(%node, %destination, scaled, "lfo routed");
    }

    /// Drop the route if it points at one of `nodes`.
    pub(crate) fn unroute_from(&self, nodes: &[NodeId]) {
        let mut inner = self.inner.borrow_mut();
        if inner.route.is_some_and(|route| nodes.contains(&route.node)) {
            inner.disconnect_route();
        }
    }

    /// Stop the generator, drop the route and release both nodes.
    pub fn dispose(self) {
        let mut inner = self.inner.borrow_mut();
        if inner.disposed {
            return;
        }
        inner.disconnect_route();
        inner.disposed = true;

        let (generator, scaler, started) = (inner.generator, inner.scaler, inner.started);
        let mut engine = inner.engine.borrow_mut();
        if started {
            engine.stop(generator);
        }
        engine.release(generator);
        engine.release(scaler);
        debug!(%generator, "lfo disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ManualClock, RecordingEngine, RenderEngine, TimerRef};

    fn setup() -> (Rc<RefCell<RecordingEngine>>, Context) {
        let engine = Rc::new(RefCell::new(RecordingEngine::new()));
        let engine_ref: EngineRef = engine.clone();
        let timer: TimerRef = Rc::new(ManualClock::new());
        (engine, Context::new(engine_ref, timer))
    }

    #[test]
    fn depth_scaling_per_destination() {
        assert_eq!(scale_depth(50.0, LfoDestination::Frequency, 440.0), 220.0);
        assert_eq!(scale_depth(50.0, LfoDestination::Gain, 440.0), 0.5);
        assert_eq!(scale_depth(100.0, LfoDestination::Pan, 440.0), 1.0);
        assert_eq!(scale_depth(0.0, LfoDestination::Frequency, 440.0), 0.0);
    }

    #[test]
    fn depth_is_clamped() {
        let (_engine, ctx) = setup();
        let mut lfo = Lfo::new(&ctx);
        lfo.set_depth(250.0);
        assert_eq!(lfo.depth(), 100.0);
        lfo.set_depth(-3.0);
        assert_eq!(lfo.depth(), 0.0);
    }

    #[test]
    fn setters_write_generator() {
        let (engine, ctx) = setup();
        let mut lfo = Lfo::new(&ctx);
        lfo.set_rate(0.25).set_waveform(Waveform::Triangle);

        let engine = engine.borrow();
        assert_eq!(engine.param(lfo.generator(), NodeParam::Frequency), Some(0.25));
        assert_eq!(engine.waveform(lfo.generator()), Some(Waveform::Triangle));
        assert!(engine.is_connected(lfo.generator(), lfo.scaler()));
    }

    #[test]
    fn unattached_lfo_is_idle() {
        let (engine, ctx) = setup();
        let lfo = Lfo::new(&ctx);
        assert!(!lfo.is_started());
        assert_eq!(lfo.destination(), None);
        assert_eq!(lfo.scaled_depth(), None);
        assert_eq!(engine.borrow().start_count(lfo.generator()), 0);
    }

    #[test]
    fn rerouting_keeps_generator_running() {
        let (engine, ctx) = setup();
        let lfo = Lfo::new(&ctx);
        let target_a = engine.borrow_mut().create_amplitude_stage(1.0);
        let target_b = engine.borrow_mut().create_position_stage(0.0);

        lfo.route_to(target_a, LfoDestination::Gain, 440.0);
        lfo.route_to(target_b, LfoDestination::Pan, 440.0);

        let engine = engine.borrow();
        assert_eq!(engine.start_count(lfo.generator()), 1);
        assert!(!engine.is_param_connected(lfo.scaler(), target_a, NodeParam::Gain));
        assert!(engine.is_param_connected(lfo.scaler(), target_b, NodeParam::Pan));
        assert_eq!(lfo.destination(), Some(LfoDestination::Pan));
    }

    #[test]
    fn dispose_releases_nodes() {
        let (engine, ctx) = setup();
        let lfo = Lfo::new(&ctx);
        let target = engine.borrow_mut().create_amplitude_stage(1.0);
        lfo.route_to(target, LfoDestination::Gain, 440.0);
        let (generator, scaler) = (lfo.generator(), lfo.scaler());

        lfo.dispose();
        let engine = engine.borrow();
        assert!(!engine.is_running(generator));
        assert!(engine.is_released(generator));
        assert!(engine.is_released(scaler));
        assert!(!engine.is_param_connected(scaler, target, NodeParam::Gain));
    }

    #[test]
    fn destination_parses() {
        assert_eq!("Pan".parse::<LfoDestination>(), Ok(LfoDestination::Pan));
        assert!(matches!(
            "detune".parse::<LfoDestination>(),
            Err(Error::UnknownDestination(_))
        ));
    }
}
