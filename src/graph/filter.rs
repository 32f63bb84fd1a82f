use std::{
    cell::RefCell,
    collections::BTreeMap,
    rc::{Rc, Weak},
};

use tracing::{debug, trace};

use crate::{
    automation::{self, Automatable, Automation, RampParam, RampStatus},
    engine::{Context, EngineRef},
    graph::node::{FilterKind, FilterSettings, NodeId, NodeParam},
};

/*
Shared Filter Specs
===================

A FilterSpec is a named bundle of filter settings that any number of voices
can splice into their chains. Each voice gets its own filter stage (a real
node in the render engine) built from the spec's values at attach time:

    let dark = FilterSpec::new(&ctx);
    bass.attach_filter(&dark);     // realizes stage #0 in bass's chain
    lead.attach_filter(&dark);     // realizes stage #1 in lead's chain

    dark.set_frequency(400.0);     // both stages now sit at 400 Hz

The spec is the single source of truth. Stages are mirrors: the spec keeps a
registry of weak references to them, keyed by a stable stage id, and pushes
every change to each live entry. When a voice is disposed its stages drop,
the weak references die, and the registry prunes them on the next push.


Gain
----

set_gain takes a value in [-100, 100] (clamped) and maps it linearly onto
[-40, 40] dB:

    gain_db = clamp(value, -100, 100) × 0.4

Only shelf and peaking responses use it, but it is stored and mirrored for
every kind.


Ramps
-----

Frequency, resonance, detune and gain can be staged and ramped exactly like
voice parameters. Each tick moves the spec's live values and pushes them to
every stage, so all voices sharing the spec sweep together. Kind changes are
never staged.
*/

/// Input range accepted by [`FilterSpec::set_gain`].
pub const GAIN_INPUT_LIMIT: f64 = 100.0;
/// dB per unit of gain input.
pub const GAIN_DB_PER_UNIT: f64 = 0.4;

/// Stable id of a realized stage within its spec's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StageId(pub u64);

/// A filter node realized from a [`FilterSpec`] and owned by one voice chain.
#[derive(Debug)]
pub struct FilterStage {
    id: StageId,
    node: NodeId,
}

impl FilterStage {
    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }
}

/// Map a gain input in [-100, 100] to dB.
pub fn gain_to_db(gain: f64) -> f64 {
    gain.clamp(-GAIN_INPUT_LIMIT, GAIN_INPUT_LIMIT) * GAIN_DB_PER_UNIT
}

struct FilterSpecInner {
    engine: EngineRef,
    settings: FilterSettings,
    stages: BTreeMap<StageId, Weak<FilterStage>>,
    next_stage: u64,
    automation: Automation,
}

impl FilterSpecInner {
    /// Write `value` to every live stage, pruning dead ones.
    fn propagate(&mut self, param: NodeParam, value: f64) {
        let mut engine = self.engine.borrow_mut();
        self.stages.retain(|id, stage| match stage.upgrade() {
            Some(stage) => {
                engine.set_param(stage.node, param, value);
                true
            }
            None => {
                trace!(stage = id.0, "pruned dead filter stage");
                false
            }
        });
    }

    fn propagate_kind(&mut self, kind: FilterKind) {
        let mut engine = self.engine.borrow_mut();
        self.stages.retain(|_, stage| match stage.upgrade() {
            Some(stage) => {
                engine.set_filter_kind(stage.node, kind);
                true
            }
            None => false,
        });
    }

    fn prune(&mut self) {
        self.stages.retain(|_, stage| stage.strong_count() > 0);
    }

    fn live_nodes(&self) -> Vec<NodeId> {
        self.stages
            .values()
            .filter_map(Weak::upgrade)
            .map(|stage| stage.node)
            .collect()
    }

    /// Stage `target` if a ramp is open, otherwise apply it now.
    fn write(&mut self, param: RampParam, target: f64) {
        if self.automation.stage(param, target) {
            return;
        }
        let node_param = match param {
            RampParam::Frequency => {
                self.settings.frequency = target;
                NodeParam::Frequency
            }
            RampParam::Resonance => {
                self.settings.q = target;
                NodeParam::Q
            }
            RampParam::Detune => {
                self.settings.detune = target;
                NodeParam::Detune
            }
            RampParam::Gain => {
                self.settings.gain_db = target;
                NodeParam::Gain
            }
            RampParam::Pan => return,
        };
        self.propagate(node_param, target);
    }
}

impl Automatable for FilterSpecInner {
    fn automation(&mut self) -> &mut Automation {
        &mut self.automation
    }

    fn live_value(&self, param: RampParam) -> Option<f64> {
        match param {
            RampParam::Frequency => Some(self.settings.frequency),
            RampParam::Resonance => Some(self.settings.q),
            RampParam::Detune => Some(self.settings.detune),
            RampParam::Gain => Some(self.settings.gain_db),
            RampParam::Pan => None,
        }
    }

    fn apply_delta(&mut self, param: RampParam, delta: f64) {
        let (value, node_param) = match param {
            RampParam::Frequency => {
                self.settings.frequency += delta;
                (self.settings.frequency, NodeParam::Frequency)
            }
            RampParam::Resonance => {
                self.settings.q += delta;
                (self.settings.q, NodeParam::Q)
            }
            RampParam::Detune => {
                self.settings.detune += delta;
                (self.settings.detune, NodeParam::Detune)
            }
            RampParam::Gain => {
                self.settings.gain_db += delta;
                (self.settings.gain_db, NodeParam::Gain)
            }
            RampParam::Pan => return,
        };
        self.propagate(node_param, value);
    }
}

/// Shared filter settings mirrored into every stage realized from them.
///
/// Cloning yields another handle to the same spec.
#[derive(Clone)]
pub struct FilterSpec {
    inner: Rc<RefCell<FilterSpecInner>>,
}

impl FilterSpec {
    /// Lowpass at 800 Hz, Q 0, no detune, 10 dB gain.
    pub fn new(ctx: &Context) -> Self {
        Self::with_settings(ctx, FilterSettings::default())
    }

    pub fn with_settings(ctx: &Context, settings: FilterSettings) -> Self {
        let inner = FilterSpecInner {
            engine: EngineRef::clone(ctx.engine()),
            settings,
            stages: BTreeMap::new(),
            next_stage: 0,
            automation: Automation::new(ctx.timer().clone()),
        };
        Self {
            inner: Rc::new(RefCell::new(inner)),
        }
    }

    pub fn set_kind(&mut self, kind: FilterKind) -> &mut Self {
        let mut inner = self.inner.borrow_mut();
        inner.settings.kind = kind;
        inner.propagate_kind(kind);
        drop(inner);
        self
    }

    pub fn set_frequency(&mut self, frequency: f64) -> &mut Self {
        self.inner
            .borrow_mut()
            .write(RampParam::Frequency, frequency);
        self
    }

    pub fn set_resonance(&mut self, q: f64) -> &mut Self {
        self.inner.borrow_mut().write(RampParam::Resonance, q);
        self
    }

    pub fn set_detune(&mut self, cents: f64) -> &mut Self {
        self.inner.borrow_mut().write(RampParam::Detune, cents);
        self
    }

    /// Gain input in [-100, 100] (clamped), stored as [-40, 40] dB.
    pub fn set_gain(&mut self, gain: f64) -> &mut Self {
        self.inner.borrow_mut().write(RampParam::Gain, gain_to_db(gain));
        self
    }

    /// Open a staging area, cancelling any running ramp.
    pub fn begin_ramp(&mut self) -> &mut Self {
        self.inner.borrow_mut().automation.begin();
        self
    }

    /// Ramp every staged value from its live value over `duration_ms`.
    pub fn commit_ramp(&mut self, duration_ms: f64) -> &mut Self {
        automation::commit(&self.inner, duration_ms);
        self
    }

    /// Current live settings.
    pub fn settings(&self) -> FilterSettings {
        self.inner.borrow().settings
    }

    /// Staged target for `param`, if a ramp is being staged.
    pub fn staged(&self, param: RampParam) -> Option<f64> {
        self.inner.borrow().automation.staged(param)
    }

    pub fn ramp_status(&self) -> RampStatus {
        self.inner.borrow().automation.status()
    }

    pub fn is_ramping(&self) -> bool {
        self.ramp_status() == RampStatus::Running
    }

    /// Live realized stages.
    pub fn stage_count(&self) -> usize {
        let mut inner = self.inner.borrow_mut();
        inner.prune();
        inner.stages.len()
    }

    /// Engine nodes of every live realized stage.
    pub fn stage_nodes(&self) -> Vec<NodeId> {
        self.inner.borrow().live_nodes()
    }

    /// Whether two handles refer to the same spec.
    pub fn ptr_eq(&self, other: &FilterSpec) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stop mirroring: cancel any ramp and forget every realized stage.
    ///
    /// Stages already spliced into voices keep their last values.
    pub fn dispose(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.automation.cancel();
        let forgotten = inner.stages.len();
        inner.stages.clear();
        debug!(forgotten, "filter spec disposed");
    }

    /// Create a stage from the current settings and register it.
    pub(crate) fn realize(&self) -> Rc<FilterStage> {
        let mut inner = self.inner.borrow_mut();
        let node = inner
            .engine
            .borrow_mut()
            .create_filter_stage(&inner.settings);
        let id = StageId(inner.next_stage);
        inner.next_stage += 1;

        let stage = Rc::new(FilterStage { id, node });
        inner.stages.insert(id, Rc::downgrade(&stage));
        debug!(stage = id.0, %node, "filter stage realized");
        stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ManualClock, RecordingEngine, TimerRef};

    fn setup() -> (Rc<RefCell<RecordingEngine>>, Rc<ManualClock>, Context) {
        let engine = Rc::new(RefCell::new(RecordingEngine::new()));
        let clock = Rc::new(ManualClock::new());
        let engine_ref: EngineRef = engine.clone();
        let timer: TimerRef = clock.clone();
        (engine, clock, Context::new(engine_ref, timer))
    }

    #[test]
    fn gain_maps_to_db() {
        assert_eq!(gain_to_db(100.0), 40.0);
        assert_eq!(gain_to_db(-100.0), -40.0);
        assert_eq!(gain_to_db(250.0), 40.0);
        assert_eq!(gain_to_db(-999.0), -40.0);
        assert_eq!(gain_to_db(25.0), 10.0);
        assert!(gain_to_db(f64::NAN).is_nan());
    }

    #[test]
    fn realize_copies_current_settings() {
        let (engine, _clock, ctx) = setup();
        let mut spec = FilterSpec::new(&ctx);
        spec.set_kind(FilterKind::Highpass)
            .set_frequency(1200.0)
            .set_resonance(3.0);

        let stage = spec.realize();
        let engine = engine.borrow();
        assert_eq!(engine.filter_kind(stage.node()), Some(FilterKind::Highpass));
        assert_eq!(engine.param(stage.node(), NodeParam::Frequency), Some(1200.0));
        assert_eq!(engine.param(stage.node(), NodeParam::Q), Some(3.0));
        assert_eq!(engine.param(stage.node(), NodeParam::Gain), Some(10.0));
    }

    #[test]
    fn setters_reach_every_stage() {
        let (engine, _clock, ctx) = setup();
        let mut spec = FilterSpec::new(&ctx);
        let a = spec.realize();
        let b = spec.realize();

        spec.set_detune(-12.0).set_gain(-50.0).set_kind(FilterKind::Peaking);

        let engine = engine.borrow();
        for stage in [&a, &b] {
            assert_eq!(engine.param(stage.node(), NodeParam::Detune), Some(-12.0));
            assert_eq!(engine.param(stage.node(), NodeParam::Gain), Some(-20.0));
            assert_eq!(engine.filter_kind(stage.node()), Some(FilterKind::Peaking));
        }
    }

    #[test]
    fn dropped_stages_are_pruned() {
        let (_engine, _clock, ctx) = setup();
        let mut spec = FilterSpec::new(&ctx);
        let keep = spec.realize();
        let gone = spec.realize();
        assert_eq!(spec.stage_count(), 2);

        drop(gone);
        spec.set_frequency(300.0);
        assert_eq!(spec.stage_count(), 1);
        assert_eq!(spec.stage_nodes(), vec![keep.node()]);
    }

    #[test]
    fn stage_ids_are_stable_and_unique() {
        let (_engine, _clock, ctx) = setup();
        let spec = FilterSpec::new(&ctx);
        let first = spec.realize();
        drop(spec.realize());
        let third = spec.realize();
        assert_eq!(first.id(), StageId(0));
        assert_eq!(third.id(), StageId(2));
    }

    #[test]
    fn staged_values_do_not_jump() {
        let (engine, clock, ctx) = setup();
        let mut spec = FilterSpec::new(&ctx);
        let stage = spec.realize();

        spec.begin_ramp().set_frequency(1800.0).set_gain(100.0);
        assert_eq!(spec.staged(RampParam::Frequency), Some(1800.0));
        assert_eq!(spec.staged(RampParam::Gain), Some(40.0));
        assert_eq!(spec.settings().frequency, 800.0);
        assert_eq!(
            engine.borrow().param(stage.node(), NodeParam::Frequency),
            Some(800.0)
        );

        spec.commit_ramp(100.0);
        clock.advance(20);
        let first_tick = engine
            .borrow()
            .param(stage.node(), NodeParam::Frequency)
            .unwrap();
        assert!((first_tick - 1000.0).abs() < 1e-9, "got {first_tick}");

        clock.advance(80);
        let settings = spec.settings();
        assert!((settings.frequency - 1800.0).abs() < 1e-9);
        assert!((settings.gain_db - 40.0).abs() < 1e-9);
        assert!(!spec.is_ramping());
    }

    #[test]
    fn kind_is_never_staged() {
        let (engine, _clock, ctx) = setup();
        let mut spec = FilterSpec::new(&ctx);
        let stage = spec.realize();

        spec.begin_ramp().set_kind(FilterKind::Notch);
        assert_eq!(engine.borrow().filter_kind(stage.node()), Some(FilterKind::Notch));
    }

    #[test]
    fn dispose_forgets_stages_and_cancels_ramp() {
        let (engine, clock, ctx) = setup();
        let mut spec = FilterSpec::new(&ctx);
        let stage = spec.realize();
        spec.begin_ramp().set_frequency(2000.0).commit_ramp(1000.0);

        spec.dispose();
        clock.advance(1000);
        assert_eq!(spec.stage_count(), 0);
        assert_eq!(
            engine.borrow().param(stage.node(), NodeParam::Frequency),
            Some(800.0)
        );
    }
}
