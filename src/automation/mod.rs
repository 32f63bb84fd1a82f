//! Staged parameter ramps shared by voices and filter specs.

/*
Staged Ramps
============

Render engines expose immediate parameter writes only. To glide a parameter
we write it many times: every 20 ms a tick adds a fixed delta until the
target is reached.

Vocabulary
----------

  live value   What the engine currently holds for a parameter. Ticks move it.

  staging      An open set of target values. While staging, setters write
               targets here instead of touching live values.

  tick         One firing of the ramp's timer interval (every 20 ms).

  delta        The amount a tick adds to one live value. Each parameter gets
               its own, computed once at commit time:

                   ticks = max(1, ceil(duration_ms / 20))
                   delta = (target - live) / ticks


The State Machine
-----------------

    ┌──────┐ begin_ramp ┌─────────┐ commit_ramp ┌─────────┐
    │ Idle │ ─────────→ │ Staging │ ──────────→ │ Running │
    └──────┘            └─────────┘             └─────────┘
       ↑                     ↑    begin_ramp         │
       │                     └───────────────────────┤
       │            last tick                        │
       └─────────────────────────────────────────────┘

begin_ramp while Running cancels the running interval before staging starts,
so an entity never has two ramps in flight. The old deltas are discarded;
nothing blends.


Units
-----

Deltas are computed in the unit callers pass to setters, which differs from
the live unit for pan only:

    pan live value     normalized, [-1, 1]
    pan setter unit    [-50, 50]  (live × 50)

    delta = (target_50 - live × 50) / ticks
    live += delta / 50                          every tick

Every other parameter uses a scale of 1.
*/

use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

use tracing::{debug, trace, warn};

use crate::engine::{IntervalId, TickOutcome, TimerRef};

/// Fixed spacing of ramp ticks.
pub const TICK_INTERVAL_MS: u32 = 20;

/// Ratio between the pan setter unit and the normalized pan value.
pub const PAN_SCALE: f64 = 50.0;

/// Parameters a ramp can move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RampParam {
    Pan,
    Frequency,
    Gain,
    Resonance,
    Detune,
}

impl RampParam {
    pub const ALL: [RampParam; 5] = [
        RampParam::Pan,
        RampParam::Frequency,
        RampParam::Gain,
        RampParam::Resonance,
        RampParam::Detune,
    ];

    fn index(self) -> usize {
        match self {
            RampParam::Pan => 0,
            RampParam::Frequency => 1,
            RampParam::Gain => 2,
            RampParam::Resonance => 3,
            RampParam::Detune => 4,
        }
    }

    /// Setter unit per live unit.
    pub fn boundary_scale(self) -> f64 {
        match self {
            RampParam::Pan => PAN_SCALE,
            _ => 1.0,
        }
    }
}

impl fmt::Display for RampParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RampParam::Pan => "pan",
            RampParam::Frequency => "frequency",
            RampParam::Gain => "gain",
            RampParam::Resonance => "resonance",
            RampParam::Detune => "detune",
        };
        f.write_str(name)
    }
}

/// A value per ramp parameter, any subset present.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParamSet {
    values: [Option<f64>; 5],
}

impl ParamSet {
    pub fn get(&self, param: RampParam) -> Option<f64> {
        self.values[param.index()]
    }

    pub fn set(&mut self, param: RampParam, value: f64) {
        self.values[param.index()] = Some(value);
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    pub fn len(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RampParam, f64)> + '_ {
        RampParam::ALL
            .into_iter()
            .filter_map(|param| self.get(param).map(|value| (param, value)))
    }
}

/// Observable phase of an entity's ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampStatus {
    Idle,
    Staging,
    Running,
}

#[derive(Debug)]
struct RunningRamp {
    deltas: ParamSet,
    remaining: u32,
    interval: IntervalId,
    generation: u64,
}

#[derive(Debug)]
enum RampPhase {
    Idle,
    Staging(ParamSet),
    Running(RunningRamp),
}

/// Deltas for one tick.
#[derive(Debug, Clone, Copy)]
struct Step {
    deltas: ParamSet,
    finished: bool,
}

/// Per-entity ramp state. At most one ramp exists per `Automation`.
pub(crate) struct Automation {
    phase: RampPhase,
    timer: TimerRef,
    generation: u64,
}

impl Automation {
    pub(crate) fn new(timer: TimerRef) -> Self {
        Self {
            phase: RampPhase::Idle,
            timer,
            generation: 0,
        }
    }

    pub(crate) fn status(&self) -> RampStatus {
        match self.phase {
            RampPhase::Idle => RampStatus::Idle,
            RampPhase::Staging(_) => RampStatus::Staging,
            RampPhase::Running(_) => RampStatus::Running,
        }
    }

    pub(crate) fn is_staging(&self) -> bool {
        matches!(self.phase, RampPhase::Staging(_))
    }

    pub(crate) fn remaining_ticks(&self) -> u32 {
        match &self.phase {
            RampPhase::Running(ramp) => ramp.remaining,
            _ => 0,
        }
    }

    /// Cancel whatever is in flight and open an empty staging set.
    pub(crate) fn begin(&mut self) {
        self.cancel();
        self.phase = RampPhase::Staging(ParamSet::default());
        trace!("ramp staging opened");
    }

    /// Record a target in setter units. Returns `false` when not staging.
    pub(crate) fn stage(&mut self, param: RampParam, target: f64) -> bool {
        match &mut self.phase {
            RampPhase::Staging(targets) => {
                targets.set(param, target);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn staged(&self, param: RampParam) -> Option<f64> {
        match &self.phase {
            RampPhase::Staging(targets) => targets.get(param),
            _ => None,
        }
    }

    /// Whether the running ramp moves `param`.
    pub(crate) fn is_ramping(&self, param: RampParam) -> bool {
        match &self.phase {
            RampPhase::Running(ramp) => ramp.deltas.get(param).is_some(),
            _ => false,
        }
    }

    /// Scale the remaining trajectory of `param` by `ratio`.
    pub(crate) fn rescale(&mut self, param: RampParam, ratio: f64) {
        if let RampPhase::Running(ramp) = &mut self.phase {
            if let Some(delta) = ramp.deltas.get(param) {
                ramp.deltas.set(param, delta * ratio);
            }
        }
    }

    /// Drop staged targets or stop the running interval; back to Idle.
    pub(crate) fn cancel(&mut self) {
        match std::mem::replace(&mut self.phase, RampPhase::Idle) {
            RampPhase::Running(ramp) => {
                self.timer.clear_interval(ramp.interval);
                debug!(
                    interval = %ramp.interval,
                    remaining = ramp.remaining,
                    "running ramp cancelled"
                );
            }
            RampPhase::Staging(targets) if !targets.is_empty() => {
                debug!(staged = targets.len(), "staged ramp discarded");
            }
            _ => {}
        }
    }

    fn take_staged(&mut self) -> Option<ParamSet> {
        match std::mem::replace(&mut self.phase, RampPhase::Idle) {
            RampPhase::Staging(targets) => Some(targets),
            other => {
                self.phase = other;
                None
            }
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn run(&mut self, deltas: ParamSet, ticks: u32, interval: IntervalId, generation: u64) {
        self.phase = RampPhase::Running(RunningRamp {
            deltas,
            remaining: ticks,
            interval,
            generation,
        });
    }

    /// Consume one tick of the ramp started as `generation`.
    fn next_step(&mut self, generation: u64) -> Option<Step> {
        let RampPhase::Running(ramp) = &mut self.phase else {
            return None;
        };
        if ramp.generation != generation || ramp.remaining == 0 {
            return None;
        }

        ramp.remaining -= 1;
        let step = Step {
            deltas: ramp.deltas,
            finished: ramp.remaining == 0,
        };
        if step.finished {
            self.phase = RampPhase::Idle;
        }
        Some(step)
    }
}

impl Drop for Automation {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// An entity whose parameters ramps can move.
pub(crate) trait Automatable: 'static {
    fn automation(&mut self) -> &mut Automation;

    /// Live value in its canonical unit, or `None` if the entity lacks `param`.
    fn live_value(&self, param: RampParam) -> Option<f64>;

    /// Add `delta` (canonical unit) to the live value and write it out.
    fn apply_delta(&mut self, param: RampParam, delta: f64);
}

/// Number of ticks a ramp of `duration_ms` takes.
pub fn tick_count(duration_ms: f64) -> u32 {
    if !duration_ms.is_finite() || duration_ms <= 0.0 {
        return 1;
    }
    let ticks = (duration_ms / f64::from(TICK_INTERVAL_MS)).ceil();
    (ticks as u32).max(1)
}

/// Turn the staged targets of `cell` into a running ramp over `duration_ms`.
pub(crate) fn commit<T: Automatable>(cell: &Rc<RefCell<T>>, duration_ms: f64) {
    let mut entity = cell.borrow_mut();
    let Some(targets) = entity.automation().take_staged() else {
        warn!("commit_ramp without begin_ramp ignored");
        return;
    };
    if targets.is_empty() {
        debug!("commit_ramp with nothing staged");
        return;
    }

    let ticks = tick_count(duration_ms);
    let mut deltas = ParamSet::default();
    for (param, target) in targets.iter() {
        let Some(live) = entity.live_value(param) else {
            continue;
        };
        let scale = param.boundary_scale();
        deltas.set(param, (target - live * scale) / f64::from(ticks));
    }

    let generation = entity.automation().next_generation();
    let weak = Rc::downgrade(cell);
    let timer = TimerRef::clone(&entity.automation().timer);
    let interval = timer.set_interval(
        TICK_INTERVAL_MS,
        Box::new(move || tick(&weak, generation)),
    );
    entity.automation().run(deltas, ticks, interval, generation);

    debug!(
        duration_ms,
        ticks,
        params = deltas.len(),
        %interval,
        "ramp committed"
    );
}

fn tick<T: Automatable>(weak: &Weak<RefCell<T>>, generation: u64) -> TickOutcome {
    let Some(cell) = weak.upgrade() else {
        return TickOutcome::Done;
    };
    let mut entity = cell.borrow_mut();
    let Some(step) = entity.automation().next_step(generation) else {
        return TickOutcome::Done;
    };

    for (param, delta) in step.deltas.iter() {
        entity.apply_delta(param, delta / param.boundary_scale());
    }

    if step.finished {
        debug!("ramp complete");
        TickOutcome::Done
    } else {
        TickOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ManualClock;

    /// Bare entity with a live value per parameter.
    struct Probe {
        automation: Automation,
        live: [f64; 5],
        writes: usize,
    }

    impl Automatable for Probe {
        fn automation(&mut self) -> &mut Automation {
            &mut self.automation
        }

        fn live_value(&self, param: RampParam) -> Option<f64> {
            Some(self.live[param.index()])
        }

        fn apply_delta(&mut self, param: RampParam, delta: f64) {
            self.live[param.index()] += delta;
            self.writes += 1;
        }
    }

    fn probe(clock: &Rc<ManualClock>) -> Rc<RefCell<Probe>> {
        let timer: TimerRef = clock.clone();
        Rc::new(RefCell::new(Probe {
            automation: Automation::new(timer),
            live: [0.0; 5],
            writes: 0,
        }))
    }

    #[test]
    fn tick_count_rounds_up() {
        assert_eq!(tick_count(100.0), 5);
        assert_eq!(tick_count(101.0), 6);
        assert_eq!(tick_count(19.0), 1);
        assert_eq!(tick_count(0.0), 1);
        assert_eq!(tick_count(-40.0), 1);
        assert_eq!(tick_count(f64::NAN), 1);
    }

    #[test]
    fn state_machine_walks_idle_staging_running_idle() {
        let clock = Rc::new(ManualClock::new());
        let p = probe(&clock);
        assert_eq!(p.borrow().automation.status(), RampStatus::Idle);

        p.borrow_mut().automation.begin();
        assert_eq!(p.borrow().automation.status(), RampStatus::Staging);
        p.borrow_mut().automation.stage(RampParam::Gain, 1.0);

        commit(&p, 100.0);
        assert_eq!(p.borrow().automation.status(), RampStatus::Running);
        assert_eq!(p.borrow().automation.remaining_ticks(), 5);

        clock.advance(100);
        assert_eq!(p.borrow().automation.status(), RampStatus::Idle);
        assert!((p.borrow().live[RampParam::Gain.index()] - 1.0).abs() < 1e-12);
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn deltas_are_independent_per_param() {
        let clock = Rc::new(ManualClock::new());
        let p = probe(&clock);
        p.borrow_mut().live[RampParam::Frequency.index()] = 100.0;
        p.borrow_mut().automation.begin();
        p.borrow_mut().automation.stage(RampParam::Frequency, 200.0);
        p.borrow_mut().automation.stage(RampParam::Detune, -40.0);
        commit(&p, 80.0);

        clock.advance(20);
        let probe = p.borrow();
        assert!((probe.live[RampParam::Frequency.index()] - 125.0).abs() < 1e-9);
        assert!((probe.live[RampParam::Detune.index()] + 10.0).abs() < 1e-9);
    }

    #[test]
    fn pan_delta_uses_setter_unit() {
        let clock = Rc::new(ManualClock::new());
        let p = probe(&clock);
        p.borrow_mut().automation.begin();
        // 25 in setter units is 0.5 normalized.
        p.borrow_mut().automation.stage(RampParam::Pan, 25.0);
        commit(&p, 40.0);

        clock.advance(20);
        let expected = ((25.0 - 0.0 * PAN_SCALE) / 2.0) / PAN_SCALE;
        assert_eq!(p.borrow().live[RampParam::Pan.index()], expected);
        clock.advance(20);
        assert!((p.borrow().live[RampParam::Pan.index()] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn begin_while_running_stops_old_ticks() {
        let clock = Rc::new(ManualClock::new());
        let p = probe(&clock);
        p.borrow_mut().automation.begin();
        p.borrow_mut().automation.stage(RampParam::Gain, 10.0);
        commit(&p, 200.0);
        clock.advance(40);
        let writes = p.borrow().writes;

        p.borrow_mut().automation.begin();
        clock.advance(400);
        assert_eq!(p.borrow().writes, writes, "cancelled ramp kept ticking");
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn commit_without_begin_is_ignored() {
        let clock = Rc::new(ManualClock::new());
        let p = probe(&clock);
        commit(&p, 100.0);
        assert_eq!(p.borrow().automation.status(), RampStatus::Idle);
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn empty_commit_returns_to_idle() {
        let clock = Rc::new(ManualClock::new());
        let p = probe(&clock);
        p.borrow_mut().automation.begin();
        commit(&p, 100.0);
        assert_eq!(p.borrow().automation.status(), RampStatus::Idle);
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn dropped_entity_ends_its_interval() {
        let clock = Rc::new(ManualClock::new());
        let p = probe(&clock);
        p.borrow_mut().automation.begin();
        p.borrow_mut().automation.stage(RampParam::Gain, 1.0);
        commit(&p, 1_000.0);
        assert_eq!(clock.pending(), 1);

        drop(p);
        assert_eq!(clock.pending(), 0);
        assert_eq!(clock.advance(1_000), 0);
    }

    #[test]
    fn rescale_scales_remaining_deltas() {
        let clock = Rc::new(ManualClock::new());
        let p = probe(&clock);
        p.borrow_mut().live[RampParam::Frequency.index()] = 100.0;
        p.borrow_mut().automation.begin();
        p.borrow_mut().automation.stage(RampParam::Frequency, 200.0);
        commit(&p, 100.0);
        clock.advance(40);

        {
            let mut probe = p.borrow_mut();
            probe.live[RampParam::Frequency.index()] *= 2.0;
            probe.automation.rescale(RampParam::Frequency, 2.0);
        }
        clock.advance(60);
        assert!((p.borrow().live[RampParam::Frequency.index()] - 400.0).abs() < 1e-9);
    }
}
