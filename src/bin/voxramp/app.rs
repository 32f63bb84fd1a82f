//! Monitor - builds the rack on a control thread and drives its clock

use std::{
    cell::RefCell,
    rc::Rc,
    thread,
    time::{Duration, Instant},
};

use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{info, warn};

use voxramp::{
    engine::{EngineRef, TimerRef},
    patch::{Patch, Rack},
    Context, ManualClock, RecordingEngine,
};

use super::ui::{ControlMessage, UiApp, UiStateInit, UiStateUpdate, VoiceMeter, MAX_VOICES};

/// How often the control thread wakes to advance the clock.
const CONTROL_PERIOD: Duration = Duration::from_millis(5);

const RAMP_MS: f64 = 1500.0;
const SWEEP_MS: f64 = 2000.0;

/// Main application builder
pub struct Monitor {
    patch: Patch,
    lead: String,
    filter: String,
}

impl Monitor {
    pub fn new(patch: Patch) -> Self {
        Self {
            patch,
            lead: String::new(),
            filter: String::new(),
        }
    }

    /// Voice driven by the pause and ramp keys
    pub fn lead(mut self, name: &str) -> Self {
        self.lead = name.to_string();
        self
    }

    /// Filter spec driven by the sweep key
    pub fn filter(mut self, name: &str) -> Self {
        self.filter = name.to_string();
        self
    }

    /// Run the application (takes over the terminal)
    pub fn run(self) -> EyreResult<()> {
        self.patch.validate().wrap_err("invalid patch")?;

        let mut voice_names: Vec<String> =
            self.patch.voices.iter().map(|v| v.name.clone()).collect();
        voice_names.sort();
        voice_names.truncate(MAX_VOICES);
        let init = UiStateInit::new(&self.patch.name, voice_names, &self.lead, &self.filter);

        let (control_tx, control_rx) = RingBuffer::<ControlMessage>::new(64);
        let (state_tx, state_rx) = RingBuffer::<UiStateUpdate>::new(256);

        let control = thread::spawn(move || {
            let Monitor {
                patch,
                lead,
                filter,
            } = self;
            control_loop(&patch, &lead, &filter, control_rx, state_tx)
        });

        let mut terminal = ratatui::init();
        let mut app = UiApp::new(state_rx, control_tx, init);
        let result = app.run(&mut terminal);
        ratatui::restore();
        // Dropping the producer tells the control thread to stop.
        drop(app);

        control
            .join()
            .map_err(|_| eyre!("control thread panicked"))??;
        result
    }
}

/// Owns the rack; everything single-threaded lives here.
fn control_loop(
    patch: &Patch,
    lead: &str,
    filter: &str,
    mut control_rx: Consumer<ControlMessage>,
    mut state_tx: Producer<UiStateUpdate>,
) -> EyreResult<()> {
    let engine = Rc::new(RefCell::new(RecordingEngine::without_log()));
    let clock = Rc::new(ManualClock::new());
    let engine_ref: EngineRef = engine.clone();
    let timer: TimerRef = clock.clone();
    let ctx = Context::new(engine_ref, timer);

    let mut rack = patch.build(&ctx)?;
    info!(patch = %patch.name, "control thread running");

    let started = Instant::now();
    let mut advanced_ms = 0u64;

    while !control_rx.is_abandoned() {
        while let Ok(message) = control_rx.pop() {
            handle_message(&mut rack, lead, filter, message);
        }

        let now_ms = whole_millis(started.elapsed());
        clock.advance(now_ms.saturating_sub(advanced_ms));
        advanced_ms = now_ms;

        // Drop the snapshot if the UI is behind; a newer one follows.
        let _ = state_tx.push(snapshot(&rack, filter, &clock));
        thread::sleep(CONTROL_PERIOD);
    }

    rack.dispose();
    info!(elapsed_ms = advanced_ms, "control thread stopped");
    Ok(())
}

/// Whole milliseconds in `elapsed`, saturating at `u64::MAX`.
fn whole_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn handle_message(rack: &mut Rack, lead: &str, filter: &str, message: ControlMessage) {
    match message {
        ControlMessage::TogglePlayback => match rack.voice_mut(lead) {
            Some(voice) if voice.is_muted() || !voice.is_started() => {
                voice.play();
            }
            Some(voice) => {
                voice.pause();
            }
            None => warn!(lead, "no lead voice to toggle"),
        },
        ControlMessage::RampLead => match rack.voice_mut(lead) {
            Some(voice) => {
                let up = voice.octave() < 5;
                let octave = if up { voice.octave() + 1 } else { voice.octave() - 1 };
                voice
                    .begin_ramp()
                    .set_octave(octave)
                    .set_pan(if up { -40.0 } else { 40.0 })
                    .commit_ramp(RAMP_MS);
            }
            None => warn!(lead, "no lead voice to ramp"),
        },
        ControlMessage::SweepFilter => match rack.filter_mut(filter) {
            Some(spec) => {
                let target = if spec.settings().frequency < 1500.0 {
                    4000.0
                } else {
                    400.0
                };
                spec.begin_ramp()
                    .set_frequency(target)
                    .commit_ramp(SWEEP_MS);
            }
            None => warn!(filter, "no filter spec to sweep"),
        },
    }
}

fn snapshot(rack: &Rack, filter: &str, clock: &ManualClock) -> UiStateUpdate {
    let mut update = UiStateUpdate::new();
    update.elapsed_ms = clock.now_ms();
    update.pending_tasks = clock.pending() as u32;

    for (slot, (_, voice)) in update.voices.iter_mut().zip(rack.voices()) {
        *slot = VoiceMeter {
            frequency: voice.frequency(),
            live_frequency: voice.live_frequency(),
            amplitude: voice.amplitude(),
            pan: voice.pan(),
            muted: voice.is_muted(),
            started: voice.is_started(),
            remaining_ticks: voice.remaining_ticks(),
        };
        update.num_voices += 1;
    }

    if let Some(spec) = rack.filter(filter) {
        update.cutoff_hz = spec.settings().frequency;
        update.filter_ramping = spec.is_ramping();
        update.filter_stages = spec.stage_count() as u32;
    }
    update
}
