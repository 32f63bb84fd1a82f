//! voxramp - terminal monitor for a running rack
//!
//! Run with: cargo run
//! Set VOXRAMP_LOG=<file> to capture engine logs while the TUI owns the screen.

mod app;
mod ui;

use std::{fs::File, sync::Mutex};

use app::Monitor;
use tracing::Level;
use voxramp::{
    graph::{FilterKind, LfoDestination, Waveform},
    patch::{FilterDescriptor, LfoDescriptor, LfoRoute, Patch, VoiceDescriptor},
};

fn init_logging() -> color_eyre::Result<()> {
    let Ok(path) = std::env::var("VOXRAMP_LOG") else {
        return Ok(());
    };
    let file = File::create(path)?;
    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_max_level(Level::DEBUG)
        .init();
    Ok(())
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    init_logging()?;

    let patch = Patch::new("duet")
        .filter(FilterDescriptor {
            name: "dark".into(),
            kind: FilterKind::Lowpass,
            frequency: 600.0,
            resonance: 4.0,
            ..Default::default()
        })
        .lfo(LfoDescriptor {
            name: "vibrato".into(),
            rate: 5.5,
            depth: 1.0,
            ..Default::default()
        })
        .voice(VoiceDescriptor {
            name: "bass".into(),
            pitch: "E".into(),
            octave: 2,
            waveform: Waveform::Sawtooth,
            amplitude: 30.0,
            pan: -15.0,
            filters: vec!["dark".into()],
            playing: true,
            ..Default::default()
        })
        .voice(VoiceDescriptor {
            name: "lead".into(),
            pitch: "A".into(),
            octave: 4,
            waveform: Waveform::Square,
            amplitude: 20.0,
            pan: 15.0,
            filters: vec!["dark".into()],
            modulation: vec![LfoRoute {
                lfo: "vibrato".into(),
                destination: LfoDestination::Frequency,
            }],
            playing: true,
        });

    Monitor::new(patch).lead("lead").filter("dark").run()
}
