//! Benchmarks for a single ramping entity.

use std::{cell::RefCell, hint::black_box, rc::Rc};

use criterion::{BenchmarkId, Criterion};
use voxramp::{
    engine::{EngineRef, TimerRef},
    Context, FilterSpec, ManualClock, RecordingEngine, Voice, Waveform,
};

use crate::FAN_OUT;

pub(crate) fn context() -> (Rc<ManualClock>, Context) {
    let engine: EngineRef = Rc::new(RefCell::new(RecordingEngine::without_log()));
    let clock = Rc::new(ManualClock::new());
    let timer: TimerRef = clock.clone();
    (clock, Context::new(engine, timer))
}

pub fn bench_voice_ramp(c: &mut Criterion) {
    let mut group = c.benchmark_group("ramps/voice");
    let (clock, ctx) = context();
    let mut voice = Voice::new(&ctx, "A", Waveform::Sawtooth, 4);
    voice.play();

    // Stage three params and run the ramp to completion: 50 ticks.
    group.bench_function("commit_and_run_1s", |b| {
        b.iter(|| {
            voice
                .begin_ramp()
                .set_octave(5)
                .set_pan(black_box(40.0))
                .set_amplitude(80)
                .ok();
            voice.commit_ramp(1000.0);
            clock.advance(black_box(1000));
            voice.begin_ramp().set_octave(4);
            voice.commit_ramp(0.0);
            clock.advance(20);
        })
    });

    group.finish();
}

pub fn bench_filter_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("ramps/filter_fan_out");

    for &stages in FAN_OUT {
        let (clock, ctx) = context();
        let mut spec = FilterSpec::new(&ctx);
        let voices: Vec<Voice> = (0..stages)
            .map(|_| {
                let mut voice = Voice::new(&ctx, "E", Waveform::Square, 2);
                voice.attach_filter(&spec);
                voice
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("sweep_1s", stages), &stages, |b, _| {
            b.iter(|| {
                spec.begin_ramp()
                    .set_frequency(black_box(4000.0))
                    .set_resonance(6.0)
                    .commit_ramp(1000.0);
                clock.advance(1000);
                spec.set_frequency(800.0).set_resonance(0.0);
            })
        });

        black_box(&voices);
    }

    group.finish();
}
