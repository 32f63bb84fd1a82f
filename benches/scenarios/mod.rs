//! Benchmarks for whole racks built from patches.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use voxramp::{
    graph::LfoDestination,
    patch::{FilterDescriptor, LfoDescriptor, LfoRoute, Patch, VoiceDescriptor},
};

use crate::{ramps::context, FAN_OUT};

const PITCHES: &[&str] = &["C", "D#", "F", "G", "A#"];

fn ensemble(voices: usize) -> Patch {
    let mut patch = Patch::new("ensemble")
        .filter(FilterDescriptor {
            name: "body".into(),
            frequency: 1200.0,
            ..Default::default()
        })
        .lfo(LfoDescriptor {
            name: "tremolo".into(),
            rate: 4.0,
            depth: 30.0,
            ..Default::default()
        });

    for i in 0..voices {
        patch = patch.voice(VoiceDescriptor {
            name: format!("v{i:03}"),
            pitch: PITCHES[i % PITCHES.len()].into(),
            octave: 2 + (i % 4) as i32,
            filters: vec!["body".into()],
            modulation: if i == 0 {
                vec![LfoRoute {
                    lfo: "tremolo".into(),
                    destination: LfoDestination::Gain,
                }]
            } else {
                Vec::new()
            },
            playing: true,
            ..Default::default()
        });
    }
    patch
}

pub fn bench_patch_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/patch_build");

    for &voices in FAN_OUT {
        let patch = ensemble(voices);
        group.bench_with_input(BenchmarkId::new("voices", voices), &voices, |b, _| {
            b.iter(|| {
                let (_clock, ctx) = context();
                let rack = patch.build(black_box(&ctx)).ok();
                if let Some(rack) = rack {
                    rack.dispose();
                }
            })
        });
    }

    group.finish();
}

pub fn bench_rack_ramp(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/rack_ramp");

    for &voices in FAN_OUT {
        let (clock, ctx) = context();
        let Ok(mut rack) = ensemble(voices).build(&ctx) else {
            continue;
        };
        let names = rack.voice_names();

        // Every voice ramps pan while the shared filter sweeps.
        group.bench_with_input(BenchmarkId::new("voices", voices), &voices, |b, _| {
            b.iter(|| {
                for name in &names {
                    if let Some(voice) = rack.voice_mut(name) {
                        voice.begin_ramp().set_pan(-50.0).commit_ramp(500.0);
                    }
                }
                if let Some(spec) = rack.filter_mut("body") {
                    spec.begin_ramp().set_frequency(300.0).commit_ramp(500.0);
                }
                clock.advance(black_box(500));
                for name in &names {
                    if let Some(voice) = rack.voice_mut(name) {
                        voice.set_pan(0.0);
                    }
                }
                if let Some(spec) = rack.filter_mut("body") {
                    spec.set_frequency(1200.0);
                }
            })
        });
    }

    group.finish();
}
