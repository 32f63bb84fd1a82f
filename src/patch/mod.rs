//! Declarative rack configuration.
//!
//! A [`Patch`] names filters, LFOs and voices and says how they connect.
//! [`Patch::build`] checks every reference first, then creates the entities
//! against a [`Context`] and returns them as a [`Rack`]. Values use the same
//! input units as the setters (pan in [-50, 50], amplitude in [0, 100],
//! filter gain in [-100, 100], LFO depth in [0, 100]).

use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    engine::Context,
    error::{Error, Result},
    graph::{
        filter::FilterSpec,
        lfo::{Lfo, LfoDestination, DEFAULT_DEPTH, DEFAULT_RATE_HZ},
        node::{FilterKind, Waveform},
        voice::Voice,
    },
};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct Patch {
    pub name: String,
    pub description: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub filters: Vec<FilterDescriptor>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub lfos: Vec<LfoDescriptor>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub voices: Vec<VoiceDescriptor>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone)]
pub struct FilterDescriptor {
    pub name: String,
    pub kind: FilterKind,
    pub frequency: f64,
    pub resonance: f64,
    pub detune: f64,
    /// Gain input in [-100, 100].
    pub gain: f64,
}

impl Default for FilterDescriptor {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: FilterKind::Lowpass,
            frequency: 800.0,
            resonance: 0.0,
            detune: 0.0,
            gain: 25.0,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone)]
pub struct LfoDescriptor {
    pub name: String,
    pub waveform: Waveform,
    pub rate: f64,
    pub depth: f64,
}

impl Default for LfoDescriptor {
    fn default() -> Self {
        Self {
            name: String::new(),
            waveform: Waveform::Sine,
            rate: DEFAULT_RATE_HZ,
            depth: DEFAULT_DEPTH,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct LfoRoute {
    pub lfo: String,
    pub destination: LfoDestination,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone)]
pub struct VoiceDescriptor {
    pub name: String,
    pub pitch: String,
    pub octave: i32,
    pub waveform: Waveform,
    /// Amplitude input in [0, 100].
    pub amplitude: f64,
    /// Pan input in [-50, 50].
    pub pan: f64,
    /// Filter names, spliced in order.
    pub filters: Vec<String>,
    pub modulation: Vec<LfoRoute>,
    /// Start the voice right after building it.
    pub playing: bool,
}

impl Default for VoiceDescriptor {
    fn default() -> Self {
        Self {
            name: String::new(),
            pitch: "C".to_string(),
            octave: 4,
            waveform: Waveform::Sine,
            amplitude: 10.0,
            pan: 0.0,
            filters: Vec::new(),
            modulation: Vec::new(),
            playing: false,
        }
    }
}

/// Entities built from a [`Patch`], by name.
#[derive(Default)]
pub struct Rack {
    filters: BTreeMap<String, FilterSpec>,
    lfos: BTreeMap<String, Lfo>,
    voices: BTreeMap<String, Voice>,
}

impl Rack {
    pub fn voice(&self, name: &str) -> Option<&Voice> {
        self.voices.get(name)
    }

    pub fn voice_mut(&mut self, name: &str) -> Option<&mut Voice> {
        self.voices.get_mut(name)
    }

    pub fn filter(&self, name: &str) -> Option<&FilterSpec> {
        self.filters.get(name)
    }

    pub fn filter_mut(&mut self, name: &str) -> Option<&mut FilterSpec> {
        self.filters.get_mut(name)
    }

    pub fn lfo(&self, name: &str) -> Option<&Lfo> {
        self.lfos.get(name)
    }

    pub fn lfo_mut(&mut self, name: &str) -> Option<&mut Lfo> {
        self.lfos.get_mut(name)
    }

    /// Voices in name order.
    pub fn voices(&self) -> impl Iterator<Item = (&str, &Voice)> {
        self.voices.iter().map(|(name, voice)| (name.as_str(), voice))
    }

    pub fn voice_names(&self) -> Vec<String> {
        self.voices.keys().cloned().collect()
    }

    /// Dispose every voice, filter spec and LFO.
    pub fn dispose(self) {
        for (_, voice) in self.voices {
            voice.dispose();
        }
        for (_, mut filter) in self.filters {
            filter.dispose();
        }
        for (_, lfo) in self.lfos {
            lfo.dispose();
        }
    }
}

fn check_unique<'a>(kind: &'static str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(Error::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

impl Patch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn filter(mut self, filter: FilterDescriptor) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn lfo(mut self, lfo: LfoDescriptor) -> Self {
        self.lfos.push(lfo);
        self
    }

    pub fn voice(mut self, voice: VoiceDescriptor) -> Self {
        self.voices.push(voice);
        self
    }

    /// Check names are unique and every route points at a declared entity.
    pub fn validate(&self) -> Result<()> {
        check_unique("filter", self.filters.iter().map(|f| f.name.as_str()))?;
        check_unique("lfo", self.lfos.iter().map(|l| l.name.as_str()))?;
        check_unique("voice", self.voices.iter().map(|v| v.name.as_str()))?;

        for voice in &self.voices {
            if let Some(missing) = voice
                .filters
                .iter()
                .find(|name| !self.filters.iter().any(|f| &f.name == *name))
            {
                return Err(Error::UnknownReference {
                    kind: "filter",
                    name: missing.clone(),
                });
            }
            if let Some(route) = voice
                .modulation
                .iter()
                .find(|route| !self.lfos.iter().any(|l| l.name == route.lfo))
            {
                return Err(Error::UnknownReference {
                    kind: "lfo",
                    name: route.lfo.clone(),
                });
            }
            if voice.amplitude.is_nan() {
                return Err(Error::Validation {
                    param: "amplitude",
                    reason: format!("voice '{}' has a NaN amplitude", voice.name),
                });
            }
        }
        Ok(())
    }

    /// Validate, then create and wire every entity.
    pub fn build(&self, ctx: &Context) -> Result<Rack> {
        self.validate()?;
        let mut rack = Rack::default();

        for desc in &self.filters {
            let mut spec = FilterSpec::new(ctx);
            spec.set_kind(desc.kind)
                .set_frequency(desc.frequency)
                .set_resonance(desc.resonance)
                .set_detune(desc.detune)
                .set_gain(desc.gain);
            rack.filters.insert(desc.name.clone(), spec);
        }

        for desc in &self.lfos {
            let mut lfo = Lfo::new(ctx);
            lfo.set_waveform(desc.waveform)
                .set_rate(desc.rate)
                .set_depth(desc.depth);
            rack.lfos.insert(desc.name.clone(), lfo);
        }

        for desc in &self.voices {
            let mut voice = Voice::new(ctx, &desc.pitch, desc.waveform, desc.octave);
            voice.set_amplitude(desc.amplitude)?.set_pan(desc.pan);
            for name in &desc.filters {
                if let Some(spec) = rack.filters.get(name) {
                    voice.attach_filter(spec);
                }
            }
            for route in &desc.modulation {
                if let Some(lfo) = rack.lfos.get(&route.lfo) {
                    voice.attach_lfo(lfo, route.destination);
                }
            }
            if desc.playing {
                voice.play();
            }
            rack.voices.insert(desc.name.clone(), voice);
        }

        info!(
            patch = %self.name,
            voices = rack.voices.len(),
            filters = rack.filters.len(),
            lfos = rack.lfos.len(),
            "patch built"
        );
        Ok(rack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::{EngineRef, ManualClock, RecordingEngine, RenderEngine, TimerRef},
        graph::node::NodeParam,
    };
    use std::{cell::RefCell, rc::Rc};

    fn setup() -> (Rc<RefCell<RecordingEngine>>, Context) {
        let engine = Rc::new(RefCell::new(RecordingEngine::new()));
        let engine_ref: EngineRef = engine.clone();
        let timer: TimerRef = Rc::new(ManualClock::new());
        (engine, Context::new(engine_ref, timer))
    }

    fn duet() -> Patch {
        Patch::new("duet")
            .filter(FilterDescriptor {
                name: "dark".into(),
                frequency: 600.0,
                ..Default::default()
            })
            .lfo(LfoDescriptor {
                name: "wobble".into(),
                depth: 20.0,
                ..Default::default()
            })
            .voice(VoiceDescriptor {
                name: "bass".into(),
                pitch: "E".into(),
                octave: 2,
                filters: vec!["dark".into()],
                playing: true,
                ..Default::default()
            })
            .voice(VoiceDescriptor {
                name: "lead".into(),
                pitch: "A".into(),
                pan: 25.0,
                filters: vec!["dark".into()],
                modulation: vec![LfoRoute {
                    lfo: "wobble".into(),
                    destination: LfoDestination::Gain,
                }],
                ..Default::default()
            })
    }

    #[test]
    fn build_wires_shared_filter() {
        let (engine, ctx) = setup();
        let rack = duet().build(&ctx).unwrap();

        let spec = rack.filter("dark").unwrap();
        assert_eq!(spec.stage_count(), 2);
        for node in spec.stage_nodes() {
            assert_eq!(engine.borrow().param(node, NodeParam::Frequency), Some(600.0));
        }

        let bass = rack.voice("bass").unwrap();
        assert!(bass.is_started());
        assert!(engine.borrow().reaches_sink(bass.generator()));

        let lead = rack.voice("lead").unwrap();
        assert!(!lead.is_started());
        assert_eq!(lead.pan(), 0.5);
        assert_eq!(rack.lfo("wobble").unwrap().scaled_depth(), Some(0.2));
    }

    #[test]
    fn unknown_filter_is_rejected_before_building() {
        let (engine, ctx) = setup();
        let patch = Patch::new("broken").voice(VoiceDescriptor {
            name: "solo".into(),
            filters: vec!["missing".into()],
            ..Default::default()
        });

        let err = patch.build(&ctx).err();
        assert_eq!(
            err,
            Some(Error::UnknownReference {
                kind: "filter",
                name: "missing".into()
            })
        );
        assert_eq!(engine.borrow().node_count(), 1, "nothing but the sink");
    }

    #[test]
    fn unknown_lfo_is_rejected() {
        let patch = Patch::new("broken").voice(VoiceDescriptor {
            name: "solo".into(),
            modulation: vec![LfoRoute {
                lfo: "nope".into(),
                destination: LfoDestination::Pan,
            }],
            ..Default::default()
        });
        assert!(matches!(
            patch.validate(),
            Err(Error::UnknownReference { kind: "lfo", .. })
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let patch = Patch::new("twins")
            .voice(VoiceDescriptor {
                name: "a".into(),
                ..Default::default()
            })
            .voice(VoiceDescriptor {
                name: "a".into(),
                ..Default::default()
            });
        assert!(matches!(
            patch.validate(),
            Err(Error::DuplicateName { kind: "voice", .. })
        ));
    }

    #[test]
    fn dispose_releases_everything() {
        let (engine, ctx) = setup();
        let rack = duet().build(&ctx).unwrap();
        let sink = engine.borrow().sink();
        rack.dispose();

        let engine = engine.borrow();
        assert_eq!(engine.node_count(), 1);
        assert!(!engine.is_released(sink));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn patch_round_trips_through_json() {
        let json = serde_json::to_string(&duet()).unwrap();
        let back: Patch = serde_json::from_str(&json).unwrap();
        assert_eq!(back.voices.len(), 2);
        assert_eq!(back.voices[1].modulation[0].destination, LfoDestination::Gain);
        assert_eq!(back.filters[0].kind, FilterKind::Lowpass);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn missing_fields_take_defaults() {
        let patch: Patch = serde_json::from_str(
            r#"{ "name": "sparse", "voices": [{ "name": "v", "waveform": "square" }] }"#,
        )
        .unwrap();
        assert_eq!(patch.voices[0].octave, 4);
        assert_eq!(patch.voices[0].waveform, Waveform::Square);
        assert!(patch.filters.is_empty());
    }
}
