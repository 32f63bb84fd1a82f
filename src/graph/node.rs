use std::{fmt, str::FromStr};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Opaque handle to a node created by a [`RenderEngine`](crate::engine::RenderEngine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Parameters a node exposes for immediate writes and modulation input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeParam {
    /// Generator or filter frequency (Hz).
    Frequency,
    /// Detune in cents.
    Detune,
    /// Linear gain on amplitude stages, dB on filter stages.
    Gain,
    /// Stereo position in [-1, 1].
    Pan,
    /// Filter quality factor.
    Q,
}

/// Generator waveform.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    pub fn as_str(self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Square => "square",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Triangle => "triangle",
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Waveform {
    type Err = Error;

    /// Case-insensitive; `"saw"` is accepted for sawtooth.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sine" => Ok(Waveform::Sine),
            "square" => Ok(Waveform::Square),
            "saw" | "sawtooth" => Ok(Waveform::Sawtooth),
            "triangle" => Ok(Waveform::Triangle),
            _ => Err(Error::UnknownWaveform(s.to_string())),
        }
    }
}

/// Biquad response of a filter stage.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterKind {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
    Lowshelf,
    Highshelf,
    Peaking,
    Notch,
    Allpass,
}

impl FilterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterKind::Lowpass => "lowpass",
            FilterKind::Highpass => "highpass",
            FilterKind::Bandpass => "bandpass",
            FilterKind::Lowshelf => "lowshelf",
            FilterKind::Highshelf => "highshelf",
            FilterKind::Peaking => "peaking",
            FilterKind::Notch => "notch",
            FilterKind::Allpass => "allpass",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lowpass" => Ok(FilterKind::Lowpass),
            "highpass" => Ok(FilterKind::Highpass),
            "bandpass" => Ok(FilterKind::Bandpass),
            "lowshelf" => Ok(FilterKind::Lowshelf),
            "highshelf" => Ok(FilterKind::Highshelf),
            "peaking" => Ok(FilterKind::Peaking),
            "notch" => Ok(FilterKind::Notch),
            "allpass" => Ok(FilterKind::Allpass),
            _ => Err(Error::UnknownFilterKind(s.to_string())),
        }
    }
}

/// Values a filter stage is created with and kept in sync to.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSettings {
    pub kind: FilterKind,
    pub frequency: f64,
    pub q: f64,
    pub detune: f64,
    pub gain_db: f64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            kind: FilterKind::Lowpass,
            frequency: 800.0,
            q: 0.0,
            detune: 0.0,
            gain_db: 10.0,
        }
    }
}
