/*
Pitch Table
===========

Voices are pitched by a name and an octave rather than a MIDI number.

  pitch name   One of the twelve pitch classes. Sharps and flats are aliases
               for the same class: "C#" and "Db" are one pitch. Names are
               case-insensitive ("c#", "DB", "eb" all work).

  base freq    The frequency of the pitch class at the reference octave 4.
               The table starts at A 440 Hz and climbs to G# 830.61 Hz, so
               C (523.25 Hz) sits above A and B within one reference octave.

  octave       An integer clamped to [0, 8]. Each step doubles or halves the
               frequency relative to octave 4:

                   multiplier = 2^(octave - 4)

                   octave 0 → 0.0625    octave 4 → 1.0
                   octave 3 → 0.5       octave 8 → 16.0

Unknown pitch names never fail: they fall back to C (523.25 Hz).

Example:
  frequency_of("A", 3)  == 220.0
  frequency_of("Db", 5) == 1108.74
*/

use std::{fmt, str::FromStr};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Lowest octave accepted by [`octave_multiplier`].
pub const MIN_OCTAVE: i32 = 0;
/// Highest octave accepted by [`octave_multiplier`].
pub const MAX_OCTAVE: i32 = 8;
/// Octave at which the base frequencies are defined.
pub const REFERENCE_OCTAVE: i32 = 4;

/// Multipliers for octaves 0..=8.
const OCTAVE_TABLE: [f64; 9] = [0.0625, 0.125, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0];

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PitchName {
    A,
    As,
    B,
    C,
    Cs,
    D,
    Ds,
    E,
    F,
    Fs,
    G,
    Gs,
}

impl PitchName {
    /// Pitch used when a name cannot be resolved.
    pub const DEFAULT: PitchName = PitchName::C;

    pub const ALL: [PitchName; 12] = [
        PitchName::A,
        PitchName::As,
        PitchName::B,
        PitchName::C,
        PitchName::Cs,
        PitchName::D,
        PitchName::Ds,
        PitchName::E,
        PitchName::F,
        PitchName::Fs,
        PitchName::G,
        PitchName::Gs,
    ];

    /// Frequency in Hz at the reference octave.
    pub fn base_frequency(self) -> f64 {
        match self {
            PitchName::A => 440.00,
            PitchName::As => 466.16,
            PitchName::B => 493.88,
            PitchName::C => 523.25,
            PitchName::Cs => 554.37,
            PitchName::D => 587.33,
            PitchName::Ds => 622.25,
            PitchName::E => 659.25,
            PitchName::F => 698.46,
            PitchName::Fs => 739.99,
            PitchName::G => 783.99,
            PitchName::Gs => 830.61,
        }
    }

    /// Resolve a name, falling back to [`PitchName::DEFAULT`].
    pub fn resolve(name: &str) -> PitchName {
        name.parse().unwrap_or(Self::DEFAULT)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PitchName::A => "A",
            PitchName::As => "A#",
            PitchName::B => "B",
            PitchName::C => "C",
            PitchName::Cs => "C#",
            PitchName::D => "D",
            PitchName::Ds => "D#",
            PitchName::E => "E",
            PitchName::F => "F",
            PitchName::Fs => "F#",
            PitchName::G => "G",
            PitchName::Gs => "G#",
        }
    }
}

impl fmt::Display for PitchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PitchName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let pitch = match normalized.as_str() {
            "a" => PitchName::A,
            "a#" | "bb" => PitchName::As,
            "b" => PitchName::B,
            "c" => PitchName::C,
            "c#" | "db" => PitchName::Cs,
            "d" => PitchName::D,
            "d#" | "eb" => PitchName::Ds,
            "e" => PitchName::E,
            "f" => PitchName::F,
            "f#" | "gb" => PitchName::Fs,
            "g" => PitchName::G,
            "g#" | "ab" => PitchName::Gs,
            _ => return Err(Error::UnknownPitch(s.to_string())),
        };
        Ok(pitch)
    }
}

/// Base frequency for a pitch name; unknown names give C.
pub fn base_frequency(name: &str) -> f64 {
    PitchName::resolve(name).base_frequency()
}

/// Clamp an octave number into the supported range.
#[inline]
pub fn clamp_octave(octave: i32) -> i32 {
    octave.clamp(MIN_OCTAVE, MAX_OCTAVE)
}

/// Frequency multiplier for an octave, relative to octave 4.
///
/// Out-of-range octaves are clamped to [0, 8] first.
pub fn octave_multiplier(octave: i32) -> f64 {
    OCTAVE_TABLE[clamp_octave(octave) as usize]
}

/// Frequency of a named pitch at an octave.
pub fn frequency_of(name: &str, octave: i32) -> f64 {
    base_frequency(name) * octave_multiplier(octave)
}
