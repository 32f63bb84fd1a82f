//! Error types for voxramp.

use thiserror::Error;

/// Result type for fallible voxramp operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the caller.
///
/// Most out-of-range input is clamped silently; only the cases below are
/// reported.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A parameter received input it cannot interpret (e.g. text for amplitude).
    #[error("invalid value for '{param}': {reason}")]
    Validation {
        /// Parameter name.
        param: &'static str,
        /// Why the input was rejected.
        reason: String,
    },

    /// Pitch name is not one of the twelve pitch classes.
    #[error("unknown pitch name: {0:?}")]
    UnknownPitch(String),

    /// Waveform name is not recognized.
    #[error("unknown waveform: {0:?}")]
    UnknownWaveform(String),

    /// Filter kind name is not recognized.
    #[error("unknown filter kind: {0:?}")]
    UnknownFilterKind(String),

    /// LFO destination name is not recognized.
    #[error("unknown LFO destination: {0:?}")]
    UnknownDestination(String),

    /// A patch route points at an entity that was never declared.
    #[error("unknown {kind} '{name}' referenced by patch")]
    UnknownReference {
        /// Entity kind ("filter", "lfo").
        kind: &'static str,
        /// The missing name.
        name: String,
    },

    /// Two entities of the same kind share a name in one patch.
    #[error("duplicate {kind} name '{name}' in patch")]
    DuplicateName {
        /// Entity kind ("voice", "filter", "lfo").
        kind: &'static str,
        /// The repeated name.
        name: String,
    },
}
