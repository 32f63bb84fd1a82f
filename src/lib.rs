pub mod automation; // Staged parameter ramps
pub mod engine; // Render engine and timer seams
pub mod error;
pub mod graph; // Voices, filter specs, LFOs
pub mod patch; // Declarative rack configuration
pub mod pitch;

pub use automation::{RampParam, RampStatus, TICK_INTERVAL_MS};
pub use engine::{Context, ManualClock, RecordingEngine, RenderEngine, Timer};
pub use error::{Error, Result};
pub use graph::{FilterKind, FilterSpec, Lfo, LfoDestination, Voice, Waveform};
pub use patch::{Patch, Rack};
