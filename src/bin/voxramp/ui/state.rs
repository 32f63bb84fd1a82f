//! Shared state types for UI communication
//!
//! Static data is sent once at init; dynamic updates are Copy so the
//! control thread never allocates to publish them.

/// Voices shown in the meter table.
pub const MAX_VOICES: usize = 8;

/// Commands sent from the UI thread to the control thread
#[derive(Clone, Copy, Debug)]
pub enum ControlMessage {
    /// Pause or resume the lead voice
    TogglePlayback,
    /// Ramp the lead voice an octave and swing its pan
    RampLead,
    /// Sweep the shared filter cutoff
    SweepFilter,
}

/// Static state sent once at initialization
#[derive(Clone, Debug)]
pub struct UiStateInit {
    pub patch_name: String,
    /// Voice names in meter order
    pub voices: Vec<String>,
    pub lead: String,
    pub filter: String,
}

/// Per-voice meter reading
#[derive(Clone, Copy, Debug, Default)]
pub struct VoiceMeter {
    /// Frequency the voice is tuned to
    pub frequency: f64,
    /// Frequency on the generator right now
    pub live_frequency: f64,
    /// Live amplitude, 0.0-1.0
    pub amplitude: f64,
    /// Live pan, -1.0-1.0
    pub pan: f64,
    pub muted: bool,
    pub started: bool,
    pub remaining_ticks: u32,
}

/// Dynamic state published by the control thread (Copy, no allocations)
#[derive(Clone, Copy, Debug)]
pub struct UiStateUpdate {
    /// Clock time of the snapshot
    pub elapsed_ms: u64,
    /// Interval tasks still scheduled
    pub pending_tasks: u32,
    pub voices: [VoiceMeter; MAX_VOICES],
    pub num_voices: u8,
    pub cutoff_hz: f64,
    pub filter_ramping: bool,
    pub filter_stages: u32,
}

impl UiStateInit {
    pub fn new(patch_name: &str, voices: Vec<String>, lead: &str, filter: &str) -> Self {
        Self {
            patch_name: patch_name.to_string(),
            voices,
            lead: lead.to_string(),
            filter: filter.to_string(),
        }
    }
}

impl UiStateUpdate {
    pub fn new() -> Self {
        Self {
            elapsed_ms: 0,
            pending_tasks: 0,
            voices: [VoiceMeter::default(); MAX_VOICES],
            num_voices: 0,
            cutoff_hz: 0.0,
            filter_ramping: false,
            filter_stages: 0,
        }
    }

    /// Meters for the voices actually present
    pub fn meters(&self) -> &[VoiceMeter] {
        &self.voices[..usize::from(self.num_voices)]
    }
}

impl Default for UiStateUpdate {
    fn default() -> Self {
        Self::new()
    }
}
