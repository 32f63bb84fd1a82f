//! The routing model: voices, the filter specs they share, and the LFOs
//! that modulate them.
//!
//! Every entity here only describes and wires nodes. The nodes themselves
//! live in a [`RenderEngine`](crate::engine::RenderEngine); voices and filter
//! specs move their parameters over time through [`crate::automation`].

/// Shared filter parameters mirrored into realized filter stages.
pub mod filter;
/// Low frequency oscillators routed into voice parameters.
pub mod lfo;
/// Node handles and the values that cross the engine boundary.
pub mod node;
/// Pitched signal chains with play/pause and filter splicing.
pub mod voice;

pub use filter::{FilterSpec, FilterStage, StageId};
pub use lfo::{Lfo, LfoDestination};
pub use node::{FilterKind, FilterSettings, NodeId, NodeParam, Waveform};
pub use voice::{ParamInput, Voice};
