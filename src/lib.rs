//! Taktwerk - generative music toolkit over a message-passing audio graph
//!
//! Design principles:
//! - The graph is the timebase: clock ticks ride on silent marker sources,
//!   so timing is sample-accurate even when the control thread is not
//! - Nodes receive parameters via message ring buffers, not shared state
//! - Voices are declarative: a source, curves, and an effect chain,
//!   compiled into graph nodes only when played
//! - Heavy chains render offline first and hand a finished buffer to the
//!   realtime graph
//! - All context (clocks, voices, registry) lives in one injectable
//!   [`Taktwerk`] value; no ambient globals

mod clock;
mod curve;
mod device;
mod engine;
mod error;
mod graph;
mod node;
mod param;
mod registry;
mod stage;
mod taktwerk;
mod voice;
pub mod nodes;

pub use clock::{Clock, ClockId, TickFn};
pub use curve::{mtof, Curve, CurveProvider, CurveSource, Interp, ParamTarget};
pub use device::CpalDevice;
pub use engine::{Engine, EventToken};
pub use error::Error;
pub use graph::{AudioGraph, NodeHandle};
pub use node::{AudioNode, NodeId, ProcessContext};
pub use param::{AutomationMessage, Param};
pub use registry::VoiceRegistry;
pub use stage::{Placement, Stage, StageKind};
pub use taktwerk::Taktwerk;
pub use voice::{SharedSample, SourceKind, Voice, VoiceId, VoiceState};
