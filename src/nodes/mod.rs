//! Built-in audio nodes.
//!
//! Nodes are organized into three categories:
//!
//! ## Sources ([`source`])
//!
//! Generate audio with no audio inputs:
//! - [`TableSource`] - Interpolating table reader (wavetables, noise tables,
//!   samples, and rendered voice buffers)
//! - [`Marker`] - Silent source that finishes after a fixed span (clock ticks
//!   and scheduled timers ride on these)
//!
//! ## Effects ([`effect`])
//!
//! Process audio (inputs → outputs):
//! - [`Gain`] - Level stage with a scheduled-automation lane
//! - [`Biquad`] - Low/high/band/all-pass filter
//! - [`Delay`] - Feedback delay
//! - [`Panner`] - Equal-power stereo panner
//!
//! ## Sinks ([`sink`])
//!
//! Consume audio with no audio outputs:
//! - [`CaptureSink`] - Sum chains into a drainable ring buffer (offline
//!   rendering and headless output)
//! - [`CpalSink`](sink::CpalSink) - Output to system audio device (requires
//!   `cpal_sink` feature)
//!
//! # Message Types
//!
//! Every chain node shares [`AutomationMessage`](crate::param::AutomationMessage)
//! as its message type, so a voice can address its whole chain uniformly.
//! Markers and sinks have no parameters and use `()`.

pub mod effect;
pub mod sink;
pub mod source;

// Re-export common types at the top level for convenience
pub use effect::{Biquad, Delay, FilterKind, Gain, Panner};
pub use sink::CaptureSink;
pub use source::{Marker, TableSource};

#[cfg(feature = "cpal_sink")]
pub use sink::CpalSink;
