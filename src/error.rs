//! Error types
//!
//! Nothing in this crate is fatal: configuration errors leave the previous
//! valid state in place, resource-not-ready conditions are queued, and
//! backend failures only silence the voice that hit them. The `Error` type
//! exists for the few internal paths (offline rendering, mostly) that
//! propagate a failure instead of logging it away.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Tempo must be finite and greater than zero.
    InvalidTempo(f64),
    /// Subdivision must be a power of two (1, 2, 4, 8, ...).
    InvalidSubdivision(u32),
    /// Event duration must be greater than zero.
    InvalidDuration(f64),
    /// A ratio parameter (swing, jitter) was outside [0, 1].
    InvalidRatio { name: &'static str, value: f64 },
    /// A parameter curve had no values.
    EmptyCurve,
    /// A sample source was played before its buffer was filled.
    SampleNotReady,
    /// Offline rendering produced no usable output.
    RenderFailed { frames: u64 },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidTempo(t) => write!(f, "invalid tempo {} (must be > 0)", t),
            Error::InvalidSubdivision(d) => {
                write!(f, "invalid subdivision {} (must be a power of two)", d)
            }
            Error::InvalidDuration(d) => write!(f, "invalid duration {}s (must be > 0)", d),
            Error::InvalidRatio { name, value } => {
                write!(f, "invalid {} {} (must be in [0, 1])", name, value)
            }
            Error::EmptyCurve => write!(f, "parameter curve is empty"),
            Error::SampleNotReady => write!(f, "sample buffer has not been loaded yet"),
            Error::RenderFailed { frames } => {
                write!(f, "offline render of {} frames produced no output", frames)
            }
        }
    }
}

impl std::error::Error for Error {}
