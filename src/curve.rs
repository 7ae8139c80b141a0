//! Parameter curves
//!
//! A curve is a fixed-length sequence of samples describing how one voice
//! parameter (amplitude, frequency, pan, a filter cutoff, ...) evolves over
//! the duration of a sound event. Curves arrive in whatever length their
//! producer found convenient and are refitted to a common control length
//! before they are applied to the signal graph.

use std::fmt;

/// Interpolation mode used when refitting a curve to a new length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interp {
    /// Linear interpolation between neighbouring points.
    Linear,
    /// Step-hold: each target point takes the nearest earlier source value.
    Hold,
}

/// A fixed-length sequence of parameter values.
#[derive(Clone, Debug, PartialEq)]
pub struct Curve {
    values: Vec<f32>,
}

impl Curve {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// A single-point curve, i.e. a constant parameter.
    pub fn constant(value: f32) -> Self {
        Self { values: vec![value] }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[inline]
    pub fn into_values(self) -> Vec<f32> {
        self.values
    }

    /// Refit the curve to `len` points.
    ///
    /// Fitting a curve to its own length returns the data unchanged. A
    /// single-point curve expands to a constant. Empty curves stay empty;
    /// callers are expected to have validated against that.
    pub fn fit(&self, len: usize, interp: Interp) -> Curve {
        let n = self.values.len();
        if n == len || n == 0 || len == 0 {
            return self.clone();
        }
        if n == 1 {
            return Curve::new(vec![self.values[0]; len]);
        }

        let mut out = Vec::with_capacity(len);
        match interp {
            Interp::Linear => {
                for i in 0..len {
                    let pos = if len == 1 {
                        0.0
                    } else {
                        i as f64 * (n - 1) as f64 / (len - 1) as f64
                    };
                    let lo = pos.floor() as usize;
                    let hi = (lo + 1).min(n - 1);
                    let frac = (pos - lo as f64) as f32;
                    out.push(self.values[lo] * (1.0 - frac) + self.values[hi] * frac);
                }
            }
            Interp::Hold => {
                for i in 0..len {
                    let idx = (i * n / len).min(n - 1);
                    out.push(self.values[idx]);
                }
            }
        }
        Curve::new(out)
    }

    /// Map every value through `f`, keeping the length.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Curve {
        Curve::new(self.values.iter().map(|&v| f(v)).collect())
    }
}

impl From<Vec<f32>> for Curve {
    fn from(values: Vec<f32>) -> Self {
        Curve::new(values)
    }
}

impl From<&[f32]> for Curve {
    fn from(values: &[f32]) -> Self {
        Curve::new(values.to_vec())
    }
}

impl From<f32> for Curve {
    fn from(value: f32) -> Self {
        Curve::constant(value)
    }
}

/// Where a curve is stored until compile time: either eager values or a
/// generator invoked lazily when the voice compiles its graph.
pub enum CurveSource {
    Values(Curve),
    Lazy(Box<dyn Fn() -> Curve + Send>),
}

impl CurveSource {
    pub fn resolve(&self) -> Curve {
        match self {
            CurveSource::Values(c) => c.clone(),
            CurveSource::Lazy(f) => f(),
        }
    }
}

impl fmt::Debug for CurveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurveSource::Values(c) => f.debug_tuple("Values").field(c).finish(),
            CurveSource::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

impl From<Curve> for CurveSource {
    fn from(c: Curve) -> Self {
        CurveSource::Values(c)
    }
}

impl From<Vec<f32>> for CurveSource {
    fn from(values: Vec<f32>) -> Self {
        CurveSource::Values(Curve::new(values))
    }
}

impl From<&[f32]> for CurveSource {
    fn from(values: &[f32]) -> Self {
        CurveSource::Values(values.into())
    }
}

impl From<f32> for CurveSource {
    fn from(value: f32) -> Self {
        CurveSource::Values(Curve::constant(value))
    }
}

/// The voice parameters a curve can target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamTarget {
    Amplitude,
    Frequency,
    Pan,
}

/// External curve producers implement this; the core treats the result as
/// opaque, already-validated data.
pub trait CurveProvider {
    fn curve(&self, target: ParamTarget) -> Option<Curve>;
}

/// MIDI note number to frequency in Hz (A4 = 69 = 440 Hz).
#[inline]
pub fn mtof(notenum: f32) -> f32 {
    440.0 * ((notenum - 69.0) / 12.0).exp2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_same_length_is_identity() {
        let c = Curve::new(vec![0.0, 0.5, 1.0, 0.25]);
        assert_eq!(c.fit(4, Interp::Linear), c);
        assert_eq!(c.fit(4, Interp::Hold), c);
    }

    #[test]
    fn fit_upsamples_linearly() {
        let c = Curve::new(vec![0.0, 1.0]);
        let up = c.fit(5, Interp::Linear);
        assert_eq!(up.values(), &[0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn fit_hold_steps() {
        let c = Curve::new(vec![1.0, 2.0]);
        let up = c.fit(4, Interp::Hold);
        assert_eq!(up.values(), &[1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn fit_downsamples() {
        let c = Curve::new(vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        let down = c.fit(3, Interp::Linear);
        assert_eq!(down.values(), &[0.0, 2.0, 4.0]);
    }

    #[test]
    fn constant_expands() {
        let c = Curve::constant(0.7);
        assert_eq!(c.fit(3, Interp::Linear).values(), &[0.7, 0.7, 0.7]);
    }

    #[test]
    fn mtof_reference_pitch() {
        assert!((mtof(69.0) - 440.0).abs() < 1e-4);
        assert!((mtof(81.0) - 880.0).abs() < 1e-3);
        assert!((mtof(57.0) - 220.0).abs() < 1e-3);
    }
}
