//! Effect stage descriptors
//!
//! A voice carries an ordered list of [`Stage`]s. Each is a plain
//! description (kind plus parameter curves); the voice compiler turns
//! them into graph nodes at play time. Placement decides which side of the
//! offline render a stage lands on: `Pre` stages are baked into the
//! rendered buffer, `Post` stages run live in the output graph.
//!
//! The bit quantizer and sample-and-hold are not graph nodes at all; they
//! rewrite the rendered buffer in place after the offline pass.

use crate::curve::Curve;

/// Which side of the offline render a stage runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Baked into the offline render.
    Pre,
    /// Runs live in the realtime graph.
    Post,
}

/// One effect in a voice's chain.
#[derive(Clone, Debug)]
pub enum StageKind {
    Gain {
        mult: Curve,
        /// Named gains are addressable for live modulation.
        name: Option<String>,
    },
    LowPass { freq: Curve, q: Curve },
    HighPass { freq: Curve, q: Curve },
    BandPass { freq: Curve, q: Curve },
    AllPass { freq: Curve, q: Curve },
    Delay { mix: Curve, time: Curve, feedback: Curve },
    /// Buffer transform: quantize to `bits` of resolution (1..=16,
    /// fractional allowed).
    BitQuantizer { bits: Curve },
    /// Buffer transform: hold each captured sample for `samples` frames.
    SampleHold { samples: Curve },
}

#[derive(Clone, Debug)]
pub struct Stage {
    pub(crate) kind: StageKind,
    pub(crate) placement: Placement,
}

impl Stage {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            placement: Placement::Post,
        }
    }

    pub fn gain(mult: impl Into<Curve>) -> Self {
        Self::new(StageKind::Gain { mult: mult.into(), name: None })
    }

    pub fn gain_named(name: &str, mult: impl Into<Curve>) -> Self {
        Self::new(StageKind::Gain {
            mult: mult.into(),
            name: Some(name.to_string()),
        })
    }

    pub fn low_pass(freq: impl Into<Curve>, q: impl Into<Curve>) -> Self {
        Self::new(StageKind::LowPass { freq: freq.into(), q: q.into() })
    }

    pub fn high_pass(freq: impl Into<Curve>, q: impl Into<Curve>) -> Self {
        Self::new(StageKind::HighPass { freq: freq.into(), q: q.into() })
    }

    pub fn band_pass(freq: impl Into<Curve>, q: impl Into<Curve>) -> Self {
        Self::new(StageKind::BandPass { freq: freq.into(), q: q.into() })
    }

    pub fn all_pass(freq: impl Into<Curve>, q: impl Into<Curve>) -> Self {
        Self::new(StageKind::AllPass { freq: freq.into(), q: q.into() })
    }

    pub fn delay(
        mix: impl Into<Curve>,
        time: impl Into<Curve>,
        feedback: impl Into<Curve>,
    ) -> Self {
        Self::new(StageKind::Delay {
            mix: mix.into(),
            time: time.into(),
            feedback: feedback.into(),
        })
    }

    pub fn bit_quantizer(bits: impl Into<Curve>) -> Self {
        Self::new(StageKind::BitQuantizer { bits: bits.into() })
    }

    pub fn sample_hold(samples: impl Into<Curve>) -> Self {
        Self::new(StageKind::SampleHold { samples: samples.into() })
    }

    pub fn low_pass_default() -> Self {
        Self::low_pass(20_000.0, 1.0)
    }

    pub fn high_pass_default() -> Self {
        Self::high_pass(30.0, 1.0)
    }

    pub fn band_pass_default() -> Self {
        Self::band_pass(30.0, 1.0)
    }

    pub fn all_pass_default() -> Self {
        Self::all_pass(30.0, 1.0)
    }

    pub fn delay_default() -> Self {
        Self::delay(0.5, 0.3, 0.5)
    }

    pub fn bit_quantizer_default() -> Self {
        Self::bit_quantizer(16.0)
    }

    pub fn sample_hold_default() -> Self {
        Self::sample_hold(1.0)
    }

    /// Bake this stage into the offline render.
    pub fn pre(mut self) -> Self {
        self.placement = Placement::Pre;
        self
    }

    /// Run this stage live in the realtime graph.
    pub fn post(mut self) -> Self {
        self.placement = Placement::Post;
        self
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn kind(&self) -> &StageKind {
        &self.kind
    }

    /// Whether this stage rewrites the rendered buffer instead of becoming
    /// a graph node.
    pub(crate) fn is_buffer_transform(&self) -> bool {
        matches!(
            self.kind,
            StageKind::BitQuantizer { .. } | StageKind::SampleHold { .. }
        )
    }
}

/// Quantize `rendered` in place. The bits curve is spread over the first
/// `dur` seconds; samples past it take the curve's last value. Bits are
/// clamped to [1, 16], fractional values allowed.
pub(crate) fn bit_quantize(rendered: &mut [f32], bits: &Curve, dur: f64, sample_rate: u32) {
    let values = bits.values();
    if values.is_empty() {
        return;
    }
    let interval = dur * sample_rate as f64 / values.len() as f64;
    for (i, sample) in rendered.iter_mut().enumerate() {
        let block = if interval > 0.0 {
            ((i as f64 / interval) as usize).min(values.len() - 1)
        } else {
            values.len() - 1
        };
        let bits = values[block].clamp(1.0, 16.0);
        let res = 2.0f32.powf(bits);
        *sample = (*sample * res).round() / res;
    }
}

/// Sample-and-hold `rendered` in place: every `samples`-th frame is
/// captured and held until the next capture point.
pub(crate) fn sample_hold(rendered: &mut [f32], samples: &Curve, dur: f64, sample_rate: u32) {
    let values = samples.values();
    if values.is_empty() {
        return;
    }
    let interval = dur * sample_rate as f64 / values.len() as f64;
    let mut held = 0.0;
    for (i, sample) in rendered.iter_mut().enumerate() {
        let block = if interval > 0.0 {
            ((i as f64 / interval) as usize).min(values.len() - 1)
        } else {
            values.len() - 1
        };
        let samps = (values[block].round() as usize).max(1);
        if i % samps == 0 {
            held = *sample;
        }
        *sample = held;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_one_bit_snaps_to_halves() {
        let mut buf = vec![0.1, 0.3, 0.6, 0.9, -0.6];
        bit_quantize(&mut buf, &Curve::constant(1.0), 1.0, 5);
        assert_eq!(buf, vec![0.0, 0.5, 0.5, 1.0, -0.5]);
    }

    #[test]
    fn quantize_leaves_full_res_nearly_alone() {
        let mut buf = vec![0.123456, -0.654321];
        let orig = buf.clone();
        bit_quantize(&mut buf, &Curve::constant(16.0), 1.0, 2);
        for (a, b) in buf.iter().zip(orig.iter()) {
            assert!((a - b).abs() < 1.0 / 65536.0);
        }
    }

    #[test]
    fn sample_hold_carries_captured_value() {
        let mut buf = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        sample_hold(&mut buf, &Curve::constant(3.0), 1.0, 6);
        assert_eq!(buf, vec![1.0, 1.0, 1.0, 4.0, 4.0, 4.0]);
    }

    #[test]
    fn sample_hold_of_one_is_identity() {
        let mut buf = vec![0.5, -0.25, 0.75];
        sample_hold(&mut buf, &Curve::constant(1.0), 1.0, 3);
        assert_eq!(buf, vec![0.5, -0.25, 0.75]);
    }

    #[test]
    fn default_placement_is_post() {
        let stage = Stage::gain(0.5);
        assert_eq!(stage.placement(), Placement::Post);
        assert_eq!(stage.pre().placement(), Placement::Pre);
    }
}
