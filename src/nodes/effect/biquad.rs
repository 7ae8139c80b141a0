//! Biquad filter stage
//!
//! Second-order IIR in Direct Form II Transposed, coefficients from the
//! Audio EQ Cookbook (Robert Bristow-Johnson), the same formulas the
//! WebAudio BiquadFilterNode uses. Cutoff and Q are automation lanes,
//! re-evaluated once per block (control rate).

use std::f64::consts::PI;

use dasp_graph::{Buffer, Input};

use crate::node::{AudioNode, ProcessContext};
use crate::param::{AutomationMessage, Param};

/// Filter response kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
    LowPass,
    HighPass,
    BandPass,
    AllPass,
}

/// A mono biquad filter with automated frequency and Q.
pub struct Biquad {
    kind: FilterKind,
    freq: Param,
    q: Param,

    // Normalized coefficients
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    // Direct Form II Transposed state
    z1: f64,
    z2: f64,

    // Last values the coefficients were computed for
    cur_freq: f64,
    cur_q: f64,
    dirty: bool,
}

impl Biquad {
    pub fn new(kind: FilterKind, freq: f32, q: f32) -> Self {
        Self {
            kind,
            freq: Param::new(freq),
            q: Param::new(q),
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            cur_freq: 0.0,
            cur_q: 0.0,
            dirty: true,
        }
    }

    pub fn freq_mut(&mut self) -> &mut Param {
        &mut self.freq
    }

    pub fn q_mut(&mut self) -> &mut Param {
        &mut self.q
    }

    fn update_coefficients(&mut self, sample_rate: f64) {
        // Clamp to the open audio band to keep the math stable.
        let freq = self.cur_freq.max(1.0).min(sample_rate * 0.49);
        let q = self.cur_q.max(1e-4);

        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let (b0, b1, b2, a0, a1, a2) = match self.kind {
            FilterKind::LowPass => {
                let b1 = 1.0 - cos_w0;
                let b0 = b1 / 2.0;
                (b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterKind::HighPass => {
                let b1 = -(1.0 + cos_w0);
                let b0 = (1.0 + cos_w0) / 2.0;
                (b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterKind::BandPass => {
                (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterKind::AllPass => (
                1.0 - alpha,
                -2.0 * cos_w0,
                1.0 + alpha,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
        };

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
        self.dirty = false;
    }
}

impl AudioNode for Biquad {
    type Message = AutomationMessage;

    fn process(
        &mut self,
        ctx: &ProcessContext,
        messages: impl Iterator<Item = AutomationMessage>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        for msg in messages {
            match msg {
                AutomationMessage::CancelAfter(t) => {
                    self.freq.cancel_after(t);
                    self.q.cancel_after(t);
                    self.dirty = true;
                }
                AutomationMessage::SnapTo(v) => {
                    self.freq.snap(v, ctx.block_time());
                    self.dirty = true;
                }
                AutomationMessage::StopAt(_) => {}
            }
        }

        if outputs.is_empty() {
            return;
        }

        let t = ctx.block_time();
        let freq = self.freq.value_at(t) as f64;
        let q = self.q.value_at(t) as f64;
        if self.dirty || freq != self.cur_freq || q != self.cur_q {
            self.cur_freq = freq;
            self.cur_q = q;
            self.update_coefficients(ctx.sample_rate as f64);
        }

        let in_buffers = inputs.get(0).map(|i| i.buffers()).unwrap_or(&[]);
        let out = &mut outputs[0];
        if in_buffers.is_empty() {
            out.iter_mut().for_each(|s| *s = 0.0);
            return;
        }

        let input = &in_buffers[0];
        for (o, &x) in out.iter_mut().zip(input.iter()) {
            let x = x as f64;
            let y = self.b0 * x + self.z1;
            self.z1 = self.b1 * x - self.a1 * y + self.z2;
            self.z2 = self.b2 * x - self.a2 * y;
            *o = y as f32;
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        1
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        1
    }
}
