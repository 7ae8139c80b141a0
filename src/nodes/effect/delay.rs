//! Feedback delay stage
//!
//! Mirrors the classic wet/dry feedback-delay wiring: the input feeds the
//! delay line, the line's output feeds back into itself scaled by
//! `feedback`, and the output is `dry + mix * delayed`. Mix, delay time,
//! and feedback are automation lanes.

use dasp_graph::{Buffer, Input};

use crate::node::{AudioNode, ProcessContext};
use crate::param::{AutomationMessage, Param};

const MAX_DELAY_SECS: f64 = 2.0;

/// A mono feedback delay with automated mix, time, and feedback.
pub struct Delay {
    mix: Param,
    time: Param,
    feedback: Param,

    line: Vec<f32>,
    write: usize,
}

impl Delay {
    pub fn new(mix: f32, time: f32, feedback: f32, sample_rate: u32) -> Self {
        let len = (MAX_DELAY_SECS * sample_rate as f64).ceil() as usize + 1;
        Self {
            mix: Param::new(mix),
            time: Param::new(time),
            feedback: Param::new(feedback),
            line: vec![0.0; len],
            write: 0,
        }
    }

    pub fn mix_mut(&mut self) -> &mut Param {
        &mut self.mix
    }

    pub fn time_mut(&mut self) -> &mut Param {
        &mut self.time
    }

    pub fn feedback_mut(&mut self) -> &mut Param {
        &mut self.feedback
    }

    #[inline]
    fn delayed(&self, delay_samples: f64) -> f32 {
        let len = self.line.len();
        let pos = self.write as f64 - delay_samples.max(1.0).min((len - 1) as f64);
        let pos = if pos < 0.0 { pos + len as f64 } else { pos };
        let lo = pos.floor() as usize % len;
        let hi = (lo + 1) % len;
        let frac = (pos - pos.floor()) as f32;
        self.line[lo] * (1.0 - frac) + self.line[hi] * frac
    }
}

impl AudioNode for Delay {
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
                    self.mix.cancel_after(t);
                    self.time.cancel_after(t);
                    self.feedback.cancel_after(t);
                }
                AutomationMessage::SnapTo(v) => self.mix.snap(v, ctx.block_time()),
                AutomationMessage::StopAt(_) => {}
            }
        }

        if outputs.is_empty() {
            return;
        }

        let in_buffers = inputs.get(0).map(|i| i.buffers()).unwrap_or(&[]);
        let out = &mut outputs[0];
        if in_buffers.is_empty() {
            out.iter_mut().for_each(|s| *s = 0.0);
            return;
        }
        let input = &in_buffers[0];

        let len = out.len();
        let mut mixes = [0.0f32; Buffer::LEN];
        let mut times = [0.0f32; Buffer::LEN];
        let mut fbs = [0.0f32; Buffer::LEN];
        self.mix.fill(ctx.block_start, ctx.sample_rate, &mut mixes[..len]);
        self.time.fill(ctx.block_start, ctx.sample_rate, &mut times[..len]);
        self.feedback.fill(ctx.block_start, ctx.sample_rate, &mut fbs[..len]);

        let sr = ctx.sample_rate as f64;
        for i in 0..len {
            let x = input[i];
            let delayed = self.delayed(times[i] as f64 * sr);
            self.line[self.write] = x + delayed * fbs[i].clamp(-1.0, 1.0);
            self.write = (self.write + 1) % self.line.len();
            out[i] = x + delayed * mixes[i];
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
