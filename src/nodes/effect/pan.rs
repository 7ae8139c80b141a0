//! Equal-power stereo panner

use std::f32::consts::FRAC_PI_2;

use dasp_graph::{Buffer, Input};

use crate::node::{AudioNode, ProcessContext};
use crate::param::{AutomationMessage, Param};

/// Spreads a mono chain across two output channels with the equal-power
/// law: -1 is hard left, 0 centered, 1 hard right. The pan position is an
/// automation lane and can be snapped live like any named target.
pub struct Panner {
    pan: Param,
}

impl Panner {
    pub fn new(pan: f32) -> Self {
        Self { pan: Param::new(pan) }
    }

    pub fn pan_mut(&mut self) -> &mut Param {
        &mut self.pan
    }
}

impl AudioNode for Panner {
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
                AutomationMessage::CancelAfter(t) => self.pan.cancel_after(t),
                AutomationMessage::SnapTo(v) => self.pan.snap(v, ctx.block_time()),
                AutomationMessage::StopAt(_) => {}
            }
        }

        if outputs.len() < 2 {
            return;
        }

        let in_buffers = inputs.get(0).map(|i| i.buffers()).unwrap_or(&[]);
        let (left, right) = outputs.split_at_mut(1);
        let left = &mut left[0];
        let right = &mut right[0];

        if in_buffers.is_empty() {
            left.iter_mut().for_each(|s| *s = 0.0);
            right.iter_mut().for_each(|s| *s = 0.0);
            return;
        }
        let input = &in_buffers[0];

        let len = left.len();
        let mut pans = [0.0f32; Buffer::LEN];
        self.pan.fill(ctx.block_start, ctx.sample_rate, &mut pans[..len]);

        for i in 0..len {
            let angle = (pans[i].clamp(-1.0, 1.0) + 1.0) * 0.5 * FRAC_PI_2;
            left[i] = input[i] * angle.cos();
            right[i] = input[i] * angle.sin();
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        1
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        2
    }
}
