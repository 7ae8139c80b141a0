//! Gain stage with a scheduled-automation lane

use dasp_graph::{Buffer, Input};

use crate::node::{AudioNode, ProcessContext};
use crate::param::{AutomationMessage, Param};

/// A gain stage whose level follows an automation lane.
///
/// Gains are the workhorse of a voice chain: the amplitude-envelope stage,
/// user gain stages, and the final output stage are all `Gain` nodes. A
/// named gain stage is the target of live modulation: `SnapTo` cancels its
/// scheduled curve and pins it to a constant.
pub struct Gain {
    level: Param,
    channels: usize,
}

impl Gain {
    pub fn new(level: f32) -> Self {
        Self {
            level: Param::new(level),
            channels: 1,
        }
    }

    /// Process `channels` output channels (mono chains use 1, the post-pan
    /// output stage uses 2).
    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels.max(1);
        self
    }

    /// The level lane, for scheduling before the node joins a graph.
    pub fn level_mut(&mut self) -> &mut Param {
        &mut self.level
    }
}

impl AudioNode for Gain {
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
                AutomationMessage::CancelAfter(t) => self.level.cancel_after(t),
                AutomationMessage::SnapTo(v) => self.level.snap(v, ctx.block_time()),
                AutomationMessage::StopAt(_) => {}
            }
        }

        if outputs.is_empty() {
            return;
        }

        let in_buffers = inputs.get(0).map(|i| i.buffers()).unwrap_or(&[]);
        if in_buffers.is_empty() {
            for buffer in outputs.iter_mut() {
                buffer.iter_mut().for_each(|s| *s = 0.0);
            }
            return;
        }

        let mut levels = [0.0f32; Buffer::LEN];
        let len = outputs[0].len();
        self.level.fill(ctx.block_start, ctx.sample_rate, &mut levels[..len]);

        for (ch, out_buffer) in outputs.iter_mut().enumerate() {
            // Missing input channels fall back to the last available one.
            let in_buffer = in_buffers.get(ch).unwrap_or_else(|| in_buffers.last().unwrap());
            for (i, (out, &inp)) in out_buffer.iter_mut().zip(in_buffer.iter()).enumerate() {
                *out = inp * levels[i];
            }
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        1
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        self.channels
    }
}
