//! Timing marker source
//!
//! A silent source whose only job is to finish after a scheduled number of
//! frames. Clocks schedule one marker per tick and treat its end
//! notification as the tick having elapsed. The graph is the timebase, so
//! tick timing stays sample-accurate regardless of control-thread jitter.

use dasp_graph::{Buffer, Input};

use crate::node::{AudioNode, ProcessContext};

/// Emits silence for a fixed number of frames, then reports finished.
pub struct Marker {
    remaining: u64,
}

impl Marker {
    pub fn new(frames: u64) -> Self {
        Self { remaining: frames }
    }

    /// A marker spanning `duration` seconds at `sample_rate`.
    pub fn with_duration(duration: f64, sample_rate: u32) -> Self {
        let frames = (duration.max(0.0) * sample_rate as f64).round() as u64;
        Self::new(frames)
    }
}

impl AudioNode for Marker {
    type Message = ();

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        _inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        for buffer in outputs.iter_mut() {
            buffer.iter_mut().for_each(|s| *s = 0.0);
        }
        let len = outputs.get(0).map(|b| b.len() as u64).unwrap_or(Buffer::LEN as u64);
        self.remaining = self.remaining.saturating_sub(len);
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        0
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        1
    }

    #[inline]
    fn finished(&self) -> bool {
        self.remaining == 0
    }
}
