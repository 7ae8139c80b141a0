//! Core node trait and context types.

use dasp_graph::{Buffer, Input};

/// Information available during audio processing.
///
/// Passed to every [`AudioNode::process`] call. Contains the graph's sample
/// rate, the buffer size (always 64 samples in the current implementation),
/// and the absolute frame index of the first sample in the block, which is
/// what scheduled automation lanes resolve their times against.
#[derive(Clone, Copy, Debug)]
pub struct ProcessContext {
    /// Sample rate of the graph in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,
    /// Number of samples per buffer (currently always 64)
    pub buffer_size: usize,
    /// Absolute frame index of the first sample in this block
    pub block_start: u64,
}

impl ProcessContext {
    /// Graph time in seconds at the start of the current block.
    #[inline]
    pub fn block_time(&self) -> f64 {
        self.block_start as f64 / self.sample_rate as f64
    }
}

/// Unique identifier for a node within a graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(pub(crate) u32);

/// The core trait for audio processing nodes.
///
/// Nodes receive parameter updates via an iterator of messages, processed
/// at the start of each audio block.
pub trait AudioNode: Send + 'static {
    /// Message type for parameter updates (use `()` if none needed)
    type Message: Send + 'static;

    /// Process one block of audio
    ///
    /// 1. Drain and handle all pending messages
    /// 2. Read from inputs, write to outputs
    fn process(
        &mut self,
        ctx: &ProcessContext,
        messages: impl Iterator<Item = Self::Message>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    );

    /// Number of input channels (0 for sources)
    fn num_inputs(&self) -> usize {
        0
    }

    /// Number of output channels
    fn num_outputs(&self) -> usize {
        1
    }

    /// Whether this node has finished producing audio.
    ///
    /// Sources with a natural end (sample players past their last frame,
    /// stopped oscillators, elapsed timing markers) return `true` once
    /// they are done; the engine polls this after each block to deliver
    /// end-of-playback notifications. Effects and sinks never finish.
    fn finished(&self) -> bool {
        false
    }
}
