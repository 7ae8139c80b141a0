//! Capture sink
//!
//! Terminal node that sums every connected chain and pushes the interleaved
//! result into a ring buffer. The control side drains the consumer after
//! each block, so the same sink serves both offline rendering and headless
//! output collection.

use dasp_graph::{Buffer, Input};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::node::{AudioNode, ProcessContext};

/// Sums its inputs and captures the interleaved samples.
pub struct CaptureSink {
    buffer: Producer<f32>,
    channels: usize,
}

impl CaptureSink {
    /// Create a sink with `channels` interleaved output channels and a ring
    /// buffer holding `capacity` samples. Returns the consumer end for the
    /// control side to drain.
    pub fn new(channels: usize, capacity: usize) -> (Self, Consumer<f32>) {
        let (producer, consumer) = RingBuffer::new(capacity.next_power_of_two().max(1024));
        (
            Self {
                buffer: producer,
                channels: channels.max(1),
            },
            consumer,
        )
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}

impl AudioNode for CaptureSink {
    type Message = ();

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        inputs: &[Input],
        _outputs: &mut [Buffer],
    ) {
        let mut mixed = [[0.0f32; Buffer::LEN]; 2];
        let channels = self.channels.min(2);

        // Sum every connected chain per channel. Chains with fewer channels
        // than the sink contribute their last channel to the rest.
        let mut len = 0;
        for input in inputs {
            let buffers = input.buffers();
            if buffers.is_empty() {
                continue;
            }
            len = len.max(buffers[0].len());
            for ch in 0..channels {
                let src = buffers.get(ch).unwrap_or_else(|| buffers.last().unwrap());
                for (acc, &s) in mixed[ch].iter_mut().zip(src.iter()) {
                    *acc += s;
                }
            }
        }

        if self.buffer.slots() < len * self.channels {
            // Consumer fell behind; drop the block rather than write a
            // partial frame and shear the interleave.
            return;
        }

        for i in 0..len {
            for ch in 0..self.channels {
                let _ = self.buffer.push(mixed[ch.min(channels - 1)][i]);
            }
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        1
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::graph::AudioGraph;
    use crate::nodes::effect::Gain;
    use crate::nodes::source::TableSource;

    #[test]
    fn sums_multiple_chains() {
        let mut graph = AudioGraph::new(44100);

        // Two constant sources through unity gains into the sink.
        let a = graph.add(TableSource::new(Arc::new(vec![0.25])));
        let b = graph.add(TableSource::new(Arc::new(vec![0.5])));
        let ga = graph.add(Gain::new(1.0));
        let gb = graph.add(Gain::new(1.0));
        let (sink, mut consumer) = CaptureSink::new(1, 4096);
        let sink = graph.add(sink);

        graph.connect(a.id(), ga.id());
        graph.connect(b.id(), gb.id());
        graph.connect(ga.id(), sink.id());
        graph.connect(gb.id(), sink.id());
        graph.set_terminal(sink.id());

        graph.process();

        let mut captured = Vec::new();
        while let Ok(s) = consumer.pop() {
            captured.push(s);
        }
        assert_eq!(captured.len(), Buffer::LEN);
        for s in captured {
            assert!((s - 0.75).abs() < 1e-6);
        }
    }
}
