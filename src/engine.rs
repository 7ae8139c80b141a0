//! Graph engine and event scheduling
//!
//! The engine owns one [`AudioGraph`] terminated by a capture sink and
//! drives it block by block. Everything time-related rides on the graph
//! itself: scheduled timers and node end-watches resolve against the
//! graph's frame counter, so a tick is late only if the audio is late.

use rtrb::Consumer;
use tracing::trace;

use crate::graph::{AudioGraph, NodeHandle};
use crate::node::{AudioNode, NodeId};
use crate::nodes::sink::CaptureSink;
use crate::nodes::source::Marker;
use crate::Error;

/// Identifies one scheduled event (timer or end-watch).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EventToken(u64);

/// An [`AudioGraph`] plus the scheduling state layered on top of it.
pub struct Engine {
    graph: AudioGraph,
    sink: NodeId,
    /// Present in capture mode; a device sink consumes its own output.
    consumer: Option<Consumer<f32>>,
    captured: Vec<f32>,
    channels: usize,

    /// Nodes being watched for their natural end, in registration order.
    watches: Vec<(NodeId, EventToken)>,
    /// Absolute deadlines in seconds.
    timers: Vec<(f64, EventToken)>,
    next_token: u64,
}

impl Engine {
    /// An engine whose output is captured for the control side to drain.
    pub fn capture(sample_rate: u32, channels: usize) -> Self {
        let mut graph = AudioGraph::new(sample_rate);
        // Half a second of slack between drains.
        let capacity = (sample_rate as usize / 2) * channels;
        let (sink, consumer) = CaptureSink::new(channels, capacity);
        let sink = graph.add(sink);
        let sink_id = sink.id();
        graph.set_terminal(sink_id);

        Self {
            graph,
            sink: sink_id,
            consumer: Some(consumer),
            captured: Vec::new(),
            channels,
            watches: Vec::new(),
            timers: Vec::new(),
            next_token: 0,
        }
    }

    /// An engine that plays out through a CPAL device.
    #[cfg(feature = "cpal_sink")]
    pub fn realtime(device: &crate::device::CpalDevice) -> Self {
        let mut graph = AudioGraph::new(device.sample_rate());
        let channels = device.channels() as usize;
        let sink = graph.add(device.create_sink());
        let sink_id = sink.id();
        graph.set_terminal(sink_id);

        Self {
            graph,
            sink: sink_id,
            consumer: None,
            captured: Vec::new(),
            channels,
            watches: Vec::new(),
            timers: Vec::new(),
            next_token: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.graph.sample_rate()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Graph time in seconds (start of the next unprocessed block).
    pub fn now(&self) -> f64 {
        self.graph.frames() as f64 / self.graph.sample_rate() as f64
    }

    pub fn add<N: AudioNode>(&mut self, node: N) -> NodeHandle<N::Message> {
        self.graph.add(node)
    }

    pub fn connect(&mut self, from: NodeId, to: NodeId) {
        self.graph.connect(from, to);
    }

    /// Wire a chain's final node into the engine's sink.
    pub fn connect_to_sink(&mut self, from: NodeId) {
        self.graph.connect(from, self.sink);
    }

    /// Remove a node and forget any watch on it.
    pub fn remove(&mut self, id: NodeId) {
        self.watches.retain(|&(n, _)| n != id);
        self.graph.remove(id);
    }

    pub fn graph_mut(&mut self) -> &mut AudioGraph {
        &mut self.graph
    }

    fn token(&mut self) -> EventToken {
        let t = EventToken(self.next_token);
        self.next_token += 1;
        t
    }

    /// Fire an event when `node` reports itself finished.
    pub fn watch(&mut self, node: NodeId) -> EventToken {
        let token = self.token();
        self.watches.push((node, token));
        token
    }

    /// Add a silent marker source spanning `duration` seconds and watch its
    /// end. The marker rides through the graph, so the notification lands
    /// on the block boundary where the span actually elapses.
    pub fn schedule_marker(&mut self, duration: f64) -> (NodeId, EventToken) {
        let marker = self.graph.add(Marker::with_duration(duration, self.graph.sample_rate()));
        let id = marker.id();
        self.graph.connect(id, self.sink);
        let token = self.watch(id);
        trace!(duration, ?token, "scheduled marker");
        (id, token)
    }

    /// Fire an event `delay` seconds from now.
    pub fn after(&mut self, delay: f64) -> EventToken {
        let token = self.token();
        let deadline = self.now() + delay.max(0.0);
        self.timers.push((deadline, token));
        token
    }

    /// Process one 64-frame block and return the events that came due, in
    /// deadline order (timers first, then finished watches in registration
    /// order).
    pub fn process_block(&mut self) -> Vec<EventToken> {
        self.graph.process();

        if let Some(consumer) = self.consumer.as_mut() {
            while let Ok(s) = consumer.pop() {
                self.captured.push(s);
            }
        }

        let now = self.now();
        let mut fired = Vec::new();

        let mut due: Vec<(f64, EventToken)> = Vec::new();
        self.timers.retain(|&(deadline, token)| {
            if deadline <= now {
                due.push((deadline, token));
                false
            } else {
                true
            }
        });
        due.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        fired.extend(due.into_iter().map(|(_, t)| t));

        let graph = &self.graph;
        self.watches.retain(|&(node, token)| {
            if graph.is_finished(node) {
                fired.push(token);
                false
            } else {
                true
            }
        });

        fired
    }

    /// Take all captured interleaved output since the last call.
    pub fn take_output(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.captured)
    }
}

/// Pump a standalone graph for `frames` frames, draining `consumer` as it
/// goes. Used for offline voice rendering, where the whole signal is
/// computed in one synchronous burst.
pub(crate) fn render_offline(
    graph: &mut AudioGraph,
    consumer: &mut Consumer<f32>,
    frames: u64,
) -> Result<Vec<f32>, Error> {
    if frames == 0 {
        return Err(Error::RenderFailed { frames });
    }
    let mut out = Vec::with_capacity(frames as usize);
    while graph.frames() < frames {
        graph.process();
        while let Ok(s) = consumer.pop() {
            out.push(s);
        }
    }
    out.truncate(frames as usize);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dasp_graph::Buffer;

    #[test]
    fn timers_fire_in_deadline_order() {
        let mut engine = Engine::capture(8000, 1);
        let late = engine.after(0.010);
        let early = engine.after(0.002);

        let mut fired = Vec::new();
        for _ in 0..(8000 / Buffer::LEN) {
            fired.extend(engine.process_block());
            if fired.len() == 2 {
                break;
            }
        }
        assert_eq!(fired, vec![early, late]);
    }

    #[test]
    fn marker_end_lands_on_schedule() {
        let sr = 8000;
        let mut engine = Engine::capture(sr, 1);
        let (_, token) = engine.schedule_marker(0.1);

        let mut blocks = 0;
        loop {
            let fired = engine.process_block();
            blocks += 1;
            if fired.contains(&token) {
                break;
            }
            assert!(blocks < 1000, "marker never finished");
        }

        let elapsed = blocks * Buffer::LEN;
        let expected = (0.1 * sr as f64) as usize;
        // Ends on the block boundary at or after the scheduled span.
        assert!(elapsed >= expected);
        assert!(elapsed < expected + 2 * Buffer::LEN);
    }

    #[test]
    fn removed_watch_does_not_fire() {
        let mut engine = Engine::capture(8000, 1);
        let (node, token) = engine.schedule_marker(0.05);
        engine.remove(node);

        for _ in 0..100 {
            assert!(!engine.process_block().contains(&token));
        }
    }
}
