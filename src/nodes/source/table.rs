//! Table-reading source
//!
//! One node covers the three buffer-backed sources a voice can have: a
//! looping wavetable oscillator, a looping noise table, and a one-shot
//! sample/rendered-buffer player. Pitch is a playback-rate automation lane
//! (table samples advanced per output sample), so a frequency curve maps to
//! `rate = freq * table_len / sample_rate`.

use std::sync::Arc;

use dasp_graph::{Buffer, Input};

use crate::node::{AudioNode, ProcessContext};
use crate::param::{AutomationMessage, Param};

/// A mono source that reads a sample table, linearly interpolated.
pub struct TableSource {
    table: Arc<Vec<f32>>,
    rate: Param,
    position: f64,
    looping: bool,
    /// Absolute start/stop window in seconds. Outside it the source is
    /// silent; past `stop` (or past the table, when not looping) it is done.
    start: f64,
    stop: f64,
    done: bool,
}

impl TableSource {
    pub fn new(table: Arc<Vec<f32>>) -> Self {
        let done = table.is_empty();
        Self {
            table,
            rate: Param::new(1.0),
            position: 0.0,
            looping: true,
            start: 0.0,
            stop: f64::INFINITY,
            done,
        }
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Set the absolute play window. `stop` may be `f64::INFINITY` to let a
    /// one-shot table run to its natural end.
    pub fn window(mut self, start: f64, stop: f64) -> Self {
        self.start = start;
        self.stop = stop;
        self
    }

    /// The playback-rate lane, for scheduling before the node joins a graph.
    pub fn rate_mut(&mut self) -> &mut Param {
        &mut self.rate
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    fn read(&self, pos: f64) -> f32 {
        let len = self.table.len();
        let lo = pos.floor() as usize;
        let frac = (pos - lo as f64) as f32;
        let a = self.table[lo % len];
        let b = if self.looping {
            self.table[(lo + 1) % len]
        } else {
            self.table[(lo + 1).min(len - 1)]
        };
        a * (1.0 - frac) + b * frac
    }
}

impl AudioNode for TableSource {
    type Message = AutomationMessage;

    fn process(
        &mut self,
        ctx: &ProcessContext,
        messages: impl Iterator<Item = AutomationMessage>,
        _inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        for msg in messages {
            match msg {
                AutomationMessage::StopAt(t) => self.stop = t,
                AutomationMessage::CancelAfter(t) => self.rate.cancel_after(t),
                AutomationMessage::SnapTo(v) => self.rate.snap(v, ctx.block_time()),
            }
        }

        if outputs.is_empty() {
            return;
        }

        let (first, rest) = outputs.split_first_mut().unwrap();
        let sr = ctx.sample_rate as f64;
        let len = self.table.len();

        let mut rates = [0.0f32; Buffer::LEN];
        self.rate.fill(ctx.block_start, ctx.sample_rate, &mut rates[..first.len()]);

        for i in 0..first.len() {
            let t = (ctx.block_start + i as u64) as f64 / sr;
            if self.done || len == 0 || t < self.start {
                first[i] = 0.0;
                continue;
            }
            if t >= self.stop {
                self.done = true;
                first[i] = 0.0;
                continue;
            }

            first[i] = self.read(self.position);

            self.position += rates[i].max(0.0) as f64;
            if self.position >= len as f64 {
                if self.looping {
                    self.position %= len as f64;
                } else {
                    self.done = true;
                }
            }
        }

        for buffer in rest.iter_mut() {
            buffer.copy_from_slice(first);
        }
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
        self.done
    }
}
