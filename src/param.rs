//! Sample-accurate parameter automation
//!
//! A [`Param`] is a scheduled-automation lane owned by a node: a base value
//! plus an ordered list of set-points and value ramps in absolute graph
//! time. Voices schedule their curves into lanes while building a chain;
//! during processing the owning node fills a per-block buffer from the lane.
//!
//! Live control after a node has moved into the graph goes through
//! [`AutomationMessage`]s on the node's ring buffer, in the same way the
//! rest of this crate passes parameters by message instead of shared state.

/// Message accepted by every automation-carrying node in a voice chain.
#[derive(Clone, Copy, Debug)]
pub enum AutomationMessage {
    /// Drop all scheduled automation from `t` (seconds) onward, on every
    /// lane the node owns. Ramps in progress at `t` are truncated there.
    CancelAfter(f64),
    /// Cancel the node's primary lane and hold it at a constant value,
    /// effective immediately. Used for live tweaks of named targets.
    SnapTo(f32),
    /// Stop a source node at `t` (seconds). Ignored by non-sources.
    StopAt(f64),
}

#[derive(Clone, Debug)]
enum Event {
    Set { time: f64, value: f32 },
    Ramp { start: f64, duration: f64, values: Vec<f32> },
}

impl Event {
    #[inline]
    fn time(&self) -> f64 {
        match self {
            Event::Set { time, .. } => *time,
            Event::Ramp { start, .. } => *start,
        }
    }
}

/// One automatable parameter lane.
#[derive(Clone, Debug)]
pub struct Param {
    base: f32,
    events: Vec<Event>,
}

impl Param {
    pub fn new(base: f32) -> Self {
        Self { base, events: Vec::new() }
    }

    /// Schedule a step to `value` at `time` seconds.
    pub fn set_at(&mut self, value: f32, time: f64) {
        self.insert(Event::Set { time, value });
    }

    /// Schedule a value ramp: `values` spread linearly over
    /// `[start, start + duration]`, linearly interpolated between points.
    /// After the ramp ends the last value holds.
    pub fn ramp(&mut self, values: Vec<f32>, start: f64, duration: f64) {
        if values.is_empty() || duration <= 0.0 {
            return;
        }
        self.insert(Event::Ramp { start, duration, values });
    }

    fn insert(&mut self, event: Event) {
        let idx = self.events.partition_point(|e| e.time() <= event.time());
        self.events.insert(idx, event);
    }

    /// Remove all automation scheduled at or after `time`. A ramp in
    /// progress at `time` is truncated so its value holds from there.
    pub fn cancel_after(&mut self, time: f64) {
        self.events.retain(|e| e.time() < time);
        if let Some(Event::Ramp { start, duration, values }) = self.events.last_mut() {
            let end = *start + *duration;
            if end > time {
                let kept = ((time - *start) / *duration * values.len() as f64).ceil() as usize;
                values.truncate(kept.max(1));
                *duration = time - *start;
            }
        }
    }

    /// Cancel everything from `now` and hold a constant from there.
    pub fn snap(&mut self, value: f32, now: f64) {
        self.cancel_after(now);
        self.set_at(value, now);
    }

    /// The lane's value at time `t` seconds.
    pub fn value_at(&self, t: f64) -> f32 {
        // Last event that has started by t wins; earlier ones are history.
        let idx = self.events.partition_point(|e| e.time() <= t);
        if idx == 0 {
            return self.base;
        }
        match &self.events[idx - 1] {
            Event::Set { value, .. } => *value,
            Event::Ramp { start, duration, values } => {
                if values.len() == 1 {
                    return values[0];
                }
                let frac = ((t - start) / duration).min(1.0).max(0.0);
                let pos = frac * (values.len() - 1) as f64;
                let lo = pos.floor() as usize;
                let hi = (lo + 1).min(values.len() - 1);
                let f = (pos - lo as f64) as f32;
                values[lo] * (1.0 - f) + values[hi] * f
            }
        }
    }

    /// Fill one block of per-sample values starting at absolute frame
    /// `block_start`.
    pub fn fill(&self, block_start: u64, sample_rate: u32, out: &mut [f32]) {
        let sr = sample_rate as f64;
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.value_at((block_start + i as u64) as f64 / sr);
        }
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_value_until_first_event() {
        let mut p = Param::new(0.5);
        p.set_at(1.0, 2.0);
        assert_eq!(p.value_at(0.0), 0.5);
        assert_eq!(p.value_at(1.999), 0.5);
        assert_eq!(p.value_at(2.0), 1.0);
        assert_eq!(p.value_at(10.0), 1.0);
    }

    #[test]
    fn ramp_interpolates_and_holds() {
        let mut p = Param::new(0.0);
        p.ramp(vec![0.0, 1.0], 1.0, 2.0);
        assert_eq!(p.value_at(0.5), 0.0);
        assert!((p.value_at(2.0) - 0.5).abs() < 1e-6);
        assert!((p.value_at(3.0) - 1.0).abs() < 1e-6);
        // Holds after the ramp ends.
        assert!((p.value_at(5.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cancel_removes_only_future_events() {
        let mut p = Param::new(0.0);
        p.set_at(1.0, 1.0);
        p.set_at(2.0, 2.0);
        p.set_at(3.0, 3.0);
        p.cancel_after(1.5);
        assert_eq!(p.value_at(0.99), 0.0);
        assert_eq!(p.value_at(1.0), 1.0);
        assert_eq!(p.value_at(4.0), 1.0);
    }

    #[test]
    fn cancel_truncates_running_ramp() {
        let mut p = Param::new(0.0);
        p.ramp(vec![0.0, 1.0], 0.0, 4.0);
        p.cancel_after(2.0);
        let held = p.value_at(3.5);
        assert!(held <= 0.51, "ramp kept climbing after cancel: {}", held);
    }

    #[test]
    fn snap_holds_constant() {
        let mut p = Param::new(0.0);
        p.set_at(0.8, 5.0);
        p.snap(0.25, 1.0);
        assert_eq!(p.value_at(2.0), 0.25);
        assert_eq!(p.value_at(6.0), 0.25);
    }
}
