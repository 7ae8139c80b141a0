//! Musical clocks
//!
//! A [`Clock`] holds tempo state and an ordered callback list; the actual
//! tick scheduling is driven by the owning [`Taktwerk`](crate::Taktwerk)
//! context, which plants a marker in the audio graph per tick and calls
//! back in here when it elapses. Slaves don't self-schedule at all: they
//! fire on a cadence of master beats.

use tracing::warn;

use crate::taktwerk::Taktwerk;

/// Identifies a clock within a [`Taktwerk`] context. Id 0 is always the
/// master.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ClockId(pub(crate) usize);

/// Callback invoked on every tick of a clock.
pub type TickFn = Box<dyn FnMut(&mut Taktwerk, ClockId)>;

pub(crate) enum CallbackEntry {
    /// A user callback, optionally named for dedupe and removal.
    User { name: Option<String>, f: TickFn },
    /// A synced clock riding this clock's tick list.
    Slave(ClockId),
}

/// A tempo grid: tempo, subdivision, time signature, swing and jitter,
/// plus the callbacks to fire each tick.
pub struct Clock {
    tempo: f64,
    subdivision: u32,
    time_sig: (u32, u32),
    swing: f64,
    jitter: f64,
    sync: bool,
    lookahead_secs: f64,

    pub(crate) beat: u32,
    pub(crate) running: bool,
    pub(crate) callbacks: Vec<CallbackEntry>,

    // While the list is out for dispatch, removals recorded here are
    // applied when it comes back.
    dispatching: bool,
    pending_clear: bool,
    pending_unregister: Vec<String>,

    // Tick bookkeeping, written by the context pump.
    pub(crate) started_at: f64,
    pub(crate) expected: f64,
    pub(crate) drift: f64,
    pub(crate) pending_interval: f64,
}

impl Clock {
    /// A clock at the given tempo and subdivision. Invalid values fall
    /// back to the defaults (60 BPM, subdivision 4) with a warning.
    pub fn new(tempo: f64, subdivision: u32) -> Self {
        let mut clock = Self::with_raw(60.0, 4);
        clock.configure(Some(tempo), Some(subdivision), None);
        clock
    }

    /// The global master grid: 480 ticks per quarter note, exempt from the
    /// power-of-two subdivision rule user clocks follow.
    pub(crate) fn master() -> Self {
        Self::with_raw(60.0, 480)
    }

    fn with_raw(tempo: f64, subdivision: u32) -> Self {
        Self {
            tempo,
            subdivision,
            time_sig: (4, 4),
            swing: 0.5,
            jitter: 0.0,
            sync: false,
            lookahead_secs: 0.05,
            beat: 0,
            running: false,
            callbacks: Vec::new(),
            dispatching: false,
            pending_clear: false,
            pending_unregister: Vec::new(),
            started_at: 0.0,
            expected: 0.0,
            drift: 0.0,
            pending_interval: 0.0,
        }
    }

    /// Update tempo, subdivision, and/or time signature. Each invalid field
    /// is rejected on its own and the previous value kept.
    pub fn configure(
        &mut self,
        tempo: Option<f64>,
        subdivision: Option<u32>,
        time_sig: Option<(u32, u32)>,
    ) {
        if let Some(t) = tempo {
            if t.is_finite() && t > 0.0 {
                self.tempo = t;
            } else {
                warn!(tempo = t, "rejecting invalid tempo, keeping {}", self.tempo);
            }
        }
        if let Some(d) = subdivision {
            if d.is_power_of_two() {
                self.subdivision = d;
            } else {
                warn!(
                    subdivision = d,
                    "rejecting non-power-of-two subdivision, keeping {}", self.subdivision
                );
            }
        }
        if let Some((num, den)) = time_sig {
            if num > 0 && den > 0 {
                self.time_sig = (num, den);
            } else {
                warn!(num, den, "rejecting invalid time signature");
            }
        }
    }

    /// Swing ratio in [0, 1]; 0.5 means none.
    pub fn set_swing(&mut self, ratio: f64) {
        if (0.0..=1.0).contains(&ratio) {
            self.swing = ratio;
        } else {
            warn!(ratio, "rejecting out-of-range swing");
        }
    }

    /// Jitter amount in [0, 1]; the fraction of the interval each tick may
    /// be perturbed by.
    pub fn set_jitter(&mut self, amount: f64) {
        if (0.0..=1.0).contains(&amount) {
            self.jitter = amount;
        } else {
            warn!(amount, "rejecting out-of-range jitter");
        }
    }

    /// Follow the master clock's grid instead of self-scheduling.
    pub fn set_sync(&mut self, sync: bool) {
        self.sync = sync;
    }

    /// Seconds of early warning the clock gives lookahead voices.
    pub fn set_lookahead(&mut self, secs: f64) {
        if secs.is_finite() && secs >= 0.0 {
            self.lookahead_secs = secs;
        } else {
            warn!(secs, "rejecting invalid lookahead");
        }
    }

    /// Append an unnamed callback. Unnamed callbacks always append; only
    /// named ones dedupe.
    pub fn register(&mut self, f: TickFn) {
        self.callbacks.push(CallbackEntry::User { name: None, f });
    }

    /// Append a named callback. Returns false (and keeps the list
    /// unchanged) if the name is already registered.
    pub fn register_named(&mut self, name: &str, f: TickFn) -> bool {
        let duplicate = self.callbacks.iter().any(|entry| {
            matches!(entry, CallbackEntry::User { name: Some(n), .. } if n == name)
        });
        if duplicate {
            warn!(name, "duplicate callback registration ignored");
            return false;
        }
        self.callbacks.push(CallbackEntry::User {
            name: Some(name.to_string()),
            f,
        });
        true
    }

    /// Remove the named callback. Returns whether anything was removed.
    /// Calling this from inside a tick callback removes the entry at the
    /// end of the current tick.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|entry| {
            !matches!(entry, CallbackEntry::User { name: Some(n), .. } if n == name)
        });
        if self.dispatching {
            self.pending_unregister.push(name.to_string());
            return true;
        }
        self.callbacks.len() != before
    }

    /// Empty the user callback list without stopping the clock. Synced
    /// slaves stay attached. From inside a tick callback this takes
    /// effect at the end of the current tick; callbacks registered after
    /// the `clear` survive.
    pub fn clear(&mut self) {
        self.callbacks
            .retain(|entry| matches!(entry, CallbackEntry::Slave(_)));
        if self.dispatching {
            self.pending_clear = true;
        }
    }

    /// Take the callback list out for dispatch. Removals requested while
    /// the list is out are recorded and applied by
    /// [`finish_dispatch`](Self::finish_dispatch).
    pub(crate) fn begin_dispatch(&mut self) -> Vec<CallbackEntry> {
        self.dispatching = true;
        std::mem::take(&mut self.callbacks)
    }

    /// Put the dispatched list back, applying any `clear`/`unregister`
    /// the callbacks performed and appending registrations they made.
    pub(crate) fn finish_dispatch(&mut self, mut taken: Vec<CallbackEntry>) {
        self.dispatching = false;
        if std::mem::take(&mut self.pending_clear) {
            taken.retain(|entry| matches!(entry, CallbackEntry::Slave(_)));
        }
        for name in std::mem::take(&mut self.pending_unregister) {
            taken.retain(|entry| {
                !matches!(entry, CallbackEntry::User { name: Some(n), .. } if *n == name)
            });
        }
        let added = std::mem::replace(&mut self.callbacks, taken);
        self.callbacks.extend(added);
    }

    /// True when the current beat is one of `beats`.
    pub fn when(&self, beats: &[u32]) -> bool {
        beats.contains(&self.beat)
    }

    /// True when the current beat is none of `beats`.
    pub fn not_when(&self, beats: &[u32]) -> bool {
        !self.when(beats)
    }

    pub fn reset_beat(&mut self) {
        self.beat = 0;
    }

    pub fn beat(&self) -> u32 {
        self.beat
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn subdivision(&self) -> u32 {
        self.subdivision
    }

    pub fn time_signature(&self) -> (u32, u32) {
        self.time_sig
    }

    pub fn swing(&self) -> f64 {
        self.swing
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    pub fn is_sync(&self) -> bool {
        self.sync
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn lookahead_secs(&self) -> f64 {
        self.lookahead_secs
    }

    /// Accumulated difference between wall-graph time and the expected
    /// tick grid, in seconds. Diagnostic only.
    pub fn drift(&self) -> f64 {
        self.drift
    }

    /// The unmodulated tick interval, `60 / tempo * (subdivision / 4)`.
    pub fn base_interval(&self) -> f64 {
        60.0 / self.tempo * (self.subdivision as f64 / 4.0)
    }

    /// The next tick's interval with jitter and swing applied, in that
    /// order. Jitter perturbs by the full `interval * jitter` magnitude
    /// with a random sign; swing scales even beats by `(1 - s) / 0.5` and
    /// odd beats by `s / 0.5`.
    pub fn modulated_interval(&self) -> f64 {
        let base = self.base_interval();
        let mut interval = base;
        if self.jitter > 0.0 {
            let sign = if fastrand::bool() { 1.0 } else { -1.0 };
            interval += base * self.jitter * sign;
        }
        let factor = if self.beat % 2 == 0 {
            (1.0 - self.swing) / 0.5
        } else {
            self.swing / 0.5
        };
        (interval * factor).max(0.0)
    }

    /// Beats per measure on this clock's grid.
    pub fn ticks_per_measure(&self) -> u32 {
        (self.subdivision * self.time_sig.0 / self.time_sig.1).max(1)
    }

    /// Whether a slave at this subdivision fires on the given master beat.
    pub(crate) fn fires_on(&self, master_beat: u32, master_subdivision: u32) -> bool {
        let cadence = (master_subdivision as f64 / self.subdivision as f64)
            .round()
            .max(1.0) as u32;
        master_beat % cadence == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_formula() {
        let clock = Clock::new(120.0, 4);
        assert!((clock.base_interval() - 0.5).abs() < 1e-9);

        let clock = Clock::new(60.0, 8);
        assert!((clock.base_interval() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn neutral_swing_leaves_interval_alone() {
        let mut clock = Clock::new(120.0, 4);
        clock.set_swing(0.5);
        assert!((clock.modulated_interval() - 0.5).abs() < 1e-9);
        clock.beat = 1;
        assert!((clock.modulated_interval() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn swing_shifts_between_beat_parities() {
        let mut clock = Clock::new(120.0, 4);
        clock.set_swing(0.75);
        // Even beats shrink, odd beats grow; the pair still sums to 2x.
        let even = clock.modulated_interval();
        clock.beat = 1;
        let odd = clock.modulated_interval();
        assert!((even - 0.25).abs() < 1e-9);
        assert!((odd - 0.75).abs() < 1e-9);
        assert!((even + odd - 1.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_configure_keeps_previous() {
        let mut clock = Clock::new(120.0, 4);
        clock.configure(Some(-3.0), Some(5), None);
        assert_eq!(clock.tempo(), 120.0);
        assert_eq!(clock.subdivision(), 4);
        clock.configure(Some(90.0), Some(16), Some((3, 4)));
        assert_eq!(clock.tempo(), 90.0);
        assert_eq!(clock.subdivision(), 16);
        assert_eq!(clock.time_signature(), (3, 4));
    }

    #[test]
    fn out_of_range_swing_and_jitter_rejected() {
        let mut clock = Clock::new(120.0, 4);
        clock.set_swing(1.5);
        clock.set_jitter(-0.1);
        assert_eq!(clock.swing(), 0.5);
        assert_eq!(clock.jitter(), 0.0);
    }

    #[test]
    fn named_callbacks_dedupe() {
        let mut clock = Clock::new(120.0, 4);
        assert!(clock.register_named("pulse", Box::new(|_, _| {})));
        assert!(!clock.register_named("pulse", Box::new(|_, _| {})));
        assert_eq!(clock.callbacks.len(), 1);

        clock.register(Box::new(|_, _| {}));
        clock.register(Box::new(|_, _| {}));
        assert_eq!(clock.callbacks.len(), 3);

        assert!(clock.unregister("pulse"));
        assert!(!clock.unregister("pulse"));
        assert_eq!(clock.callbacks.len(), 2);
    }

    #[test]
    fn clear_during_dispatch_applies_on_restore() {
        let mut clock = Clock::new(120.0, 4);
        clock.register_named("a", Box::new(|_, _| {}));
        clock.register(Box::new(|_, _| {}));

        let taken = clock.begin_dispatch();
        clock.clear();
        // Registered mid-dispatch, after the clear: survives.
        clock.register_named("b", Box::new(|_, _| {}));
        clock.finish_dispatch(taken);

        assert_eq!(clock.callbacks.len(), 1);
        assert!(clock.unregister("b"));
        assert!(!clock.unregister("a"));
    }

    #[test]
    fn unregister_during_dispatch_applies_on_restore() {
        let mut clock = Clock::new(120.0, 4);
        clock.register_named("once", Box::new(|_, _| {}));
        clock.register_named("keep", Box::new(|_, _| {}));

        let taken = clock.begin_dispatch();
        assert!(clock.unregister("once"));
        clock.finish_dispatch(taken);

        assert_eq!(clock.callbacks.len(), 1);
        assert!(!clock.unregister("once"));
        assert!(clock.unregister("keep"));
    }

    #[test]
    fn jitter_perturbs_by_full_magnitude_with_random_sign() {
        let mut clock = Clock::new(120.0, 4);
        clock.set_jitter(0.2);
        let base = clock.base_interval();
        let shrunk = base * 0.8;
        let grown = base * 1.2;

        let mut seen_shrunk = false;
        let mut seen_grown = false;
        for _ in 0..200 {
            let interval = clock.modulated_interval();
            if (interval - shrunk).abs() < 1e-9 {
                seen_shrunk = true;
            } else if (interval - grown).abs() < 1e-9 {
                seen_grown = true;
            } else {
                panic!("interval {} is not {} or {}", interval, shrunk, grown);
            }
        }
        assert!(seen_shrunk && seen_grown);
    }

    #[test]
    fn beat_predicates() {
        let mut clock = Clock::new(120.0, 4);
        clock.beat = 2;
        assert!(clock.when(&[0, 2]));
        assert!(!clock.when(&[1, 3]));
        assert!(clock.not_when(&[1, 3]));
    }

    #[test]
    fn ticks_per_measure_follows_time_signature() {
        let mut clock = Clock::new(120.0, 16);
        assert_eq!(clock.ticks_per_measure(), 16);
        clock.configure(None, None, Some((3, 4)));
        assert_eq!(clock.ticks_per_measure(), 12);
    }

    #[test]
    fn slave_cadence() {
        let slave = Clock::new(120.0, 16);
        // Master at 480 ticks per quarter: fires every 30 master beats.
        for beat in 0..120 {
            assert_eq!(slave.fires_on(beat, 480), beat % 30 == 0);
        }
    }
}
