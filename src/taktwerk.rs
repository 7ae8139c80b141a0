//! The context object
//!
//! [`Taktwerk`] owns everything: the engine, the clock bank (index 0 is
//! the master), the active voices, and the global voice registry. All
//! control flow funnels through one event queue: the engine reports which
//! scheduled events came due each block, the context maps them to pending
//! actions, and processes the queue one event fully at a time. Callbacks
//! can enqueue new work but can never interleave with a running event,
//! so a tick callback cannot cause two overlapping ticks.

use std::collections::VecDeque;

use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::clock::{CallbackEntry, Clock, ClockId, TickFn};
use crate::engine::{Engine, EventToken};
use crate::node::NodeId;
use crate::param::AutomationMessage;
use crate::registry::VoiceRegistry;
use crate::voice::{self, CompiledVoice, SourceKind, Voice, VoiceId, VoiceState};

#[cfg(feature = "cpal_sink")]
use crate::device::CpalDevice;

enum Pending {
    /// A clock's tick marker elapsed.
    MarkerEnd(ClockId, NodeId),
    /// Begin a voice's play sequence (registry, duration resolution).
    VoiceStart(VoiceId),
    /// Compile a voice into the graph.
    VoiceLaunch(VoiceId),
    /// A voice's source reached its natural end.
    VoiceEnd(VoiceId),
    /// A delayed stop came due.
    VoiceStop(VoiceId),
}

struct ActiveVoice {
    voice: Voice,
    state: VoiceState,
    compiled: Option<CompiledVoice>,
    /// Per-play overrides from `play_at`.
    play_offset: Option<f64>,
    play_dur: Option<f64>,
    /// Duration resolved at start time, reused for repeats.
    resolved_dur: f64,
}

/// The injectable top-level context: engine, clocks, voices, registry.
pub struct Taktwerk {
    engine: Engine,
    clocks: Vec<Clock>,
    voices: HashMap<VoiceId, ActiveVoice>,
    registry: VoiceRegistry,

    queue: VecDeque<Pending>,
    tokens: HashMap<EventToken, Pending>,
    /// Voices parked until their sample buffer loads.
    waiting: Vec<VoiceId>,
    next_voice: u64,
}

impl Taktwerk {
    /// A headless context capturing stereo output at the given sample
    /// rate. The master clock (480 ticks per quarter) is created stopped.
    pub fn new(sample_rate: u32) -> Self {
        Self::with_engine(Engine::capture(sample_rate, 2))
    }

    /// A context playing through the system's default output device.
    #[cfg(feature = "cpal_sink")]
    pub fn default_output() -> Option<Self> {
        let device = CpalDevice::default_output()?;
        Some(Self::with_engine(Engine::realtime(&device)))
    }

    fn with_engine(engine: Engine) -> Self {
        Self {
            engine,
            clocks: vec![Clock::master()],
            voices: HashMap::new(),
            registry: VoiceRegistry::new(),
            queue: VecDeque::new(),
            tokens: HashMap::new(),
            waiting: Vec::new(),
            next_voice: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.engine.sample_rate()
    }

    /// Graph time in seconds.
    pub fn now(&self) -> f64 {
        self.engine.now()
    }

    // ----- clocks -----

    /// The master clock's id.
    pub fn master(&self) -> ClockId {
        ClockId(0)
    }

    /// Create a clock synced to the master's grid. It registers itself on
    /// the master's callback list and fires on its beat cadence once
    /// started.
    pub fn new_clock(&mut self, tempo: f64, subdivision: u32) -> ClockId {
        let mut clock = Clock::new(tempo, subdivision);
        clock.set_sync(true);
        let id = ClockId(self.clocks.len());
        self.clocks.push(clock);
        self.clocks[0].callbacks.push(CallbackEntry::Slave(id));
        id
    }

    pub fn clock(&self, id: ClockId) -> &Clock {
        &self.clocks[id.0]
    }

    pub fn clock_mut(&mut self, id: ClockId) -> &mut Clock {
        &mut self.clocks[id.0]
    }

    /// Register a tick callback on a clock.
    pub fn on_tick(&mut self, id: ClockId, f: TickFn) {
        self.clocks[id.0].register(f);
    }

    /// Register a named tick callback; duplicates are rejected.
    pub fn on_tick_named(&mut self, id: ClockId, name: &str, f: TickFn) -> bool {
        self.clocks[id.0].register_named(name, f)
    }

    /// Start a clock. Idempotent; an already-running clock is untouched.
    /// Synced slaves start firing on the master's next due beat, others
    /// issue their first tick immediately.
    pub fn start_clock(&mut self, id: ClockId) {
        let now = self.engine.now();
        let clock = &mut self.clocks[id.0];
        if clock.running {
            return;
        }
        clock.running = true;
        clock.started_at = now;
        clock.expected = 0.0;
        clock.drift = 0.0;
        if !(clock.is_sync() && id.0 != 0) {
            self.issue_tick(id);
        }
    }

    /// Stop future self-scheduling. An in-flight tick still completes and
    /// fires callbacks once more.
    pub fn stop_clock(&mut self, id: ClockId) {
        self.clocks[id.0].running = false;
    }

    fn issue_tick(&mut self, id: ClockId) {
        let (interval, base) = {
            let c = &self.clocks[id.0];
            (c.modulated_interval(), c.base_interval())
        };
        self.clocks[id.0].pending_interval = base;
        let (node, token) = self.engine.schedule_marker(interval);
        self.tokens.insert(token, Pending::MarkerEnd(id, node));
    }

    // ----- voices -----

    /// Queue a voice for playback. Returns immediately; the voice starts
    /// on the next block pump.
    pub fn play(&mut self, voice: Voice) -> VoiceId {
        self.play_at(voice, None, None)
    }

    /// Play with explicit start offset and/or duration overriding the
    /// voice's stored values.
    pub fn play_at(&mut self, voice: Voice, offset: Option<f64>, dur: Option<f64>) -> VoiceId {
        let id = VoiceId(self.next_voice);
        self.next_voice += 1;
        self.voices.insert(
            id,
            ActiveVoice {
                voice,
                state: VoiceState::Idle,
                compiled: None,
                play_offset: offset,
                play_dur: dur,
                resolved_dur: 0.0,
            },
        );
        self.queue.push_back(Pending::VoiceStart(id));
        id
    }

    /// Bind a voice to a clock and play it clock-paced: duration follows
    /// the clock's tick interval and the start defers into the clock's
    /// lookahead window.
    pub fn play_on(&mut self, voice: Voice, clock: ClockId) -> VoiceId {
        let mut voice = voice.auto_dur(true).lookahead(true);
        voice.clock = Some(clock);
        self.play(voice)
    }

    /// Stop a voice `delay` seconds from now: cancels scheduled automation
    /// from that point, stops the source, suppresses repeats, and
    /// deregisters. Safe on unknown or already-stopped ids.
    pub fn stop_voice(&mut self, id: VoiceId, delay: f64) {
        let delay = delay.max(0.0);
        let now = self.engine.now();
        let entry = match self.voices.get_mut(&id) {
            Some(e) => e,
            None => return,
        };
        entry.voice.repeat = 0;
        match entry.state {
            VoiceState::Playing => {
                let t = now + delay;
                if let Some(c) = entry.compiled.as_mut() {
                    for (i, sender) in c.senders.iter_mut().enumerate() {
                        let _ = sender.send(AutomationMessage::CancelAfter(t));
                        if i == 0 {
                            let _ = sender.send(AutomationMessage::StopAt(t));
                        }
                    }
                }
                entry.state = VoiceState::Stopping;
                let token = self.engine.after(delay);
                self.tokens.insert(token, Pending::VoiceStop(id));
            }
            VoiceState::Idle | VoiceState::WaitingSample | VoiceState::Scheduled => {
                // Not in the graph yet; the pending start will see this
                // and clean up.
                entry.state = VoiceState::Stopped;
                self.registry.remove(id);
            }
            _ => {}
        }
    }

    /// Stop every registered voice.
    pub fn stop_all(&mut self, delay: f64) {
        let ids: Vec<VoiceId> = self.registry.iter().collect();
        for id in ids {
            self.stop_voice(id, delay);
        }
    }

    /// Snap a named modulation target (a named gain stage) to a constant,
    /// cancelling its scheduled curve. Returns whether the target existed.
    pub fn modulate(&mut self, id: VoiceId, name: &str, value: f32) -> bool {
        if let Some(entry) = self.voices.get_mut(&id) {
            if let Some(c) = entry.compiled.as_mut() {
                if let Some(&idx) = c.named.get(name) {
                    let _ = c.senders[idx].send(AutomationMessage::SnapTo(value));
                    return true;
                }
            }
        }
        warn!(?id, name, "no such modulation target");
        false
    }

    pub fn active_voices(&self) -> usize {
        self.registry.len()
    }

    pub fn registry(&self) -> &VoiceRegistry {
        &self.registry
    }

    // ----- pump -----

    /// Advance roughly `seconds` of graph time.
    pub fn advance(&mut self, seconds: f64) {
        let frames = seconds * self.engine.sample_rate() as f64;
        let blocks = (frames / dasp_graph::Buffer::LEN as f64).ceil() as usize;
        self.advance_blocks(blocks);
    }

    pub fn advance_blocks(&mut self, blocks: usize) {
        for _ in 0..blocks {
            self.step_block();
        }
    }

    /// Interleaved output captured since the last call (capture mode).
    pub fn take_output(&mut self) -> Vec<f32> {
        self.engine.take_output()
    }

    /// Process one audio block, then drain the event queue to quiescence.
    pub fn step_block(&mut self) {
        self.poll_waiting();

        let fired = self.engine.process_block();
        for token in fired {
            if let Some(pending) = self.tokens.remove(&token) {
                self.queue.push_back(pending);
            }
        }

        while let Some(event) = self.queue.pop_front() {
            self.handle(event);
        }
    }

    fn poll_waiting(&mut self) {
        if self.waiting.is_empty() {
            return;
        }
        let mut still = Vec::new();
        for id in std::mem::take(&mut self.waiting) {
            let ready = match self.voices.get(&id) {
                Some(e) => match &e.voice.source {
                    SourceKind::Sample(s) => s.is_ready(),
                    _ => true,
                },
                None => continue,
            };
            if ready {
                if let Some(e) = self.voices.get_mut(&id) {
                    e.state = VoiceState::Idle;
                }
                debug!(?id, "deferred sample ready, retrying play");
                self.queue.push_back(Pending::VoiceStart(id));
            } else {
                still.push(id);
            }
        }
        self.waiting = still;
    }

    fn handle(&mut self, event: Pending) {
        match event {
            Pending::MarkerEnd(clock, node) => self.handle_marker_end(clock, node),
            Pending::VoiceStart(id) => self.handle_voice_start(id),
            Pending::VoiceLaunch(id) => self.handle_voice_launch(id),
            Pending::VoiceEnd(id) => self.handle_voice_end(id),
            Pending::VoiceStop(id) => self.handle_voice_stop(id),
        }
    }

    fn handle_marker_end(&mut self, id: ClockId, node: NodeId) {
        self.engine.remove(node);
        let now = self.engine.now();
        {
            let c = &mut self.clocks[id.0];
            c.expected += c.pending_interval;
            c.drift = (now - c.started_at) - c.expected;
        }

        // Dispatch with the list taken out so callbacks can borrow the
        // whole context. Registrations made during dispatch land in the
        // live list and are appended afterwards; clear/unregister calls
        // are recorded on the clock and applied on restore.
        let beat = self.clocks[id.0].beat;
        let subdivision = self.clocks[id.0].subdivision();
        let mut callbacks = self.clocks[id.0].begin_dispatch();
        for entry in callbacks.iter_mut() {
            match entry {
                CallbackEntry::User { f, .. } => f(self, id),
                CallbackEntry::Slave(slave) => self.slave_tick(*slave, beat, subdivision),
            }
        }
        self.clocks[id.0].finish_dispatch(callbacks);

        let c = &mut self.clocks[id.0];
        c.beat = (c.beat + 1) % c.ticks_per_measure();
        if c.running {
            self.issue_tick(id);
        }
    }

    fn slave_tick(&mut self, id: ClockId, master_beat: u32, master_subdivision: u32) {
        {
            let slave = &self.clocks[id.0];
            if !slave.is_sync()
                || !slave.is_running()
                || !slave.fires_on(master_beat, master_subdivision)
            {
                return;
            }
        }
        let mut callbacks = self.clocks[id.0].begin_dispatch();
        for entry in callbacks.iter_mut() {
            if let CallbackEntry::User { f, .. } = entry {
                f(self, id);
            }
        }
        self.clocks[id.0].finish_dispatch(callbacks);

        let c = &mut self.clocks[id.0];
        c.beat = (c.beat + 1) % c.ticks_per_measure();
    }

    fn handle_voice_start(&mut self, id: VoiceId) {
        let mut entry = match self.voices.remove(&id) {
            Some(e) => e,
            None => return,
        };
        if entry.state == VoiceState::Stopped {
            return;
        }

        // Deferred, never dropped: a pending sample parks the voice.
        if let SourceKind::Sample(s) = &entry.voice.source {
            if !s.is_ready() {
                debug!(?id, "sample pending, deferring play");
                entry.state = VoiceState::WaitingSample;
                self.voices.insert(id, entry);
                self.waiting.push(id);
                return;
            }
        }

        // Explicit argument beats auto-duration beats the stored default.
        let dur = match entry.play_dur {
            Some(d) => d,
            None if entry.voice.auto_dur => match entry.voice.clock {
                Some(c) => self.clocks[c.0].base_interval(),
                None => {
                    warn!(?id, "auto-duration without a bound clock, using stored duration");
                    entry.voice.dur
                }
            },
            None => entry.voice.dur,
        };
        if !(dur.is_finite() && dur > 0.0) {
            warn!(?id, dur, "rejecting play with invalid duration");
            return;
        }
        entry.resolved_dur = dur;

        self.registry.add(id);
        entry.state = VoiceState::Scheduled;

        if entry.voice.lookahead {
            let lookahead = entry
                .voice
                .clock
                .map(|c| self.clocks[c.0].lookahead_secs())
                .unwrap_or(0.05);
            let token = self.engine.after(lookahead);
            self.tokens.insert(token, Pending::VoiceLaunch(id));
        } else {
            self.queue.push_back(Pending::VoiceLaunch(id));
        }
        self.voices.insert(id, entry);
    }

    fn handle_voice_launch(&mut self, id: VoiceId) {
        let mut entry = match self.voices.remove(&id) {
            Some(e) => e,
            None => return,
        };
        if entry.state == VoiceState::Stopped {
            return;
        }

        let offset = entry.play_offset.unwrap_or(entry.voice.offset);
        match voice::launch(&entry.voice, &mut self.engine, offset, entry.resolved_dur) {
            Ok(compiled) => {
                self.tokens.insert(compiled.end_watch, Pending::VoiceEnd(id));
                entry.compiled = Some(compiled);
                entry.state = VoiceState::Playing;
                self.voices.insert(id, entry);
            }
            Err(e) => {
                // Backend failure: deregister, suppress repeat, drop.
                warn!(?id, error = %e, "voice launch failed");
                self.registry.remove(id);
            }
        }
    }

    fn teardown(&mut self, compiled: CompiledVoice) {
        self.tokens.remove(&compiled.end_watch);
        for node in compiled.nodes {
            self.engine.remove(node);
        }
    }

    fn handle_voice_end(&mut self, id: VoiceId) {
        let mut entry = match self.voices.remove(&id) {
            Some(e) => e,
            None => return,
        };
        let natural = entry.state == VoiceState::Playing;
        if let Some(compiled) = entry.compiled.take() {
            self.teardown(compiled);
        }
        self.registry.remove(id);

        // Repeats only follow a natural, uncancelled completion.
        if natural && entry.voice.repeat > 0 {
            entry.voice.repeat -= 1;
            entry.state = VoiceState::Idle;
            debug!(?id, remaining = entry.voice.repeat, "voice repeating");
            self.voices.insert(id, entry);
            self.queue.push_back(Pending::VoiceStart(id));
        } else {
            entry.state = VoiceState::Completed;
            debug!(?id, "voice completed");
        }
    }

    fn handle_voice_stop(&mut self, id: VoiceId) {
        let mut entry = match self.voices.remove(&id) {
            Some(e) => e,
            None => return,
        };
        if let Some(compiled) = entry.compiled.take() {
            self.teardown(compiled);
        }
        self.registry.remove(id);
        debug!(?id, "voice stopped");
    }
}
