//! Voices and the chain compiler
//!
//! A [`Voice`] is a declarative description of one sound event: a source,
//! parameter curves, an effect chain, and timing flags. Nothing touches the
//! audio graph until the owning context plays it; [`launch`] then compiles
//! the description into graph nodes, in one of two shapes:
//!
//! - **Direct**: source -> amp -> post stages -> pan -> out, built straight
//!   in the realtime graph.
//! - **Rendered**: when pre stages, buffer transforms, or a noise source
//!   are involved, the source/amp/pre-stage chain is first rendered offline
//!   into a buffer, the buffer transforms rewrite it in place, and the
//!   realtime graph only ever sees a buffer source feeding the post chain.
//!   The realtime graph never observes a partially rendered buffer.

use std::sync::{Arc, OnceLock};

use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::clock::ClockId;
use crate::curve::{mtof, Curve, CurveProvider, CurveSource, Interp, ParamTarget};
use crate::engine::{render_offline, Engine, EventToken};
use crate::graph::{AudioGraph, NodeHandle};
use crate::node::NodeId;
use crate::nodes::effect::{Biquad, Delay, FilterKind, Gain, Panner};
use crate::nodes::sink::CaptureSink;
use crate::nodes::source::{sine_table, white_noise, TableSource};
use crate::param::{AutomationMessage, Param};
use crate::stage::{bit_quantize, sample_hold, Placement, Stage, StageKind};
use crate::Error;

/// Default wavetable length; frequency curves map to playback rate as
/// `freq * table_len / sample_rate`.
pub(crate) const DEFAULT_TABLE_LEN: usize = 8192;

/// Identifies a playing (or queued) voice within a context.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct VoiceId(pub(crate) u64);

/// A sample buffer that may still be loading. `play` on a voice whose
/// sample is pending is deferred, not dropped; the context polls
/// [`SharedSample::is_ready`] and retries.
#[derive(Clone, Debug)]
pub struct SharedSample {
    data: Arc<OnceLock<Vec<f32>>>,
}

impl SharedSample {
    /// A sample slot that a loader will fill later.
    pub fn pending() -> Self {
        Self {
            data: Arc::new(OnceLock::new()),
        }
    }

    /// A sample that is already loaded.
    pub fn ready(data: Vec<f32>) -> Self {
        let slot = OnceLock::new();
        let _ = slot.set(data);
        Self { data: Arc::new(slot) }
    }

    /// Fill the slot. Returns false if it was already filled.
    pub fn fill(&self, data: Vec<f32>) -> bool {
        self.data.set(data).is_ok()
    }

    pub fn is_ready(&self) -> bool {
        self.data.get().is_some()
    }

    pub fn get(&self) -> Option<&[f32]> {
        self.data.get().map(|v| v.as_slice())
    }
}

/// What a voice sounds like before any processing.
#[derive(Clone, Debug)]
pub enum SourceKind {
    /// Default sine wavetable.
    Sine,
    /// Looped white noise. Always takes the rendered path.
    Noise,
    /// A caller-provided single-cycle wavetable.
    Wavetable(Vec<f32>),
    /// An externally loaded sample buffer, played once at unit rate.
    Sample(SharedSample),
}

/// Lifecycle of a playing voice, advanced by the owning context.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VoiceState {
    Idle,
    /// Deferred until its sample buffer loads.
    WaitingSample,
    /// Queued behind a lookahead timer.
    Scheduled,
    Playing,
    Stopping,
    Stopped,
    Completed,
}

/// A declarative sound event.
pub struct Voice {
    pub(crate) source: SourceKind,
    pub(crate) amp: CurveSource,
    pub(crate) freq: CurveSource,
    pub(crate) pan: CurveSource,
    pub(crate) stages: Vec<Stage>,

    pub(crate) dur: f64,
    pub(crate) auto_dur: bool,
    pub(crate) offset: f64,
    pub(crate) repeat: u32,
    pub(crate) lookahead: bool,
    pub(crate) continuous: bool,
    pub(crate) interp: Interp,
    pub(crate) clock: Option<ClockId>,
}

impl Default for Voice {
    fn default() -> Self {
        Self::new()
    }
}

impl Voice {
    /// A sine voice with unity amplitude, 440 Hz, centered pan, one second
    /// long.
    pub fn new() -> Self {
        Self {
            source: SourceKind::Sine,
            amp: CurveSource::Values(Curve::constant(1.0)),
            freq: CurveSource::Values(Curve::constant(440.0)),
            pan: CurveSource::Values(Curve::constant(0.0)),
            stages: Vec::new(),
            dur: 1.0,
            auto_dur: false,
            offset: 0.0,
            repeat: 0,
            lookahead: false,
            continuous: false,
            interp: Interp::Linear,
            clock: None,
        }
    }

    pub fn source(mut self, source: SourceKind) -> Self {
        match &source {
            SourceKind::Wavetable(w) if w.is_empty() => {
                warn!("empty wavetable, falling back to sine");
                self.source = SourceKind::Sine;
            }
            _ => self.source = source,
        }
        self
    }

    /// Store a curve for one parameter. Values are kept verbatim until the
    /// voice compiles; lazy sources are invoked at compile time.
    pub fn curve(mut self, target: ParamTarget, source: impl Into<CurveSource>) -> Self {
        let source = source.into();
        match target {
            ParamTarget::Amplitude => self.amp = source,
            ParamTarget::Frequency => self.freq = source,
            ParamTarget::Pan => self.pan = source,
        }
        self
    }

    /// A curve generated fresh each time the voice compiles.
    pub fn curve_lazy(
        self,
        target: ParamTarget,
        f: impl Fn() -> Curve + Send + 'static,
    ) -> Self {
        self.curve(target, CurveSource::Lazy(Box::new(f)))
    }

    pub fn amp(self, c: impl Into<CurveSource>) -> Self {
        self.curve(ParamTarget::Amplitude, c)
    }

    pub fn freq(self, c: impl Into<CurveSource>) -> Self {
        self.curve(ParamTarget::Frequency, c)
    }

    pub fn pan(self, c: impl Into<CurveSource>) -> Self {
        self.curve(ParamTarget::Pan, c)
    }

    /// Pitch as MIDI note numbers; converted to a frequency curve.
    pub fn notenum(self, c: impl Into<Curve>) -> Self {
        let freq = c.into().map(mtof);
        self.curve(ParamTarget::Frequency, freq)
    }

    /// Pull curves from an external provider for every target it covers.
    pub fn curves_from(mut self, provider: &impl CurveProvider) -> Self {
        for target in [ParamTarget::Amplitude, ParamTarget::Frequency, ParamTarget::Pan] {
            if let Some(curve) = provider.curve(target) {
                self = self.curve(target, curve);
            }
        }
        self
    }

    /// Event duration in seconds. Non-positive values are rejected and the
    /// previous duration kept.
    pub fn dur(mut self, secs: f64) -> Self {
        if secs.is_finite() && secs > 0.0 {
            self.dur = secs;
            self.auto_dur = false;
        } else {
            warn!(secs, "rejecting invalid duration, keeping {}", self.dur);
        }
        self
    }

    /// Derive duration from the bound clock's tick interval at play time.
    pub fn auto_dur(mut self, auto: bool) -> Self {
        self.auto_dur = auto;
        self
    }

    pub fn offset(mut self, secs: f64) -> Self {
        if secs.is_finite() && secs >= 0.0 {
            self.offset = secs;
        } else {
            warn!(secs, "rejecting invalid offset");
        }
        self
    }

    /// Extra plays after the first; each natural completion decrements.
    pub fn repeat(mut self, count: u32) -> Self {
        self.repeat = count;
        self
    }

    /// Defer the start into the bound clock's lookahead window.
    pub fn lookahead(mut self, lookahead: bool) -> Self {
        self.lookahead = lookahead;
        self
    }

    /// Force every curve to apply as a continuous ramp regardless of
    /// length.
    pub fn continuous(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }

    /// Interpolation used when refitting curves.
    pub fn interp(mut self, interp: Interp) -> Self {
        self.interp = interp;
        self
    }

    /// Refit all eager curves to a common length. Fitting a curve to its
    /// own length leaves it untouched; lazy curves are left for compile
    /// time.
    pub fn fit_curves(mut self, len: usize) -> Self {
        for slot in [&mut self.amp, &mut self.freq, &mut self.pan] {
            if let CurveSource::Values(c) = slot {
                *slot = CurveSource::Values(c.fit(len, self.interp));
            }
        }
        self
    }

    /// Append an effect stage. Order within each placement is preserved.
    pub fn effect(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn gain(self, mult: impl Into<Curve>) -> Self {
        self.effect(Stage::gain(mult))
    }

    /// A named gain stage, addressable for live modulation. Always placed
    /// post so it stays live.
    pub fn gain_named(self, name: &str, mult: impl Into<Curve>) -> Self {
        self.effect(Stage::gain_named(name, mult).post())
    }

    pub fn lpf(self, freq: impl Into<Curve>, q: impl Into<Curve>) -> Self {
        self.effect(Stage::low_pass(freq, q))
    }

    pub fn hpf(self, freq: impl Into<Curve>, q: impl Into<Curve>) -> Self {
        self.effect(Stage::high_pass(freq, q))
    }

    pub fn bpf(self, freq: impl Into<Curve>, q: impl Into<Curve>) -> Self {
        self.effect(Stage::band_pass(freq, q))
    }

    pub fn apf(self, freq: impl Into<Curve>, q: impl Into<Curve>) -> Self {
        self.effect(Stage::all_pass(freq, q))
    }

    pub fn delay(
        self,
        mix: impl Into<Curve>,
        time: impl Into<Curve>,
        feedback: impl Into<Curve>,
    ) -> Self {
        self.effect(Stage::delay(mix, time, feedback))
    }

    pub fn bitcrush(self, bits: impl Into<Curve>) -> Self {
        self.effect(Stage::bit_quantizer(bits))
    }

    pub fn samplehold(self, samples: impl Into<Curve>) -> Self {
        self.effect(Stage::sample_hold(samples))
    }

    pub fn stored_duration(&self) -> f64 {
        self.dur
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat
    }

    fn resolve(&self, source: &CurveSource, fallback: f32, what: &str) -> Curve {
        let curve = source.resolve();
        if curve.is_empty() {
            warn!(what, "empty curve, using fallback {}", fallback);
            Curve::constant(fallback)
        } else {
            curve
        }
    }

    fn amp_curve(&self) -> Curve {
        self.resolve(&self.amp, 1.0, "amplitude")
    }

    fn freq_curve(&self) -> Curve {
        self.resolve(&self.freq, 440.0, "frequency")
    }

    fn pan_curve(&self) -> Curve {
        self.resolve(&self.pan, 0.0, "pan")
    }

    /// Frequency curve mapped to table playback rate. Sample sources play
    /// at unit rate; noise keeps the default table length for the mapping
    /// even though its table is longer.
    fn rate_curve(&self, sample_rate: u32) -> Curve {
        let table_len = match &self.source {
            SourceKind::Sample(_) => return Curve::constant(1.0),
            SourceKind::Wavetable(w) if !w.is_empty() => w.len(),
            _ => DEFAULT_TABLE_LEN,
        };
        self.freq_curve()
            .map(|f| f * table_len as f32 / sample_rate as f32)
    }

    fn table(&self, sample_rate: u32) -> Arc<Vec<f32>> {
        match &self.source {
            SourceKind::Sine => Arc::new(sine_table(DEFAULT_TABLE_LEN)),
            SourceKind::Noise => Arc::new(white_noise(sample_rate)),
            SourceKind::Wavetable(w) => Arc::new(w.clone()),
            SourceKind::Sample(s) => match s.get() {
                Some(data) => Arc::new(data.to_vec()),
                None => {
                    warn!("sample not loaded at compile time, falling back to sine");
                    Arc::new(sine_table(DEFAULT_TABLE_LEN))
                }
            },
        }
    }

    /// Whether this voice must go through the offline render: pre stages
    /// and buffer transforms are baked, and noise tables are generated
    /// offline.
    pub(crate) fn needs_render(&self) -> bool {
        matches!(self.source, SourceKind::Noise)
            || self.stages.iter().any(|s| {
                s.is_buffer_transform() || s.placement() == Placement::Pre
            })
    }
}

/// The graph-side remains of a launched voice.
pub(crate) struct CompiledVoice {
    /// Every realtime node, for teardown.
    pub(crate) nodes: Vec<NodeId>,
    /// Message senders for the whole chain; index 0 is the source.
    pub(crate) senders: Vec<NodeHandle<AutomationMessage>>,
    /// Named modulation targets, as indices into `senders`.
    pub(crate) named: HashMap<String, usize>,
    pub(crate) source: NodeId,
    pub(crate) end_watch: EventToken,
    pub(crate) from_rendered: bool,
    pub(crate) rendered_frames: Option<usize>,
}

/// Schedule curve values into an automation lane. Long curves (over 25% of
/// the duration at one value per sample) apply as a continuous ramp,
/// short ones as discrete set-points spread over the duration.
fn apply_curve(
    param: &mut Param,
    curve: &Curve,
    start: f64,
    dur: f64,
    sample_rate: u32,
    continuous: bool,
) {
    let n = curve.len();
    if n == 0 {
        return;
    }
    if continuous || (n as f64 / sample_rate as f64) > dur * 0.25 {
        param.ramp(curve.values().to_vec(), start, dur);
    } else {
        for (i, &v) in curve.values().iter().enumerate() {
            param.set_at(v, start + i as f64 / n as f64 * dur);
        }
    }
}

fn first(curve: &Curve, fallback: f32) -> f32 {
    curve.values().first().copied().unwrap_or(fallback)
}

/// Build one stage as a graph node with its curves scheduled. Buffer
/// transforms return None; they never become nodes.
fn add_stage(
    graph: &mut AudioGraph,
    stage: &Stage,
    start: f64,
    dur: f64,
    continuous: bool,
) -> Option<(NodeHandle<AutomationMessage>, Option<String>)> {
    let sr = graph.sample_rate();
    let filter = |kind: FilterKind, freq: &Curve, q: &Curve, graph: &mut AudioGraph| {
        let mut node = Biquad::new(kind, first(freq, 30.0), first(q, 1.0));
        apply_curve(node.freq_mut(), freq, start, dur, sr, continuous);
        apply_curve(node.q_mut(), q, start, dur, sr, continuous);
        graph.add(node)
    };

    match stage.kind() {
        StageKind::Gain { mult, name } => {
            let mut node = Gain::new(first(mult, 1.0));
            apply_curve(node.level_mut(), mult, start, dur, sr, continuous);
            Some((graph.add(node), name.clone()))
        }
        StageKind::LowPass { freq, q } => {
            Some((filter(FilterKind::LowPass, freq, q, graph), None))
        }
        StageKind::HighPass { freq, q } => {
            Some((filter(FilterKind::HighPass, freq, q, graph), None))
        }
        StageKind::BandPass { freq, q } => {
            Some((filter(FilterKind::BandPass, freq, q, graph), None))
        }
        StageKind::AllPass { freq, q } => {
            Some((filter(FilterKind::AllPass, freq, q, graph), None))
        }
        StageKind::Delay { mix, time, feedback } => {
            let mut node = Delay::new(
                first(mix, 0.5),
                first(time, 0.3),
                first(feedback, 0.5),
                sr,
            );
            apply_curve(node.mix_mut(), mix, start, dur, sr, continuous);
            apply_curve(node.time_mut(), time, start, dur, sr, continuous);
            apply_curve(node.feedback_mut(), feedback, start, dur, sr, continuous);
            Some((graph.add(node), None))
        }
        StageKind::BitQuantizer { .. } | StageKind::SampleHold { .. } => None,
    }
}

/// Compile a voice into the engine's graph. `offset` is seconds from now;
/// duration has already been resolved by the caller.
pub(crate) fn launch(
    voice: &Voice,
    engine: &mut Engine,
    offset: f64,
    dur: f64,
) -> Result<CompiledVoice, Error> {
    if !(dur.is_finite() && dur > 0.0) {
        return Err(Error::InvalidDuration(dur));
    }
    if voice.needs_render() {
        launch_rendered(voice, engine, offset, dur)
    } else {
        launch_direct(voice, engine, offset, dur)
    }
}

/// The direct path: every node lives in the realtime graph.
fn launch_direct(
    voice: &Voice,
    engine: &mut Engine,
    offset: f64,
    dur: f64,
) -> Result<CompiledVoice, Error> {
    let sr = engine.sample_rate();
    let now = engine.now();
    let t0 = now + offset;

    let looping = !matches!(voice.source, SourceKind::Sample(_));
    let mut src = TableSource::new(voice.table(sr))
        .looping(looping)
        .window(t0, t0 + dur);
    apply_curve(src.rate_mut(), &voice.rate_curve(sr), t0, dur, sr, voice.continuous);
    let src = engine.add(src);
    let source_id = src.id();

    let mut nodes = vec![source_id];
    let mut senders = vec![src];
    let mut named = HashMap::new();

    let amp_curve = voice.amp_curve();
    let mut amp = Gain::new(first(&amp_curve, 1.0));
    apply_curve(amp.level_mut(), &amp_curve, t0, dur, sr, voice.continuous);
    let amp = engine.add(amp);
    engine.connect(source_id, amp.id());
    let mut prev = amp.id();
    nodes.push(amp.id());
    senders.push(amp);

    for stage in &voice.stages {
        if let Some((handle, name)) = add_stage(engine.graph_mut(), stage, t0, dur, voice.continuous) {
            engine.connect(prev, handle.id());
            prev = handle.id();
            nodes.push(handle.id());
            if let Some(n) = name {
                named.insert(n, senders.len());
            }
            senders.push(handle);
        }
    }

    let (pan_id, out_id) = finish_chain(voice, engine, prev, t0, dur, &mut nodes, &mut senders);
    engine.connect(pan_id, out_id);
    engine.connect_to_sink(out_id);

    let end_watch = engine.watch(source_id);
    debug!(?source_id, "voice launched direct");

    Ok(CompiledVoice {
        nodes,
        senders,
        named,
        source: source_id,
        end_watch,
        from_rendered: false,
        rendered_frames: None,
    })
}

/// The rendered path: offline graph first, buffer transforms, then the
/// realtime handoff.
fn launch_rendered(
    voice: &Voice,
    engine: &mut Engine,
    offset: f64,
    dur: f64,
) -> Result<CompiledVoice, Error> {
    let sr = engine.sample_rate();

    // Offline pass. The graph's own timeline starts at zero; the source
    // plays its window at `offset` so the buffer carries the offset head.
    let mut graph = AudioGraph::new(sr);
    let (sink, mut consumer) = CaptureSink::new(1, 8192);
    let sink = graph.add(sink);
    let sink_id = sink.id();
    graph.set_terminal(sink_id);

    let t0 = offset;
    let mut src = TableSource::new(voice.table(sr))
        .looping(true)
        .window(t0, t0 + dur);
    apply_curve(src.rate_mut(), &voice.rate_curve(sr), t0, dur, sr, voice.continuous);
    let src = graph.add(src);

    let amp_curve = voice.amp_curve();
    let mut amp = Gain::new(first(&amp_curve, 1.0));
    apply_curve(amp.level_mut(), &amp_curve, t0, dur, sr, voice.continuous);
    let amp = graph.add(amp);
    graph.connect(src.id(), amp.id());

    let mut prev = amp.id();
    for stage in &voice.stages {
        if stage.placement() != Placement::Pre || stage.is_buffer_transform() {
            continue;
        }
        if let Some((handle, _)) = add_stage(&mut graph, stage, t0, dur, voice.continuous) {
            graph.connect(prev, handle.id());
            prev = handle.id();
        }
    }

    // Headroom for the baked chain.
    let out = graph.add(Gain::new(0.3));
    graph.connect(prev, out.id());
    graph.connect(out.id(), sink_id);

    let frames = ((offset + 4.0 * dur) * sr as f64).round() as u64;
    let mut rendered = render_offline(&mut graph, &mut consumer, frames)?;

    for stage in &voice.stages {
        match stage.kind() {
            StageKind::BitQuantizer { bits } => bit_quantize(&mut rendered, bits, dur, sr),
            StageKind::SampleHold { samples } => sample_hold(&mut rendered, samples, dur, sr),
            _ => {}
        }
    }
    debug!(frames = rendered.len(), "offline render complete");

    // Realtime handoff: the rendered buffer plays once from its start, so
    // the audible onset stays at now + offset.
    let now = engine.now();
    let t_post = now + offset;
    let rendered_frames = rendered.len();

    let rt_src = TableSource::new(Arc::new(rendered))
        .looping(false)
        .window(now, f64::INFINITY);
    let rt_src = engine.add(rt_src);
    let source_id = rt_src.id();

    let mut nodes = vec![source_id];
    let mut senders = vec![rt_src];
    let mut named = HashMap::new();
    let mut prev = source_id;

    for stage in &voice.stages {
        if stage.placement() != Placement::Post || stage.is_buffer_transform() {
            continue;
        }
        if let Some((handle, name)) =
            add_stage(engine.graph_mut(), stage, t_post, dur, voice.continuous)
        {
            engine.connect(prev, handle.id());
            prev = handle.id();
            nodes.push(handle.id());
            if let Some(n) = name {
                named.insert(n, senders.len());
            }
            senders.push(handle);
        }
    }

    let (pan_id, out_id) = finish_chain(voice, engine, prev, t_post, dur, &mut nodes, &mut senders);
    engine.connect(pan_id, out_id);
    engine.connect_to_sink(out_id);

    let end_watch = engine.watch(source_id);
    debug!(?source_id, "voice launched from rendered buffer");

    Ok(CompiledVoice {
        nodes,
        senders,
        named,
        source: source_id,
        end_watch,
        from_rendered: true,
        rendered_frames: Some(rendered_frames),
    })
}

/// Append the shared chain tail: pan, then the stereo output gain. Returns
/// (pan, out) node ids; the caller wires pan -> out -> sink.
fn finish_chain(
    voice: &Voice,
    engine: &mut Engine,
    prev: NodeId,
    start: f64,
    dur: f64,
    nodes: &mut Vec<NodeId>,
    senders: &mut Vec<NodeHandle<AutomationMessage>>,
) -> (NodeId, NodeId) {
    let sr = engine.sample_rate();

    let pan_curve = voice.pan_curve();
    let mut pan = Panner::new(first(&pan_curve, 0.0));
    apply_curve(pan.pan_mut(), &pan_curve, start, dur, sr, voice.continuous);
    let pan = engine.add(pan);
    let pan_id = pan.id();
    engine.connect(prev, pan_id);
    nodes.push(pan_id);
    senders.push(pan);

    let out = engine.add(Gain::new(1.0).with_channels(2));
    let out_id = out.id();
    nodes.push(out_id);
    senders.push(out);

    (pan_id, out_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let v = Voice::new();
        assert!(matches!(v.source, SourceKind::Sine));
        assert_eq!(v.amp_curve().values(), &[1.0]);
        assert_eq!(v.freq_curve().values(), &[440.0]);
        assert_eq!(v.pan_curve().values(), &[0.0]);
        assert_eq!(v.dur, 1.0);
        assert_eq!(v.repeat, 0);
        assert!(!v.needs_render());
    }

    #[test]
    fn notenum_maps_to_frequency() {
        let v = Voice::new().notenum(vec![69.0, 81.0]);
        let freq = v.freq_curve();
        assert!((freq.values()[0] - 440.0).abs() < 1e-3);
        assert!((freq.values()[1] - 880.0).abs() < 1e-2);
    }

    #[test]
    fn empty_wavetable_falls_back_to_sine() {
        let v = Voice::new().source(SourceKind::Wavetable(vec![]));
        assert!(matches!(v.source, SourceKind::Sine));
    }

    #[test]
    fn invalid_duration_keeps_previous() {
        let v = Voice::new().dur(2.0).dur(-1.0).dur(f64::NAN);
        assert_eq!(v.dur, 2.0);
    }

    #[test]
    fn rate_curve_scales_by_table_length() {
        let v = Voice::new().freq(vec![440.0]);
        let rate = v.rate_curve(44100);
        let expected = 440.0 * DEFAULT_TABLE_LEN as f32 / 44100.0;
        assert!((rate.values()[0] - expected).abs() < 1e-4);

        let sample = Voice::new().source(SourceKind::Sample(SharedSample::ready(vec![0.0; 64])));
        assert_eq!(sample.rate_curve(44100).values(), &[1.0]);
    }

    #[test]
    fn short_curves_apply_as_set_points() {
        let mut p = Param::new(0.0);
        // 2 points over 1s at 44100 Hz is far under the 25% threshold.
        apply_curve(&mut p, &Curve::new(vec![0.0, 1.0]), 0.0, 1.0, 44100, false);
        assert_eq!(p.value_at(0.25), 0.0);
        assert_eq!(p.value_at(0.75), 1.0);
    }

    #[test]
    fn long_or_forced_curves_apply_as_ramps() {
        let mut p = Param::new(0.0);
        apply_curve(&mut p, &Curve::new(vec![0.0, 1.0]), 0.0, 1.0, 44100, true);
        assert!((p.value_at(0.5) - 0.5).abs() < 1e-3);

        // A curve longer than 25% of the duration in samples ramps too.
        let mut p = Param::new(0.0);
        let long: Vec<f32> = (0..30).map(|i| i as f32 / 29.0).collect();
        apply_curve(&mut p, &Curve::new(long), 0.0, 0.01, 8000, false);
        assert!((p.value_at(0.005) - 0.5).abs() < 0.1);
    }

    #[test]
    fn pre_stage_forces_offline_render() {
        let mut engine = Engine::capture(8000, 2);
        let voice = Voice::new()
            .freq(vec![220.0])
            .effect(Stage::low_pass(1000.0, 1.0).pre())
            .gain(0.8);
        let compiled = launch(&voice, &mut engine, 0.0, 0.5).unwrap();
        assert!(compiled.from_rendered);
        // (offset + 4 * dur) * sr frames.
        assert_eq!(compiled.rendered_frames, Some(16000));
    }

    #[test]
    fn plain_voice_launches_direct() {
        let mut engine = Engine::capture(8000, 2);
        let voice = Voice::new().gain_named("lead", 0.5);
        let compiled = launch(&voice, &mut engine, 0.0, 0.5).unwrap();
        assert!(!compiled.from_rendered);
        assert!(compiled.named.contains_key("lead"));
    }

    #[test]
    fn rejects_bad_duration() {
        let mut engine = Engine::capture(8000, 2);
        let voice = Voice::new();
        assert!(launch(&voice, &mut engine, 0.0, 0.0).is_err());
        assert!(launch(&voice, &mut engine, 0.0, f64::NAN).is_err());
    }
}
