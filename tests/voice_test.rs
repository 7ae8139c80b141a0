use taktwerk::{SharedSample, SourceKind, Stage, Taktwerk, Voice};

const SR: u32 = 8000;

/// Frames where either channel is audible, in interleaved stereo output.
fn audible_frames(out: &[f32]) -> usize {
    out.chunks(2)
        .filter(|f| f.iter().any(|s| s.abs() > 1e-5))
        .count()
}

fn rms(out: &[f32]) -> f64 {
    if out.is_empty() {
        return 0.0;
    }
    let sum: f64 = out.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / out.len() as f64).sqrt()
}

#[test]
fn stop_before_start_produces_nothing() {
    let mut tw = Taktwerk::new(SR);
    let id = tw.play(Voice::new().dur(0.25));
    tw.stop_voice(id, 0.0);
    tw.advance(0.5);

    assert_eq!(tw.active_voices(), 0);
    assert!(tw.take_output().iter().all(|&s| s == 0.0));
}

/// repeat(2) means two extra plays: three windows of sound back to back,
/// then the voice completes and leaves the registry.
#[test]
fn repeat_plays_again_after_natural_end() {
    let mut tw = Taktwerk::new(SR);
    tw.play(Voice::new().dur(0.1).repeat(2));
    tw.advance(1.5);

    let out = tw.take_output();
    let audible = audible_frames(&out);
    let expected = 3 * (0.1 * SR as f64) as usize;
    assert!(
        audible > expected - 50 && audible < expected + 50,
        "audible {} expected about {}",
        audible,
        expected
    );
    assert_eq!(tw.active_voices(), 0);
}

#[test]
fn pre_filter_is_baked_into_the_render() {
    let run = |voice: Voice| {
        let mut tw = Taktwerk::new(SR);
        tw.play(voice);
        tw.advance(1.5);
        rms(&tw.take_output())
    };

    // Both chains take the offline path so headroom matches; only the
    // filter differs.
    let filtered = run(
        Voice::new()
            .freq(vec![880.0])
            .dur(0.25)
            .effect(Stage::low_pass(110.0, 1.0).pre()),
    );
    let plain = run(
        Voice::new()
            .freq(vec![880.0])
            .dur(0.25)
            .effect(Stage::gain(1.0).pre()),
    );

    assert!(plain > 0.01, "plain rms {}", plain);
    assert!(
        filtered < plain * 0.2,
        "filtered {} not attenuated vs {}",
        filtered,
        plain
    );
}

#[test]
fn pending_sample_defers_until_loaded() {
    let mut tw = Taktwerk::new(SR);
    let sample = SharedSample::pending();
    tw.play(
        Voice::new()
            .source(SourceKind::Sample(sample.clone()))
            .dur(0.1),
    );

    tw.advance(0.2);
    assert_eq!(tw.active_voices(), 0);
    assert!(tw.take_output().iter().all(|&s| s == 0.0));

    assert!(sample.fill(vec![0.5; 1600]));
    tw.advance(0.5);

    let out = tw.take_output();
    let audible = audible_frames(&out);
    assert!(audible > 750 && audible < 850, "audible {}", audible);
    assert_eq!(tw.active_voices(), 0);
}

#[test]
fn stop_all_silences_every_voice() {
    let mut tw = Taktwerk::new(SR);
    for _ in 0..3 {
        tw.play(Voice::new().dur(2.0));
    }
    tw.advance(0.2);
    assert_eq!(tw.active_voices(), 3);

    tw.stop_all(0.0);
    tw.take_output();
    tw.advance(0.2);

    assert_eq!(tw.active_voices(), 0);
    assert!(tw.take_output().iter().all(|&s| s.abs() < 1e-6));
}

#[test]
fn modulate_snaps_a_named_gain() {
    let mut tw = Taktwerk::new(SR);
    let id = tw.play(Voice::new().dur(1.0).gain_named("lead", 1.0));
    tw.advance(0.2);
    assert!(rms(&tw.take_output()) > 0.01);

    assert!(tw.modulate(id, "lead", 0.0));
    assert!(!tw.modulate(id, "nope", 0.0));

    tw.advance(0.2);
    assert!(tw.take_output().iter().all(|&s| s.abs() < 1e-6));
    // The voice is muted, not stopped.
    assert_eq!(tw.active_voices(), 1);
}

/// play_on derives duration from the clock's tick interval and defers the
/// launch into its lookahead window.
#[test]
fn clock_paced_voice_uses_tick_interval() {
    let mut tw = Taktwerk::new(SR);
    let clock = tw.new_clock(240.0, 4);
    tw.play_on(Voice::new(), clock);

    // Still inside the 50ms lookahead window.
    tw.advance(0.03);
    assert!(tw.take_output().iter().all(|&s| s == 0.0));

    tw.advance(2.0);
    let out = tw.take_output();
    let audible = audible_frames(&out);
    // One tick at 240 BPM, subdivision 4 is 0.25s.
    let expected = (0.25 * SR as f64) as usize;
    assert!(
        audible > expected - 50 && audible < expected + 50,
        "audible {} expected about {}",
        audible,
        expected
    );
    assert_eq!(tw.active_voices(), 0);
}
