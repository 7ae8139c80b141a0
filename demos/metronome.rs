//! Four-on-the-floor metronome with an accented downbeat
//!
//! Run with: cargo run --example metronome --features cpal_sink

use std::thread::sleep;
use std::time::{Duration, Instant};

use taktwerk::{Taktwerk, Voice};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut tw = Taktwerk::default_output().ok_or("No audio device")?;

    let clock = tw.new_clock(120.0, 4);
    tw.clock_mut(clock).set_sync(false);

    tw.on_tick(
        clock,
        Box::new(|tw, id| {
            let downbeat = tw.clock(id).when(&[0]);
            let beat = tw.clock(id).beat();
            println!("beat {}", beat);

            let blip = Voice::new()
                .freq(vec![if downbeat { 1760.0 } else { 880.0 }])
                .amp(vec![0.8, 0.0])
                .dur(0.08);
            tw.play(blip);
        }),
    );

    tw.start_clock(clock);

    println!("Ticking... Ctrl+C to stop");

    let start = Instant::now();
    let rate = tw.sample_rate() as f64;
    let mut blocks = 0u64;

    loop {
        let target = (start.elapsed().as_secs_f64() * rate / 64.0) as u64 + 6; // 6 blocks buffer
        while blocks < target {
            tw.step_block();
            blocks += 1;
        }
        sleep(Duration::from_micros(500));
    }
}
