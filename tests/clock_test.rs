use std::cell::RefCell;
use std::rc::Rc;

use taktwerk::Taktwerk;

const SR: u32 = 8000;
const BLOCK: usize = 64;

/// A tick at 120 BPM, subdivision 4 spans 0.5s = 4000 frames, which the
/// 64-frame block pump rounds up to 63 blocks. Beats count 0,1,2,3 on the
/// default 4/4 grid, and the quantization shows up as positive drift.
#[test]
fn ticks_land_on_the_grid() {
    let mut tw = Taktwerk::new(SR);
    let clock = tw.new_clock(120.0, 4);
    tw.clock_mut(clock).set_sync(false);

    let log: Rc<RefCell<Vec<(u32, f64)>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    tw.on_tick(
        clock,
        Box::new(move |tw, id| {
            sink.borrow_mut().push((tw.clock(id).beat(), tw.now()));
        }),
    );

    tw.start_clock(clock);
    tw.advance_blocks(260);

    let log = log.borrow();
    let beats: Vec<u32> = log.iter().map(|&(b, _)| b).collect();
    assert_eq!(beats, vec![0, 1, 2, 3]);

    // Each tick takes ceil(4000 / 64) = 63 blocks.
    for (k, &(_, t)) in log.iter().enumerate() {
        let expected = (63 * (k + 1) * BLOCK) as f64 / SR as f64;
        assert!((t - expected).abs() < 1e-9, "tick {} at {}, expected {}", k, t, expected);
    }

    let drift = tw.clock(clock).drift();
    assert!(drift > 0.0 && drift < 0.05, "drift {}", drift);
}

#[test]
fn beat_wraps_at_measure_boundary() {
    let mut tw = Taktwerk::new(SR);
    let clock = tw.new_clock(120.0, 4);
    tw.clock_mut(clock).set_sync(false);
    tw.clock_mut(clock).configure(None, None, Some((3, 4)));

    let beats: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = beats.clone();
    tw.on_tick(
        clock,
        Box::new(move |tw, id| sink.borrow_mut().push(tw.clock(id).beat())),
    );

    tw.start_clock(clock);
    tw.advance_blocks(63 * 5 + 1);

    assert_eq!(*beats.borrow(), vec![0, 1, 2, 0, 1]);
}

#[test]
fn swing_alternates_tick_spacing() {
    let mut tw = Taktwerk::new(SR);
    let clock = tw.new_clock(120.0, 4);
    tw.clock_mut(clock).set_sync(false);
    tw.clock_mut(clock).set_swing(0.75);

    let times: Rc<RefCell<Vec<f64>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = times.clone();
    tw.on_tick(clock, Box::new(move |tw, _| sink.borrow_mut().push(tw.now())));

    tw.start_clock(clock);
    tw.advance_blocks(170);

    let times = times.borrow();
    assert!(times.len() >= 3, "got {} ticks", times.len());
    // Even beats shrink to 0.25s, odd beats stretch to 0.75s.
    let first = times[0];
    let second = times[1] - times[0];
    let third = times[2] - times[1];
    assert!(first < 0.3, "first {}", first);
    assert!(second > 0.7 && second < 0.8, "second {}", second);
    assert!(third < 0.3, "third {}", third);
}

/// A synced clock never self-schedules; it fires on the master's beat
/// cadence. At the master's 480 ticks per quarter a subdivision-16 slave
/// fires every 30 master beats.
#[test]
fn synced_clock_follows_master_cadence() {
    let mut tw = Taktwerk::new(SR);
    // Push the master grid to 10ms per tick so the test stays short.
    let master = tw.master();
    tw.clock_mut(master).configure(Some(720_000.0), None, None);

    let slave = tw.new_clock(120.0, 16);

    let master_ticks = Rc::new(RefCell::new(0u32));
    let slave_ticks = Rc::new(RefCell::new(0u32));
    let m = master_ticks.clone();
    let s = slave_ticks.clone();
    tw.on_tick(master, Box::new(move |_, _| *m.borrow_mut() += 1));
    tw.on_tick(slave, Box::new(move |_, _| *s.borrow_mut() += 1));

    tw.start_clock(slave);
    tw.start_clock(master);
    // 80-frame markers round up to 2 blocks per master tick.
    tw.advance_blocks(122);

    assert_eq!(*master_ticks.borrow(), 61);
    // Master beats 0, 30, 60.
    assert_eq!(*slave_ticks.borrow(), 3);
    assert_eq!(tw.clock(slave).beat(), 3);
}

#[test]
fn stopped_clock_finishes_its_last_tick() {
    let mut tw = Taktwerk::new(SR);
    let clock = tw.new_clock(120.0, 4);
    tw.clock_mut(clock).set_sync(false);

    let ticks = Rc::new(RefCell::new(0u32));
    let sink = ticks.clone();
    tw.on_tick(clock, Box::new(move |_, _| *sink.borrow_mut() += 1));

    tw.start_clock(clock);
    tw.advance_blocks(10);
    tw.stop_clock(clock);
    tw.advance_blocks(300);

    // The in-flight tick still lands; nothing is scheduled after it.
    assert_eq!(*ticks.borrow(), 1);
}

/// A callback that clears its own clock must not fire again; the tick
/// keeps scheduling but dispatches an empty list.
#[test]
fn clear_from_inside_a_tick_sticks() {
    let mut tw = Taktwerk::new(SR);
    let clock = tw.new_clock(480.0, 4);
    tw.clock_mut(clock).set_sync(false);

    let ticks = Rc::new(RefCell::new(0u32));
    let sink = ticks.clone();
    tw.on_tick_named(
        clock,
        "self-destruct",
        Box::new(move |tw, id| {
            *sink.borrow_mut() += 1;
            tw.clock_mut(id).clear();
        }),
    );

    tw.start_clock(clock);
    // 0.125s ticks; room for several.
    tw.advance(2.0);

    assert_eq!(*ticks.borrow(), 1);
    assert!(tw.clock(clock).is_running());
}

#[test]
fn unregister_from_inside_a_tick_removes_only_that_name() {
    let mut tw = Taktwerk::new(SR);
    let clock = tw.new_clock(480.0, 4);
    tw.clock_mut(clock).set_sync(false);

    let once = Rc::new(RefCell::new(0u32));
    let every = Rc::new(RefCell::new(0u32));
    let o = once.clone();
    tw.on_tick_named(
        clock,
        "once",
        Box::new(move |tw, id| {
            *o.borrow_mut() += 1;
            assert!(tw.clock_mut(id).unregister("once"));
        }),
    );
    let e = every.clone();
    tw.on_tick(clock, Box::new(move |_, _| *e.borrow_mut() += 1));

    tw.start_clock(clock);
    tw.advance(2.0);

    assert_eq!(*once.borrow(), 1);
    assert!(*every.borrow() > 3);
}

#[test]
fn duplicate_named_callbacks_rejected_across_context() {
    let mut tw = Taktwerk::new(SR);
    let clock = tw.new_clock(120.0, 4);
    assert!(tw.on_tick_named(clock, "pulse", Box::new(|_, _| {})));
    assert!(!tw.on_tick_named(clock, "pulse", Box::new(|_, _| {})));
    assert!(tw.clock_mut(clock).unregister("pulse"));
}
