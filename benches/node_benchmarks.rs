use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dasp_graph::Buffer;

use taktwerk::nodes::effect::{Biquad, FilterKind, Gain, Panner};
use taktwerk::nodes::source::{sine_table, TableSource};
use taktwerk::{AudioNode, Engine, ProcessContext};

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("TableSource.process()", |b| {
        let mut source = TableSource::new(Arc::new(sine_table(8192)));
        let mut output = [Buffer::default()];
        let ctx = ProcessContext {
            sample_rate: 48000,
            buffer_size: Buffer::LEN,
            block_start: 0,
        };

        b.iter(move || source.process(&ctx, std::iter::empty(), &[], &mut output))
    });

    c.bench_function("Engine.process_block() voice chain", |b| {
        let mut engine = Engine::capture(48000, 2);
        let src = engine.add(TableSource::new(Arc::new(sine_table(8192))));
        let amp = engine.add(Gain::new(0.8));
        let filt = engine.add(Biquad::new(FilterKind::LowPass, 2000.0, 1.0));
        let pan = engine.add(Panner::new(0.0));
        let out = engine.add(Gain::new(1.0).with_channels(2));
        engine.connect(src.id(), amp.id());
        engine.connect(amp.id(), filt.id());
        engine.connect(filt.id(), pan.id());
        engine.connect(pan.id(), out.id());
        engine.connect_to_sink(out.id());

        b.iter(|| {
            engine.process_block();
            black_box(engine.take_output());
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
