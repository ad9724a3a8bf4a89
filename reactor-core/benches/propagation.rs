use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use reactor_core::{Indicator, Trigger};

fn chain(len: usize) -> (Trigger<u64>, Vec<Indicator<u64>>) {
    let source = Trigger::new();
    let mut nodes: Vec<Indicator<u64>> = Vec::with_capacity(len);
    for _ in 0..len {
        let next = Indicator::new();
        match nodes.last() {
            Some(prev) => next.add_binding(prev, |v| v + 1),
            None => next.add_binding(&source, |v| *v),
        }
        .expect("chain has no cycles");
        nodes.push(next);
    }
    (source, nodes)
}

fn fan_out(width: usize) -> (Trigger<u64>, Vec<Indicator<u64>>) {
    let source = Trigger::new();
    let nodes: Vec<Indicator<u64>> = (0..width).map(|_| Indicator::new()).collect();
    for node in &nodes {
        node.add_binding(&source, |v| v * 2).expect("fan-out has no cycles");
    }
    (source, nodes)
}

fn bench_set_value(c: &mut Criterion) {
    let trigger = Trigger::<u64>::new();
    c.bench_function("trigger_set_value", |b| {
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            trigger.set_value(black_box(n));
        })
    });
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("immediate_chain");
    for len in [1usize, 10, 100, 1_000] {
        let (source, nodes) = chain(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            let mut n = 0u64;
            b.iter(|| {
                n += 1;
                source.set_value(black_box(n));
            })
        });
        black_box(nodes.last().and_then(Indicator::peek));
    }
    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("immediate_fan_out");
    for width in [1usize, 10, 100] {
        let (source, nodes) = fan_out(width);
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            let mut n = 0u64;
            b.iter(|| {
                n += 1;
                source.set_value(black_box(n));
            })
        });
        black_box(nodes.len());
    }
    group.finish();
}

criterion_group!(benches, bench_set_value, bench_chain, bench_fan_out);
criterion_main!(benches);
