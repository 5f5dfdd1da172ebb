//! Track/trigger benchmarks.
//!
//! - Notifying many effects subscribed to one key
//! - Rerunning an effect that reads many keys (cleanup + re-track)
//! - Pushing onto an array observed by a length reader
//! - Recomputing a computed value after invalidation
//!
//! Run with: cargo bench -p tether-core --bench trigger

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tether_core::{Raw, RawKind, Reactivity, Value};

fn fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    for effects in [1usize, 16, 256] {
        let ctx = Reactivity::new();
        let obj = ctx.reactive(&Raw::record([("n", Value::from(0))]));
        for _ in 0..effects {
            let reader = obj.clone();
            ctx.effect(move || {
                black_box(reader.get("n"));
            });
        }

        let mut n = 0u64;
        group.bench_with_input(BenchmarkId::from_parameter(effects), &effects, |b, _| {
            b.iter(|| {
                n += 1;
                obj.set("n", n).unwrap();
            })
        });
    }
    group.finish();
}

fn wide_reader(c: &mut Criterion) {
    let mut group = c.benchmark_group("wide_reader");
    for keys in [8usize, 64, 512] {
        let ctx = Reactivity::new();
        let raw = Raw::record((0..keys).map(|i| (format!("k{i}"), Value::from(i))));
        let obj = ctx.reactive(&raw);

        let reader = obj.clone();
        ctx.effect(move || {
            for value in reader.values() {
                black_box(value);
            }
        });

        let mut n = 0u64;
        group.bench_with_input(BenchmarkId::from_parameter(keys), &keys, |b, _| {
            b.iter(|| {
                n += 1;
                obj.set("k0", n).unwrap();
            })
        });
    }
    group.finish();
}

fn array_push(c: &mut Criterion) {
    c.bench_function("array_push_observed", |b| {
        let ctx = Reactivity::new();
        let arr = ctx.reactive(&Raw::empty(RawKind::Array));
        let reader = arr.clone();
        ctx.effect(move || {
            black_box(reader.len());
        });

        b.iter(|| {
            arr.push([1]).unwrap();
            if arr.raw().len() > 1024 {
                arr.set_len(0).unwrap();
            }
        })
    });
}

fn computed_invalidation(c: &mut Criterion) {
    c.bench_function("computed_invalidate_and_read", |b| {
        let ctx = Reactivity::new();
        let obj = ctx.reactive(&Raw::record([("x", Value::from(1)), ("y", Value::from(2))]));
        let reader = obj.clone();
        let sum = ctx.computed(move || {
            reader.get("x").as_number().unwrap_or(0.0) + reader.get("y").as_number().unwrap_or(0.0)
        });

        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            obj.set("x", n).unwrap();
            black_box(sum.get());
        })
    });
}

criterion_group!(
    benches,
    fan_out,
    wide_reader,
    array_push,
    computed_invalidation
);
criterion_main!(benches);
