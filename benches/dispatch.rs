//! Dispatch throughput/latency under the three delivery contexts (§4's
//! `ExecutionContext`): immediate (same-thread), thread-pool, and tokio.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cascade::context::immediate::ImmediateContext;
use cascade::context::threadpool::ThreadPoolContext;
use cascade::error::Outcome;
use cascade::signal;

use criterion::{Criterion, criterion_group, criterion_main};

const MESSAGES: u64 = 10_000;

fn single_hop_immediate(c: &mut Criterion) {
    c.bench_function("single_hop/immediate", |b| {
        b.iter(|| {
            let ctx = ImmediateContext::new();
            let (source, root) = signal::input::<u64>();
            let received = Arc::new(AtomicU64::new(0));
            let counter = received.clone();
            root.subscribe(ctx, true, move |item| {
                if let Outcome::Success(v) = item {
                    counter.fetch_add(v, Ordering::Relaxed);
                }
            })
            .unwrap();
            for i in 0..MESSAGES {
                source.send(Outcome::Success(i));
            }
            criterion::black_box(received.load(Ordering::Relaxed));
        });
    });
}

fn transform_chain_immediate(c: &mut Criterion) {
    c.bench_function("transform_chain/immediate", |b| {
        b.iter(|| {
            let ctx = ImmediateContext::new();
            let (source, root) = signal::input::<u64>();
            let doubled = root.transform(ctx.clone(), |item, cont| {
                let _ = cont.send(item.map(|v| v * 2));
            });
            let plus_one = doubled.transform(ctx.clone(), |item, cont| {
                let _ = cont.send(item.map(|v| v + 1));
            });
            let received = Arc::new(AtomicU64::new(0));
            let counter = received.clone();
            plus_one
                .subscribe(ctx, true, move |item| {
                    if let Outcome::Success(v) = item {
                        counter.fetch_add(v, Ordering::Relaxed);
                    }
                })
                .unwrap();
            for i in 0..MESSAGES {
                source.send(Outcome::Success(i));
            }
            criterion::black_box(received.load(Ordering::Relaxed));
        });
    });
}

fn fan_out_continuous(c: &mut Criterion) {
    c.bench_function("fan_out/continuous_10_subscribers", |b| {
        b.iter(|| {
            let ctx = ImmediateContext::new();
            let (source, root) = signal::input::<u64>();
            let hot = root.continuous(ctx.clone());
            let received = Arc::new(AtomicU64::new(0));
            for _ in 0..10 {
                let counter = received.clone();
                hot.subscribe(ctx.clone(), true, move |item| {
                    if let Outcome::Success(v) = item {
                        counter.fetch_add(v, Ordering::Relaxed);
                    }
                })
                .unwrap();
            }
            for i in 0..MESSAGES {
                source.send(Outcome::Success(i));
            }
            criterion::black_box(received.load(Ordering::Relaxed));
        });
    });
}

fn single_hop_threadpool(c: &mut Criterion) {
    c.bench_function("single_hop/threadpool", |b| {
        b.iter(|| {
            let ctx = ThreadPoolContext::new();
            let (source, root) = signal::input::<u64>();
            let received = Arc::new(AtomicU64::new(0));
            let counter = received.clone();
            root.subscribe(ctx, true, move |item| {
                if let Outcome::Success(v) = item {
                    counter.fetch_add(v, Ordering::Relaxed);
                }
            })
            .unwrap();
            for i in 0..MESSAGES {
                source.send(Outcome::Success(i));
            }
            criterion::black_box(received.load(Ordering::Relaxed));
        });
    });
}

criterion_group!(
    benches,
    single_hop_immediate,
    transform_chain_immediate,
    fan_out_continuous,
    single_hop_threadpool
);
criterion_main!(benches);
