//! Performance benchmarks for the kvsim transaction driver.
//!
//! Run with: `cargo bench`
//! Or for specific bench: `cargo bench --bench driver_bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use kvsim::trace::write_vcd;
use kvsim::workload::{FillWorkload, RandomWorkload, Workload};
use kvsim::{
    ClockedModel, ContextConfig, ModelInstance, ModelVariant, SimContext, TraceDestination,
    TraceRecorder, TransactionDriver,
};

const VARIANTS: [ModelVariant; 2] = [ModelVariant::HashMap, ModelVariant::Kvs];

// ============================================================================
// Model Benchmarks
// ============================================================================

fn bench_model_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("model_step");

    for variant in VARIANTS {
        group.throughput(Throughput::Elements(1000));
        group.bench_with_input(BenchmarkId::new("idle", variant), &variant, |b, &variant| {
            let ctx = SimContext::create();
            let mut model = ModelInstance::create(&ctx, variant);
            b.iter(|| {
                for _ in 0..1000 {
                    black_box(model.step());
                }
            });
        });
    }

    group.finish();
}

// ============================================================================
// Driver Benchmarks
// ============================================================================

fn bench_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("fill_readback");
    group.sample_size(20);

    for count in [100u32, 1000, 5000].iter() {
        group.throughput(Throughput::Elements(*count as u64 * 2));
        for variant in VARIANTS {
            group.bench_with_input(
                BenchmarkId::new(variant.name(), count),
                count,
                |b, &count| {
                    b.iter(|| {
                        let ctx = SimContext::create();
                        let model = ModelInstance::with_capacity(&ctx, variant, Some(1 << 14));
                        let mut driver = TransactionDriver::new(model);
                        black_box(FillWorkload::new(count).run(&mut driver).unwrap());
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_random(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_operations");
    group.sample_size(20);

    for ops in [1000usize, 10000].iter() {
        group.throughput(Throughput::Elements(*ops as u64));
        group.bench_with_input(BenchmarkId::new("ops", ops), ops, |b, &ops| {
            b.iter(|| {
                let ctx = SimContext::create();
                let model = ModelInstance::with_capacity(&ctx, ModelVariant::HashMap, Some(4096));
                let mut driver = TransactionDriver::new(model);
                black_box(RandomWorkload::new(1, 1000, ops).run(&mut driver).unwrap());
            });
        });
    }

    group.finish();
}

// ============================================================================
// Trace Benchmarks
// ============================================================================

fn bench_traced_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("traced_fill");
    group.sample_size(20);

    group.bench_function("record_and_render", |b| {
        b.iter(|| {
            let ctx = SimContext::new(ContextConfig::new().with_trace(true));
            let mut model = ModelInstance::with_capacity(&ctx, ModelVariant::HashMap, Some(1024));
            let recorder = TraceRecorder::attach(&mut model, TraceDestination::Memory).unwrap();
            let mut driver = TransactionDriver::new(model);
            FillWorkload::new(500).run(&mut driver).unwrap();
            black_box(recorder.close().unwrap());
        });
    });

    group.bench_function("write_vcd", |b| {
        let ctx = SimContext::new(ContextConfig::new().with_trace(true));
        let mut model = ModelInstance::with_capacity(&ctx, ModelVariant::Kvs, Some(1024));
        let recorder = TraceRecorder::attach(&mut model, TraceDestination::Memory).unwrap();
        let mut driver = TransactionDriver::new(model);
        FillWorkload::new(500).run(&mut driver).unwrap();
        let snapshots = recorder.snapshots();

        b.iter(|| {
            let mut buf = Vec::with_capacity(1 << 20);
            write_vcd(&mut buf, "kvs", &snapshots).unwrap();
            black_box(buf.len())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_model_step,
    bench_fill,
    bench_random,
    bench_traced_fill,
);

criterion_main!(benches);
