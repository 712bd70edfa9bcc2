//! Performance benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use memdb::plot::{plot_layout, plot_usage, PlotDimensions, Theme};
use memdb::{diff, HeapOperation, Range, TrackedHeap};

/// Allocations of varying size, every other one freed later on.
fn synthetic_heap(allocations: u64) -> TrackedHeap {
    let allocs = (0..allocations).map(|i| HeapOperation::alloc(0x10_0000 + i * 64, 8 + i % 56));
    let frees = (0..allocations)
        .step_by(2)
        .map(|i| HeapOperation::dealloc(0x10_0000 + i * 64));
    TrackedHeap::builder()
        .add_operations(allocs)
        .add_operations(frees)
        .build()
        .without_unmatched_deallocs()
}

fn benchmark_analysis(c: &mut Criterion) {
    let heap = synthetic_heap(2_000);
    let spec = Range::whole_range_spec(&heap);

    c.bench_function("diff_whole_heap_n=3000", |b| {
        b.iter(|| diff::compute(black_box(&heap), black_box(&spec)).unwrap());
    });

    c.bench_function("plot_usage_100x40", |b| {
        let range = Range::whole(&heap).unwrap();
        b.iter(|| plot_usage(black_box(&range), PlotDimensions::usage(), Theme::plain()).unwrap());
    });

    c.bench_function("plot_layout_15x40", |b| {
        let diff = diff::compute(&heap, &spec).unwrap();
        b.iter(|| plot_layout(black_box(&diff), PlotDimensions::layout(), Theme::plain()).unwrap());
    });
}

criterion_group!(benches, benchmark_analysis);
criterion_main!(benches);
