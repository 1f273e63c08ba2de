//! Benchmarks for graph construction and scheduling overhead.

#![allow(clippy::expect_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use etlflow::adapters::DelimitedExtract;
use etlflow::pipeline::{PipelineBuilder, PipelineGraph, Scheduler, SchedulerConfig, StageExecutor};
use etlflow::progress::NoOpProgressLog;
use etlflow::stages::NoOpAction;
use std::sync::Arc;

/// `source -> leaf_0..leaf_n -> sink`
fn fan_out(width: usize) -> PipelineGraph {
    let leaves: Vec<String> = (0..width).map(|i| format!("leaf_{i}")).collect();
    let mut builder = PipelineBuilder::new("fan_out")
        .stage("source", Arc::new(NoOpAction), &[])
        .expect("valid source stage");
    for leaf in &leaves {
        builder = builder
            .stage(leaf.as_str(), Arc::new(NoOpAction), &["source"])
            .expect("valid leaf stage");
    }
    let deps: Vec<&str> = leaves.iter().map(String::as_str).collect();
    builder
        .stage("sink", Arc::new(NoOpAction), &deps)
        .expect("valid sink stage")
        .build()
        .expect("acyclic graph")
}

fn build_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    for width in [10, 100, 500] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            b.iter(|| black_box(fan_out(width)));
        });
    }
    group.finish();
}

fn schedule_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("schedule");
    for width in [10, 100, 500] {
        let graph = fan_out(width);
        let scheduler = Scheduler::new(StageExecutor::new(Arc::new(NoOpProgressLog)))
            .with_config(SchedulerConfig::default().with_max_workers(8));
        group.bench_with_input(BenchmarkId::from_parameter(width), &graph, |b, graph| {
            b.iter(|| {
                let run = runtime.block_on(scheduler.execute(graph)).expect("run completes");
                black_box(run.is_success())
            });
        });
    }
    group.finish();
}

fn extract_benchmark(c: &mut Criterion) {
    let data: String = (0..10_000)
        .map(|i| format!("{i},Thu Aug 19 21:54:38 2021,{},car,2,VC965\n", 100_000 + i))
        .collect();
    let extract = DelimitedExtract::new(
        "vehicle-data.csv",
        vec![1, 2, 3, 4],
        vec!["rowid".into(), "timestamp".into(), "vehicle_number".into(), "vehicle_type".into()],
    );
    c.bench_function("delimited_10k_rows", |b| {
        b.iter(|| black_box(extract.parse(data.as_bytes()).expect("well-formed rows")));
    });
}

criterion_group!(benches, build_benchmark, schedule_benchmark, extract_benchmark);
criterion_main!(benches);
