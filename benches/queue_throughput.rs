//! Enqueue/dequeue throughput across partition counts and strategies
//! (spec §4.1), mirroring the source repo's `event_bus_throughput.rs`
//! shape: one `BenchmarkId` per input size within a single group.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use kgraph_ingest::config::QueueConfig;
use kgraph_ingest::event_bus::{EventBus, MemorySink};
use kgraph_ingest::model::{Task, TaskType};
use kgraph_ingest::queue::TaskQueueManager;

const BATCH_SIZES: &[usize] = &[64, 256, 1024];

fn new_manager(partitions: usize) -> TaskQueueManager {
    let bus = EventBus::with_sink(MemorySink::new());
    let config = QueueConfig {
        partitions,
        ..QueueConfig::default()
    };
    TaskQueueManager::new(config, bus.get_emitter())
}

fn bench_enqueue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_enqueue");

    for &batch in BATCH_SIZES {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &size| {
            b.iter(|| {
                let manager = new_manager(8);
                for i in 0..size {
                    let task = Task::new(format!("t{i}"), TaskType::Parse, json!({"i": i}), (i % 10) as u8);
                    manager.enqueue(task).expect("enqueue");
                }
            });
        });
    }

    group.finish();
}

fn bench_enqueue_dequeue_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_roundtrip");

    for &batch in BATCH_SIZES {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &size| {
            b.iter(|| {
                let manager = new_manager(1);
                for i in 0..size {
                    let task = Task::new(format!("t{i}"), TaskType::Parse, json!({}), 5);
                    manager.enqueue(task).expect("enqueue");
                }
                while manager.dequeue(0).expect("dequeue").is_some() {}
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_enqueue, bench_enqueue_dequeue_roundtrip);
criterion_main!(benches);
