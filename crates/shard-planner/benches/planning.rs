// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for enumeration and end-to-end planning.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use shard_planner::{
    EmbeddingBagCollectionSharder, EmbeddingEnumerator, PlannerConfig, ShardingPlanner, Topology,
};
use storage_budget::Storage;
use table_ir::{ComputeDevice, ConstraintMap, EmbeddingModule, EmbeddingTable, ModuleKind, Validated};

const GIB: u64 = 1024 * 1024 * 1024;

fn synthetic_module(num_tables: usize) -> EmbeddingModule<Validated> {
    let tables = (0..num_tables)
        .map(|i| {
            let rows = 10_000 * (1 + (i as u64 * 7) % 50);
            let dim = [32, 64, 128, 256][i % 4];
            EmbeddingTable::new(format!("t_{i}"), rows, dim).with_pooling_factor(1.0 + (i % 8) as f64)
        })
        .collect();
    EmbeddingModule::new("sparse.ebc", ModuleKind::EmbeddingBagCollection, tables)
        .validate()
        .unwrap()
}

fn bench_enumerate(c: &mut Criterion) {
    let topology = Topology::new(8, ComputeDevice::Cuda).unwrap();
    let enumerator = EmbeddingEnumerator::new(topology, &PlannerConfig::default()).unwrap();
    let sharder = EmbeddingBagCollectionSharder::new();
    let effective = vec![Storage::new(24 * GIB, 100 * GIB); 8];
    let constraints = ConstraintMap::new();

    let mut group = c.benchmark_group("enumerate");
    for n in [8, 64] {
        let modules = [synthetic_module(n)];
        group.bench_with_input(BenchmarkId::from_parameter(n), &modules, |b, modules| {
            b.iter(|| {
                enumerator
                    .enumerate(black_box(modules), &[&sharder], &constraints, &effective)
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_plan(c: &mut Criterion) {
    let sharder = EmbeddingBagCollectionSharder::new();
    let config = PlannerConfig {
        max_proposals: 200,
        ..Default::default()
    };

    let mut group = c.benchmark_group("plan");
    group.sample_size(10);
    for (world, n) in [(2, 8), (8, 32)] {
        let modules = [synthetic_module(n)];
        let topology = Topology::new(world, ComputeDevice::Cuda).unwrap();
        group.bench_with_input(
            BenchmarkId::new(format!("world_{world}"), n),
            &modules,
            |b, modules| {
                b.iter(|| {
                    let mut planner = ShardingPlanner::new(topology.clone(), config.clone()).unwrap();
                    planner.plan(black_box(modules), &[&sharder]).unwrap()
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_enumerate, bench_plan);
criterion_main!(benches);
