// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Example: Compare proposers on a synthetic recommendation model.
//!
//! Each proposer searches the same option space under several device
//! budgets; tighter budgets push tables towards row-wise splits and
//! caching kernels, or make planning fail outright.
//!
//! ```bash
//! cargo run -p shard-planner --example plan_tables
//! ```

use shard_planner::{
    EmbeddingBagCollectionSharder, EmbeddingOffloadScaleupProposer, GreedyProposer,
    GridSearchProposer, PlannerConfig, Proposer, ShardingPlanner, Topology, UniformProposer,
};
use storage_budget::MemoryBudget;
use table_ir::{
    CacheParams, ComputeDevice, ConstraintMap, EmbeddingModule, EmbeddingTable, ModuleKind,
    ParameterConstraints, Validated,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .init();

    let module = build_module(12)?;
    println!("Model: {}\n", module.summary());
    let modules = [module];
    let constraints = cacheable(&modules);
    let sharder = EmbeddingBagCollectionSharder::new();

    let proposers: [(&str, fn() -> Box<dyn Proposer>); 4] = [
        ("greedy", || Box::new(GreedyProposer::new())),
        ("uniform", || Box::new(UniformProposer::new())),
        ("grid-search", || Box::new(GridSearchProposer::new(4096))),
        ("embedding-offload-scaleup", || {
            Box::new(EmbeddingOffloadScaleupProposer::new(8))
        }),
    ];
    let budgets = ["64M", "256M", "2G"];

    println!(
        "{:<26} {:>8} {:>10} {:>12} {:>14}",
        "Proposer", "HBM", "Proposals", "Max HBM MB", "Perf (s)",
    );
    println!("{}", "-".repeat(74));

    for (name, make) in &proposers {
        for budget in budgets {
            let topology = Topology::new(4, ComputeDevice::Cuda)?
                .with_hbm_cap(MemoryBudget::parse(budget)?.as_bytes());
            let mut planner = ShardingPlanner::new(topology, PlannerConfig::default())?
                .with_constraints(constraints.clone())
                .with_proposers(vec![make()]);
            match planner.plan(&modules, &[&sharder]) {
                Ok(plan) => {
                    let max_hbm = plan
                        .rank_usage(4)
                        .iter()
                        .map(|s| s.hbm)
                        .max()
                        .unwrap_or(0) as f64
                        / (1024.0 * 1024.0);
                    let perf = planner
                        .last_stats()
                        .and_then(|s| s.lines().last().cloned())
                        .unwrap_or_default();
                    println!(
                        "{:<26} {:>8} {:>10} {:>12.2} {:>14}",
                        name,
                        budget,
                        planner.num_proposals(),
                        max_hbm,
                        perf.trim_start_matches("Best perf: "),
                    );
                }
                Err(e) => {
                    println!("{:<26} {:>8} {:>10}", name, budget, format!("FAIL: {:?}", e.kind()));
                }
            }
        }
    }

    // Full default pipeline on the mid budget, with stats.
    println!("\n--- Default proposers @ 256M HBM per device ---\n");
    let topology = Topology::new(4, ComputeDevice::Cuda)?.with_hbm_cap(256 * 1024 * 1024);
    let mut planner =
        ShardingPlanner::new(topology, PlannerConfig::default())?.with_constraints(constraints);
    let plan = planner.plan(&modules, &[&sharder])?;
    println!("{}", plan.summary());
    if let Some(stats) = planner.last_stats() {
        println!("{stats}");
    }
    println!("Context hash: {}", planner.hash_planner_context_inputs()?);

    Ok(())
}

/// A module of `n` tables with sizes spread over two orders of magnitude.
fn build_module(n: usize) -> Result<EmbeddingModule<Validated>, Box<dyn std::error::Error>> {
    let tables = (0..n)
        .map(|i| {
            let rows = 20_000 * (1 + (i as u64 * 13) % 40);
            let dim = if i % 3 == 0 { 128 } else { 64 };
            EmbeddingTable::new(format!("feature_{i}"), rows, dim)
                .with_pooling_factor(1.0 + (i % 5) as f64)
        })
        .collect();
    Ok(EmbeddingModule::new("sparse.ebc", ModuleKind::EmbeddingBagCollection, tables).validate()?)
}

/// Marks every table as eligible for cache offloading.
fn cacheable(modules: &[EmbeddingModule<Validated>]) -> ConstraintMap {
    modules
        .iter()
        .flat_map(|m| m.iter_tables())
        .map(|t| {
            (
                t.name.clone(),
                ParameterConstraints {
                    cache_params: Some(CacheParams::default()),
                    ..Default::default()
                },
            )
        })
        .collect()
}
