// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Human-readable statistics of a chosen plan.

use crate::perf_model::CriticalPathPerfModel;
use crate::{ShardingOption, Topology};
use std::collections::BTreeMap;
use std::fmt;
use storage_budget::{Storage, Tier};
use table_ir::ComputeKernel;

const GB: f64 = (1024 * 1024 * 1024) as f64;

fn gb(bytes: u64) -> f64 {
    bytes as f64 / GB
}

/// Stats lines of a plan, as logged at info level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanStats {
    lines: Vec<String>,
}

impl PlanStats {
    pub fn new(
        placed: &[ShardingOption],
        topology: &Topology,
        effective: &[Storage],
        num_proposals: usize,
        best_perf: f64,
    ) -> Self {
        let world = topology.world_size();
        let mut lines = vec![format!(
            "Sharding plan: {} tables on {} ranks ({})",
            placed.len(),
            world,
            topology.compute_device(),
        )];

        let mut per_kernel: BTreeMap<ComputeKernel, Storage> = BTreeMap::new();
        let mut per_rank = vec![Storage::default(); world];
        for option in placed {
            *per_kernel.entry(option.compute_kernel).or_default() += option.total_storage();
            for shard in &option.shards {
                if let Some(used) = shard.rank.and_then(|r| per_rank.get_mut(r)) {
                    *used += shard.storage;
                }
            }
        }

        for (kernel, storage) in &per_kernel {
            lines.push(format!(
                "{kernel}: HBM: {:.3} GB, DDR: {:.3} GB",
                gb(storage.hbm),
                gb(storage.ddr),
            ));
        }

        let rank_costs = CriticalPathPerfModel::rank_costs(placed);
        for (rank, used) in per_rank.iter().enumerate() {
            let budget = effective.get(rank).copied().unwrap_or_default();
            lines.push(format!(
                "Rank {rank}: HBM: {:.3} / {:.3} GB, DDR: {:.3} / {:.3} GB, perf {:.3e} s",
                gb(used.hbm),
                gb(budget.hbm),
                gb(used.ddr),
                gb(budget.ddr),
                rank_costs.get(&rank).copied().unwrap_or(0.0),
            ));
        }

        for tier in Tier::ALL {
            if let Some((max, min)) = extremes(&per_rank, tier) {
                lines.push(format!("Max {tier}: {:.3} GB on ranks {:?}", gb(max.0), max.1));
                lines.push(format!("Min {tier}: {:.3} GB on ranks {:?}", gb(min.0), min.1));
            }
        }

        lines.push(format!("Proposals considered: {num_proposals}"));
        lines.push(format!("Best perf: {best_perf:.3e} s"));
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Emits every line through `tracing` at info level.
    pub fn log(&self) {
        for line in &self.lines {
            tracing::info!("{line}");
        }
    }
}

type Extreme = (u64, Vec<usize>);

/// Largest and smallest per-rank usage in `tier`, with every rank that
/// attains each.
fn extremes(per_rank: &[Storage], tier: Tier) -> Option<(Extreme, Extreme)> {
    let values: Vec<u64> = per_rank.iter().map(|s| s.get(tier)).collect();
    let max = *values.iter().max()?;
    let min = *values.iter().min()?;
    let ranks_at = |v: u64| {
        values
            .iter()
            .enumerate()
            .filter(|&(_, &x)| x == v)
            .map(|(r, _)| r)
            .collect::<Vec<_>>()
    };
    Some(((max, ranks_at(max)), (min, ranks_at(min))))
}

impl fmt::Display for PlanStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option::Shard;
    use table_ir::{ComputeDevice, ShardingType};

    const GIB: u64 = 1024 * 1024 * 1024;

    fn placed(kernel: ComputeKernel, shards: &[(usize, u64, u64)]) -> ShardingOption {
        ShardingOption {
            name: "t".into(),
            module_path: "m".into(),
            table_index: 0,
            sharding_type: ShardingType::RowWise,
            compute_kernel: kernel,
            shards: shards
                .iter()
                .map(|&(rank, hbm, ddr)| {
                    let mut s = Shard::new([0, 0], [1, 1]);
                    s.rank = Some(rank);
                    s.storage = Storage::new(hbm, ddr);
                    s.perf.fwd_compute = 1.0e-3;
                    s
                })
                .collect(),
            cache_load_factor: None,
            cache_params: None,
            enforce_hbm: None,
            stochastic_rounding: None,
            bounds_check_mode: None,
            is_weighted: false,
            feature_names: vec!["t".into()],
            key_value_params: None,
            priority: 1.0,
            fallback: None,
            requested_sharding_type: None,
        }
    }

    #[test]
    fn test_lines() {
        let topo = Topology::new(2, ComputeDevice::Cuda).unwrap();
        let plan = [
            placed(ComputeKernel::Fused, &[(0, GIB, 0), (1, GIB / 2, 0)]),
            placed(ComputeKernel::FusedUvm, &[(1, 0, 2 * GIB)]),
        ];
        let stats = PlanStats::new(&plan, &topo, &[Storage::new(4 * GIB, 8 * GIB); 2], 7, 2.0e-3);
        let lines = stats.lines();
        assert!(lines.contains(&"fused: HBM: 1.500 GB, DDR: 0.000 GB".to_string()));
        assert!(lines.contains(&"fused_uvm: HBM: 0.000 GB, DDR: 2.000 GB".to_string()));
        assert!(lines.contains(&"Max HBM: 1.000 GB on ranks [0]".to_string()));
        assert!(lines.contains(&"Min HBM: 0.500 GB on ranks [1]".to_string()));
        assert!(lines.contains(&"Max DDR: 2.000 GB on ranks [1]".to_string()));
        assert!(lines.contains(&"Proposals considered: 7".to_string()));
        assert!(stats.to_string().lines().count() == lines.len());
    }

    #[test]
    fn test_ties_list_every_rank() {
        let topo = Topology::new(2, ComputeDevice::Cuda).unwrap();
        let plan = [placed(ComputeKernel::Fused, &[(0, GIB, 0), (1, GIB, 0)])];
        let stats = PlanStats::new(&plan, &topo, &[Storage::new(4 * GIB, 0); 2], 1, 0.0);
        assert!(stats.lines().contains(&"Max HBM: 1.000 GB on ranks [0, 1]".to_string()));
        assert!(stats.lines().contains(&"Min DDR: 0.000 GB on ranks [0, 1]".to_string()));
    }
}
