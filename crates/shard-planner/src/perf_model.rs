// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Scoring of placed proposals. Lower is better.

use crate::ShardingOption;
use std::collections::BTreeMap;

/// Rates a fully placed proposal.
pub trait PerfModel {
    /// Human-readable name of this model.
    fn name(&self) -> &str;

    /// Stable description of the model's parameters.
    fn fingerprint(&self) -> String {
        self.name().to_string()
    }

    /// Scores `plan`. Must be pure.
    fn rate(&self, plan: &[ShardingOption]) -> f64;
}

/// Rates every plan the same, so the first feasible proposal wins.
#[derive(Debug, Clone, Default)]
pub struct NoopPerfModel;

impl PerfModel for NoopPerfModel {
    fn name(&self) -> &str {
        "noop"
    }

    fn rate(&self, _plan: &[ShardingOption]) -> f64 {
        0.0
    }
}

/// The slowest rank determines step time: sums priority-weighted shard
/// cost per rank and returns the maximum.
#[derive(Debug, Clone, Default)]
pub struct CriticalPathPerfModel;

impl CriticalPathPerfModel {
    /// Priority-weighted cost per rank.
    pub fn rank_costs(plan: &[ShardingOption]) -> BTreeMap<usize, f64> {
        let mut costs = BTreeMap::new();
        for option in plan {
            for shard in &option.shards {
                if let Some(rank) = shard.rank {
                    *costs.entry(rank).or_insert(0.0) += shard.perf.total() * option.priority;
                }
            }
        }
        costs
    }
}

impl PerfModel for CriticalPathPerfModel {
    fn name(&self) -> &str {
        "critical-path"
    }

    fn rate(&self, plan: &[ShardingOption]) -> f64 {
        Self::rank_costs(plan).into_values().fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option::Shard;
    use table_ir::{ComputeKernel, ShardingType};

    fn placed(name: &str, shards: &[(usize, f64)], priority: f64) -> ShardingOption {
        ShardingOption {
            name: name.into(),
            module_path: "m".into(),
            table_index: 0,
            sharding_type: ShardingType::RowWise,
            compute_kernel: ComputeKernel::Fused,
            shards: shards
                .iter()
                .map(|&(rank, cost)| {
                    let mut s = Shard::new([0, 0], [1, 1]);
                    s.perf.fwd_compute = cost;
                    s.rank = Some(rank);
                    s
                })
                .collect(),
            cache_load_factor: None,
            cache_params: None,
            enforce_hbm: None,
            stochastic_rounding: None,
            bounds_check_mode: None,
            is_weighted: false,
            feature_names: vec![name.into()],
            key_value_params: None,
            priority,
            fallback: None,
            requested_sharding_type: None,
        }
    }

    #[test]
    fn test_noop() {
        let plan = [placed("a", &[(0, 5.0)], 1.0)];
        assert_eq!(NoopPerfModel.rate(&plan), 0.0);
        assert_eq!(NoopPerfModel.fingerprint(), "noop");
    }

    #[test]
    fn test_critical_path_takes_max_rank() {
        let plan = [
            placed("a", &[(0, 3.0)], 1.0),
            placed("b", &[(0, 1.0), (1, 1.0)], 1.0),
            placed("c", &[(1, 2.0)], 1.0),
        ];
        let costs = CriticalPathPerfModel::rank_costs(&plan);
        assert_eq!(costs[&0], 4.0);
        assert_eq!(costs[&1], 3.0);
        assert_eq!(CriticalPathPerfModel.rate(&plan), 4.0);
    }

    #[test]
    fn test_priority_weights_cost() {
        let plan = [placed("a", &[(0, 1.0)], 1.0), placed("b", &[(1, 1.0)], 3.0)];
        assert_eq!(CriticalPathPerfModel.rate(&plan), 3.0);
    }

    #[test]
    fn test_empty_plan() {
        assert_eq!(CriticalPathPerfModel.rate(&[]), 0.0);
    }
}
