// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Sharding plan: the output of the planner.
//!
//! A plan maps module path → table name → [`ParameterSharding`]. It is
//! the contract between the planner and whatever shards the tables.

use crate::{PlannerError, ShardingOption};
use std::collections::BTreeMap;
use storage_budget::Storage;
use table_ir::{
    BoundsCheckMode, CacheParams, ComputeKernel, EmbeddingModule, KeyValueParams, ShardingType,
    Validated,
};

/// One placed shard.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PlacedShard {
    /// `[row, column]` offset into the table.
    pub offsets: [u64; 2],
    /// `[rows, columns]` extent.
    pub sizes: [u64; 2],
    pub rank: usize,
    pub storage: Storage,
}

/// Placement of one table.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ParameterSharding {
    pub sharding_type: ShardingType,
    pub compute_kernel: ComputeKernel,
    /// Ranks of the shards, in shard order.
    pub ranks: Vec<usize>,
    pub shards: Vec<PlacedShard>,
    pub cache_params: Option<CacheParams>,
    pub cache_load_factor: Option<f64>,
    pub enforce_hbm: Option<bool>,
    pub stochastic_rounding: Option<bool>,
    pub bounds_check_mode: Option<BoundsCheckMode>,
    pub key_value_params: Option<KeyValueParams>,
    /// The sharding type originally proposed when a row-wise fallback
    /// was applied.
    pub requested_sharding_type: Option<ShardingType>,
}

impl ParameterSharding {
    fn from_option(option: &ShardingOption) -> Self {
        Self {
            sharding_type: option.sharding_type,
            compute_kernel: option.compute_kernel,
            ranks: option.ranks(),
            shards: option
                .shards
                .iter()
                .filter_map(|s| {
                    s.rank.map(|rank| PlacedShard {
                        offsets: s.offsets,
                        sizes: s.sizes,
                        rank,
                        storage: s.storage,
                    })
                })
                .collect(),
            cache_params: option.cache_params.clone(),
            cache_load_factor: option.cache_load_factor,
            enforce_hbm: option.enforce_hbm,
            stochastic_rounding: option.stochastic_rounding,
            bounds_check_mode: option.bounds_check_mode,
            key_value_params: option.key_value_params.clone(),
            requested_sharding_type: option.requested_sharding_type,
        }
    }

    /// Storage of all shards together.
    pub fn total_storage(&self) -> Storage {
        self.shards.iter().map(|s| s.storage).sum()
    }
}

/// The complete sharding plan produced by a [`crate::ShardingPlanner`].
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct ShardingPlan {
    pub modules: BTreeMap<String, BTreeMap<String, ParameterSharding>>,
}

impl ShardingPlan {
    /// Builds a plan from fully placed options.
    pub fn from_placed(placed: &[ShardingOption]) -> Self {
        let mut modules: BTreeMap<String, BTreeMap<String, ParameterSharding>> = BTreeMap::new();
        for option in placed {
            modules
                .entry(option.module_path.clone())
                .or_default()
                .insert(option.name.clone(), ParameterSharding::from_option(option));
        }
        Self { modules }
    }

    pub fn get(&self, module_path: &str, table: &str) -> Option<&ParameterSharding> {
        self.modules.get(module_path)?.get(table)
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn num_tables(&self) -> usize {
        self.modules.values().map(BTreeMap::len).sum()
    }

    /// Iterates `(module path, table name, placement)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &ParameterSharding)> {
        self.modules.iter().flat_map(|(path, tables)| {
            tables
                .iter()
                .map(move |(name, ps)| (path.as_str(), name.as_str(), ps))
        })
    }

    /// Storage charged to each of `world_size` ranks.
    pub fn rank_usage(&self, world_size: usize) -> Vec<Storage> {
        let mut usage = vec![Storage::default(); world_size];
        for (_, _, ps) in self.iter() {
            for shard in &ps.shards {
                if let Some(u) = usage.get_mut(shard.rank) {
                    *u += shard.storage;
                }
            }
        }
        usage
    }

    /// Returns a human-readable summary of the plan.
    pub fn summary(&self) -> String {
        let mut s = format!("ShardingPlan: {} tables\n", self.num_tables());
        for (path, name, ps) in self.iter() {
            s.push_str(&format!(
                "  {path}.{name}: {} / {} ranks {:?}{}\n",
                ps.sharding_type,
                ps.compute_kernel,
                ps.ranks,
                ps.requested_sharding_type
                    .map(|t| format!(" (requested {t})"))
                    .unwrap_or_default(),
            ));
        }
        s
    }

    /// Checks the plan against the modules it was built for.
    ///
    /// Checks:
    /// - Every table of a planned module is placed.
    /// - Shards lie inside their table and do not overlap; non-replicated
    ///   shards cover the table exactly, data-parallel replicas cover it
    ///   whole.
    /// - No rank exceeds its `effective` budget in either tier.
    pub fn validate(
        &self,
        modules: &[EmbeddingModule<Validated>],
        effective: &[Storage],
    ) -> Result<(), PlannerError> {
        for module in modules {
            let Some(tables) = self.modules.get(&module.path) else {
                continue;
            };
            for table in module.iter_tables() {
                let ps = tables.get(&table.name).ok_or_else(|| {
                    PlannerError::InvalidInput(format!(
                        "table '{}.{}' is missing from the plan",
                        module.path, table.name,
                    ))
                })?;
                check_coverage(
                    &format!("{}.{}", module.path, table.name),
                    ps,
                    table.num_embeddings,
                    table.embedding_dim,
                )?;
            }
        }

        for (rank, used) in self.rank_usage(effective.len()).iter().enumerate() {
            if !used.fits_in(&effective[rank]) {
                return Err(PlannerError::InvalidInput(format!(
                    "rank {rank} uses {used}, over its budget of {}",
                    effective[rank],
                )));
            }
        }
        if let Some(shard) = self
            .iter()
            .flat_map(|(_, _, ps)| &ps.shards)
            .find(|s| s.rank >= effective.len())
        {
            return Err(PlannerError::InvalidInput(format!(
                "shard placed on rank {} of a {}-rank world",
                shard.rank,
                effective.len(),
            )));
        }
        Ok(())
    }

    /// Serialises the plan to pretty JSON.
    pub fn to_json(&self) -> Result<String, PlannerError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PlannerError::InvalidInput(format!("failed to serialise plan: {e}")))
    }
}

fn check_coverage(table: &str, ps: &ParameterSharding, rows: u64, dim: u64) -> Result<(), PlannerError> {
    let fail = |detail: String| PlannerError::InvalidInput(format!("table '{table}': {detail}"));

    if ps.shards.is_empty() {
        return Err(fail("no shards".into()));
    }
    for s in &ps.shards {
        if s.offsets[0] + s.sizes[0] > rows || s.offsets[1] + s.sizes[1] > dim {
            return Err(fail(format!("shard at {:?} exceeds the table", s.offsets)));
        }
    }

    if ps.sharding_type == ShardingType::DataParallel {
        return match ps.shards.iter().find(|s| s.sizes != [rows, dim]) {
            Some(s) => Err(fail(format!("replica on rank {} is partial", s.rank))),
            None => Ok(()),
        };
    }

    let area: u64 = ps.shards.iter().map(|s| s.sizes[0] * s.sizes[1]).sum();
    if area != rows * dim {
        return Err(fail(format!("shards cover {area} of {} elements", rows * dim)));
    }
    for (i, a) in ps.shards.iter().enumerate() {
        for b in &ps.shards[i + 1..] {
            let overlap = |k: usize| {
                a.offsets[k] < b.offsets[k] + b.sizes[k] && b.offsets[k] < a.offsets[k] + a.sizes[k]
            };
            if overlap(0) && overlap(1) {
                return Err(fail(format!("shards at {:?} and {:?} overlap", a.offsets, b.offsets)));
            }
        }
    }
    Ok(())
}
