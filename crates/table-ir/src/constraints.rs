// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-table planning constraints.
//!
//! A [`ParameterConstraints`] narrows the search space for one table
//! (allowed sharding types and kernels) and carries fused-kernel settings
//! that the planner copies verbatim into the plan (cache parameters,
//! stochastic rounding, bounds checking). Absence of a constraint means
//! "anything the sharder supports, no overrides".

use crate::{ComputeKernel, DataType, EmbeddingTable, ShardingType, TableError};
use std::collections::BTreeMap;

/// Table name → constraints. Ordered so that iteration and hashing are
/// deterministic.
pub type ConstraintMap = BTreeMap<String, ParameterConstraints>;

/// Eviction policy of a fast-tier cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheAlgorithm {
    Lru,
    Lfu,
}

/// Settings for caching kernels.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CacheParams {
    pub algorithm: Option<CacheAlgorithm>,
    /// Fraction of the table held in the fast-tier cache.
    pub load_factor: Option<f64>,
    /// Upper bound on the fast-tier cache, in GiB.
    pub reserved_memory: Option<f64>,
    /// Element type of cached rows.
    pub precision: Option<DataType>,
}

impl CacheParams {
    pub fn with_algorithm(algorithm: CacheAlgorithm) -> Self {
        Self {
            algorithm: Some(algorithm),
            ..Default::default()
        }
    }
}

/// How out-of-range ids are handled by the lookup kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundsCheckMode {
    Fatal,
    Warning,
    Ignore,
    None,
}

/// Capacity hints for virtual tables. When present they replace the
/// load-factor based estimate, clipped to what the table can occupy.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct KeyValueParams {
    /// Upper bound on the fast-tier (L1) cache per shard, in MiB.
    pub max_l1_cache_mb: Option<u64>,
    /// Slow-tier (L2) cache per shard, in MiB.
    pub l2_cache_mb: Option<u64>,
}

/// Constraints and fused-kernel settings for one table.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ParameterConstraints {
    /// Allowed sharding types; `None` allows all.
    pub sharding_types: Option<Vec<ShardingType>>,
    /// Allowed compute kernels; `None` allows all.
    pub compute_kernels: Option<Vec<ComputeKernel>>,
    pub cache_params: Option<CacheParams>,
    /// Require the table to live entirely in the fast tier.
    pub enforce_hbm: Option<bool>,
    pub stochastic_rounding: Option<bool>,
    pub bounds_check_mode: Option<BoundsCheckMode>,
    pub is_weighted: bool,
    /// Expected feature names; must match the table's when set.
    pub feature_names: Option<Vec<String>>,
    pub key_value_params: Option<KeyValueParams>,
    /// Overrides the table's pooling factor.
    pub pooling_factor: Option<f64>,
    /// Weight applied to this table's cost estimate.
    pub priority: Option<f64>,
}

impl ParameterConstraints {
    /// Returns `true` if `sharding_type` is permitted.
    pub fn allows_sharding_type(&self, sharding_type: ShardingType) -> bool {
        self.sharding_types
            .as_ref()
            .map_or(true, |allowed| allowed.contains(&sharding_type))
    }

    /// Returns `true` if `kernel` is permitted.
    pub fn allows_kernel(&self, kernel: ComputeKernel) -> bool {
        self.compute_kernels
            .as_ref()
            .map_or(true, |allowed| allowed.contains(&kernel))
    }

    /// Returns `true` if the table must stay in the fast tier.
    pub fn enforces_hbm(&self) -> bool {
        self.enforce_hbm.unwrap_or(false)
    }

    /// Checks that the constraint's feature names agree with the table's.
    pub fn check_feature_names(&self, table: &EmbeddingTable) -> Result<(), TableError> {
        match &self.feature_names {
            Some(names) if *names != table.feature_names => Err(TableError::InvalidTable {
                table: table.name.clone(),
                detail: format!(
                    "constraint lists features {:?} but the table serves {:?}",
                    names, table.feature_names,
                ),
            }),
            _ => Ok(()),
        }
    }
}
