// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Search-space enumeration.
//!
//! For every table of every module that has a sharder, the enumerator
//! lists each legal (sharding type, compute kernel) pair as a fully
//! estimated [`ShardingOption`]:
//!
//! ```text
//! sharder.sharding_types(device) ∩ constraint.sharding_types
//!   └─ per type: sharder.compute_kernels(type, device) ∩ constraint.compute_kernels
//!                 ∩ virtual-table rules
//!        └─ shard geometry → ShardEstimator → prune against device budget
//! ```
//!
//! Options are grouped per table in input order and sorted by cost within
//! each table, cheapest first.

use crate::estimator::{ShardEstimator, TableContext};
use crate::option::{bucket_row_ranges, even_split, row_ranges, Shard};
use crate::{PlannerConfig, PlannerError, Sharder, ShardingOption, Topology};
use std::collections::BTreeMap;
use storage_budget::Storage;
use table_ir::{
    ComputeKernel, ConstraintMap, EmbeddingModule, EmbeddingTable, ModuleKind,
    ParameterConstraints, ShardingType, Validated,
};

/// Picks one sharder per module kind. The first sharder for a kind wins.
pub fn select_sharders<'a>(sharders: &[&'a dyn Sharder]) -> BTreeMap<ModuleKind, &'a dyn Sharder> {
    let mut by_kind: BTreeMap<ModuleKind, &'a dyn Sharder> = BTreeMap::new();
    for &sharder in sharders {
        let kind = sharder.module_kind();
        match by_kind.get(&kind) {
            Some(existing) => tracing::warn!(
                "sharder '{}' ignored: '{}' already handles {}",
                sharder.name(),
                existing.name(),
                kind,
            ),
            None => {
                by_kind.insert(kind, sharder);
            }
        }
    }
    by_kind
}

/// The options of one table.
#[derive(Debug, Clone)]
pub struct TableOptions {
    pub module_path: String,
    pub context: TableContext,
    /// Sorted by total cost, cheapest first.
    pub options: Vec<ShardingOption>,
}

impl TableOptions {
    pub fn name(&self) -> &str {
        &self.context.table.name
    }
}

/// Every table's options, plus what is needed to re-estimate them.
#[derive(Debug, Clone)]
pub struct SearchSpace {
    tables: Vec<TableOptions>,
    topology: Topology,
    estimator: ShardEstimator,
}

impl SearchSpace {
    pub fn new(tables: Vec<TableOptions>, topology: Topology, estimator: ShardEstimator) -> Self {
        Self {
            tables,
            topology,
            estimator,
        }
    }

    pub fn tables(&self) -> &[TableOptions] {
        &self.tables
    }

    pub fn num_tables(&self) -> usize {
        self.tables.len()
    }

    pub fn num_options(&self) -> usize {
        self.tables.iter().map(|t| t.options.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Every table's cheapest option.
    pub fn cheapest_proposal(&self) -> Vec<ShardingOption> {
        self.tables
            .iter()
            .filter_map(|t| t.options.first().cloned())
            .collect()
    }

    /// Returns `option` re-estimated with a different cache load factor.
    pub fn with_cache_load_factor(&self, option: &ShardingOption, load_factor: f64) -> ShardingOption {
        let mut rescaled = option.unplaced();
        rescaled.cache_load_factor = Some(load_factor);
        if let Some(table) = self.tables.get(option.table_index) {
            self.estimator
                .estimate(&self.topology, &table.context, &mut rescaled);
        }
        rescaled
    }
}

/// Enumerates sharding options for embedding modules.
#[derive(Debug, Clone)]
pub struct EmbeddingEnumerator {
    topology: Topology,
    estimator: ShardEstimator,
    min_column_dim: u64,
}

impl EmbeddingEnumerator {
    pub fn new(topology: Topology, config: &PlannerConfig) -> Result<Self, PlannerError> {
        Ok(Self {
            topology,
            estimator: ShardEstimator::new(config)?,
            min_column_dim: config.min_column_dim,
        })
    }

    pub fn estimator(&self) -> &ShardEstimator {
        &self.estimator
    }

    /// Stable description of the enumerator's parameters.
    pub fn fingerprint(&self) -> String {
        format!(
            "EmbeddingEnumerator(min_column_dim={}, {})",
            self.min_column_dim,
            self.estimator.fingerprint(),
        )
    }

    /// Builds the search space.
    ///
    /// `effective` is the per-device budget left after reservation;
    /// options with a shard that fits no device are pruned.
    ///
    /// # Errors
    /// - [`PlannerError::Table`] if constraint feature names disagree with
    ///   a table's.
    /// - [`PlannerError::StrictConstraints`] if a table has no legal
    ///   option, or only options too large for any device while the
    ///   cluster as a whole could hold it.
    /// - [`PlannerError::InsufficientStorage`] if every option of a table
    ///   exceeds even the aggregate budget.
    pub fn enumerate(
        &self,
        modules: &[EmbeddingModule<Validated>],
        sharders: &[&dyn Sharder],
        constraints: &ConstraintMap,
        effective: &[Storage],
    ) -> Result<SearchSpace, PlannerError> {
        let by_kind = select_sharders(sharders);
        let largest_device = Storage::new(
            effective.iter().map(|s| s.hbm).max().unwrap_or(0),
            effective.iter().map(|s| s.ddr).max().unwrap_or(0),
        );
        let aggregate: Storage = effective.iter().copied().sum();
        let no_constraint = ParameterConstraints::default();

        let mut tables = Vec::new();
        for module in modules {
            let Some(&sharder) = by_kind.get(&module.kind) else {
                tracing::info!(
                    "no sharder for module '{}' ({}); left unsharded",
                    module.path,
                    module.kind,
                );
                continue;
            };

            for table in module.iter_tables() {
                let constraint = constraints.get(&table.name).unwrap_or(&no_constraint);
                constraint.check_feature_names(table)?;

                let context = TableContext {
                    table: table.clone(),
                    module_kind: module.kind,
                    pooling_factor: constraint.pooling_factor.unwrap_or(table.pooling_factor),
                };
                let table_index = tables.len();
                let options = self.table_options(
                    &module.path,
                    table_index,
                    &context,
                    constraint,
                    sharder,
                    largest_device,
                    aggregate,
                )?;
                tables.push(TableOptions {
                    module_path: module.path.clone(),
                    context,
                    options,
                });
            }
        }

        let space = SearchSpace::new(tables, self.topology.clone(), self.estimator.clone());
        tracing::info!(
            "enumerated {} options for {} tables",
            space.num_options(),
            space.num_tables(),
        );
        Ok(space)
    }

    #[allow(clippy::too_many_arguments)]
    fn table_options(
        &self,
        module_path: &str,
        table_index: usize,
        context: &TableContext,
        constraint: &ParameterConstraints,
        sharder: &dyn Sharder,
        largest_device: Storage,
        aggregate: Storage,
    ) -> Result<Vec<ShardingOption>, PlannerError> {
        let table = &context.table;
        let device = self.topology.compute_device();
        let fits = |o: &ShardingOption| o.shards.iter().all(|s| s.storage.fits_in(&largest_device));

        let mut legal_pairs = 0usize;
        let mut options = Vec::new();
        let mut pruned = Vec::new();

        for sharding_type in sharder.sharding_types(device) {
            if !constraint.allows_sharding_type(sharding_type) {
                continue;
            }
            for kernel in self.legal_kernels(sharder, sharding_type, constraint, table) {
                legal_pairs += 1;
                let build = |st| {
                    self.build_option(module_path, table_index, context, constraint, sharder, st, kernel)
                };
                let mut option = build(sharding_type);

                if sharding_type == ShardingType::TableWise
                    && sharder.sharding_types(device).contains(&ShardingType::RowWise)
                    && constraint.allows_sharding_type(ShardingType::RowWise)
                    && self
                        .legal_kernels(sharder, ShardingType::RowWise, constraint, table)
                        .contains(&kernel)
                {
                    let fallback = build(ShardingType::RowWise);
                    if fits(&fallback) {
                        option.fallback = Some(Box::new(fallback));
                    }
                }

                if fits(&option) {
                    options.push(option);
                } else {
                    tracing::debug!(
                        "pruned {}: a shard exceeds every device budget",
                        option.summary(),
                    );
                    pruned.push(option);
                }
            }
        }

        if legal_pairs == 0 {
            return Err(PlannerError::StrictConstraints {
                tables: vec![table.name.clone()],
                detail: format!(
                    "sharder '{}' and the table's constraints share no sharding type and compute kernel",
                    sharder.name(),
                ),
            });
        }

        if options.is_empty() {
            let could_hold = pruned.iter().any(|o| o.total_storage().fits_in(&aggregate));
            if could_hold {
                return Err(PlannerError::StrictConstraints {
                    tables: vec![table.name.clone()],
                    detail: format!(
                        "every allowed option has a shard larger than any device's effective budget ({largest_device})",
                    ),
                });
            }
            let smallest = pruned
                .iter()
                .map(ShardingOption::total_storage)
                .min_by_key(Storage::total)
                .unwrap_or_default();
            let tier = smallest.dominant_tier();
            return Err(PlannerError::InsufficientStorage {
                tier,
                needed: smallest.get(tier),
                available: aggregate.get(tier),
                proposals: 0,
                detail: format!("table '{}' exceeds the aggregate effective budget", table.name),
            });
        }

        options.sort_by(|a, b| {
            a.total_perf()
                .total_cmp(&b.total_perf())
                .then(a.sharding_type.cmp(&b.sharding_type))
                .then(a.compute_kernel.cmp(&b.compute_kernel))
        });
        Ok(options)
    }

    fn legal_kernels(
        &self,
        sharder: &dyn Sharder,
        sharding_type: ShardingType,
        constraint: &ParameterConstraints,
        table: &EmbeddingTable,
    ) -> Vec<ComputeKernel> {
        sharder
            .compute_kernels(sharding_type, self.topology.compute_device())
            .into_iter()
            .filter(|k| constraint.allows_kernel(*k))
            .filter(|k| {
                if table.use_virtual_table {
                    k.supports_dynamic_rows()
                } else {
                    *k != ComputeKernel::DramVirtualTable
                }
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn build_option(
        &self,
        module_path: &str,
        table_index: usize,
        context: &TableContext,
        constraint: &ParameterConstraints,
        sharder: &dyn Sharder,
        sharding_type: ShardingType,
        kernel: ComputeKernel,
    ) -> ShardingOption {
        let table = &context.table;
        let cache_load_factor = (kernel.is_caching() || kernel.supports_dynamic_rows()).then(|| {
            constraint
                .cache_params
                .as_ref()
                .and_then(|p| p.load_factor)
                .or_else(|| sharder.cache_load_factor())
                .unwrap_or(self.estimator.default_cache_load_factor())
        });

        let mut option = ShardingOption {
            name: table.name.clone(),
            module_path: module_path.to_string(),
            table_index,
            sharding_type,
            compute_kernel: kernel,
            shards: self.shard_geometry(table, sharding_type),
            cache_load_factor,
            cache_params: constraint.cache_params.clone(),
            enforce_hbm: constraint.enforce_hbm,
            stochastic_rounding: constraint.stochastic_rounding,
            bounds_check_mode: constraint.bounds_check_mode,
            is_weighted: table.is_weighted || constraint.is_weighted,
            feature_names: table.feature_names.clone(),
            key_value_params: constraint.key_value_params.clone(),
            priority: constraint.priority.unwrap_or(1.0),
            fallback: None,
            requested_sharding_type: None,
        };
        self.estimator.estimate(&self.topology, context, &mut option);
        option
    }

    fn shard_geometry(&self, table: &EmbeddingTable, sharding_type: ShardingType) -> Vec<Shard> {
        let rows = table.num_embeddings;
        let dim = table.embedding_dim;
        let world = self.topology.world_size();

        let row_shards = |parts: usize| {
            let ranges = if table.use_virtual_table {
                bucket_row_ranges(rows, table.total_num_buckets.unwrap_or(rows), parts)
            } else {
                row_ranges(rows, parts)
            };
            ranges
                .into_iter()
                .map(|(offset, size)| Shard::new([offset, 0], [size, dim]))
                .collect::<Vec<_>>()
        };

        match sharding_type {
            ShardingType::TableWise => vec![Shard::new([0, 0], [rows, dim])],
            ShardingType::DataParallel => (0..world).map(|_| Shard::new([0, 0], [rows, dim])).collect(),
            ShardingType::RowWise => row_shards(world),
            ShardingType::TableRowWise => row_shards(self.topology.local_world_size()),
            ShardingType::ColumnWise => {
                let parts = (dim / self.min_column_dim).min(world as u64).max(1) as usize;
                let mut offset = 0;
                even_split(dim, parts)
                    .into_iter()
                    .map(|cols| {
                        let shard = Shard::new([0, offset], [rows, cols]);
                        offset += cols;
                        shard
                    })
                    .collect()
            }
        }
    }
}
