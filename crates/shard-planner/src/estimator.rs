// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-shard storage and cost estimates.
//!
//! # Storage Model
//!
//! ```text
//! base  = rows × row_bytes(cols)
//!
//! dense / fused / quant      fast tier = base        (slow tier on CPU)
//! fused_uvm                  slow tier = base
//! caching                    fast = min(cache cap, ⌈clf × base⌉), slow = base − fast
//! virtual table              fast = min(l1, ⌈clf × base⌉),        slow = min(l2, base − fast)
//! ```
//!
//! # Cost Model
//!
//! With `B = batch × world` examples per step, `L = B × features × pooling`
//! ids, and `f` the shard's fraction of the table's rows:
//!
//! ```text
//! table-/column-wise  compute = L × row_bytes / mem_bw
//!                     comms   = L × id_bytes / comm_bw + output_bytes / comm_bw
//! row-wise            compute = f × L × row_bytes / mem_bw
//!                     comms   = f × L × id_bytes / comm_bw + output_bytes / comm_bw
//! data-parallel       compute = (L / world) × row_bytes / mem_bw
//!                     comms   = gradient all-reduce (backward only)
//! backward            compute = 2 × forward compute, comms = forward comms
//! ```
//!
//! Row-wise shards each pay the full pooled output, so a two-way row-wise
//! shard always costs between half and all of its table-wise counterpart.

use crate::option::Perf;
use crate::{PlannerConfig, PlannerError, ShardingOption, Topology};
use storage_budget::Storage;
use table_ir::{ComputeKernel, EmbeddingTable, ModuleKind, ShardingType};

const MIB: u64 = 1024 * 1024;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Bytes per looked-up id on the wire (plus a weight for weighted tables).
const ID_BYTES: f64 = 8.0;
const WEIGHT_BYTES: f64 = 4.0;
/// Output activations are fp32.
const OUTPUT_ELEMENT_BYTES: f64 = 4.0;

/// Everything about a table the estimator needs besides the option.
#[derive(Debug, Clone, PartialEq)]
pub struct TableContext {
    pub table: EmbeddingTable,
    pub module_kind: ModuleKind,
    /// Pooling factor after constraint overrides.
    pub pooling_factor: f64,
}

/// Fills in per-shard storage and cost.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardEstimator {
    batch_size: u64,
    cache_load_factor: f64,
    l1_cache_bytes: u64,
    l2_cache_bytes: u64,
}

impl ShardEstimator {
    pub fn new(config: &PlannerConfig) -> Result<Self, PlannerError> {
        Ok(Self {
            batch_size: config.batch_size,
            cache_load_factor: config.cache_load_factor,
            l1_cache_bytes: config.l1_cache_bytes()?,
            l2_cache_bytes: config.l2_cache_bytes()?,
        })
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    /// Cache load factor used when neither constraints nor sharder set one.
    pub fn default_cache_load_factor(&self) -> f64 {
        self.cache_load_factor
    }

    /// Stable description of the estimator's parameters.
    pub fn fingerprint(&self) -> String {
        format!(
            "ShardEstimator(batch_size={}, cache_load_factor={}, l1={}, l2={})",
            self.batch_size, self.cache_load_factor, self.l1_cache_bytes, self.l2_cache_bytes,
        )
    }

    /// Recomputes storage and cost of every shard of `option`.
    pub fn estimate(&self, topology: &Topology, ctx: &TableContext, option: &mut ShardingOption) {
        let num_shards = option.shards.len();
        for i in 0..num_shards {
            let [rows, cols] = option.shards[i].sizes;
            let storage = self.shard_storage(topology, ctx, option, rows, cols);
            let perf = self.shard_perf(topology, ctx, option, rows, cols);
            option.shards[i].storage = storage;
            option.shards[i].perf = perf;
        }
    }

    fn shard_storage(
        &self,
        topology: &Topology,
        ctx: &TableContext,
        option: &ShardingOption,
        rows: u64,
        cols: u64,
    ) -> Storage {
        let table = &ctx.table;
        let base = rows.saturating_mul(table.data_type.row_bytes(cols));
        let kernel = option.compute_kernel;
        let clf = option.cache_load_factor.unwrap_or(self.cache_load_factor);
        let cached = (((base as f64) * clf).ceil() as u64).min(base);

        let (fast, slow) = if table.use_virtual_table && kernel.supports_dynamic_rows() {
            let kv = option.key_value_params.as_ref();
            let l1 = kv
                .and_then(|p| p.max_l1_cache_mb)
                .map_or(self.l1_cache_bytes, |mb| mb.saturating_mul(MIB));
            let l2 = kv
                .and_then(|p| p.l2_cache_mb)
                .map_or(self.l2_cache_bytes, |mb| mb.saturating_mul(MIB));
            let fast = l1.min(cached);
            (fast, l2.min(base.saturating_sub(fast)))
        } else if kernel.is_caching() {
            let cap = option
                .cache_params
                .as_ref()
                .and_then(|p| p.reserved_memory)
                .map_or(u64::MAX, |gib| (gib * GIB) as u64);
            let fast = cap.min(cached);
            (fast, base.saturating_sub(fast))
        } else if kernel == ComputeKernel::FusedUvm {
            (0, base)
        } else {
            (base, 0)
        };

        if topology.compute_device().has_fast_tier() {
            Storage::new(fast, slow)
        } else {
            Storage::new(0, fast.saturating_add(slow))
        }
    }

    /// Effective read bandwidth of `kernel`, blending cache hits and
    /// misses by the cache load factor.
    fn kernel_bw(&self, topology: &Topology, kernel: ComputeKernel, clf: f64) -> f64 {
        if !topology.compute_device().has_fast_tier() {
            return topology.ddr_mem_bw();
        }
        let blend = |miss_bw: f64| 1.0 / (clf / topology.hbm_mem_bw() + (1.0 - clf) / miss_bw);
        match kernel {
            ComputeKernel::Dense | ComputeKernel::Fused | ComputeKernel::Quant => {
                topology.compute_mem_bw()
            }
            ComputeKernel::FusedUvm => topology.uvm_mem_bw(),
            ComputeKernel::FusedUvmCaching => blend(topology.uvm_mem_bw()),
            ComputeKernel::KeyValue => blend(topology.ssd_mem_bw()),
            ComputeKernel::DramVirtualTable => blend(topology.ddr_mem_bw()),
        }
    }

    fn shard_perf(
        &self,
        topology: &Topology,
        ctx: &TableContext,
        option: &ShardingOption,
        rows: u64,
        cols: u64,
    ) -> Perf {
        let table = &ctx.table;
        let world = topology.world_size() as f64;
        let global_batch = self.batch_size as f64 * world;
        let features = table.num_features() as f64;
        let lookups = global_batch * features * ctx.pooling_factor;
        let row_bytes = table.data_type.row_bytes(cols) as f64;
        let id_bytes = if option.is_weighted {
            ID_BYTES + WEIGHT_BYTES
        } else {
            ID_BYTES
        };
        let output_rows = if ctx.module_kind.is_pooled() {
            global_batch * features
        } else {
            lookups
        };
        let output_bytes = output_rows * cols as f64 * OUTPUT_ELEMENT_BYTES;
        let clf = option.cache_load_factor.unwrap_or(self.cache_load_factor);
        let mem_bw = self.kernel_bw(topology, option.compute_kernel, clf);
        let comm_bw = topology.comm_bw();

        let (fwd_compute, fwd_comms, bwd_comms) = match option.sharding_type {
            ShardingType::DataParallel => {
                let compute = (lookups / world) * row_bytes / mem_bw;
                let table_bytes = rows as f64 * row_bytes;
                let all_reduce = 2.0 * table_bytes * (world - 1.0) / world / comm_bw;
                (compute, 0.0, all_reduce)
            }
            ShardingType::TableWise | ShardingType::ColumnWise => {
                let compute = lookups * row_bytes / mem_bw;
                let comms = lookups * id_bytes / comm_bw + output_bytes / comm_bw;
                (compute, comms, comms)
            }
            ShardingType::RowWise | ShardingType::TableRowWise => {
                let fraction = rows as f64 / table.num_embeddings.max(1) as f64;
                let input_bw = if option.sharding_type == ShardingType::TableRowWise {
                    topology.intra_host_bw()
                } else {
                    comm_bw
                };
                let compute = fraction * lookups * row_bytes / mem_bw;
                let comms = fraction * lookups * id_bytes / input_bw + output_bytes / comm_bw;
                (compute, comms, comms)
            }
        };

        Perf {
            fwd_compute,
            fwd_comms,
            bwd_compute: 2.0 * fwd_compute,
            bwd_comms,
        }
    }
}
