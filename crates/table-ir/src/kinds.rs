// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Vocabulary shared by sharders, constraints and plans: how a table is
//! partitioned, which lookup kernel serves it, and where it runs.

use crate::TableError;
use std::fmt;

/// How a table's rows and columns are partitioned across devices.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
    serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ShardingType {
    /// Full replica on every device; gradients are all-reduced.
    DataParallel,
    /// The whole table lives on a single device.
    TableWise,
    /// The embedding dimension is split into column shards.
    ColumnWise,
    /// Rows are split across every device in the world.
    RowWise,
    /// Rows are split across the devices of a single host.
    TableRowWise,
}

impl ShardingType {
    /// Every sharding type, in a fixed order.
    pub const ALL: [ShardingType; 5] = [
        ShardingType::DataParallel,
        ShardingType::TableWise,
        ShardingType::ColumnWise,
        ShardingType::RowWise,
        ShardingType::TableRowWise,
    ];

    /// Returns `true` if shards split the row dimension across devices.
    pub fn is_row_partitioned(self) -> bool {
        matches!(self, ShardingType::RowWise | ShardingType::TableRowWise)
    }

    /// Returns the canonical snake_case label.
    pub fn as_str(self) -> &'static str {
        match self {
            ShardingType::DataParallel => "data_parallel",
            ShardingType::TableWise => "table_wise",
            ShardingType::ColumnWise => "column_wise",
            ShardingType::RowWise => "row_wise",
            ShardingType::TableRowWise => "table_row_wise",
        }
    }

    /// Parses a sharding type, accepting short aliases (`"tw"`, `"rw"`).
    pub fn from_str_loose(s: &str) -> Result<Self, TableError> {
        match s.to_lowercase().as_str() {
            "data_parallel" | "dp" => Ok(Self::DataParallel),
            "table_wise" | "tw" => Ok(Self::TableWise),
            "column_wise" | "cw" => Ok(Self::ColumnWise),
            "row_wise" | "rw" => Ok(Self::RowWise),
            "table_row_wise" | "twrw" => Ok(Self::TableRowWise),
            _ => Err(TableError::UnknownName {
                what: "sharding type",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ShardingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The lookup implementation that serves a shard.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
    serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ComputeKernel {
    /// Plain dense parameter, used for data-parallel replicas.
    Dense,
    /// Fused lookup with weights resident in device memory.
    Fused,
    /// Fused lookup with weights in host memory, accessed over UVM.
    FusedUvm,
    /// Fused lookup with a device-memory cache in front of host memory.
    FusedUvmCaching,
    /// Inference lookup over row-wise quantised weights.
    Quant,
    /// Key-value backed table with a device cache.
    KeyValue,
    /// Host-memory virtual table for dynamic row counts.
    DramVirtualTable,
}

impl ComputeKernel {
    /// Every compute kernel, in a fixed order.
    pub const ALL: [ComputeKernel; 7] = [
        ComputeKernel::Dense,
        ComputeKernel::Fused,
        ComputeKernel::FusedUvm,
        ComputeKernel::FusedUvmCaching,
        ComputeKernel::Quant,
        ComputeKernel::KeyValue,
        ComputeKernel::DramVirtualTable,
    ];

    /// Returns `true` for kernels that hold a fast-tier cache of a
    /// slow-tier table.
    pub fn is_caching(self) -> bool {
        matches!(
            self,
            ComputeKernel::FusedUvmCaching | ComputeKernel::KeyValue
        )
    }

    /// Returns `true` for kernels that can serve tables whose row count
    /// is not fixed up front.
    pub fn supports_dynamic_rows(self) -> bool {
        matches!(
            self,
            ComputeKernel::KeyValue | ComputeKernel::DramVirtualTable
        )
    }

    /// Returns the canonical snake_case label.
    pub fn as_str(self) -> &'static str {
        match self {
            ComputeKernel::Dense => "dense",
            ComputeKernel::Fused => "fused",
            ComputeKernel::FusedUvm => "fused_uvm",
            ComputeKernel::FusedUvmCaching => "fused_uvm_caching",
            ComputeKernel::Quant => "quant",
            ComputeKernel::KeyValue => "key_value",
            ComputeKernel::DramVirtualTable => "dram_virtual_table",
        }
    }

    /// Parses a compute kernel label.
    pub fn from_str_loose(s: &str) -> Result<Self, TableError> {
        match s.to_lowercase().as_str() {
            "dense" => Ok(Self::Dense),
            "fused" => Ok(Self::Fused),
            "fused_uvm" | "uvm" => Ok(Self::FusedUvm),
            "fused_uvm_caching" | "uvm_caching" => Ok(Self::FusedUvmCaching),
            "quant" | "quantized" => Ok(Self::Quant),
            "key_value" | "kv" => Ok(Self::KeyValue),
            "dram_virtual_table" | "virtual" => Ok(Self::DramVirtualTable),
            _ => Err(TableError::UnknownName {
                what: "compute kernel",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ComputeKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of device the sharded module computes on.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
    serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    /// An accelerator with its own high-bandwidth memory.
    #[default]
    Cuda,
    /// A host CPU; all storage lives in DDR.
    Cpu,
}

impl ComputeDevice {
    /// Returns `true` if the device has a separate fast memory tier.
    pub fn has_fast_tier(self) -> bool {
        matches!(self, ComputeDevice::Cuda)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComputeDevice::Cuda => "cuda",
            ComputeDevice::Cpu => "cpu",
        }
    }

    /// Parses a device kind (`"cuda"`, `"gpu"`, `"cpu"`).
    pub fn from_str_loose(s: &str) -> Result<Self, TableError> {
        match s.to_lowercase().as_str() {
            "cuda" | "gpu" => Ok(Self::Cuda),
            "cpu" | "host" => Ok(Self::Cpu),
            _ => Err(TableError::UnknownName {
                what: "compute device",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of module that owns a group of tables. Sharders declare the
/// module kind they know how to shard.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
    serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    /// Pooled lookups: one vector per feature per example.
    EmbeddingBagCollection,
    /// Sequence lookups: one vector per id.
    EmbeddingCollection,
}

impl ModuleKind {
    /// Returns `true` when lookups are pooled per example.
    pub fn is_pooled(self) -> bool {
        matches!(self, ModuleKind::EmbeddingBagCollection)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModuleKind::EmbeddingBagCollection => "embedding_bag_collection",
            ModuleKind::EmbeddingCollection => "embedding_collection",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
