// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Sharder capabilities.
//!
//! A [`Sharder`] declares which sharding types and compute kernels it can
//! realise for one kind of module. The planner never shards anything
//! itself; it only intersects these capabilities with per-table
//! constraints.

use table_ir::{ComputeDevice, ComputeKernel, ModuleKind, ShardingType};

/// Capability description of a module sharder.
///
/// ```ignore
/// struct TableWiseOnly;
/// impl Sharder for TableWiseOnly {
///     fn name(&self) -> &str { "tw-only" }
///     fn module_kind(&self) -> ModuleKind { ModuleKind::EmbeddingBagCollection }
///     fn sharding_types(&self, _: ComputeDevice) -> Vec<ShardingType> {
///         vec![ShardingType::TableWise]
///     }
///     fn compute_kernels(&self, _: ShardingType, _: ComputeDevice) -> Vec<ComputeKernel> {
///         vec![ComputeKernel::Fused]
///     }
/// }
/// ```
pub trait Sharder {
    /// Human-readable name of this sharder.
    fn name(&self) -> &str;

    /// The kind of module this sharder handles.
    fn module_kind(&self) -> ModuleKind;

    /// Sharding types supported on `device`.
    fn sharding_types(&self, device: ComputeDevice) -> Vec<ShardingType>;

    /// Kernels supported for `sharding_type` on `device`.
    fn compute_kernels(&self, sharding_type: ShardingType, device: ComputeDevice)
        -> Vec<ComputeKernel>;

    /// Cache load factor applied to caching kernels when a table's
    /// constraints do not set one.
    fn cache_load_factor(&self) -> Option<f64> {
        None
    }
}

/// Capabilities shared by the stock sharders, optionally narrowed.
#[derive(Debug, Clone, Default)]
struct Capabilities {
    sharding_types: Option<Vec<ShardingType>>,
    compute_kernels: Option<Vec<ComputeKernel>>,
    cache_load_factor: Option<f64>,
}

impl Capabilities {
    fn sharding_types(&self, device: ComputeDevice) -> Vec<ShardingType> {
        ShardingType::ALL
            .into_iter()
            .filter(|st| match device {
                ComputeDevice::Cuda => true,
                ComputeDevice::Cpu => *st != ShardingType::TableRowWise,
            })
            .filter(|st| self.sharding_types.as_ref().map_or(true, |a| a.contains(st)))
            .collect()
    }

    fn compute_kernels(&self, sharding_type: ShardingType, device: ComputeDevice) -> Vec<ComputeKernel> {
        let base: &[ComputeKernel] = match (sharding_type, device) {
            (ShardingType::DataParallel, _) => &[ComputeKernel::Dense],
            (_, ComputeDevice::Cpu) => &[ComputeKernel::Fused],
            (_, ComputeDevice::Cuda) => &[
                ComputeKernel::Fused,
                ComputeKernel::FusedUvm,
                ComputeKernel::FusedUvmCaching,
                ComputeKernel::KeyValue,
                ComputeKernel::DramVirtualTable,
            ],
        };
        base.iter()
            .copied()
            .filter(|k| self.compute_kernels.as_ref().map_or(true, |a| a.contains(k)))
            .collect()
    }
}

macro_rules! stock_sharder {
    ($(#[$doc:meta])* $ty:ident, $kind:expr, $name:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default)]
        pub struct $ty {
            caps: Capabilities,
        }

        impl $ty {
            pub fn new() -> Self {
                Self::default()
            }

            /// Restricts the sharding types this sharder offers.
            pub fn with_sharding_types(mut self, types: impl IntoIterator<Item = ShardingType>) -> Self {
                self.caps.sharding_types = Some(types.into_iter().collect());
                self
            }

            /// Restricts the compute kernels this sharder offers.
            pub fn with_compute_kernels(mut self, kernels: impl IntoIterator<Item = ComputeKernel>) -> Self {
                self.caps.compute_kernels = Some(kernels.into_iter().collect());
                self
            }

            /// Sets the fused-parameter cache load factor.
            pub fn with_cache_load_factor(mut self, load_factor: f64) -> Self {
                self.caps.cache_load_factor = Some(load_factor);
                self
            }
        }

        impl Sharder for $ty {
            fn name(&self) -> &str {
                $name
            }

            fn module_kind(&self) -> ModuleKind {
                $kind
            }

            fn sharding_types(&self, device: ComputeDevice) -> Vec<ShardingType> {
                self.caps.sharding_types(device)
            }

            fn compute_kernels(
                &self,
                sharding_type: ShardingType,
                device: ComputeDevice,
            ) -> Vec<ComputeKernel> {
                self.caps.compute_kernels(sharding_type, device)
            }

            fn cache_load_factor(&self) -> Option<f64> {
                self.caps.cache_load_factor
            }
        }
    };
}

stock_sharder!(
    /// Sharder for pooled embedding-bag modules.
    EmbeddingBagCollectionSharder,
    ModuleKind::EmbeddingBagCollection,
    "embedding_bag_collection"
);

stock_sharder!(
    /// Sharder for sequence embedding modules.
    EmbeddingCollectionSharder,
    ModuleKind::EmbeddingCollection,
    "embedding_collection"
);
