// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Storage reservation: budget held back from embedding tables.
//!
//! # Heuristic
//!
//! ```text
//! reserved (each tier)  = percentage × tier capacity
//! reserved (compute tier) += 2 × batch × Σ output width × 4        pooled activations + grads
//!                          + batch × Σ features × (pooling × 8 + 4) input ids + lengths
//! effective             = capacity − reserved      (negative ⇒ infeasible)
//! ```
//!
//! The compute tier is HBM on accelerators and DDR on CPU hosts.

use crate::Topology;
use storage_budget::{Storage, Tier};
use table_ir::{ConstraintMap, EmbeddingModule, Validated};

/// Computes how much of each device is unavailable to embedding tables.
pub trait StorageReservation {
    /// Human-readable name of this policy.
    fn name(&self) -> &str;

    /// Stable description of the policy's parameters.
    fn fingerprint(&self) -> String;

    /// Per-device reservation. Must be deterministic.
    fn reserve(
        &self,
        topology: &Topology,
        batch_size: u64,
        modules: &[EmbeddingModule<Validated>],
        constraints: &ConstraintMap,
    ) -> Storage;
}

/// Reserves a fixed percentage of each tier and nothing else.
#[derive(Debug, Clone)]
pub struct FixedPercentageStorageReservation {
    percentage: f64,
}

impl FixedPercentageStorageReservation {
    pub fn new(percentage: f64) -> Self {
        Self { percentage }
    }
}

impl StorageReservation for FixedPercentageStorageReservation {
    fn name(&self) -> &str {
        "fixed-percentage"
    }

    fn fingerprint(&self) -> String {
        format!("FixedPercentageStorageReservation(percentage={})", self.percentage)
    }

    fn reserve(
        &self,
        topology: &Topology,
        _batch_size: u64,
        _modules: &[EmbeddingModule<Validated>],
        _constraints: &ConstraintMap,
    ) -> Storage {
        percentage_of(topology.device_capacity(), self.percentage)
    }
}

/// Reserves a percentage of each tier plus an estimate of the dense
/// activations and inputs the embedding lookups produce.
#[derive(Debug, Clone)]
pub struct HeuristicalStorageReservation {
    percentage: f64,
}

impl HeuristicalStorageReservation {
    pub fn new(percentage: f64) -> Self {
        Self { percentage }
    }

    /// Bytes of pooled outputs, their gradients and the input ids.
    fn dense_bytes(
        batch_size: u64,
        modules: &[EmbeddingModule<Validated>],
        constraints: &ConstraintMap,
    ) -> u64 {
        let batch = batch_size as f64;
        let mut output_width = 0.0;
        let mut input = 0.0;
        for table in modules.iter().flat_map(|m| m.iter_tables()) {
            let features = table.num_features() as f64;
            let pooling = constraints
                .get(&table.name)
                .and_then(|c| c.pooling_factor)
                .unwrap_or(table.pooling_factor);
            output_width += features * table.embedding_dim as f64;
            input += features * (pooling * 8.0 + 4.0);
        }
        (2.0 * batch * output_width * 4.0 + batch * input).ceil() as u64
    }
}

impl Default for HeuristicalStorageReservation {
    fn default() -> Self {
        Self::new(0.15)
    }
}

impl StorageReservation for HeuristicalStorageReservation {
    fn name(&self) -> &str {
        "heuristical"
    }

    fn fingerprint(&self) -> String {
        format!("HeuristicalStorageReservation(percentage={})", self.percentage)
    }

    fn reserve(
        &self,
        topology: &Topology,
        batch_size: u64,
        modules: &[EmbeddingModule<Validated>],
        constraints: &ConstraintMap,
    ) -> Storage {
        let compute_tier = if topology.compute_device().has_fast_tier() {
            Tier::Hbm
        } else {
            Tier::Ddr
        };
        let dense = Self::dense_bytes(batch_size, modules, constraints);
        percentage_of(topology.device_capacity(), self.percentage) + Storage::in_tier(compute_tier, dense)
    }
}

fn percentage_of(capacity: Storage, percentage: f64) -> Storage {
    Storage::new(
        (capacity.hbm as f64 * percentage).ceil() as u64,
        (capacity.ddr as f64 * percentage).ceil() as u64,
    )
}

/// Budget left on every device after `reserved`, or the first tier that
/// goes negative.
pub fn effective_budget(topology: &Topology, reserved: &Storage) -> Result<Vec<Storage>, Tier> {
    let capacity = topology.device_capacity();
    match capacity.checked_sub(reserved) {
        Some(effective) => Ok(vec![effective; topology.world_size()]),
        None if reserved.hbm > capacity.hbm => Err(Tier::Hbm),
        None => Err(Tier::Ddr),
    }
}
