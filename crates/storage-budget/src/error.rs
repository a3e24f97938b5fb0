// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for storage accounting.

use crate::Tier;

/// Errors that can occur while parsing sizes or charging device budgets.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Placing a shard would exceed a device's budget in one tier.
    #[error("out of {tier} on rank {rank}: requested {requested} bytes, but only {available} available (budget: {budget})")]
    OutOfMemory {
        tier: Tier,
        rank: usize,
        requested: u64,
        available: u64,
        budget: u64,
    },

    /// A rank outside the ledger was addressed.
    #[error("rank {rank} is out of range for world size {world_size}")]
    UnknownRank { rank: usize, world_size: usize },

    /// A human-readable size string could not be parsed.
    #[error("invalid size '{input}': {detail}")]
    InvalidSize { input: String, detail: String },
}
