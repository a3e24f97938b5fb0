// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the shard planner.

use storage_budget::{StorageError, Tier};
use table_ir::TableError;

/// Coarse classification of a [`PlannerError`] for programmatic matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlannerErrorKind {
    /// Constraints and sharder capabilities leave no way to place a table.
    StrictConstraints,
    /// The effective budget cannot hold the tables under any option.
    InsufficientStorage,
    /// Enough storage exists in aggregate but no proposal could be packed.
    PartitionInfeasible,
    /// Malformed tables, topology or configuration.
    InvalidInput,
}

/// Errors that can occur during shard planning.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    /// Sharder capabilities intersected with constraints leave no legal
    /// option for some tables, or every option was rejected by a
    /// constraint.
    #[error("strict constraints: no legal placement for tables {tables:?}: {detail}")]
    StrictConstraints { tables: Vec<String>, detail: String },

    /// The reserved or required storage exceeds what the devices provide.
    #[error("insufficient storage in {tier}: need {needed} bytes, {available} available after {proposals} proposals: {detail}")]
    InsufficientStorage {
        tier: Tier,
        needed: u64,
        available: u64,
        proposals: usize,
        detail: String,
    },

    /// Every proposal failed to pack even though aggregate capacity
    /// would suffice.
    #[error("unable to find a feasible plan after {proposals} proposals: {detail}")]
    PartitionInfeasible {
        proposals: usize,
        tables: Vec<String>,
        detail: String,
    },

    /// The topology or planner inputs are malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A table or module description is invalid.
    #[error("table error: {0}")]
    Table(#[from] TableError),

    /// A storage size or ledger operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A configuration file could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PlannerError {
    /// Returns the coarse kind of this error.
    pub fn kind(&self) -> PlannerErrorKind {
        match self {
            PlannerError::StrictConstraints { .. } => PlannerErrorKind::StrictConstraints,
            PlannerError::InsufficientStorage { .. } => PlannerErrorKind::InsufficientStorage,
            PlannerError::PartitionInfeasible { .. } => PlannerErrorKind::PartitionInfeasible,
            PlannerError::InvalidInput(_)
            | PlannerError::Table(_)
            | PlannerError::Storage(_)
            | PlannerError::Config(_) => PlannerErrorKind::InvalidInput,
        }
    }

    /// Number of proposals tried before the error was raised, where known.
    pub fn proposals(&self) -> Option<usize> {
        match self {
            PlannerError::InsufficientStorage { proposals, .. }
            | PlannerError::PartitionInfeasible { proposals, .. } => Some(*proposals),
            _ => None,
        }
    }
}
