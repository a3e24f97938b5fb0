// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The [`Proposer`] trait and proposer implementations.
//!
//! A proposer walks the search space and hands the planner one candidate
//! at a time: one option per table, in search-space order. The planner
//! reports back whether the candidate could be placed and how it scored.
//!
//! ```text
//!   load(space) ─▶ propose() ─▶ Some(candidate) ─▶ partition + rate
//!                     ▲                                  │
//!                     └──────── feedback(outcome) ◀──────┘
//!                  propose() ─▶ None   (exhausted)
//! ```
//!
//! | Proposer | Candidates |
//! |---|---|
//! | [`GreedyProposer`] | cheapest options, then walks the costliest table down its list |
//! | [`UniformProposer`] | one per sharding type shared by every table |
//! | [`GridSearchProposer`] | every combination of per-table sharding types, bounded |
//! | [`EmbeddingOffloadScaleupProposer`] | offloads tables to caching kernels, then grows the cache |

pub mod greedy;
pub mod grid;
pub mod scaleup;
pub mod uniform;

pub use greedy::GreedyProposer;
pub use grid::GridSearchProposer;
pub use scaleup::EmbeddingOffloadScaleupProposer;
pub use uniform::UniformProposer;

use crate::enumerator::SearchSpace;
use crate::ShardingOption;

/// Result of trying a candidate, reported back to its proposer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProposalOutcome {
    /// The candidate could be placed within the effective budget.
    pub feasible: bool,
    /// Score of the placed candidate; `None` when infeasible.
    pub perf: Option<f64>,
}

impl ProposalOutcome {
    pub fn feasible(perf: f64) -> Self {
        Self {
            feasible: true,
            perf: Some(perf),
        }
    }

    pub fn infeasible() -> Self {
        Self {
            feasible: false,
            perf: None,
        }
    }
}

/// Trait for search-space proposers.
///
/// Proposers are plain state machines: they can be stepped by hand with
/// [`load`](Proposer::load), [`propose`](Proposer::propose) and
/// [`feedback`](Proposer::feedback), without a planner.
pub trait Proposer {
    /// Human-readable name of this proposer.
    fn name(&self) -> &str;

    /// Resets the proposer onto a new search space.
    fn load(&mut self, space: &SearchSpace);

    /// Next candidate, or `None` once exhausted.
    fn propose(&mut self) -> Option<Vec<ShardingOption>>;

    /// Outcome of the most recent candidate.
    fn feedback(&mut self, outcome: &ProposalOutcome);
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::enumerator::{EmbeddingEnumerator, SearchSpace};
    use crate::{PlannerConfig, Sharder, Topology};
    use storage_budget::Storage;
    use table_ir::{
        ComputeDevice, ConstraintMap, EmbeddingModule, EmbeddingTable, ModuleKind,
    };

    /// Search space over `tables` (name, rows, dim) on two roomy devices.
    pub fn space(tables: &[(&str, u64, u64)], sharder: &dyn Sharder) -> SearchSpace {
        space_with(tables, sharder, &ConstraintMap::new())
    }

    pub fn space_with(
        tables: &[(&str, u64, u64)],
        sharder: &dyn Sharder,
        constraints: &ConstraintMap,
    ) -> SearchSpace {
        let topology = Topology::new(2, ComputeDevice::Cuda).unwrap();
        let module = EmbeddingModule::new(
            "sparse.ebc",
            ModuleKind::EmbeddingBagCollection,
            tables
                .iter()
                .map(|&(name, rows, dim)| EmbeddingTable::new(name, rows, dim))
                .collect(),
        )
        .validate()
        .unwrap();
        let effective = vec![Storage::new(1 << 30, 1 << 30); 2];
        EmbeddingEnumerator::new(topology, &PlannerConfig::default())
            .unwrap()
            .enumerate(&[module], &[sharder], constraints, &effective)
            .unwrap()
    }
}
