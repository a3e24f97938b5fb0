// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Greedy proposer.
//!
//! Starts from every table's cheapest option. After each candidate it
//! moves the table whose current option costs the most to its next
//! option, until no table has one left.

use super::{ProposalOutcome, Proposer};
use crate::enumerator::SearchSpace;
use crate::ShardingOption;

#[derive(Debug, Clone, Default)]
pub struct GreedyProposer {
    options: Vec<Vec<ShardingOption>>,
    current: Vec<usize>,
    awaiting_feedback: bool,
    exhausted: bool,
}

impl GreedyProposer {
    pub fn new() -> Self {
        Self {
            exhausted: true,
            ..Default::default()
        }
    }

    /// Index of each table's current option.
    pub fn current(&self) -> &[usize] {
        &self.current
    }

    fn advance(&mut self) {
        let mut pick: Option<(usize, f64)> = None;
        for (table, options) in self.options.iter().enumerate() {
            let idx = self.current[table];
            if idx + 1 >= options.len() {
                continue;
            }
            let perf = options[idx].total_perf();
            if pick.map_or(true, |(_, best)| perf > best) {
                pick = Some((table, perf));
            }
        }
        match pick {
            Some((table, _)) => self.current[table] += 1,
            None => self.exhausted = true,
        }
    }
}

impl Proposer for GreedyProposer {
    fn name(&self) -> &str {
        "greedy"
    }

    fn load(&mut self, space: &SearchSpace) {
        self.options = space.tables().iter().map(|t| t.options.clone()).collect();
        self.current = vec![0; self.options.len()];
        self.awaiting_feedback = false;
        self.exhausted = self.options.is_empty() || self.options.iter().any(Vec::is_empty);
    }

    fn propose(&mut self) -> Option<Vec<ShardingOption>> {
        if self.awaiting_feedback {
            self.awaiting_feedback = false;
            self.advance();
        }
        if self.exhausted {
            return None;
        }
        self.awaiting_feedback = true;
        Some(
            self.options
                .iter()
                .zip(&self.current)
                .map(|(options, &idx)| options[idx].clone())
                .collect(),
        )
    }

    fn feedback(&mut self, _outcome: &ProposalOutcome) {
        if self.awaiting_feedback {
            self.awaiting_feedback = false;
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposer::testing::space;
    use crate::EmbeddingBagCollectionSharder;
    use table_ir::{ComputeKernel, ShardingType};

    fn tw_rw() -> EmbeddingBagCollectionSharder {
        EmbeddingBagCollectionSharder::new()
            .with_sharding_types([ShardingType::TableWise, ShardingType::RowWise])
            .with_compute_kernels([ComputeKernel::Fused])
    }

    #[test]
    fn test_starts_from_cheapest() {
        let sharder = tw_rw();
        let space = space(&[("a", 100, 64), ("b", 100, 64)], &sharder);
        let mut p = GreedyProposer::new();
        p.load(&space);
        let first = p.propose().unwrap();
        assert_eq!(first, space.cheapest_proposal());
    }

    #[test]
    fn test_walks_costliest_table_and_exhausts() {
        let sharder = tw_rw();
        let space = space(&[("small", 100, 8), ("big", 100, 64)], &sharder);
        let mut p = GreedyProposer::new();
        p.load(&space);

        p.propose().unwrap();
        p.feedback(&ProposalOutcome::feasible(1.0));
        // "big" costs more, so it moves first.
        assert_eq!(p.current(), &[0, 1]);

        p.propose().unwrap();
        p.feedback(&ProposalOutcome::infeasible());
        assert_eq!(p.current(), &[1, 1]);

        assert!(p.propose().is_some());
        p.feedback(&ProposalOutcome::infeasible());
        assert!(p.propose().is_none());
    }

    #[test]
    fn test_unloaded_is_exhausted() {
        let mut p = GreedyProposer::new();
        assert!(p.propose().is_none());
    }

    #[test]
    fn test_steps_without_feedback() {
        let sharder = tw_rw();
        let space = space(&[("a", 100, 64)], &sharder);
        let mut p = GreedyProposer::new();
        p.load(&space);
        let first = p.propose().unwrap();
        let second = p.propose().unwrap();
        assert_ne!(first[0].sharding_type, second[0].sharding_type);
        assert!(p.propose().is_none());
    }
}
