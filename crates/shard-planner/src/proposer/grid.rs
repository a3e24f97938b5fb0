// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Grid-search proposer.
//!
//! Enumerates the cartesian product of each table's sharding types, using
//! the cheapest kernel for each type. The first table is the most
//! significant digit, so the last table changes fastest.
//!
//! ```text
//!   a: [TW, RW]   b: [TW, RW]
//!   (TW,TW) (TW,RW) (RW,TW) (RW,RW)
//! ```
//!
//! The grid grows exponentially with the table count; when it exceeds
//! `limit` candidates nothing is proposed.

use super::{ProposalOutcome, Proposer};
use crate::enumerator::SearchSpace;
use crate::ShardingOption;

#[derive(Debug, Clone)]
pub struct GridSearchProposer {
    limit: usize,
    choices: Vec<Vec<ShardingOption>>,
    digits: Vec<usize>,
    done: bool,
}

impl GridSearchProposer {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            choices: Vec::new(),
            digits: Vec::new(),
            done: true,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Moves the odometer one step; marks the grid done after wrapping.
    fn step(&mut self) {
        for pos in (0..self.digits.len()).rev() {
            self.digits[pos] += 1;
            if self.digits[pos] < self.choices[pos].len() {
                return;
            }
            self.digits[pos] = 0;
        }
        self.done = true;
    }
}

impl Proposer for GridSearchProposer {
    fn name(&self) -> &str {
        "grid-search"
    }

    fn load(&mut self, space: &SearchSpace) {
        self.choices = space
            .tables()
            .iter()
            .map(|t| {
                let mut per_type: Vec<ShardingOption> = Vec::new();
                for option in &t.options {
                    if !per_type.iter().any(|o| o.sharding_type == option.sharding_type) {
                        per_type.push(option.clone());
                    }
                }
                per_type
            })
            .collect();
        self.digits = vec![0; self.choices.len()];

        let size = self
            .choices
            .iter()
            .try_fold(1usize, |acc, c| acc.checked_mul(c.len()));
        self.done = match size {
            Some(0) => true,
            Some(n) if n <= self.limit => {
                tracing::debug!("grid search over {n} candidates");
                self.choices.is_empty()
            }
            _ => {
                tracing::warn!(
                    "grid search skipped: {} tables exceed the limit of {} candidates",
                    self.choices.len(),
                    self.limit,
                );
                true
            }
        };
    }

    fn propose(&mut self) -> Option<Vec<ShardingOption>> {
        if self.done {
            return None;
        }
        let proposal = self
            .choices
            .iter()
            .zip(&self.digits)
            .map(|(c, &d)| c[d].clone())
            .collect();
        self.step();
        Some(proposal)
    }

    fn feedback(&mut self, _outcome: &ProposalOutcome) {}
}
