// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Uniform proposer: every table uses the same sharding type.

use super::{ProposalOutcome, Proposer};
use crate::enumerator::SearchSpace;
use crate::ShardingOption;
use table_ir::ShardingType;

/// Proposes one candidate per sharding type that every table supports,
/// each table taking its cheapest option of that type.
#[derive(Debug, Clone, Default)]
pub struct UniformProposer {
    proposals: Vec<Vec<ShardingOption>>,
    cursor: usize,
}

impl UniformProposer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Proposer for UniformProposer {
    fn name(&self) -> &str {
        "uniform"
    }

    fn load(&mut self, space: &SearchSpace) {
        self.cursor = 0;
        self.proposals = if space.is_empty() {
            Vec::new()
        } else {
            ShardingType::ALL
                .iter()
                .filter_map(|&st| {
                    space
                        .tables()
                        .iter()
                        .map(|t| t.options.iter().find(|o| o.sharding_type == st).cloned())
                        .collect::<Option<Vec<_>>>()
                })
                .collect()
        };
    }

    fn propose(&mut self) -> Option<Vec<ShardingOption>> {
        let proposal = self.proposals.get(self.cursor).cloned();
        self.cursor += 1;
        proposal
    }

    fn feedback(&mut self, _outcome: &ProposalOutcome) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposer::testing::{space, space_with};
    use crate::EmbeddingBagCollectionSharder;
    use table_ir::{ComputeKernel, ConstraintMap, ParameterConstraints};

    #[test]
    fn test_one_proposal_per_shared_type() {
        let sharder = EmbeddingBagCollectionSharder::new()
            .with_sharding_types([ShardingType::TableWise, ShardingType::RowWise])
            .with_compute_kernels([ComputeKernel::Fused, ComputeKernel::FusedUvm]);
        let space = space(&[("a", 100, 64), ("b", 50, 32)], &sharder);
        let mut p = UniformProposer::new();
        p.load(&space);

        let tw = p.propose().unwrap();
        assert!(tw.iter().all(|o| o.sharding_type == ShardingType::TableWise));
        assert!(tw.iter().all(|o| o.compute_kernel == ComputeKernel::Fused));
        let rw = p.propose().unwrap();
        assert!(rw.iter().all(|o| o.sharding_type == ShardingType::RowWise));
        assert!(p.propose().is_none());
    }

    #[test]
    fn test_skips_types_not_shared() {
        let sharder = EmbeddingBagCollectionSharder::new()
            .with_sharding_types([ShardingType::TableWise, ShardingType::RowWise])
            .with_compute_kernels([ComputeKernel::Fused]);
        let mut constraints = ConstraintMap::new();
        constraints.insert(
            "b".into(),
            ParameterConstraints {
                sharding_types: Some(vec![ShardingType::RowWise]),
                ..Default::default()
            },
        );
        let space = space_with(&[("a", 100, 64), ("b", 100, 64)], &sharder, &constraints);
        let mut p = UniformProposer::new();
        p.load(&space);
        let only = p.propose().unwrap();
        assert!(only.iter().all(|o| o.sharding_type == ShardingType::RowWise));
        assert!(p.propose().is_none());
    }
}
