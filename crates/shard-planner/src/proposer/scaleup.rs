// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Offload / scale-up proposer.
//!
//! Trades fast-tier memory for speed in two phases:
//!
//! ```text
//!  Initial ──infeasible──▶ Offloading ──infeasible──▶ Offloading ...
//!     │                       │
//!     │ feasible, nothing     │ feasible
//!     │ offloaded             ▼
//!     │                  Scaling { lo, hi, step }  bisect the shared cache
//!     ▼                       │                    load factor in [lo, hi]
//!    Done ◀──no candidate─────┴──steps used up
//! ```
//!
//! Offloading moves one table at a time from a fast-tier kernel to the
//! caching kernel of the same sharding type. Only tables with
//! `cache_params` and without `enforce_hbm` are eligible; the table with
//! the largest HBM footprint goes first. Once a candidate fits, the cache
//! load factor of every offloaded table is raised as far as the leftover
//! fast-tier budget allows.

use super::{ProposalOutcome, Proposer};
use crate::enumerator::SearchSpace;
use crate::ShardingOption;
use std::cmp::Reverse;
use table_ir::ComputeKernel;

/// Phase of the offload / scale-up search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleupState {
    /// Proposing every table's cheapest option.
    Initial,
    /// Offloading tables until a candidate fits.
    Offloading,
    /// Bisecting the cache load factor of offloaded tables.
    Scaling { lo: f64, hi: f64, step: usize },
    Done,
}

#[derive(Debug, Clone)]
pub struct EmbeddingOffloadScaleupProposer {
    max_steps: usize,
    space: Option<SearchSpace>,
    current: Vec<ShardingOption>,
    offloaded: Vec<usize>,
    state: ScaleupState,
}

impl EmbeddingOffloadScaleupProposer {
    pub fn new(max_steps: usize) -> Self {
        Self {
            max_steps,
            space: None,
            current: Vec::new(),
            offloaded: Vec::new(),
            state: ScaleupState::Done,
        }
    }

    pub fn state(&self) -> ScaleupState {
        self.state
    }

    /// Tables moved to a caching kernel so far, in offload order.
    pub fn offloaded(&self) -> &[usize] {
        &self.offloaded
    }

    /// Swaps the next eligible table to its caching option. Returns
    /// `false` when no table is left to offload.
    fn offload_next(&mut self) -> bool {
        let Some(space) = &self.space else {
            return false;
        };
        let candidate = self
            .current
            .iter()
            .enumerate()
            .filter(|(_, o)| {
                o.cache_params.is_some()
                    && o.enforce_hbm != Some(true)
                    && !o.compute_kernel.is_caching()
                    && o.total_storage().hbm > 0
            })
            .filter_map(|(idx, o)| {
                space.tables()[idx]
                    .options
                    .iter()
                    .find(|c| {
                        c.compute_kernel == ComputeKernel::FusedUvmCaching
                            && c.sharding_type == o.sharding_type
                    })
                    .map(|c| (idx, o.total_storage().hbm, c.clone()))
            })
            .min_by_key(|&(idx, hbm, _)| (Reverse(hbm), idx));

        match candidate {
            Some((idx, hbm, caching)) => {
                tracing::debug!(
                    "offloading '{}' ({} B of HBM) to {}",
                    caching.name,
                    hbm,
                    caching.compute_kernel,
                );
                self.current[idx] = caching;
                self.offloaded.push(idx);
                true
            }
            None => false,
        }
    }

    /// Re-estimates every offloaded table at `load_factor`.
    fn apply_load_factor(&mut self, load_factor: f64) {
        let Some(space) = &self.space else {
            return;
        };
        for &idx in &self.offloaded {
            self.current[idx] = space.with_cache_load_factor(&self.current[idx], load_factor);
        }
    }

    fn offloaded_load_factor(&self) -> f64 {
        self.offloaded
            .iter()
            .filter_map(|&idx| self.current[idx].cache_load_factor)
            .fold(0.0, f64::max)
    }

    /// Moves to the midpoint of `[lo, hi]`, or finishes.
    fn scale_to(&mut self, lo: f64, hi: f64, step: usize) {
        if step >= self.max_steps || hi - lo <= f64::EPSILON {
            self.state = ScaleupState::Done;
            return;
        }
        self.apply_load_factor((lo + hi) / 2.0);
        self.state = ScaleupState::Scaling { lo, hi, step };
    }
}

impl Proposer for EmbeddingOffloadScaleupProposer {
    fn name(&self) -> &str {
        "scaleup"
    }

    fn load(&mut self, space: &SearchSpace) {
        self.current = space.cheapest_proposal();
        self.offloaded.clear();
        self.state = if space.is_empty() {
            ScaleupState::Done
        } else {
            ScaleupState::Initial
        };
        self.space = Some(space.clone());
    }

    fn propose(&mut self) -> Option<Vec<ShardingOption>> {
        match self.state {
            ScaleupState::Done => None,
            _ => Some(self.current.clone()),
        }
    }

    fn feedback(&mut self, outcome: &ProposalOutcome) {
        match self.state {
            ScaleupState::Initial | ScaleupState::Offloading => {
                if outcome.feasible {
                    if self.offloaded.is_empty() {
                        self.state = ScaleupState::Done;
                    } else {
                        let lo = self.offloaded_load_factor();
                        self.scale_to(lo, 1.0, 0);
                    }
                } else if self.offload_next() {
                    self.state = ScaleupState::Offloading;
                } else {
                    self.state = ScaleupState::Done;
                }
            }
            ScaleupState::Scaling { lo, hi, step } => {
                let mid = (lo + hi) / 2.0;
                let (lo, hi) = if outcome.feasible { (mid, hi) } else { (lo, mid) };
                self.scale_to(lo, hi, step + 1);
            }
            ScaleupState::Done => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposer::testing::space_with;
    use crate::EmbeddingBagCollectionSharder;
    use table_ir::{CacheParams, ConstraintMap, ParameterConstraints, ShardingType};

    fn sharder() -> EmbeddingBagCollectionSharder {
        EmbeddingBagCollectionSharder::new()
            .with_sharding_types([ShardingType::TableWise])
            .with_compute_kernels([ComputeKernel::Fused, ComputeKernel::FusedUvmCaching])
    }

    fn cached(names: &[&str]) -> ConstraintMap {
        names
            .iter()
            .map(|n| {
                (
                    n.to_string(),
                    ParameterConstraints {
                        cache_params: Some(CacheParams::default()),
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    fn assert_close(actual: Option<f64>, expected: f64) {
        let actual = actual.unwrap();
        assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");
    }

    #[test]
    fn test_feasible_start_finishes() {
        let sharder = sharder();
        let space = space_with(&[("a", 100, 64)], &sharder, &cached(&["a"]));
        let mut p = EmbeddingOffloadScaleupProposer::new(4);
        p.load(&space);
        assert_eq!(p.state(), ScaleupState::Initial);
        let first = p.propose().unwrap();
        assert_eq!(first[0].compute_kernel, ComputeKernel::Fused);
        p.feedback(&ProposalOutcome::feasible(1.0));
        assert!(p.propose().is_none());
    }

    #[test]
    fn test_offloads_largest_eligible_first() {
        let sharder = sharder();
        let space = space_with(
            &[("small", 100, 32), ("big", 100, 64), ("pinned", 1000, 64)],
            &sharder,
            &cached(&["small", "big"]),
        );
        let mut p = EmbeddingOffloadScaleupProposer::new(4);
        p.load(&space);

        p.propose().unwrap();
        p.feedback(&ProposalOutcome::infeasible());
        assert_eq!(p.state(), ScaleupState::Offloading);
        assert_eq!(p.offloaded(), &[1]);
        let c = p.propose().unwrap();
        assert_eq!(c[1].compute_kernel, ComputeKernel::FusedUvmCaching);
        assert_eq!(c[2].compute_kernel, ComputeKernel::Fused);

        p.feedback(&ProposalOutcome::infeasible());
        assert_eq!(p.offloaded(), &[1, 0]);

        // Nothing eligible is left.
        p.propose().unwrap();
        p.feedback(&ProposalOutcome::infeasible());
        assert_eq!(p.state(), ScaleupState::Done);
        assert!(p.propose().is_none());
    }

    #[test]
    fn test_bisects_load_factor_after_fit() {
        let sharder = sharder();
        let space = space_with(&[("a", 100, 64)], &sharder, &cached(&["a"]));
        let mut p = EmbeddingOffloadScaleupProposer::new(3);
        p.load(&space);

        p.propose().unwrap();
        p.feedback(&ProposalOutcome::infeasible());
        let offloaded = p.propose().unwrap();
        assert_eq!(offloaded[0].cache_load_factor, Some(0.2));

        p.feedback(&ProposalOutcome::feasible(2.0));
        assert_eq!(p.state(), ScaleupState::Scaling { lo: 0.2, hi: 1.0, step: 0 });
        let scaled = p.propose().unwrap();
        assert_close(scaled[0].cache_load_factor, 0.6);
        assert!(scaled[0].total_storage().hbm > offloaded[0].total_storage().hbm);

        p.feedback(&ProposalOutcome::infeasible());
        assert_close(p.propose().unwrap()[0].cache_load_factor, 0.4);
        p.feedback(&ProposalOutcome::feasible(1.5));
        assert_close(p.propose().unwrap()[0].cache_load_factor, 0.5);
        p.feedback(&ProposalOutcome::feasible(1.4));
        assert_eq!(p.state(), ScaleupState::Done);
    }

    #[test]
    fn test_enforce_hbm_never_offloaded() {
        let sharder = sharder();
        let mut constraints = cached(&["a"]);
        if let Some(c) = constraints.get_mut("a") {
            c.enforce_hbm = Some(true);
        }
        let space = space_with(&[("a", 100, 64)], &sharder, &constraints);
        let mut p = EmbeddingOffloadScaleupProposer::new(4);
        p.load(&space);
        p.propose().unwrap();
        p.feedback(&ProposalOutcome::infeasible());
        assert_eq!(p.state(), ScaleupState::Done);
    }
}
