// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The planner driver.
//!
//! # Lifecycle
//!
//! ```text
//!  Idle ─▶ Enumerating ─▶ Proposing ─┬─▶ Succeeded
//!            │                        └─▶ Exhausted
//!            └── reservation / enumeration error ─▶ Exhausted
//! ```
//!
//! One call to [`ShardingPlanner::plan`]:
//! 1. reserves storage and derives the effective per-rank budget,
//! 2. enumerates the search space once,
//! 3. draws candidates from the proposers round-robin, partitions and
//!    rates each one, keeping the strictly best feasible plan,
//! 4. stops when every proposer is exhausted, or on the proposal limit,
//!    the time budget or early acceptance.

use crate::enumerator::{select_sharders, EmbeddingEnumerator, SearchSpace};
use crate::option::OptionKey;
use crate::partitioner::{GreedyPartitioner, PartitionFailure, Partitioner};
use crate::perf_model::{CriticalPathPerfModel, PerfModel};
use crate::proposer::{ProposalOutcome, Proposer};
use crate::reservation::{effective_budget, HeuristicalStorageReservation, StorageReservation};
use crate::{PlanStats, PlannerConfig, PlannerError, Sharder, ShardingOption, ShardingPlan, Topology};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};
use storage_budget::{Storage, Tier};
use table_ir::{ConstraintMap, EmbeddingModule, Validated};

/// Where the planner is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerPhase {
    Idle,
    Enumerating,
    Proposing,
    Succeeded,
    Exhausted,
}

/// Failures seen while proposing, for classifying exhaustion.
#[derive(Debug, Default)]
struct FailureLog {
    count: usize,
    constraint_only: bool,
    tables: BTreeSet<String>,
    last: Option<PartitionFailure>,
}

impl FailureLog {
    fn new() -> Self {
        Self {
            constraint_only: true,
            ..Default::default()
        }
    }

    fn record(&mut self, failure: PartitionFailure) {
        self.count += 1;
        self.constraint_only &= failure.is_constraint();
        self.tables.insert(failure.table().to_string());
        self.last = Some(failure);
    }

    fn detail(&self) -> String {
        self.last
            .as_ref()
            .map_or_else(|| "no proposal was made".to_string(), ToString::to_string)
    }
}

/// Capacity-aware embedding shard planner.
pub struct ShardingPlanner {
    topology: Topology,
    config: PlannerConfig,
    constraints: ConstraintMap,
    enumerator: EmbeddingEnumerator,
    reservation: Box<dyn StorageReservation>,
    perf_model: Box<dyn PerfModel>,
    partitioner: Box<dyn Partitioner>,
    proposers: Vec<Box<dyn Proposer>>,
    phase: PlannerPhase,
    num_proposals: usize,
    best_plan: Option<ShardingPlan>,
    last_stats: Option<PlanStats>,
}

impl ShardingPlanner {
    /// Creates a planner with the heuristic reservation, the critical-path
    /// perf model, the greedy partitioner and the proposers named in
    /// `config`.
    pub fn new(topology: Topology, config: PlannerConfig) -> Result<Self, PlannerError> {
        config.validate()?;
        let enumerator = EmbeddingEnumerator::new(topology.clone(), &config)?;
        let proposers = config.create_proposers()?;
        Ok(Self {
            reservation: Box::new(HeuristicalStorageReservation::new(config.reservation_percentage)),
            perf_model: Box::new(CriticalPathPerfModel),
            partitioner: Box::new(GreedyPartitioner::new()),
            topology,
            config,
            constraints: ConstraintMap::new(),
            enumerator,
            proposers,
            phase: PlannerPhase::Idle,
            num_proposals: 0,
            best_plan: None,
            last_stats: None,
        })
    }

    /// Creates a planner from a config carrying a `[topology]` section.
    pub fn from_config(config: PlannerConfig) -> Result<Self, PlannerError> {
        let topology = config
            .topology
            .as_ref()
            .ok_or_else(|| PlannerError::Config("missing [topology] section".into()))?
            .build()?;
        Self::new(topology, config)
    }

    pub fn with_constraints(mut self, constraints: ConstraintMap) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_proposers(mut self, proposers: Vec<Box<dyn Proposer>>) -> Self {
        self.proposers = proposers;
        self
    }

    pub fn with_perf_model(mut self, perf_model: Box<dyn PerfModel>) -> Self {
        self.perf_model = perf_model;
        self
    }

    pub fn with_storage_reservation(mut self, reservation: Box<dyn StorageReservation>) -> Self {
        self.reservation = reservation;
        self
    }

    pub fn with_partitioner(mut self, partitioner: Box<dyn Partitioner>) -> Self {
        self.partitioner = partitioner;
        self
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn constraints(&self) -> &ConstraintMap {
        &self.constraints
    }

    pub fn phase(&self) -> PlannerPhase {
        self.phase
    }

    /// Proposals tried by the most recent [`plan`](Self::plan) call.
    pub fn num_proposals(&self) -> usize {
        self.num_proposals
    }

    pub fn best_plan(&self) -> Option<&ShardingPlan> {
        self.best_plan.as_ref()
    }

    /// Stats of the most recent successful plan.
    pub fn last_stats(&self) -> Option<&PlanStats> {
        self.last_stats.as_ref()
    }

    /// Plans `modules` with `sharders`.
    ///
    /// Modules whose kind no sharder handles are left out of the plan.
    /// Repeated calls with the same inputs return the same plan.
    ///
    /// # Errors
    /// - [`PlannerError::StrictConstraints`] when constraints leave some
    ///   table no placeable option.
    /// - [`PlannerError::InsufficientStorage`] when the reservation or the
    ///   smallest footprint of the tables exceeds what the devices hold.
    /// - [`PlannerError::PartitionInfeasible`] when no proposal could be
    ///   packed although aggregate capacity would suffice.
    /// - [`PlannerError::Table`] on constraint feature-name mismatches.
    pub fn plan(
        &mut self,
        modules: &[EmbeddingModule<Validated>],
        sharders: &[&dyn Sharder],
    ) -> Result<ShardingPlan, PlannerError> {
        self.phase = PlannerPhase::Idle;
        self.num_proposals = 0;
        self.best_plan = None;
        self.last_stats = None;

        let result = self.run(modules, sharders);
        match &result {
            Ok(plan) => {
                self.phase = PlannerPhase::Succeeded;
                self.best_plan = Some(plan.clone());
            }
            Err(e) => {
                tracing::warn!("planning failed after {} proposals: {e}", self.num_proposals);
                self.phase = PlannerPhase::Exhausted;
            }
        }
        result
    }

    fn run(
        &mut self,
        modules: &[EmbeddingModule<Validated>],
        sharders: &[&dyn Sharder],
    ) -> Result<ShardingPlan, PlannerError> {
        let by_kind = select_sharders(sharders);
        let sharded: Vec<EmbeddingModule<Validated>> = modules
            .iter()
            .filter(|m| by_kind.contains_key(&m.kind))
            .cloned()
            .collect();
        if sharded.is_empty() {
            tracing::info!("no module has a sharder; returning an empty plan");
            return Ok(ShardingPlan::default());
        }

        let reserved = self.reservation.reserve(
            &self.topology,
            self.config.batch_size,
            &sharded,
            &self.constraints,
        );
        let effective = effective_budget(&self.topology, &reserved).map_err(|tier| {
            PlannerError::InsufficientStorage {
                tier,
                needed: reserved.get(tier),
                available: self.topology.device_capacity().get(tier),
                proposals: 0,
                detail: format!(
                    "'{}' reservation exceeds per-device capacity",
                    self.reservation.name(),
                ),
            }
        })?;
        tracing::info!(
            "reserved {reserved} per rank; effective budget {}",
            effective.first().copied().unwrap_or_default(),
        );

        self.phase = PlannerPhase::Enumerating;
        let space = self
            .enumerator
            .enumerate(&sharded, sharders, &self.constraints, &effective)?;
        if space.num_options() == 0 {
            return Err(PlannerError::StrictConstraints {
                tables: Vec::new(),
                detail: "enumeration produced no sharding options".into(),
            });
        }

        self.phase = PlannerPhase::Proposing;
        let (best, failures) = self.propose_loop(&space, &effective);

        match best {
            Some((perf, placed)) => {
                tracing::info!(
                    "selected plan with perf {perf:.3e} s after {} proposals",
                    self.num_proposals,
                );
                let stats = PlanStats::new(&placed, &self.topology, &effective, self.num_proposals, perf);
                stats.log();
                self.last_stats = Some(stats);
                Ok(ShardingPlan::from_placed(&placed))
            }
            None => Err(self.classify_exhaustion(&space, &effective, failures)),
        }
    }

    /// Round-robin over the proposers until all are exhausted or a limit
    /// is hit. Returns the best placed proposal and the failures seen.
    fn propose_loop(
        &mut self,
        space: &SearchSpace,
        effective: &[Storage],
    ) -> (Option<(f64, Vec<ShardingOption>)>, FailureLog) {
        for proposer in self.proposers.iter_mut() {
            proposer.load(space);
        }

        let deadline = self.config.time_budget_ms.map(Duration::from_millis);
        let start = Instant::now();
        let mut active = vec![true; self.proposers.len()];
        let mut seen: HashMap<Vec<OptionKey>, Option<f64>> = HashMap::new();
        let mut best: Option<(f64, Vec<ShardingOption>)> = None;
        let mut failures = FailureLog::new();
        let mut since_improvement = 0usize;

        'search: while active.iter().any(|&a| a) {
            for i in 0..self.proposers.len() {
                if !active[i] {
                    continue;
                }
                if self.num_proposals >= self.config.max_proposals {
                    tracing::info!("proposal limit of {} reached", self.config.max_proposals);
                    break 'search;
                }
                // The first proposal is always evaluated, whatever the budget.
                if self.num_proposals > 0 && deadline.is_some_and(|d| start.elapsed() >= d) {
                    tracing::warn!(
                        "time budget of {:?} hit after {} proposals",
                        deadline.unwrap_or_default(),
                        self.num_proposals,
                    );
                    break 'search;
                }

                let Some(candidate) = self.proposers[i].propose() else {
                    tracing::debug!("proposer '{}' exhausted", self.proposers[i].name());
                    active[i] = false;
                    continue;
                };
                self.num_proposals += 1;

                let key: Vec<OptionKey> = candidate.iter().map(ShardingOption::key).collect();
                let outcome = match seen.get(&key).copied() {
                    Some(cached) => {
                        tracing::debug!("proposal {} is a duplicate", self.num_proposals);
                        cached.map_or_else(ProposalOutcome::infeasible, ProposalOutcome::feasible)
                    }
                    None => match self.partitioner.partition(&candidate, &self.topology, effective) {
                        Ok(placed) => {
                            let perf = self.perf_model.rate(&placed);
                            tracing::debug!("proposal {} placed, perf {perf:.3e}", self.num_proposals);
                            seen.insert(key, Some(perf));
                            if best.as_ref().map_or(true, |(b, _)| perf < *b) {
                                best = Some((perf, placed));
                                since_improvement = 0;
                            } else {
                                since_improvement += 1;
                            }
                            ProposalOutcome::feasible(perf)
                        }
                        Err(failure) => {
                            tracing::debug!("proposal {} rejected: {failure}", self.num_proposals);
                            seen.insert(key, None);
                            failures.record(failure);
                            ProposalOutcome::infeasible()
                        }
                    },
                };
                self.proposers[i].feedback(&outcome);

                if let Some(limit) = self.config.early_stop_after {
                    if best.is_some() && since_improvement >= limit {
                        tracing::info!("accepting plan after {limit} proposals without improvement");
                        break 'search;
                    }
                }
            }
        }

        (best, failures)
    }

    fn classify_exhaustion(
        &self,
        space: &SearchSpace,
        effective: &[Storage],
        failures: FailureLog,
    ) -> PlannerError {
        let proposals = self.num_proposals;
        if failures.count > 0 && failures.constraint_only {
            let detail = failures.detail();
            return PlannerError::StrictConstraints {
                tables: failures.tables.into_iter().collect(),
                detail,
            };
        }

        let aggregate: Storage = effective.iter().copied().sum();
        for tier in Tier::ALL {
            let needed: u64 = space
                .tables()
                .iter()
                .filter_map(|t| t.options.iter().map(|o| o.total_storage().get(tier)).min())
                .sum();
            if needed > aggregate.get(tier) {
                return PlannerError::InsufficientStorage {
                    tier,
                    needed,
                    available: aggregate.get(tier),
                    proposals,
                    detail: format!(
                        "the smallest footprint of {} tables exceeds the aggregate effective budget",
                        space.num_tables(),
                    ),
                };
            }
        }

        let detail = failures.detail();
        PlannerError::PartitionInfeasible {
            proposals,
            tables: failures.tables.into_iter().collect(),
            detail,
        }
    }

    /// Stable hex digest of everything that determines a plan besides the
    /// modules and sharders: topology, batch size, constraints and the
    /// enumerator, reservation and perf model parameters.
    pub fn hash_planner_context_inputs(&self) -> Result<String, PlannerError> {
        #[derive(serde::Serialize)]
        struct ContextInputs<'a> {
            topology: &'a Topology,
            batch_size: u64,
            constraints: &'a ConstraintMap,
            enumerator: String,
            storage_reservation: String,
            perf_model: String,
        }

        let inputs = ContextInputs {
            topology: &self.topology,
            batch_size: self.config.batch_size,
            constraints: &self.constraints,
            enumerator: self.enumerator.fingerprint(),
            storage_reservation: self.reservation.fingerprint(),
            perf_model: self.perf_model.fingerprint(),
        };
        let bytes = serde_json::to_vec(&inputs)
            .map_err(|e| PlannerError::InvalidInput(format!("failed to serialise planner context: {e}")))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perf_model::NoopPerfModel;
    use crate::reservation::FixedPercentageStorageReservation;
    use crate::EmbeddingBagCollectionSharder;
    use table_ir::{ComputeDevice, ComputeKernel, EmbeddingTable, ModuleKind, ShardingType};

    const MIB: u64 = 1024 * 1024;

    fn modules(tables: &[(&str, u64, u64)]) -> Vec<EmbeddingModule<Validated>> {
        vec![EmbeddingModule::new(
            "sparse.ebc",
            ModuleKind::EmbeddingBagCollection,
            tables
                .iter()
                .map(|&(n, r, d)| EmbeddingTable::new(n, r, d))
                .collect(),
        )
        .validate()
        .unwrap()]
    }

    fn planner(hbm: u64) -> ShardingPlanner {
        let topo = Topology::new(2, ComputeDevice::Cuda).unwrap().with_hbm_cap(hbm);
        ShardingPlanner::new(topo, PlannerConfig::default()).unwrap()
    }

    fn tw_rw() -> EmbeddingBagCollectionSharder {
        EmbeddingBagCollectionSharder::new()
            .with_sharding_types([ShardingType::TableWise, ShardingType::RowWise])
            .with_compute_kernels([ComputeKernel::Fused])
    }

    #[test]
    fn test_phases() {
        let mut p = planner(64 * MIB);
        assert_eq!(p.phase(), PlannerPhase::Idle);
        let sharder = tw_rw();
        p.plan(&modules(&[("a", 100, 64)]), &[&sharder]).unwrap();
        assert_eq!(p.phase(), PlannerPhase::Succeeded);
        assert!(p.num_proposals() > 0);
        assert!(p.best_plan().is_some());
        assert!(p.last_stats().is_some());

        let err = p
            .plan(&modules(&[("huge", 10_000_000, 1024)]), &[&sharder])
            .unwrap_err();
        assert_eq!(p.phase(), PlannerPhase::Exhausted);
        assert!(p.best_plan().is_none());
        assert_eq!(err.proposals(), Some(0));
    }

    #[test]
    fn test_negative_effective_budget() {
        let mut p = planner(MIB).with_storage_reservation(Box::new(
            FixedPercentageStorageReservation::new(1.5),
        ));
        let sharder = tw_rw();
        let err = p.plan(&modules(&[("a", 10, 4)]), &[&sharder]).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::InsufficientStorage { tier: Tier::Hbm, proposals: 0, .. }
        ));
    }

    #[test]
    fn test_proposal_limit() {
        let topo = Topology::new(2, ComputeDevice::Cuda).unwrap();
        let config = PlannerConfig {
            max_proposals: 1,
            ..Default::default()
        };
        let mut p = ShardingPlanner::new(topo, config).unwrap();
        let sharder = tw_rw();
        p.plan(&modules(&[("a", 100, 64), ("b", 100, 64)]), &[&sharder])
            .unwrap();
        assert_eq!(p.num_proposals(), 1);
    }

    #[test]
    fn test_early_stop() {
        let topo = Topology::new(2, ComputeDevice::Cuda).unwrap();
        let config = PlannerConfig {
            early_stop_after: Some(1),
            proposers: vec!["greedy".into()],
            ..Default::default()
        };
        let mut p = ShardingPlanner::new(topo, config)
            .unwrap()
            .with_perf_model(Box::new(NoopPerfModel));
        let sharder = tw_rw();
        p.plan(&modules(&[("a", 100, 64), ("b", 100, 64)]), &[&sharder])
            .unwrap();
        // First proposal sets the best, the second does not improve on it.
        assert_eq!(p.num_proposals(), 2);
    }

    #[test]
    fn test_time_budget_keeps_feasible_plan() {
        let topo = Topology::new(2, ComputeDevice::Cuda).unwrap();
        let config = PlannerConfig {
            time_budget_ms: Some(0),
            ..Default::default()
        };
        let mut p = ShardingPlanner::new(topo, config).unwrap();
        let sharder = tw_rw();
        let plan = p
            .plan(&modules(&[("a", 100, 64), ("b", 100, 64)]), &[&sharder])
            .unwrap();
        assert_eq!(p.num_proposals(), 1);
        assert_eq!(plan.num_tables(), 2);
        assert_eq!(p.phase(), PlannerPhase::Succeeded);
    }

    #[test]
    fn test_time_budget_reports_tried_proposal() {
        // Three 700 KB tables, 1 MiB per device: each fits alone, not all three.
        let topo = Topology::new(2, ComputeDevice::Cuda).unwrap().with_hbm_cap(MIB);
        let config = PlannerConfig {
            time_budget_ms: Some(0),
            ..Default::default()
        };
        let mut p = ShardingPlanner::new(topo, config)
            .unwrap()
            .with_storage_reservation(Box::new(FixedPercentageStorageReservation::new(0.0)));
        let sharder = EmbeddingBagCollectionSharder::new()
            .with_sharding_types([ShardingType::TableWise])
            .with_compute_kernels([ComputeKernel::Fused]);
        let err = p
            .plan(
                &modules(&[("a", 2800, 64), ("b", 2800, 64), ("c", 2800, 64)]),
                &[&sharder],
            )
            .unwrap_err();
        assert_eq!(p.num_proposals(), 1);
        assert_eq!(err.proposals(), Some(1));
        assert!(matches!(
            err,
            PlannerError::InsufficientStorage { tier: Tier::Hbm, .. }
        ));
    }

    #[test]
    fn test_duplicates_are_counted() {
        let topo = Topology::new(2, ComputeDevice::Cuda).unwrap();
        let config = PlannerConfig {
            proposers: vec!["greedy".into(), "greedy".into()],
            ..Default::default()
        };
        let mut p = ShardingPlanner::new(topo, config).unwrap();
        let sharder = tw_rw();
        p.plan(&modules(&[("a", 100, 64)]), &[&sharder]).unwrap();
        // Two greedy proposers walk the same two options.
        assert_eq!(p.num_proposals(), 4);
    }

    #[test]
    fn test_from_config() {
        let config = PlannerConfig::from_toml(
            r#"
            [topology]
            world_size = 4
            hbm_cap = "1G"
            "#,
        )
        .unwrap();
        let p = ShardingPlanner::from_config(config).unwrap();
        assert_eq!(p.topology().world_size(), 4);

        let err = ShardingPlanner::from_config(PlannerConfig::default()).err().unwrap();
        assert!(matches!(err, PlannerError::Config(_)));
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let h = planner(MIB).hash_planner_context_inputs().unwrap();
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
