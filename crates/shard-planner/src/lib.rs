// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # shard-planner
//!
//! Places sharded embedding tables onto a fixed set of devices so that
//! every device stays within its HBM and DDR budget, minimising an
//! estimated step time, or explains why no such placement exists.
//!
//! # Pipeline
//!
//! ```text
//!  Topology + modules + constraints
//!        │
//!        ▼
//!  StorageReservation ──▶ effective per-rank budget
//!        │
//!        ▼
//!  EmbeddingEnumerator ──▶ SearchSpace (options per table, cheapest first)
//!        │
//!        ▼
//!  Proposer(s) ──▶ candidate ──▶ Partitioner ──▶ PerfModel ──▶ best plan
//!        ▲                                           │
//!        └───────────────── feedback ◀───────────────┘
//! ```
//!
//! # Pluggable pieces
//!
//! | Trait | Stock implementations |
//! |---|---|
//! | [`Sharder`] | [`EmbeddingBagCollectionSharder`], [`EmbeddingCollectionSharder`] |
//! | [`StorageReservation`] | [`HeuristicalStorageReservation`], [`FixedPercentageStorageReservation`] |
//! | [`PerfModel`] | [`CriticalPathPerfModel`], [`NoopPerfModel`] |
//! | [`Proposer`] | [`GreedyProposer`], [`UniformProposer`], [`GridSearchProposer`], [`EmbeddingOffloadScaleupProposer`] |
//! | [`Partitioner`] | [`GreedyPartitioner`] |
//!
//! # Example
//! ```no_run
//! use shard_planner::{EmbeddingBagCollectionSharder, PlannerConfig, ShardingPlanner, Topology};
//! use table_ir::{ComputeDevice, EmbeddingModule, EmbeddingTable, ModuleKind};
//!
//! let module = EmbeddingModule::new(
//!     "sparse.ebc",
//!     ModuleKind::EmbeddingBagCollection,
//!     vec![EmbeddingTable::new("user_id", 1_000_000, 128)],
//! )
//! .validate()
//! .unwrap();
//!
//! let topology = Topology::new(8, ComputeDevice::Cuda).unwrap();
//! let mut planner = ShardingPlanner::new(topology, PlannerConfig::default()).unwrap();
//! let sharder = EmbeddingBagCollectionSharder::new();
//! let plan = planner.plan(&[module], &[&sharder]).unwrap();
//! println!("{}", plan.summary());
//! ```

mod config;
pub mod enumerator;
mod error;
pub mod estimator;
pub mod option;
pub mod partitioner;
pub mod perf_model;
mod plan;
pub mod planner;
pub mod proposer;
pub mod reservation;
mod sharder;
mod stats;
mod topology;

pub use config::{PlannerConfig, TopologyConfig, PROPOSER_NAMES};
pub use enumerator::{EmbeddingEnumerator, SearchSpace, TableOptions};
pub use error::{PlannerError, PlannerErrorKind};
pub use estimator::{ShardEstimator, TableContext};
pub use option::{Perf, Shard, ShardingOption};
pub use partitioner::{GreedyPartitioner, PartitionFailure, Partitioner};
pub use perf_model::{CriticalPathPerfModel, NoopPerfModel, PerfModel};
pub use plan::{ParameterSharding, PlacedShard, ShardingPlan};
pub use planner::{PlannerPhase, ShardingPlanner};
pub use proposer::{
    EmbeddingOffloadScaleupProposer, GreedyProposer, GridSearchProposer, ProposalOutcome, Proposer,
    UniformProposer,
};
pub use reservation::{
    FixedPercentageStorageReservation, HeuristicalStorageReservation, StorageReservation,
};
pub use sharder::{EmbeddingBagCollectionSharder, EmbeddingCollectionSharder, Sharder};
pub use stats::PlanStats;
pub use topology::{Topology, DEFAULT_DDR_CAP, DEFAULT_HBM_CAP};
