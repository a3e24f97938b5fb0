// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Placement of a proposal onto devices.
//!
//! # Greedy first-fit-decreasing
//!
//! ```text
//! tables sorted by total storage ↓, then name, then module path
//!   table-wise / column-wise  each shard → rank with most remaining
//!                             bytes in the shard's dominant tier
//!   row-wise                  n shards → n ranks with most remaining,
//!                             assigned in ascending rank order
//!   table-row-wise            all shards → ranks of one host, hosts
//!                             tried by remaining bytes
//!   data-parallel             replica i → rank i
//! ```
//!
//! A table is charged to the ledger only if every one of its shards fits.
//! A table-wise option that cannot be placed is retried as its row-wise
//! fallback before the proposal is rejected.

use crate::{ShardingOption, Topology};
use std::cmp::Reverse;
use storage_budget::{DeviceLedger, Storage, StorageError, Tier};
use table_ir::ShardingType;

/// Why a proposal could not be placed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PartitionFailure {
    /// A shard did not fit on any eligible device.
    #[error("table '{table}': shard needs {needed} bytes of {tier} on rank {rank}, {available} left")]
    Capacity {
        table: String,
        tier: Tier,
        rank: usize,
        needed: u64,
        available: u64,
    },

    /// A propagated constraint rejects the option regardless of capacity.
    #[error("table '{table}': {detail}")]
    Constraint { table: String, detail: String },
}

impl PartitionFailure {
    pub fn table(&self) -> &str {
        match self {
            PartitionFailure::Capacity { table, .. } | PartitionFailure::Constraint { table, .. } => table,
        }
    }

    pub fn is_constraint(&self) -> bool {
        matches!(self, PartitionFailure::Constraint { .. })
    }

    fn from_storage(table: &str, err: StorageError) -> Self {
        match err {
            StorageError::OutOfMemory {
                tier,
                rank,
                requested,
                available,
                ..
            } => PartitionFailure::Capacity {
                table: table.to_string(),
                tier,
                rank,
                needed: requested,
                available,
            },
            other => PartitionFailure::Constraint {
                table: table.to_string(),
                detail: other.to_string(),
            },
        }
    }
}

/// Assigns every shard of a proposal to a rank.
pub trait Partitioner {
    /// Human-readable name of this partitioner.
    fn name(&self) -> &str;

    /// Places `proposal` within the per-rank `effective` budget.
    ///
    /// Returns the placed options in proposal order.
    fn partition(
        &self,
        proposal: &[ShardingOption],
        topology: &Topology,
        effective: &[Storage],
    ) -> Result<Vec<ShardingOption>, PartitionFailure>;
}

/// Greedy first-fit-decreasing partitioner.
#[derive(Debug, Clone, Default)]
pub struct GreedyPartitioner;

impl GreedyPartitioner {
    pub fn new() -> Self {
        Self
    }

    /// Places one option on a copy of `ledger`. The copy is returned only
    /// if every shard fits.
    fn place(
        &self,
        option: &ShardingOption,
        topology: &Topology,
        ledger: &DeviceLedger,
    ) -> Result<(ShardingOption, DeviceLedger), PartitionFailure> {
        if option.enforce_hbm == Some(true) && option.total_storage().ddr > 0 {
            return Err(PartitionFailure::Constraint {
                table: option.name.clone(),
                detail: format!(
                    "enforce_hbm forbids {} with {} bytes in DDR",
                    option.compute_kernel,
                    option.total_storage().ddr,
                ),
            });
        }

        let mut ledger = ledger.clone();
        let mut placed = option.unplaced();
        match placed.sharding_type {
            ShardingType::TableWise | ShardingType::ColumnWise => {
                for shard in placed.shards.iter_mut() {
                    let rank = best_fit(&ledger, &shard.storage, &option.name)?;
                    ledger
                        .try_allocate(rank, &shard.storage)
                        .map_err(|e| PartitionFailure::from_storage(&option.name, e))?;
                    shard.rank = Some(rank);
                }
            }
            ShardingType::RowWise => {
                let tier = placed.total_storage().dominant_tier();
                let mut ranks: Vec<usize> = ledger
                    .ranks_by_remaining(tier)
                    .into_iter()
                    .take(placed.shards.len())
                    .collect();
                ranks.sort_unstable();
                for (shard, rank) in placed.shards.iter_mut().zip(ranks) {
                    ledger
                        .try_allocate(rank, &shard.storage)
                        .map_err(|e| PartitionFailure::from_storage(&option.name, e))?;
                    shard.rank = Some(rank);
                }
            }
            ShardingType::TableRowWise => {
                let (host_placed, host_ledger) = self.place_on_host(&placed, topology, &ledger)?;
                placed = host_placed;
                ledger = host_ledger;
            }
            ShardingType::DataParallel => {
                for (rank, shard) in placed.shards.iter_mut().enumerate() {
                    ledger
                        .try_allocate(rank, &shard.storage)
                        .map_err(|e| PartitionFailure::from_storage(&option.name, e))?;
                    shard.rank = Some(rank);
                }
            }
        }

        if !placed.is_placed() {
            return Err(PartitionFailure::Constraint {
                table: option.name.clone(),
                detail: format!("{} shards exceed the world size", placed.num_shards()),
            });
        }
        Ok((placed, ledger))
    }

    /// Tries every host, most remaining capacity first.
    fn place_on_host(
        &self,
        option: &ShardingOption,
        topology: &Topology,
        ledger: &DeviceLedger,
    ) -> Result<(ShardingOption, DeviceLedger), PartitionFailure> {
        let tier = option.total_storage().dominant_tier();
        let mut hosts: Vec<usize> = (0..topology.num_hosts()).collect();
        hosts.sort_by_key(|&h| {
            let remaining: u64 = topology
                .host_ranks(h)
                .map(|r| ledger.remaining(r).get(tier))
                .sum();
            (Reverse(remaining), h)
        });

        let mut last_failure = None;
        for host in hosts {
            let mut attempt = ledger.clone();
            let mut placed = option.clone();
            let result = placed
                .shards
                .iter_mut()
                .zip(topology.host_ranks(host))
                .try_for_each(|(shard, rank)| {
                    attempt.try_allocate(rank, &shard.storage)?;
                    shard.rank = Some(rank);
                    Ok::<(), StorageError>(())
                });
            match result {
                Ok(()) => return Ok((placed, attempt)),
                Err(e) => last_failure = Some(PartitionFailure::from_storage(&option.name, e)),
            }
        }
        Err(last_failure.unwrap_or_else(|| PartitionFailure::Constraint {
            table: option.name.clone(),
            detail: "topology has no hosts".to_string(),
        }))
    }
}

/// First rank, by remaining bytes in the dominant tier, that can hold
/// `storage`.
fn best_fit(ledger: &DeviceLedger, storage: &Storage, table: &str) -> Result<usize, PartitionFailure> {
    let tier = storage.dominant_tier();
    let ranks = ledger.ranks_by_remaining(tier);
    if let Some(&rank) = ranks.iter().find(|&&r| ledger.fits(r, storage)) {
        return Ok(rank);
    }
    let rank = ranks.first().copied().unwrap_or(0);
    Err(PartitionFailure::Capacity {
        table: table.to_string(),
        tier,
        rank,
        needed: storage.get(tier),
        available: ledger.remaining(rank).get(tier),
    })
}

impl Partitioner for GreedyPartitioner {
    fn name(&self) -> &str {
        "greedy"
    }

    fn partition(
        &self,
        proposal: &[ShardingOption],
        topology: &Topology,
        effective: &[Storage],
    ) -> Result<Vec<ShardingOption>, PartitionFailure> {
        let mut ledger = DeviceLedger::new(effective.to_vec());

        let mut order: Vec<usize> = (0..proposal.len()).collect();
        order.sort_by(|&a, &b| {
            let (x, y) = (&proposal[a], &proposal[b]);
            y.total_storage()
                .total()
                .cmp(&x.total_storage().total())
                .then_with(|| x.name.cmp(&y.name))
                .then_with(|| x.module_path.cmp(&y.module_path))
        });

        let mut placed: Vec<Option<ShardingOption>> = vec![None; proposal.len()];
        for idx in order {
            let option = &proposal[idx];
            let (done, next) = match self.place(option, topology, &ledger) {
                Ok(result) => result,
                Err(failure) => match option.fallback.as_deref() {
                    Some(fallback) if option.sharding_type == ShardingType::TableWise => {
                        match self.place(fallback, topology, &ledger) {
                            Ok((mut rw, next)) => {
                                tracing::debug!(
                                    "'{}' placed row-wise after table-wise failed: {}",
                                    option.name,
                                    failure,
                                );
                                rw.requested_sharding_type = Some(ShardingType::TableWise);
                                (rw, next)
                            }
                            Err(_) => return Err(failure),
                        }
                    }
                    _ => return Err(failure),
                },
            };
            ledger = next;
            placed[idx] = Some(done);
        }

        Ok(placed.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option::Shard;
    use table_ir::{ComputeDevice, ComputeKernel};

    fn option(name: &str, st: ShardingType, shard_storage: &[(u64, u64)]) -> ShardingOption {
        ShardingOption {
            name: name.into(),
            module_path: "m".into(),
            table_index: 0,
            sharding_type: st,
            compute_kernel: ComputeKernel::Fused,
            shards: shard_storage
                .iter()
                .map(|&(h, d)| {
                    let mut s = Shard::new([0, 0], [1, 1]);
                    s.storage = Storage::new(h, d);
                    s
                })
                .collect(),
            cache_load_factor: None,
            cache_params: None,
            enforce_hbm: None,
            stochastic_rounding: None,
            bounds_check_mode: None,
            is_weighted: false,
            feature_names: vec![name.into()],
            key_value_params: None,
            priority: 1.0,
            fallback: None,
            requested_sharding_type: None,
        }
    }

    fn topology(world: usize) -> Topology {
        Topology::new(world, ComputeDevice::Cuda).unwrap()
    }

    fn budget(world: usize, hbm: u64) -> Vec<Storage> {
        vec![Storage::new(hbm, 1000); world]
    }

    fn ranks(placed: &[ShardingOption]) -> Vec<Vec<usize>> {
        placed.iter().map(ShardingOption::ranks).collect()
    }

    #[test]
    fn test_table_wise_balances() {
        let proposal: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .map(|n| option(n, ShardingType::TableWise, &[(10, 0)]))
            .collect();
        let placed = GreedyPartitioner::new()
            .partition(&proposal, &topology(2), &budget(2, 100))
            .unwrap();
        assert_eq!(ranks(&placed), vec![vec![0], vec![1], vec![0], vec![1]]);
    }

    #[test]
    fn test_largest_first() {
        let proposal = vec![
            option("small", ShardingType::TableWise, &[(10, 0)]),
            option("big", ShardingType::TableWise, &[(60, 0)]),
        ];
        let placed = GreedyPartitioner::new()
            .partition(&proposal, &topology(2), &budget(2, 100))
            .unwrap();
        // Output keeps proposal order; "big" was placed first on rank 0.
        assert_eq!(placed[0].name, "small");
        assert_eq!(ranks(&placed), vec![vec![1], vec![0]]);
    }

    #[test]
    fn test_row_wise_ascending_ranks() {
        let proposal = vec![
            option("a", ShardingType::TableWise, &[(50, 0)]),
            option("b", ShardingType::RowWise, &[(10, 0), (10, 0)]),
        ];
        let placed = GreedyPartitioner::new()
            .partition(&proposal, &topology(3), &budget(3, 100))
            .unwrap();
        assert_eq!(placed[0].ranks(), vec![0]);
        // Ranks 1 and 2 have the most left; assigned in ascending order.
        assert_eq!(placed[1].ranks(), vec![1, 2]);
    }

    #[test]
    fn test_data_parallel_every_rank() {
        let proposal = vec![option("a", ShardingType::DataParallel, &[(10, 0), (10, 0)])];
        let placed = GreedyPartitioner::new()
            .partition(&proposal, &topology(2), &budget(2, 100))
            .unwrap();
        assert_eq!(placed[0].ranks(), vec![0, 1]);
    }

    #[test]
    fn test_table_row_wise_stays_on_one_host() {
        let topo = topology(4).with_local_world_size(2).unwrap();
        let proposal = vec![
            option("a", ShardingType::TableWise, &[(80, 0)]),
            option("b", ShardingType::TableRowWise, &[(30, 0), (30, 0)]),
        ];
        let placed = GreedyPartitioner::new()
            .partition(&proposal, &topo, &budget(4, 100))
            .unwrap();
        assert_eq!(placed[0].ranks(), vec![0]);
        assert_eq!(placed[1].ranks(), vec![2, 3]);
    }

    #[test]
    fn test_capacity_failure() {
        let proposal = vec![
            option("a", ShardingType::TableWise, &[(70, 0)]),
            option("b", ShardingType::TableWise, &[(70, 0)]),
            option("c", ShardingType::TableWise, &[(70, 0)]),
        ];
        let err = GreedyPartitioner::new()
            .partition(&proposal, &topology(2), &budget(2, 100))
            .unwrap_err();
        assert!(matches!(err, PartitionFailure::Capacity { tier: Tier::Hbm, needed: 70, available: 30, .. }));
        assert_eq!(err.table(), "c");
    }

    #[test]
    fn test_enforce_hbm_is_constraint_failure() {
        let mut o = option("a", ShardingType::TableWise, &[(10, 5)]);
        o.enforce_hbm = Some(true);
        let err = GreedyPartitioner::new()
            .partition(&[o], &topology(2), &budget(2, 100))
            .unwrap_err();
        assert!(err.is_constraint());
    }

    #[test]
    fn test_hidden_row_wise_fallback() {
        let mut tw = option("b", ShardingType::TableWise, &[(60, 0)]);
        tw.fallback = Some(Box::new(option("b", ShardingType::RowWise, &[(30, 0), (30, 0)])));
        let proposal = vec![
            option("a", ShardingType::TableWise, &[(65, 0)]),
            option("c", ShardingType::TableWise, &[(61, 0)]),
            tw,
        ];
        let placed = GreedyPartitioner::new()
            .partition(&proposal, &topology(2), &budget(2, 100))
            .unwrap();
        let b = &placed[2];
        assert_eq!(b.sharding_type, ShardingType::RowWise);
        assert_eq!(b.requested_sharding_type, Some(ShardingType::TableWise));
        assert_eq!(b.ranks(), vec![0, 1]);
    }

    #[test]
    fn test_failed_table_leaves_no_charge() {
        // "a" cannot be placed row-wise; nothing of it may stay charged
        // before the error surfaces.
        let proposal = vec![option("a", ShardingType::RowWise, &[(50, 0), (150, 0)])];
        let err = GreedyPartitioner::new()
            .partition(&proposal, &topology(2), &budget(2, 100))
            .unwrap_err();
        assert!(matches!(err, PartitionFailure::Capacity { rank: 1, .. }));
    }
}
