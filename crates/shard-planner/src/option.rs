// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Sharding options: one concrete way to shard one table.
//!
//! An option fixes the sharding type, the compute kernel and the shard
//! geometry of a table. The enumerator fills in per-shard storage and
//! cost; the partitioner fills in ranks.
//!
//! ```text
//!  row-wise, 2 shards                 column-wise, 2 shards
//!  ┌──────────────┐ offsets [0, 0]    ┌──────┬──────┐
//!  │   shard 0    │ sizes   [50, 64]  │  0   │  1   │ offsets [0,0] / [0,32]
//!  ├──────────────┤                   │      │      │ sizes   [100,32] each
//!  │   shard 1    │ offsets [50, 0]   │      │      │
//!  └──────────────┘                   └──────┴──────┘
//! ```

use std::ops::Add;
use storage_budget::Storage;
use table_ir::{
    BoundsCheckMode, CacheParams, ComputeKernel, KeyValueParams, ShardingType,
};

/// Estimated cost of a shard, in seconds per training step.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct Perf {
    pub fwd_compute: f64,
    pub fwd_comms: f64,
    pub bwd_compute: f64,
    pub bwd_comms: f64,
}

impl Perf {
    pub fn total(&self) -> f64 {
        self.fwd_compute + self.fwd_comms + self.bwd_compute + self.bwd_comms
    }

    /// Scales every component by `factor`.
    pub fn scaled(&self, factor: f64) -> Perf {
        Perf {
            fwd_compute: self.fwd_compute * factor,
            fwd_comms: self.fwd_comms * factor,
            bwd_compute: self.bwd_compute * factor,
            bwd_comms: self.bwd_comms * factor,
        }
    }
}

impl Add for Perf {
    type Output = Perf;

    fn add(self, rhs: Perf) -> Perf {
        Perf {
            fwd_compute: self.fwd_compute + rhs.fwd_compute,
            fwd_comms: self.fwd_comms + rhs.fwd_comms,
            bwd_compute: self.bwd_compute + rhs.bwd_compute,
            bwd_comms: self.bwd_comms + rhs.bwd_comms,
        }
    }
}

/// A rectangular piece of a table.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Shard {
    /// `[row, column]` offset into the table.
    pub offsets: [u64; 2],
    /// `[rows, columns]` extent.
    pub sizes: [u64; 2],
    pub storage: Storage,
    pub perf: Perf,
    /// Device the shard is placed on; `None` until partitioned.
    pub rank: Option<usize>,
}

impl Shard {
    pub fn new(offsets: [u64; 2], sizes: [u64; 2]) -> Self {
        Self {
            offsets,
            sizes,
            storage: Storage::default(),
            perf: Perf::default(),
            rank: None,
        }
    }

    /// Number of elements covered by the shard.
    pub fn area(&self) -> u64 {
        self.sizes[0].saturating_mul(self.sizes[1])
    }
}

/// One way to shard one table.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ShardingOption {
    /// Table name.
    pub name: String,
    pub module_path: String,
    /// Position of the table in the search space.
    pub table_index: usize,
    pub sharding_type: ShardingType,
    pub compute_kernel: ComputeKernel,
    pub shards: Vec<Shard>,
    /// Fast-tier cache fraction used to size caching kernels.
    pub cache_load_factor: Option<f64>,
    pub cache_params: Option<CacheParams>,
    pub enforce_hbm: Option<bool>,
    pub stochastic_rounding: Option<bool>,
    pub bounds_check_mode: Option<BoundsCheckMode>,
    pub is_weighted: bool,
    pub feature_names: Vec<String>,
    pub key_value_params: Option<KeyValueParams>,
    /// Weight applied to this table's cost.
    pub priority: f64,
    /// Row-wise variant tried when this table-wise option cannot be placed.
    #[serde(skip)]
    pub fallback: Option<Box<ShardingOption>>,
    /// Set on a placed fallback: the sharding type originally proposed.
    pub requested_sharding_type: Option<ShardingType>,
}

impl ShardingOption {
    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Storage of all shards together.
    pub fn total_storage(&self) -> Storage {
        self.shards.iter().map(|s| s.storage).sum()
    }

    /// Sum of shard costs, unweighted.
    pub fn total_perf(&self) -> f64 {
        self.shards.iter().map(|s| s.perf.total()).sum()
    }

    /// Ranks of the placed shards, in shard order.
    pub fn ranks(&self) -> Vec<usize> {
        self.shards.iter().filter_map(|s| s.rank).collect()
    }

    pub fn is_placed(&self) -> bool {
        !self.shards.is_empty() && self.shards.iter().all(|s| s.rank.is_some())
    }

    /// Identity of the option for de-duplicating proposals: table,
    /// sharding type, kernel and cache load factor.
    pub fn key(&self) -> OptionKey {
        OptionKey {
            table_index: self.table_index,
            sharding_type: self.sharding_type,
            compute_kernel: self.compute_kernel,
            cache_load_factor_bits: self.cache_load_factor.map(f64::to_bits),
        }
    }

    /// Returns a copy with all ranks cleared.
    pub fn unplaced(&self) -> ShardingOption {
        let mut option = self.clone();
        option.shards.iter_mut().for_each(|s| s.rank = None);
        option
    }

    pub fn summary(&self) -> String {
        format!(
            "{}.{}: {} / {} x{} shard(s), {}, perf {:.3e}",
            self.module_path,
            self.name,
            self.sharding_type,
            self.compute_kernel,
            self.num_shards(),
            self.total_storage(),
            self.total_perf(),
        )
    }
}

/// Hashable identity of a [`ShardingOption`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptionKey {
    pub table_index: usize,
    pub sharding_type: ShardingType,
    pub compute_kernel: ComputeKernel,
    pub cache_load_factor_bits: Option<u64>,
}

// ── Geometry ──────────────────────────────────────────────────────

/// Splits `total` into `parts` sizes differing by at most one, the
/// remainder going to the lowest-indexed parts.
pub(crate) fn even_split(total: u64, parts: usize) -> Vec<u64> {
    if parts == 0 {
        return Vec::new();
    }
    let n = parts as u64;
    let base = total / n;
    let rem = total % n;
    (0..n).map(|i| base + u64::from(i < rem)).collect()
}

/// `(offset, size)` row ranges of an even row-wise split.
pub(crate) fn row_ranges(rows: u64, parts: usize) -> Vec<(u64, u64)> {
    let mut offset = 0;
    even_split(rows, parts)
        .into_iter()
        .map(|size| {
            let range = (offset, size);
            offset += size;
            range
        })
        .collect()
}

/// `(offset, size)` row ranges of a bucket-aligned split.
///
/// Buckets are divided as evenly as possible; each bucket spans
/// `ceil(rows / buckets)` rows and the last shard absorbs the tail.
pub(crate) fn bucket_row_ranges(rows: u64, buckets: u64, parts: usize) -> Vec<(u64, u64)> {
    if parts == 0 {
        return Vec::new();
    }
    let buckets = buckets.clamp(1, rows.max(1));
    let rows_per_bucket = rows.div_ceil(buckets);
    let mut bucket_offset = 0;
    let split = even_split(buckets, parts);
    let last = split.len() - 1;
    split
        .into_iter()
        .enumerate()
        .map(|(i, num_buckets)| {
            let offset = (bucket_offset * rows_per_bucket).min(rows);
            let size = if i == last {
                rows - offset
            } else {
                (num_buckets * rows_per_bucket).min(rows - offset)
            };
            bucket_offset += num_buckets;
            (offset, size)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option_with_shards(storages: &[(u64, u64)]) -> ShardingOption {
        ShardingOption {
            name: "t".into(),
            module_path: "m".into(),
            table_index: 0,
            sharding_type: ShardingType::RowWise,
            compute_kernel: ComputeKernel::Fused,
            shards: storages
                .iter()
                .map(|&(h, d)| {
                    let mut s = Shard::new([0, 0], [1, 1]);
                    s.storage = Storage::new(h, d);
                    s.perf.fwd_compute = 1.0;
                    s
                })
                .collect(),
            cache_load_factor: None,
            cache_params: None,
            enforce_hbm: None,
            stochastic_rounding: None,
            bounds_check_mode: None,
            is_weighted: false,
            feature_names: vec!["t".into()],
            key_value_params: None,
            priority: 1.0,
            fallback: None,
            requested_sharding_type: None,
        }
    }

    #[test]
    fn test_even_split() {
        assert_eq!(even_split(100, 2), vec![50, 50]);
        assert_eq!(even_split(10, 3), vec![4, 3, 3]);
        assert_eq!(even_split(1, 3), vec![1, 0, 0]);
        assert!(even_split(5, 0).is_empty());
    }

    #[test]
    fn test_row_ranges_tile() {
        let ranges = row_ranges(101, 4);
        assert_eq!(ranges, vec![(0, 26), (26, 25), (51, 25), (76, 25)]);
        assert_eq!(ranges.iter().map(|r| r.1).sum::<u64>(), 101);
    }

    #[test]
    fn test_bucket_ranges() {
        assert_eq!(bucket_row_ranges(10_000, 10, 2), vec![(0, 5000), (5000, 5000)]);
        // 3 buckets of 4 rows over 10 rows: buckets split [2, 1].
        assert_eq!(bucket_row_ranges(10, 3, 2), vec![(0, 8), (8, 2)]);
        // Fewer buckets than shards leaves trailing shards empty.
        assert_eq!(bucket_row_ranges(10, 1, 2), vec![(0, 10), (10, 0)]);
    }

    #[test]
    fn test_totals() {
        let o = option_with_shards(&[(10, 1), (20, 2)]);
        assert_eq!(o.total_storage(), Storage::new(30, 3));
        assert_eq!(o.total_perf(), 2.0);
        assert!(!o.is_placed());
        assert!(o.ranks().is_empty());
    }

    #[test]
    fn test_placement_and_key() {
        let mut o = option_with_shards(&[(1, 0), (1, 0)]);
        o.shards[0].rank = Some(1);
        o.shards[1].rank = Some(0);
        assert!(o.is_placed());
        assert_eq!(o.ranks(), vec![1, 0]);
        assert_eq!(o.unplaced().ranks(), Vec::<usize>::new());
        assert_eq!(o.key(), o.unplaced().key());

        let mut cached = o.clone();
        cached.cache_load_factor = Some(0.5);
        assert_ne!(o.key(), cached.key());
    }

    #[test]
    fn test_perf_add_and_scale() {
        let p = Perf {
            fwd_compute: 1.0,
            fwd_comms: 2.0,
            bwd_compute: 2.0,
            bwd_comms: 2.0,
        };
        assert_eq!(p.total(), 7.0);
        assert_eq!((p + p).total(), 14.0);
        assert_eq!(p.scaled(0.5).total(), 3.5);
    }
}
