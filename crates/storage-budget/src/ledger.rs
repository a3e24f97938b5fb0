// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-device budget accounting.
//!
//! The [`DeviceLedger`] holds a two-tier capacity for every rank and the
//! storage charged against it so far. It is the single source of truth
//! for the capacity invariant: a charge that would push any tier of any
//! rank over its capacity is refused and nothing is recorded.
//!
//! ```text
//!  rank │ capacity (HBM / DDR) │ used (HBM / DDR) │ remaining
//!  ─────┼──────────────────────┼──────────────────┼──────────
//!    0  │   2 MiB  /  8 MiB    │  50 KiB / 0      │  ...
//!    1  │   2 MiB  /  8 MiB    │  25 KiB / 0      │  ...
//! ```

use crate::{Storage, StorageError, Tier};

/// Capacity and usage of every device in a world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceLedger {
    capacity: Vec<Storage>,
    used: Vec<Storage>,
    /// Number of refused charges since construction or the last reset.
    rejections: u64,
}

impl DeviceLedger {
    /// Creates a ledger with one entry per rank.
    pub fn new(capacity: Vec<Storage>) -> Self {
        let used = vec![Storage::default(); capacity.len()];
        Self {
            capacity,
            used,
            rejections: 0,
        }
    }

    /// Creates a ledger where every rank has the same capacity.
    pub fn uniform(world_size: usize, per_device: Storage) -> Self {
        Self::new(vec![per_device; world_size])
    }

    pub fn world_size(&self) -> usize {
        self.capacity.len()
    }

    pub fn capacity(&self) -> &[Storage] {
        &self.capacity
    }

    /// Storage charged per rank.
    pub fn usage(&self) -> &[Storage] {
        &self.used
    }

    pub fn rejections(&self) -> u64 {
        self.rejections
    }

    /// Remaining storage on `rank`, or zero for unknown ranks.
    pub fn remaining(&self, rank: usize) -> Storage {
        match (self.capacity.get(rank), self.used.get(rank)) {
            (Some(cap), Some(used)) => cap.saturating_sub(used),
            _ => Storage::default(),
        }
    }

    /// Remaining storage summed over all ranks.
    pub fn total_remaining(&self) -> Storage {
        (0..self.world_size()).map(|r| self.remaining(r)).sum()
    }

    /// Capacity summed over all ranks.
    pub fn total_capacity(&self) -> Storage {
        self.capacity.iter().copied().sum()
    }

    /// Returns `true` if `request` fits in what is left on `rank`.
    pub fn fits(&self, rank: usize, request: &Storage) -> bool {
        rank < self.world_size() && request.fits_in(&self.remaining(rank))
    }

    /// Charges `request` to `rank`.
    ///
    /// Returns `Err(OutOfMemory)` naming the first tier (HBM before DDR)
    /// that cannot hold the request. The ledger is unchanged on error.
    pub fn try_allocate(&mut self, rank: usize, request: &Storage) -> Result<(), StorageError> {
        if rank >= self.world_size() {
            self.rejections += 1;
            return Err(StorageError::UnknownRank {
                rank,
                world_size: self.world_size(),
            });
        }

        let remaining = self.remaining(rank);
        for tier in Tier::ALL {
            if request.get(tier) > remaining.get(tier) {
                self.rejections += 1;
                return Err(StorageError::OutOfMemory {
                    tier,
                    rank,
                    requested: request.get(tier),
                    available: remaining.get(tier),
                    budget: self.capacity[rank].get(tier),
                });
            }
        }

        self.used[rank] += *request;
        Ok(())
    }

    /// Returns `request` to `rank`, clamping at zero usage.
    pub fn release(&mut self, rank: usize, request: &Storage) {
        if let Some(used) = self.used.get_mut(rank) {
            *used = used.saturating_sub(request);
        }
    }

    /// Ranks ordered by remaining bytes in `tier`, most first; ties go to
    /// the lowest rank.
    pub fn ranks_by_remaining(&self, tier: Tier) -> Vec<usize> {
        let mut ranks: Vec<usize> = (0..self.world_size()).collect();
        ranks.sort_by(|&a, &b| {
            self.remaining(b)
                .get(tier)
                .cmp(&self.remaining(a).get(tier))
                .then(a.cmp(&b))
        });
        ranks
    }

    /// Clears all charges.
    pub fn reset(&mut self) {
        self.used.iter_mut().for_each(|u| *u = Storage::default());
        self.rejections = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> DeviceLedger {
        DeviceLedger::uniform(2, Storage::new(1000, 500))
    }

    #[test]
    fn test_allocate_and_release() {
        let mut l = ledger();
        l.try_allocate(0, &Storage::new(400, 100)).unwrap();
        assert_eq!(l.remaining(0), Storage::new(600, 400));
        assert_eq!(l.usage()[0], Storage::new(400, 100));

        l.release(0, &Storage::new(400, 100));
        assert_eq!(l.remaining(0), Storage::new(1000, 500));
    }

    #[test]
    fn test_oom_leaves_ledger_unchanged() {
        let mut l = ledger();
        l.try_allocate(1, &Storage::new(900, 0)).unwrap();
        let err = l.try_allocate(1, &Storage::new(200, 0)).unwrap_err();
        match err {
            StorageError::OutOfMemory {
                tier,
                rank,
                requested,
                available,
                budget,
            } => {
                assert_eq!(tier, Tier::Hbm);
                assert_eq!(rank, 1);
                assert_eq!(requested, 200);
                assert_eq!(available, 100);
                assert_eq!(budget, 1000);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(l.usage()[1], Storage::new(900, 0));
        assert_eq!(l.rejections(), 1);
    }

    #[test]
    fn test_ddr_overflow_reported() {
        let mut l = ledger();
        let err = l.try_allocate(0, &Storage::new(0, 501)).unwrap_err();
        assert!(matches!(err, StorageError::OutOfMemory { tier: Tier::Ddr, .. }));
    }

    #[test]
    fn test_unknown_rank() {
        let mut l = ledger();
        assert!(matches!(
            l.try_allocate(5, &Storage::new(1, 1)),
            Err(StorageError::UnknownRank { rank: 5, world_size: 2 })
        ));
        assert!(!l.fits(5, &Storage::default()));
    }

    #[test]
    fn test_ranks_by_remaining() {
        let mut l = DeviceLedger::uniform(3, Storage::new(100, 100));
        assert_eq!(l.ranks_by_remaining(Tier::Hbm), vec![0, 1, 2]);
        l.try_allocate(0, &Storage::new(50, 0)).unwrap();
        l.try_allocate(2, &Storage::new(10, 0)).unwrap();
        assert_eq!(l.ranks_by_remaining(Tier::Hbm), vec![1, 2, 0]);
        assert_eq!(l.ranks_by_remaining(Tier::Ddr), vec![0, 1, 2]);
    }

    #[test]
    fn test_totals_and_reset() {
        let mut l = ledger();
        assert_eq!(l.total_capacity(), Storage::new(2000, 1000));
        l.try_allocate(0, &Storage::new(100, 100)).unwrap();
        assert_eq!(l.total_remaining(), Storage::new(1900, 900));
        l.reset();
        assert_eq!(l.total_remaining(), l.total_capacity());
    }
}
