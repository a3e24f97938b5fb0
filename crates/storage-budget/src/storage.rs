// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Two-tier storage amounts.

use std::fmt;
use std::ops::{Add, AddAssign};

/// A memory tier of a device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
    serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Fast device memory.
    Hbm,
    /// Slow host memory.
    Ddr,
}

impl Tier {
    pub const ALL: [Tier; 2] = [Tier::Hbm, Tier::Ddr];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Hbm => "HBM",
            Tier::Ddr => "DDR",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bytes held in each tier. Used both for device capacities and for the
/// footprint of a single shard.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct Storage {
    pub hbm: u64,
    pub ddr: u64,
}

impl Storage {
    pub fn new(hbm: u64, ddr: u64) -> Self {
        Self { hbm, ddr }
    }

    /// Storage entirely in one tier.
    pub fn in_tier(tier: Tier, bytes: u64) -> Self {
        match tier {
            Tier::Hbm => Self::new(bytes, 0),
            Tier::Ddr => Self::new(0, bytes),
        }
    }

    /// Returns the bytes held in `tier`.
    pub fn get(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Hbm => self.hbm,
            Tier::Ddr => self.ddr,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.hbm == 0 && self.ddr == 0
    }

    /// Sum of both tiers, saturating.
    pub fn total(&self) -> u64 {
        self.hbm.saturating_add(self.ddr)
    }

    /// The tier holding the most bytes; ties go to HBM.
    pub fn dominant_tier(&self) -> Tier {
        if self.hbm >= self.ddr {
            Tier::Hbm
        } else {
            Tier::Ddr
        }
    }

    /// Returns `true` if both tiers of `self` fit within `capacity`.
    pub fn fits_in(&self, capacity: &Storage) -> bool {
        self.hbm <= capacity.hbm && self.ddr <= capacity.ddr
    }

    /// Subtracts per tier, returning `None` if either tier would go
    /// negative.
    pub fn checked_sub(&self, other: &Storage) -> Option<Storage> {
        Some(Storage {
            hbm: self.hbm.checked_sub(other.hbm)?,
            ddr: self.ddr.checked_sub(other.ddr)?,
        })
    }

    /// Subtracts per tier, clamping at zero.
    pub fn saturating_sub(&self, other: &Storage) -> Storage {
        Storage {
            hbm: self.hbm.saturating_sub(other.hbm),
            ddr: self.ddr.saturating_sub(other.ddr),
        }
    }

    /// Scales both tiers by `factor`, rounding up.
    pub fn scale_ceil(&self, factor: f64) -> Storage {
        Storage {
            hbm: (self.hbm as f64 * factor).ceil() as u64,
            ddr: (self.ddr as f64 * factor).ceil() as u64,
        }
    }
}

impl Add for Storage {
    type Output = Storage;

    fn add(self, rhs: Storage) -> Storage {
        Storage {
            hbm: self.hbm.saturating_add(rhs.hbm),
            ddr: self.ddr.saturating_add(rhs.ddr),
        }
    }
}

impl AddAssign for Storage {
    fn add_assign(&mut self, rhs: Storage) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for Storage {
    fn sum<I: Iterator<Item = Storage>>(iter: I) -> Storage {
        iter.fold(Storage::default(), |acc, s| acc + s)
    }
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HBM: {} B, DDR: {} B", self.hbm, self.ddr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_sum() {
        let a = Storage::new(10, 20);
        let b = Storage::new(1, 2);
        assert_eq!(a + b, Storage::new(11, 22));
        let total: Storage = vec![a, b, b].into_iter().sum();
        assert_eq!(total, Storage::new(12, 24));
    }

    #[test]
    fn test_add_saturates() {
        let a = Storage::new(u64::MAX, 0);
        assert_eq!((a + Storage::new(1, 1)).hbm, u64::MAX);
    }

    #[test]
    fn test_checked_sub() {
        let cap = Storage::new(100, 100);
        assert_eq!(cap.checked_sub(&Storage::new(40, 0)), Some(Storage::new(60, 100)));
        assert_eq!(cap.checked_sub(&Storage::new(0, 101)), None);
        assert_eq!(cap.saturating_sub(&Storage::new(0, 101)), Storage::new(100, 0));
    }

    #[test]
    fn test_fits_in() {
        let cap = Storage::new(100, 50);
        assert!(Storage::new(100, 50).fits_in(&cap));
        assert!(!Storage::new(101, 0).fits_in(&cap));
        assert!(!Storage::new(0, 51).fits_in(&cap));
    }

    #[test]
    fn test_dominant_tier() {
        assert_eq!(Storage::new(5, 5).dominant_tier(), Tier::Hbm);
        assert_eq!(Storage::new(0, 5).dominant_tier(), Tier::Ddr);
        assert_eq!(Storage::in_tier(Tier::Ddr, 7).get(Tier::Ddr), 7);
    }

    #[test]
    fn test_scale_ceil() {
        assert_eq!(Storage::new(10, 3).scale_ceil(0.25), Storage::new(3, 1));
    }
}
