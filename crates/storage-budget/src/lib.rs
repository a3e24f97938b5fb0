// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # storage-budget
//!
//! Budget accounting for devices with a fast (HBM) and a slow (DDR)
//! memory tier.
//!
//! # Key Components
//!
//! - [`MemoryBudget`]: a byte count with human-readable parsing
//!   (`"64M"`, `"32G"`, etc.).
//! - [`Storage`]: bytes per [`Tier`], with saturating arithmetic.
//! - [`DeviceLedger`]: per-rank capacity and usage. Every charge is
//!   checked against the remaining budget of both tiers and refused
//!   atomically if it does not fit.
//!
//! # Example
//! ```
//! use storage_budget::{DeviceLedger, MemoryBudget, Storage, Tier};
//!
//! let hbm = MemoryBudget::parse("2M").unwrap().as_bytes();
//! let mut ledger = DeviceLedger::uniform(2, Storage::new(hbm, 0));
//!
//! ledger.try_allocate(0, &Storage::new(1024, 0)).unwrap();
//! assert_eq!(ledger.ranks_by_remaining(Tier::Hbm), vec![1, 0]);
//!
//! // Exceeding the budget is refused and nothing is charged.
//! assert!(ledger.try_allocate(1, &Storage::new(hbm + 1, 0)).is_err());
//! assert_eq!(ledger.usage()[1], Storage::default());
//! ```

mod budget;
mod error;
pub mod ledger;
mod storage;

pub use budget::MemoryBudget;
pub use error::StorageError;
pub use ledger::DeviceLedger;
pub use storage::{Storage, Tier};
