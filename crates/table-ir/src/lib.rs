// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # table-ir
//!
//! A declarative description of embedding tables for shard planning.
//!
//! The planner never touches weights. It needs only what this crate
//! captures:
//!
//! - [`EmbeddingTable`]: geometry, element type and access pattern of a table.
//! - [`EmbeddingModule`]: an ordered group of tables, with a
//!   **type-state pattern** (`Loaded` → `Validated`).
//! - [`ParameterConstraints`]: per-table restrictions and kernel settings.
//! - [`ShardingType`], [`ComputeKernel`], [`ComputeDevice`], [`ModuleKind`]:
//!   the shared vocabulary of sharders and plans.
//! - [`TableManifest`]: a JSON file bundling modules and constraints.
//!
//! # Example
//! ```
//! use table_ir::{EmbeddingModule, EmbeddingTable, ModuleKind};
//!
//! let module = EmbeddingModule::new(
//!     "sparse.ebc",
//!     ModuleKind::EmbeddingBagCollection,
//!     vec![EmbeddingTable::new("user_id", 1_000, 64)],
//! )
//! .validate()
//! .unwrap();
//! println!("{}", module.summary());
//! ```

mod constraints;
mod dtype;
mod error;
mod kinds;
mod manifest;
pub mod module;
mod table;

pub use constraints::{
    BoundsCheckMode, CacheAlgorithm, CacheParams, ConstraintMap, KeyValueParams,
    ParameterConstraints,
};
pub use dtype::DataType;
pub use error::TableError;
pub use kinds::{ComputeDevice, ComputeKernel, ModuleKind, ShardingType};
pub use manifest::{ManifestModule, TableManifest};
pub use module::{EmbeddingModule, Loaded, ModuleState, Validated};
pub use table::EmbeddingTable;
