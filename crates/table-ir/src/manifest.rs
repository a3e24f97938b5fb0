// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! JSON table manifest parsing.
//!
//! A manifest bundles the modules to shard and the per-table constraints
//! so that a whole planning problem can be described in one file.
//!
//! # Format
//! ```json
//! {
//!   "modules": [
//!     {
//!       "path": "sparse.ebc",
//!       "kind": "embedding_bag_collection",
//!       "tables": [
//!         {
//!           "name": "user_id",
//!           "num_embeddings": 1000000,
//!           "embedding_dim": 128,
//!           "feature_names": ["user_id"],
//!           "pooling_factor": 2.0
//!         }
//!       ]
//!     }
//!   ],
//!   "constraints": {
//!     "user_id": { "sharding_types": ["row_wise"] }
//!   }
//! }
//! ```

use crate::{
    ConstraintMap, EmbeddingModule, EmbeddingTable, Loaded, ModuleKind, TableError, Validated,
};
use std::collections::HashSet;
use std::path::Path;

/// Top-level manifest, deserialised from JSON.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TableManifest {
    pub modules: Vec<ManifestModule>,
    /// Table name → constraints.
    #[serde(default)]
    pub constraints: ConstraintMap,
}

/// A single module entry in the manifest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ManifestModule {
    /// Module path (e.g., `"sparse.ebc"`).
    pub path: String,
    #[serde(default = "default_kind")]
    pub kind: ModuleKind,
    pub tables: Vec<EmbeddingTable>,
}

fn default_kind() -> ModuleKind {
    ModuleKind::EmbeddingBagCollection
}

impl TableManifest {
    /// Loads a manifest from a JSON file path.
    pub fn from_file(path: &Path) -> Result<Self, TableError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parses a manifest from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, TableError> {
        let manifest: Self = serde_json::from_str(json)?;
        Ok(manifest)
    }

    /// Validates manifest-level consistency.
    ///
    /// Checks:
    /// - At least one module is defined.
    /// - Module paths are unique.
    /// - Constraint feature names agree with the tables they name.
    ///
    /// Constraints for tables that appear in no module are ignored with
    /// a warning. Per-table geometry is checked by
    /// [`EmbeddingModule::validate`].
    pub fn validate(&self) -> Result<(), TableError> {
        if self.modules.is_empty() {
            return Err(TableError::InvalidModule {
                module: String::new(),
                detail: "manifest contains no modules".into(),
            });
        }

        let mut paths = HashSet::new();
        for module in &self.modules {
            if !paths.insert(module.path.as_str()) {
                return Err(TableError::InvalidModule {
                    module: module.path.clone(),
                    detail: "duplicate module path".into(),
                });
            }
        }

        for (name, constraint) in &self.constraints {
            let table = self
                .modules
                .iter()
                .flat_map(|m| m.tables.iter())
                .find(|t| &t.name == name);
            match table {
                Some(table) => constraint.check_feature_names(table)?,
                None => tracing::warn!("constraint for unknown table '{}' is ignored", name),
            }
        }

        Ok(())
    }

    /// Returns the total number of tables across all modules.
    pub fn total_table_count(&self) -> usize {
        self.modules.iter().map(|m| m.tables.len()).sum()
    }

    /// Validates the manifest and converts every entry into a validated
    /// module, returning the constraints alongside.
    pub fn into_modules(self) -> Result<(Vec<EmbeddingModule<Validated>>, ConstraintMap), TableError> {
        self.validate()?;
        let modules = self
            .modules
            .into_iter()
            .map(|m| EmbeddingModule::<Loaded>::new(m.path, m.kind, m.tables).validate())
            .collect::<Result<Vec<_>, _>>()?;
        Ok((modules, self.constraints))
    }
}
