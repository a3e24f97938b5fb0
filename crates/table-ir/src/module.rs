// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Embedding modules: named groups of tables sharded together.
//!
//! # Type-State Pattern
//!
//! ```text
//! EmbeddingModule<Loaded>     : tables parsed, not yet checked.
//!       │  .validate()
//!       ▼
//! EmbeddingModule<Validated>  : geometry verified, ready for planning.
//! ```
//!
//! The planner only accepts validated modules, so malformed table
//! descriptions are rejected before any search work is done.

use crate::{EmbeddingTable, ModuleKind, TableError};
use std::collections::HashSet;
use std::fmt;

// ── Type-state markers ─────────────────────────────────────────────

/// Marker: module has been constructed but not validated.
#[derive(Debug, Clone)]
pub struct Loaded;

/// Marker: module has been validated and is ready for planning.
#[derive(Debug, Clone)]
pub struct Validated;

/// Sealed trait for module states.
pub trait ModuleState: fmt::Debug + Clone {}
impl ModuleState for Loaded {}
impl ModuleState for Validated {}

// ── EmbeddingModule ────────────────────────────────────────────────

/// A module that owns an ordered list of embedding tables.
#[derive(Debug, Clone)]
pub struct EmbeddingModule<S: ModuleState = Loaded> {
    /// Fully qualified module path (e.g., `"sparse.ebc"`).
    pub path: String,
    /// What kind of module this is; selects the sharder.
    pub kind: ModuleKind,
    /// Tables in declaration order.
    pub tables: Vec<EmbeddingTable>,
    _state: std::marker::PhantomData<S>,
}

// ── Loaded state ───────────────────────────────────────────────────

impl EmbeddingModule<Loaded> {
    /// Creates a new module in the `Loaded` state.
    pub fn new(path: impl Into<String>, kind: ModuleKind, tables: Vec<EmbeddingTable>) -> Self {
        Self {
            path: path.into(),
            kind,
            tables,
            _state: std::marker::PhantomData,
        }
    }

    /// Validates the module and transitions to the `Validated` state.
    ///
    /// # Checks
    /// - The module path is non-empty and at least one table is present.
    /// - Table names are unique.
    /// - Every table has rows, a non-zero dimension, at least one feature,
    ///   and a positive pooling factor.
    /// - Virtual tables declare a bucket count in `1..=num_embeddings`.
    pub fn validate(self) -> Result<EmbeddingModule<Validated>, TableError> {
        if self.path.is_empty() {
            return Err(TableError::InvalidModule {
                module: self.path,
                detail: "module path is empty".into(),
            });
        }
        if self.tables.is_empty() {
            return Err(TableError::InvalidModule {
                module: self.path,
                detail: "module contains no tables".into(),
            });
        }

        let mut seen = HashSet::new();
        for table in &self.tables {
            if !seen.insert(table.name.as_str()) {
                return Err(TableError::InvalidModule {
                    module: self.path.clone(),
                    detail: format!("duplicate table name '{}'", table.name),
                });
            }
            validate_table(table)?;
        }

        Ok(EmbeddingModule {
            path: self.path,
            kind: self.kind,
            tables: self.tables,
            _state: std::marker::PhantomData,
        })
    }
}

fn validate_table(table: &EmbeddingTable) -> Result<(), TableError> {
    let invalid = |detail: &str| TableError::InvalidTable {
        table: table.name.clone(),
        detail: detail.to_string(),
    };

    if table.name.is_empty() {
        return Err(invalid("table name is empty"));
    }
    if table.num_embeddings == 0 {
        return Err(invalid("num_embeddings must be positive"));
    }
    if table.embedding_dim == 0 {
        return Err(invalid("embedding_dim must be positive"));
    }
    if table.feature_names.is_empty() {
        return Err(invalid("at least one feature name is required"));
    }
    if table.feature_names.iter().any(|f| f.is_empty()) {
        return Err(invalid("feature names must be non-empty"));
    }
    if !(table.pooling_factor.is_finite() && table.pooling_factor > 0.0) {
        return Err(invalid("pooling_factor must be a positive number"));
    }
    if table.use_virtual_table {
        match table.total_num_buckets {
            Some(b) if b > 0 && b <= table.num_embeddings => {}
            Some(b) => {
                return Err(TableError::InvalidTable {
                    table: table.name.clone(),
                    detail: format!(
                        "total_num_buckets {b} must be in 1..={}",
                        table.num_embeddings
                    ),
                })
            }
            None => return Err(invalid("virtual tables require total_num_buckets")),
        }
    }
    Ok(())
}

// ── Validated state ────────────────────────────────────────────────

impl EmbeddingModule<Validated> {
    /// Returns the number of tables.
    pub fn num_tables(&self) -> usize {
        self.tables.len()
    }

    /// Returns an iterator over the tables in declaration order.
    pub fn iter_tables(&self) -> impl Iterator<Item = &EmbeddingTable> {
        self.tables.iter()
    }

    /// Looks a table up by name.
    pub fn table(&self, name: &str) -> Option<&EmbeddingTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Total storage of all tables in bytes, saturating on overflow.
    pub fn total_size_bytes(&self) -> u64 {
        self.tables
            .iter()
            .fold(0u64, |acc, t| acc.saturating_add(t.size_bytes()))
    }

    /// Returns a summary string describing the module.
    pub fn summary(&self) -> String {
        let total_mb = self.total_size_bytes() as f64 / (1024.0 * 1024.0);
        format!(
            "Module '{}' ({}): {} tables, {:.1} MB",
            self.path,
            self.kind,
            self.num_tables(),
            total_mb,
        )
    }
}

// ── Shared implementations ─────────────────────────────────────────

impl<S: ModuleState> fmt::Display for EmbeddingModule<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "EmbeddingModule '{}' ({} tables):", self.path, self.tables.len())?;
        for table in &self.tables {
            writeln!(f, "  {}", table.summary())?;
        }
        Ok(())
    }
}
