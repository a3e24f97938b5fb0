// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Embedding table definitions.
//!
//! An [`EmbeddingTable`] describes one physical table: its geometry, its
//! element type, and the logical features that look it up. Weight data is
//! **not** stored here; the planner only needs sizes and access patterns.

use crate::DataType;

fn default_pooling_factor() -> f64 {
    1.0
}

/// Metadata describing a single embedding table.
///
/// Several logical features may alias one physical table, which is why
/// `feature_names` is a list.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EmbeddingTable {
    /// Unique name of the table within its module (e.g., `"table_0"`).
    pub name: String,
    /// Number of rows. For virtual tables this is the id-space size.
    pub num_embeddings: u64,
    /// Width of each row.
    pub embedding_dim: u64,
    /// Logical features served by this table.
    pub feature_names: Vec<String>,
    /// Element type of the weights.
    #[serde(default)]
    pub data_type: DataType,
    /// Average number of ids looked up per feature per example.
    #[serde(default = "default_pooling_factor")]
    pub pooling_factor: f64,
    /// Whether lookups carry per-id weights.
    #[serde(default)]
    pub is_weighted: bool,
    /// Whether the table is backed by a key-value store with a dynamic
    /// row count rather than a dense array.
    #[serde(default)]
    pub use_virtual_table: bool,
    /// Number of hash buckets for virtual tables.
    #[serde(default)]
    pub total_num_buckets: Option<u64>,
}

impl EmbeddingTable {
    /// Creates an fp32 table with a single feature named after the table.
    pub fn new(name: impl Into<String>, num_embeddings: u64, embedding_dim: u64) -> Self {
        let name = name.into();
        Self {
            feature_names: vec![name.clone()],
            name,
            num_embeddings,
            embedding_dim,
            data_type: DataType::Fp32,
            pooling_factor: default_pooling_factor(),
            is_weighted: false,
            use_virtual_table: false,
            total_num_buckets: None,
        }
    }

    /// Replaces the feature names.
    pub fn with_feature_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.feature_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_pooling_factor(mut self, pooling_factor: f64) -> Self {
        self.pooling_factor = pooling_factor;
        self
    }

    /// Marks the table as a virtual table spread over `total_num_buckets`.
    pub fn with_virtual_buckets(mut self, total_num_buckets: u64) -> Self {
        self.use_virtual_table = true;
        self.total_num_buckets = Some(total_num_buckets);
        self
    }

    /// Returns the number of logical features.
    pub fn num_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Storage of one row in bytes.
    pub fn row_bytes(&self) -> u64 {
        self.data_type.row_bytes(self.embedding_dim)
    }

    /// Storage of the whole table in bytes, saturating on overflow.
    pub fn size_bytes(&self) -> u64 {
        self.num_embeddings.saturating_mul(self.row_bytes())
    }

    /// Returns a concise summary string for display.
    pub fn summary(&self) -> String {
        let size_mb = self.size_bytes() as f64 / (1024.0 * 1024.0);
        format!(
            "{}: {} x {} {} ({:.2} MB), {} feature(s){}",
            self.name,
            self.num_embeddings,
            self.embedding_dim,
            self.data_type,
            size_mb,
            self.num_features(),
            if self.use_virtual_table { ", virtual" } else { "" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_bytes() {
        let t = EmbeddingTable::new("t", 100, 64);
        assert_eq!(t.row_bytes(), 256);
        assert_eq!(t.size_bytes(), 25_600);
    }

    #[test]
    fn test_size_bytes_saturates() {
        let t = EmbeddingTable::new("huge", u64::MAX / 2, 64);
        assert_eq!(t.size_bytes(), u64::MAX);
    }

    #[test]
    fn test_builders() {
        let t = EmbeddingTable::new("t", 10, 8)
            .with_feature_names(["f0", "f1"])
            .with_data_type(DataType::Fp16)
            .with_pooling_factor(3.0)
            .with_virtual_buckets(5);
        assert_eq!(t.num_features(), 2);
        assert_eq!(t.row_bytes(), 16);
        assert!(t.use_virtual_table);
        assert_eq!(t.total_num_buckets, Some(5));
    }

    #[test]
    fn test_summary() {
        let s = EmbeddingTable::new("user_id", 1000, 16).summary();
        assert!(s.contains("user_id"));
        assert!(s.contains("1000 x 16"));
        assert!(!s.contains("virtual"));
    }

    #[test]
    fn test_serde_defaults() {
        let json = r#"{"name":"t","num_embeddings":4,"embedding_dim":2,"feature_names":["f"]}"#;
        let t: EmbeddingTable = serde_json::from_str(json).unwrap();
        assert_eq!(t.data_type, DataType::Fp32);
        assert_eq!(t.pooling_factor, 1.0);
        assert!(!t.use_virtual_table);
    }
}
