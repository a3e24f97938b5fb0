// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for table descriptions and manifests.

/// Errors that can occur when describing embedding tables and modules.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// The table manifest file could not be read.
    #[error("failed to read manifest: {0}")]
    ManifestReadError(#[from] std::io::Error),

    /// The manifest JSON is malformed.
    #[error("failed to parse manifest: {0}")]
    ManifestParseError(#[from] serde_json::Error),

    /// A table definition is invalid (e.g., zero rows, missing features).
    #[error("invalid table '{table}': {detail}")]
    InvalidTable { table: String, detail: String },

    /// A module is malformed (e.g., empty, duplicate table names).
    #[error("invalid module '{module}': {detail}")]
    InvalidModule { module: String, detail: String },

    /// A string could not be mapped onto a known enum value.
    #[error("unrecognised {what} '{value}'")]
    UnknownName { what: &'static str, value: String },
}
