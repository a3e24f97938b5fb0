// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Human-readable memory sizes.
//!
//! A [`MemoryBudget`] is a byte count that can be written the way device
//! capacities are usually quoted (`"32G"`, `"64M"`). It is used for
//! topology capacities and cache-size defaults in configuration files.

use crate::StorageError;
use std::fmt;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;
const TIB: u64 = 1024 * GIB;

/// A byte count with human-readable parsing.
///
/// # Parsing
/// Supports binary suffixes, case-insensitive:
/// - `"512M"` or `"512MB"` → 512 × 1024² bytes
/// - `"32G"` or `"32GB"` → 32 × 1024³ bytes
/// - `"2T"` or `"2TB"` → 2 × 1024⁴ bytes
/// - `"2048K"` or `"2048KB"` → 2048 × 1024 bytes
/// - `"1073741824"` → raw byte count
///
/// Zero is accepted: a device without a fast tier has a zero HBM budget.
///
/// # Examples
/// ```
/// use storage_budget::MemoryBudget;
///
/// let b = MemoryBudget::from_gb(32);
/// assert_eq!(b.as_mb(), 32 * 1024);
///
/// let b = MemoryBudget::parse("1G").unwrap();
/// assert_eq!(b.as_mb(), 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct MemoryBudget {
    /// Size in bytes.
    bytes: u64,
}

impl MemoryBudget {
    /// Creates a budget from a byte count.
    pub fn from_bytes(bytes: u64) -> Self {
        Self { bytes }
    }

    /// Creates a budget from mebibytes.
    pub fn from_mb(mb: u64) -> Self {
        Self {
            bytes: mb.saturating_mul(MIB),
        }
    }

    /// Creates a budget from gibibytes.
    pub fn from_gb(gb: u64) -> Self {
        Self {
            bytes: gb.saturating_mul(GIB),
        }
    }

    /// Returns the size in bytes.
    pub fn as_bytes(&self) -> u64 {
        self.bytes
    }

    /// Returns the size in mebibytes (truncated).
    pub fn as_mb(&self) -> u64 {
        self.bytes / MIB
    }

    /// Returns the size in gibibytes as a float, for reporting.
    pub fn as_gb_f64(&self) -> f64 {
        self.bytes as f64 / GIB as f64
    }

    /// Parses a human-readable size string.
    ///
    /// Accepted formats: `"512M"`, `"512MB"`, `"1G"`, `"1GB"`, `"1T"`,
    /// `"2048K"`, `"2048KB"`, `"100B"`, or a plain byte count.
    pub fn parse(s: &str) -> Result<Self, StorageError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(StorageError::InvalidSize {
                input: s.to_string(),
                detail: "empty string".into(),
            });
        }

        let upper = trimmed.to_uppercase();
        let (num_str, multiplier) = [
            ("TB", TIB),
            ("T", TIB),
            ("GB", GIB),
            ("G", GIB),
            ("MB", MIB),
            ("M", MIB),
            ("KB", KIB),
            ("K", KIB),
            ("B", 1),
        ]
        .iter()
        .find(|(suffix, _)| upper.ends_with(suffix))
        .map(|(suffix, mult)| (&trimmed[..trimmed.len() - suffix.len()], *mult))
        .unwrap_or((trimmed, 1));

        let value: u64 = num_str.trim().parse().map_err(|_| StorageError::InvalidSize {
            input: s.to_string(),
            detail: "expected a number followed by an optional suffix (K, M, G, T)".into(),
        })?;

        let bytes = value
            .checked_mul(multiplier)
            .ok_or_else(|| StorageError::InvalidSize {
                input: s.to_string(),
                detail: "size overflows 64 bits".into(),
            })?;

        Ok(Self { bytes })
    }
}

impl fmt::Display for MemoryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.bytes;
        if b >= GIB && b % GIB == 0 {
            write!(f, "{} GB", b / GIB)
        } else if b >= MIB && b % MIB == 0 {
            write!(f, "{} MB", b / MIB)
        } else if b >= KIB && b % KIB == 0 {
            write!(f, "{} KB", b / KIB)
        } else {
            write!(f, "{b} B")
        }
    }
}
