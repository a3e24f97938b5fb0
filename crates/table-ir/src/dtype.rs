// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Element data types for embedding weights.

/// Per-row overhead of quantised rows: an fp16 scale and an fp16 bias.
const QUANT_ROW_OVERHEAD_BYTES: u64 = 4;

/// Numeric type of an embedding table's weights.
///
/// The planner uses `DataType` to size shards; quantised types carry a
/// small per-row scale/bias overhead on top of their packed payload.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
    serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// 32-bit IEEE 754 floating point.
    #[default]
    Fp32,
    /// 16-bit IEEE 754 floating point.
    Fp16,
    /// 16-bit brain floating point.
    Bf16,
    /// 8-bit row-wise quantised integer.
    Int8,
    /// 4-bit row-wise quantised integer (two values per byte).
    Int4,
}

impl DataType {
    /// Returns the number of bits used by a single element.
    pub fn bits(self) -> u64 {
        match self {
            DataType::Fp32 => 32,
            DataType::Fp16 | DataType::Bf16 => 16,
            DataType::Int8 => 8,
            DataType::Int4 => 4,
        }
    }

    /// Returns `true` for row-wise quantised types.
    pub fn is_quantized(self) -> bool {
        matches!(self, DataType::Int8 | DataType::Int4)
    }

    /// Returns the storage size of one row of `dim` elements in bytes.
    pub fn row_bytes(self, dim: u64) -> u64 {
        let payload = (dim * self.bits()).div_ceil(8);
        if self.is_quantized() {
            payload + QUANT_ROW_OVERHEAD_BYTES
        } else {
            payload
        }
    }

    /// Returns a human-readable label for this data type.
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Fp32 => "fp32",
            DataType::Fp16 => "fp16",
            DataType::Bf16 => "bf16",
            DataType::Int8 => "int8",
            DataType::Int4 => "int4",
        }
    }

    /// Parses a data type, accepting common aliases (`"f32"`, `"float"`).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "fp32" | "f32" | "float" | "float32" => Some(Self::Fp32),
            "fp16" | "f16" | "half" | "float16" => Some(Self::Fp16),
            "bf16" | "bfloat16" => Some(Self::Bf16),
            "int8" | "i8" => Some(Self::Int8),
            "int4" | "i4" => Some(Self::Int4),
            _ => None,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
