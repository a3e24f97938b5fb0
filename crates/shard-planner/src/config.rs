// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Planner configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! batch_size = 512
//! max_proposals = 10000
//! time_budget_ms = 2000
//! reservation_percentage = 0.15
//! cache_load_factor = 0.2
//! proposers = ["greedy", "uniform", "grid-search"]
//!
//! [topology]
//! world_size = 8
//! local_world_size = 4
//! compute_device = "cuda"
//! hbm_cap = "32G"
//! ddr_cap = "128G"
//! ```

use crate::proposer::{
    EmbeddingOffloadScaleupProposer, GreedyProposer, GridSearchProposer, Proposer,
    UniformProposer,
};
use crate::{PlannerError, Topology};
use std::path::Path;
use storage_budget::MemoryBudget;
use table_ir::ComputeDevice;

/// Names accepted in [`PlannerConfig::proposers`].
pub const PROPOSER_NAMES: [&str; 4] = ["greedy", "uniform", "grid-search", "scaleup"];

/// Configuration for the shard planner.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Per-device training batch size.
    pub batch_size: u64,
    /// Upper bound on proposals evaluated per `plan()` call.
    pub max_proposals: usize,
    /// Optional wall-clock budget for the proposal loop.
    pub time_budget_ms: Option<u64>,
    /// Stop after this many consecutive feasible proposals that do not
    /// improve on the best plan.
    pub early_stop_after: Option<usize>,
    /// Fraction of each tier held back for non-embedding use.
    pub reservation_percentage: f64,
    /// Default fraction of a table cached in the fast tier by caching
    /// kernels.
    pub cache_load_factor: f64,
    /// Narrowest column shard produced by column-wise sharding.
    pub min_column_dim: u64,
    /// Largest cartesian product the grid-search proposer will walk.
    pub grid_search_limit: usize,
    /// Bisection steps of the scale-up proposer.
    pub scaleup_steps: usize,
    /// Default fast-tier cache per virtual table shard (e.g., `"64M"`).
    pub virtual_table_l1_cache: String,
    /// Default slow-tier cache per virtual table shard (e.g., `"128M"`).
    pub virtual_table_l2_cache: String,
    /// Proposers, in round-robin order.
    pub proposers: Vec<String>,
    /// Optional topology description for file-driven setups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topology: Option<TopologyConfig>,
}

impl PlannerConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, PlannerError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PlannerError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, PlannerError> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| PlannerError::Config(format!("TOML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, PlannerError> {
        toml::to_string_pretty(self)
            .map_err(|e| PlannerError::Config(format!("TOML serialise error: {e}")))
    }

    /// Checks ranges and names.
    pub fn validate(&self) -> Result<(), PlannerError> {
        let bad = |msg: String| Err(PlannerError::Config(msg));
        if self.batch_size == 0 {
            return bad("batch_size must be positive".into());
        }
        if self.max_proposals == 0 {
            return bad("max_proposals must be positive".into());
        }
        if !(0.0..1.0).contains(&self.reservation_percentage) {
            return bad(format!(
                "reservation_percentage {} must be in [0, 1)",
                self.reservation_percentage
            ));
        }
        if !(self.cache_load_factor > 0.0 && self.cache_load_factor <= 1.0) {
            return bad(format!(
                "cache_load_factor {} must be in (0, 1]",
                self.cache_load_factor
            ));
        }
        if self.min_column_dim == 0 {
            return bad("min_column_dim must be positive".into());
        }
        if self.proposers.is_empty() {
            return bad("at least one proposer is required".into());
        }
        for name in &self.proposers {
            if !PROPOSER_NAMES.contains(&name.to_lowercase().as_str()) {
                return bad(format!(
                    "unknown proposer '{name}'; expected one of {PROPOSER_NAMES:?}"
                ));
            }
        }
        self.l1_cache_bytes()?;
        self.l2_cache_bytes()?;
        Ok(())
    }

    /// Parses the default virtual-table fast-tier cache size.
    pub fn l1_cache_bytes(&self) -> Result<u64, PlannerError> {
        Ok(MemoryBudget::parse(&self.virtual_table_l1_cache)?.as_bytes())
    }

    /// Parses the default virtual-table slow-tier cache size.
    pub fn l2_cache_bytes(&self) -> Result<u64, PlannerError> {
        Ok(MemoryBudget::parse(&self.virtual_table_l2_cache)?.as_bytes())
    }

    /// Creates the proposers named by this config, in order.
    pub fn create_proposers(&self) -> Result<Vec<Box<dyn Proposer>>, PlannerError> {
        self.proposers
            .iter()
            .map(|name| -> Result<Box<dyn Proposer>, PlannerError> {
                match name.to_lowercase().as_str() {
                    "greedy" => Ok(Box::new(GreedyProposer::new())),
                    "uniform" => Ok(Box::new(UniformProposer::new())),
                    "grid-search" | "grid" => {
                        Ok(Box::new(GridSearchProposer::new(self.grid_search_limit)))
                    }
                    "scaleup" => Ok(Box::new(EmbeddingOffloadScaleupProposer::new(
                        self.scaleup_steps,
                    ))),
                    other => Err(PlannerError::Config(format!(
                        "unknown proposer '{other}'; expected one of {PROPOSER_NAMES:?}"
                    ))),
                }
            })
            .collect()
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            batch_size: 512,
            max_proposals: 10_000,
            time_budget_ms: None,
            early_stop_after: None,
            reservation_percentage: 0.15,
            cache_load_factor: 0.2,
            min_column_dim: 32,
            grid_search_limit: 4096,
            scaleup_steps: 8,
            virtual_table_l1_cache: "64M".to_string(),
            virtual_table_l2_cache: "128M".to_string(),
            proposers: vec![
                "greedy".to_string(),
                "uniform".to_string(),
                "grid-search".to_string(),
            ],
            topology: None,
        }
    }
}

/// File form of a [`Topology`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TopologyConfig {
    pub world_size: usize,
    /// Devices per host; defaults to `world_size`.
    pub local_world_size: Option<usize>,
    #[serde(default)]
    pub compute_device: ComputeDevice,
    /// Per-device fast-tier capacity (e.g., `"32G"`).
    pub hbm_cap: Option<String>,
    /// Per-device slow-tier capacity (e.g., `"128G"`).
    pub ddr_cap: Option<String>,
}

impl TopologyConfig {
    /// Parses a standalone topology description.
    pub fn from_toml(toml_str: &str) -> Result<Self, PlannerError> {
        toml::from_str(toml_str)
            .map_err(|e| PlannerError::Config(format!("TOML parse error: {e}")))
    }

    /// Builds the topology, parsing capacity strings.
    pub fn build(&self) -> Result<Topology, PlannerError> {
        let mut topology = Topology::new(self.world_size, self.compute_device)?;
        if let Some(local) = self.local_world_size {
            topology = topology.with_local_world_size(local)?;
        }
        if let Some(hbm) = &self.hbm_cap {
            topology = topology.with_hbm_cap(MemoryBudget::parse(hbm)?.as_bytes());
        }
        if let Some(ddr) = &self.ddr_cap {
            topology = topology.with_ddr_cap(MemoryBudget::parse(ddr)?.as_bytes());
        }
        Ok(topology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let c = PlannerConfig::default();
        assert_eq!(c.batch_size, 512);
        assert_eq!(c.max_proposals, 10_000);
        assert_eq!(c.cache_load_factor, 0.2);
        assert_eq!(c.l1_cache_bytes().unwrap(), 64 * 1024 * 1024);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
batch_size = 128
proposers = ["greedy", "scaleup"]
early_stop_after = 5
"#;
        let c = PlannerConfig::from_toml(toml).unwrap();
        assert_eq!(c.batch_size, 128);
        assert_eq!(c.early_stop_after, Some(5));
        assert_eq!(c.reservation_percentage, 0.15);
        let proposers = c.create_proposers().unwrap();
        let names: Vec<_> = proposers.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, ["greedy", "scaleup"]);
    }

    #[test]
    fn test_from_toml_with_topology() {
        let toml = r#"
[topology]
world_size = 8
local_world_size = 4
hbm_cap = "16G"
"#;
        let c = PlannerConfig::from_toml(toml).unwrap();
        let topo = c.topology.unwrap().build().unwrap();
        assert_eq!(topo.world_size(), 8);
        assert_eq!(topo.num_hosts(), 2);
        assert_eq!(topo.device_capacity().hbm, 16 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_invalid_values() {
        assert!(PlannerConfig::from_toml("batch_size = 0").is_err());
        assert!(PlannerConfig::from_toml("reservation_percentage = 1.5").is_err());
        assert!(PlannerConfig::from_toml("cache_load_factor = 0.0").is_err());
        assert!(PlannerConfig::from_toml(r#"proposers = ["annealing"]"#).is_err());
        assert!(PlannerConfig::from_toml(r#"virtual_table_l1_cache = "lots""#).is_err());
        assert!(PlannerConfig::from_toml("batch_size = [").is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let c = PlannerConfig {
            time_budget_ms: Some(250),
            ..Default::default()
        };
        let s = c.to_toml().unwrap();
        let back = PlannerConfig::from_toml(&s).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_topology_config_cpu() {
        let t = TopologyConfig::from_toml(
            r#"
world_size = 2
compute_device = "cpu"
ddr_cap = "4G"
"#,
        )
        .unwrap()
        .build()
        .unwrap();
        assert_eq!(t.device_capacity().hbm, 0);
        assert_eq!(t.device_capacity().ddr, 4 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_topology_config_invalid() {
        let bad = TopologyConfig {
            world_size: 6,
            local_world_size: Some(4),
            compute_device: ComputeDevice::Cuda,
            hbm_cap: None,
            ddr_cap: None,
        };
        assert!(bad.build().is_err());
    }
}
