// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Device topology: how many devices, how much memory each has, and how
//! fast data moves between them.

use crate::PlannerError;
use storage_budget::{MemoryBudget, Storage};
use table_ir::ComputeDevice;

const GB_PER_S: f64 = 1024.0 * 1024.0 * 1024.0;

/// Default fast-tier capacity of an accelerator.
pub const DEFAULT_HBM_CAP: u64 = 32 * 1024 * 1024 * 1024;
/// Default slow-tier capacity of a device.
pub const DEFAULT_DDR_CAP: u64 = 128 * 1024 * 1024 * 1024;

/// A fixed set of identical devices, grouped into hosts of
/// `local_world_size` devices.
///
/// Bandwidths are stored in bytes per second.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Topology {
    world_size: usize,
    local_world_size: usize,
    compute_device: ComputeDevice,
    hbm_cap: u64,
    ddr_cap: u64,
    hbm_mem_bw: f64,
    ddr_mem_bw: f64,
    uvm_mem_bw: f64,
    ssd_mem_bw: f64,
    intra_host_bw: f64,
    inter_host_bw: f64,
}

impl Topology {
    /// Creates a single-host topology with default capacities and
    /// bandwidths. CPU devices get no fast tier.
    pub fn new(world_size: usize, compute_device: ComputeDevice) -> Result<Self, PlannerError> {
        let topology = Self {
            world_size,
            local_world_size: world_size,
            compute_device,
            hbm_cap: if compute_device.has_fast_tier() {
                DEFAULT_HBM_CAP
            } else {
                0
            },
            ddr_cap: DEFAULT_DDR_CAP,
            hbm_mem_bw: 897.0 * GB_PER_S,
            ddr_mem_bw: 51.0 * GB_PER_S,
            uvm_mem_bw: 32.0 * GB_PER_S,
            ssd_mem_bw: 2.0 * GB_PER_S,
            intra_host_bw: 600.0 * GB_PER_S,
            inter_host_bw: 12.5 * GB_PER_S,
        };
        topology.validate()?;
        Ok(topology)
    }

    /// Sets the per-device fast-tier capacity in bytes.
    pub fn with_hbm_cap(mut self, bytes: u64) -> Self {
        self.hbm_cap = bytes;
        self
    }

    /// Sets the per-device slow-tier capacity in bytes.
    pub fn with_ddr_cap(mut self, bytes: u64) -> Self {
        self.ddr_cap = bytes;
        self
    }

    /// Sets the number of devices per host.
    pub fn with_local_world_size(mut self, local_world_size: usize) -> Result<Self, PlannerError> {
        self.local_world_size = local_world_size;
        self.validate()?;
        Ok(self)
    }

    /// Overrides the communication bandwidths, in GB/s.
    pub fn with_comm_bandwidths(mut self, intra_host_gbps: f64, inter_host_gbps: f64) -> Self {
        self.intra_host_bw = intra_host_gbps * GB_PER_S;
        self.inter_host_bw = inter_host_gbps * GB_PER_S;
        self
    }

    fn validate(&self) -> Result<(), PlannerError> {
        if self.world_size == 0 {
            return Err(PlannerError::InvalidInput("world_size must be positive".into()));
        }
        if self.local_world_size == 0 || self.world_size % self.local_world_size != 0 {
            return Err(PlannerError::InvalidInput(format!(
                "local_world_size {} must divide world_size {}",
                self.local_world_size, self.world_size,
            )));
        }
        Ok(())
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    pub fn local_world_size(&self) -> usize {
        self.local_world_size
    }

    pub fn num_hosts(&self) -> usize {
        self.world_size / self.local_world_size
    }

    pub fn compute_device(&self) -> ComputeDevice {
        self.compute_device
    }

    /// Capacity of one device.
    pub fn device_capacity(&self) -> Storage {
        Storage::new(self.hbm_cap, self.ddr_cap)
    }

    pub fn hbm_mem_bw(&self) -> f64 {
        self.hbm_mem_bw
    }

    pub fn ddr_mem_bw(&self) -> f64 {
        self.ddr_mem_bw
    }

    /// Bandwidth of device reads served from host memory.
    pub fn uvm_mem_bw(&self) -> f64 {
        self.uvm_mem_bw
    }

    pub fn ssd_mem_bw(&self) -> f64 {
        self.ssd_mem_bw
    }

    /// Bandwidth of the memory a plain lookup kernel reads from.
    pub fn compute_mem_bw(&self) -> f64 {
        if self.compute_device.has_fast_tier() {
            self.hbm_mem_bw
        } else {
            self.ddr_mem_bw
        }
    }

    /// Bandwidth of collectives spanning the whole world.
    pub fn comm_bw(&self) -> f64 {
        if self.world_size > self.local_world_size {
            self.inter_host_bw
        } else {
            self.intra_host_bw
        }
    }

    /// Bandwidth of collectives within one host.
    pub fn intra_host_bw(&self) -> f64 {
        self.intra_host_bw
    }

    /// Ranks of host `host`, in ascending order.
    pub fn host_ranks(&self, host: usize) -> std::ops::Range<usize> {
        let start = host * self.local_world_size;
        start..start + self.local_world_size
    }

    pub fn summary(&self) -> String {
        format!(
            "Topology: {} x {} ({} host(s)), HBM {} / DDR {} per device",
            self.world_size,
            self.compute_device,
            self.num_hosts(),
            MemoryBudget::from_bytes(self.hbm_cap),
            MemoryBudget::from_bytes(self.ddr_cap),
        )
    }
}
