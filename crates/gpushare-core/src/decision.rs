//! Allocation records and the node-wide decision view

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::job::Priority;

/// Device id every container sees for its single GPU
pub const LOCAL_DEVICE_ID: u32 = 0;

/// Memory limit granted to one job on one GPU
///
/// Field order matches the sorted key order of the decision file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Device id inside the job's own namespace
    #[serde(rename = "device_id")]
    pub local_device_id: u32,
    /// Host GPU index the job runs on
    #[serde(rename = "host_device_id")]
    pub host_device_index: u32,
    /// Granted device memory in MB
    #[serde(rename = "maxDeviceMemMb")]
    pub max_device_mem_mb: u64,
    /// Echo of the job's priority
    pub priority: Priority,
}

impl Allocation {
    pub fn new(priority: Priority, host_device_index: u32, max_device_mem_mb: u64) -> Self {
        Self {
            local_device_id: LOCAL_DEVICE_ID,
            host_device_index,
            max_device_mem_mb,
            priority,
        }
    }
}

/// Job name to allocation, ordered by name
pub type AllocationMap = BTreeMap<String, Allocation>;

/// Complete allocation decision for the node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionView {
    /// Allocations of every job on every GPU
    #[serde(rename = "gpuConfigInfo")]
    pub per_gpu_allocation: AllocationMap,
    /// Registry version this decision was computed from
    pub version: u64,
}

impl DecisionView {
    /// Create an empty view for a registry version
    pub fn new(version: u64) -> Self {
        Self {
            per_gpu_allocation: AllocationMap::new(),
            version,
        }
    }

    /// Number of jobs with an allocation
    pub fn len(&self) -> usize {
        self.per_gpu_allocation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.per_gpu_allocation.is_empty()
    }

    pub fn get(&self, job_name: &str) -> Option<&Allocation> {
        self.per_gpu_allocation.get(job_name)
    }

    /// Allocations placed on one host GPU
    pub fn on_device(&self, host_device_index: u32) -> impl Iterator<Item = (&String, &Allocation)> {
        self.per_gpu_allocation
            .iter()
            .filter(move |(_, a)| a.host_device_index == host_device_index)
    }

    /// Sum of grants on one host GPU in MB, saturating at `u64::MAX`
    pub fn granted_on(&self, host_device_index: u32) -> u64 {
        self.on_device(host_device_index)
            .fold(0u64, |sum, (_, a)| sum.saturating_add(a.max_device_mem_mb))
    }
}
