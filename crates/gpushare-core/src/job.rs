//! Job, priority and GPU topology type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Scheduling priority of a job
///
/// Only two tiers exist. On the wire a priority is an ordinal: `0` is high,
/// any other value is low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Priority {
    /// Served first, never squeezed by low-priority demand
    High,
    /// Shares whatever capacity high-priority jobs leave behind
    Low,
}

impl Priority {
    /// Map a wire ordinal onto a priority tier
    pub fn from_ordinal(ordinal: i64) -> Self {
        if ordinal == 0 {
            Priority::High
        } else {
            Priority::Low
        }
    }

    /// Wire ordinal of this tier
    pub fn ordinal(self) -> i64 {
        match self {
            Priority::High => 0,
            Priority::Low => 1,
        }
    }

    pub fn is_high(self) -> bool {
        self == Priority::High
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Low
    }
}

impl From<i64> for Priority {
    fn from(ordinal: i64) -> Self {
        Priority::from_ordinal(ordinal)
    }
}

impl From<Priority> for i64 {
    fn from(priority: Priority) -> Self {
        priority.ordinal()
    }
}

impl FromStr for Priority {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Priority::from_ordinal)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// A GPU-consuming workload observed on this node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job name, used as the allocation key
    pub name: String,
    /// Priority tier
    #[serde(default)]
    pub priority: Priority,
    /// Index of the GPU the job was bound to
    ///
    /// Signed because the value comes from free-form workload metadata and
    /// may be out of range.
    #[serde(default)]
    pub device_index: i64,
    /// Requested device memory in MB, `0` when the job declared nothing
    #[serde(default)]
    pub required_memory_mb: u64,
    /// Creation time, orders high-priority jobs under contention
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a new job stamped with the current time
    pub fn new(
        name: impl Into<String>,
        priority: Priority,
        device_index: i64,
        required_memory_mb: u64,
    ) -> Self {
        Self {
            name: name.into(),
            priority,
            device_index,
            required_memory_mb,
            created_at: Utc::now(),
        }
    }

    /// Replace the creation timestamp
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Whether the job declared a memory requirement at all
    pub fn has_requirement(&self) -> bool {
        self.required_memory_mb > 0
    }
}

/// One physical GPU of the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuTopologyEntry {
    /// Host device index, matches `Job::device_index`
    pub index: u32,
    /// Device memory capacity in MB
    pub total_memory_mb: u64,
}

impl GpuTopologyEntry {
    pub fn new(index: u32, total_memory_mb: u64) -> Self {
        Self {
            index,
            total_memory_mb,
        }
    }
}
