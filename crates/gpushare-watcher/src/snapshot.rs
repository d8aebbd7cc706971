//! Snapshot-file workload source
//!
//! Reads jobs and topology from a JSON document on local disk:
//!
//! ```json
//! {
//!     "gpus": [{ "index": 0, "total_memory_mb": 16000 }],
//!     "jobs": [{ "name": "train", "priority": 0, "device_index": 0, "required_memory_mb": 8000 }]
//! }
//! ```
//!
//! The file is re-read on every poll, so editing it drives new decisions.

use async_trait::async_trait;
use gpushare_core::{GpuTopologyEntry, GpushareError, GpushareResult, Job};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::traits::WorkloadSource;

/// Jobs and GPUs of a node at one point in time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub gpus: Vec<GpuTopologyEntry>,
    #[serde(default)]
    pub jobs: Vec<Job>,
}

impl Snapshot {
    /// Load a snapshot, with GPUs sorted by index
    pub async fn from_file(path: &Path) -> GpushareResult<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            GpushareError::Source(format!("failed to read snapshot {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> GpushareResult<Self> {
        let mut snapshot: Snapshot = serde_json::from_str(content)?;
        snapshot.gpus.sort_by_key(|g| g.index);
        Ok(snapshot)
    }
}

/// Workload source backed by a snapshot file
pub struct SnapshotSource {
    path: PathBuf,
}

impl SnapshotSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn load(&self) -> GpushareResult<Snapshot> {
        let snapshot = Snapshot::from_file(&self.path).await?;
        debug!(
            path = %self.path.display(),
            gpus = snapshot.gpus.len(),
            jobs = snapshot.jobs.len(),
            "Loaded snapshot"
        );
        Ok(snapshot)
    }
}

#[async_trait]
impl WorkloadSource for SnapshotSource {
    async fn gpu_topology(&self) -> GpushareResult<Vec<GpuTopologyEntry>> {
        Ok(self.load().await?.gpus)
    }

    async fn jobs(&self) -> GpushareResult<Vec<Job>> {
        Ok(self.load().await?.jobs)
    }

    fn name(&self) -> &'static str {
        "snapshot"
    }
}
