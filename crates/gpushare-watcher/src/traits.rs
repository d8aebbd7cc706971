//! Source trait definitions

use async_trait::async_trait;
use gpushare_core::{GpuTopologyEntry, GpushareResult, Job};

/// Supplies the jobs and GPU topology of this node
#[async_trait]
pub trait WorkloadSource: Send + Sync {
    /// GPUs of the node, sorted by index
    async fn gpu_topology(&self) -> GpushareResult<Vec<GpuTopologyEntry>>;

    /// Jobs currently bound to GPUs of the node
    async fn jobs(&self) -> GpushareResult<Vec<Job>>;

    /// Get the source name
    fn name(&self) -> &'static str;
}
