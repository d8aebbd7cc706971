//! Node-wide decision assembly

use gpushare_core::{DecisionView, Job};
use tracing::{info, warn};

use crate::allocator::GpuAllocator;
use crate::registry::JobRegistry;

/// Builds the decision view for every GPU known to a registry
#[derive(Debug, Clone, Default)]
pub struct DecisionBuilder {
    allocator: GpuAllocator,
}

impl DecisionBuilder {
    pub fn new(allocator: GpuAllocator) -> Self {
        Self { allocator }
    }

    /// Allocate every GPU of the registry topology and merge the results
    ///
    /// Jobs bound to an index outside the topology are logged and left out.
    pub fn build(&self, registry: &JobRegistry) -> DecisionView {
        let topology = registry.topology();
        let mut per_gpu: Vec<Vec<&Job>> = vec![Vec::new(); topology.len()];

        for job in registry.jobs() {
            match usize::try_from(job.device_index)
                .ok()
                .filter(|idx| *idx < topology.len())
            {
                Some(idx) => per_gpu[idx].push(job),
                None => warn!(
                    job = %job.name,
                    device_index = job.device_index,
                    gpu_count = topology.len(),
                    "Job has invalid GPU index, excluded from allocation"
                ),
            }
        }

        let mut view = DecisionView::new(registry.version());
        for (gpu, jobs) in topology.iter().zip(per_gpu) {
            if jobs.is_empty() {
                info!(gpu = gpu.index, "No jobs on GPU");
            }
            view.per_gpu_allocation
                .extend(self.allocator.allocate(gpu, &jobs));
        }

        info!(
            version = view.version,
            gpus = topology.len(),
            allocations = view.len(),
            "Built GPU memory decision"
        );

        view
    }
}
