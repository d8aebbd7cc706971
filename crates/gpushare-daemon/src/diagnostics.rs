//! GPU telemetry logging
//!
//! Physical device numbers are informational only; jobs may run on virtual
//! slices, so these figures are never fed back into allocation.

use gpushare_core::{detect_gpus, GpuInfo, Job};
use tracing::info;

/// Number of jobs bound to each of `gpu_count` GPUs
pub fn jobs_per_gpu(jobs: &[Job], gpu_count: usize) -> Vec<usize> {
    let mut counts = vec![0; gpu_count];
    for job in jobs {
        if let Some(count) = usize::try_from(job.device_index)
            .ok()
            .and_then(|idx| counts.get_mut(idx))
        {
            *count += 1;
        }
    }
    counts
}

/// Log memory and SM utilization of every detected GPU
pub fn log_device_status(version: u64, jobs: &[Job]) {
    report(version, jobs, &detect_gpus());
}

fn report(version: u64, jobs: &[Job], gpus: &GpuInfo) {
    let counts = jobs_per_gpu(jobs, gpus.count());
    for (device, process_count) in gpus.devices.iter().zip(counts) {
        info!(
            version,
            gpu_id = device.index,
            process_count,
            mem_util = format!("{:.4}%", device.memory_utilization()),
            sm_util = format!("{:.4}%", device.utilization.unwrap_or(0) as f64),
            "GPU status"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpushare_core::Priority;

    #[test]
    fn test_jobs_per_gpu() {
        let jobs = vec![
            Job::new("a", Priority::High, 0, 100),
            Job::new("b", Priority::Low, 0, 100),
            Job::new("c", Priority::Low, 1, 100),
            Job::new("d", Priority::Low, 7, 100),
            Job::new("e", Priority::Low, -2, 100),
        ];
        assert_eq!(jobs_per_gpu(&jobs, 2), vec![2, 1]);
        assert!(jobs_per_gpu(&jobs, 0).is_empty());
    }
}
