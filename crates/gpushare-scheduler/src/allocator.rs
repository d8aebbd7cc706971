//! Per-GPU memory allocator
//!
//! Splits one GPU's memory between the jobs bound to it. High-priority jobs
//! are served first: in full while their aggregate demand fits, otherwise in
//! proportion to their requests. Low-priority jobs share what is left in
//! proportion to their requests, or evenly when none of them asked for a
//! specific amount. All arithmetic truncates to whole megabytes.

use gpushare_core::{Allocation, AllocationMap, GpuTopologyEntry, Job};
use tracing::{debug, info, warn};

/// Smallest grant ever handed out
///
/// The virtualization layer treats a limit of 0 as "unlimited", so starved
/// jobs get this instead.
pub const MIN_GRANT_MB: u64 = 1;

/// Allocator computing memory limits for the jobs of a single GPU
#[derive(Debug, Clone, Copy, Default)]
pub struct GpuAllocator;

impl GpuAllocator {
    pub fn new() -> Self {
        Self
    }

    /// Compute the allocation of every job bound to `gpu`
    ///
    /// All `jobs` are assumed to belong to this GPU; the caller filters out
    /// jobs bound elsewhere.
    pub fn allocate(&self, gpu: &GpuTopologyEntry, jobs: &[&Job]) -> AllocationMap {
        let mut allocations = AllocationMap::new();
        if jobs.is_empty() {
            return allocations;
        }

        let (mut high_jobs, low_jobs): (Vec<&Job>, Vec<&Job>) =
            jobs.iter().copied().partition(|j| j.priority.is_high());
        high_jobs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });

        let total = gpu.total_memory_mb;
        let high_required = total_required(&high_jobs);
        let low_required = total_required(&low_jobs);
        let over_max = high_required > u128::from(total);

        info!(
            gpu = gpu.index,
            jobs = jobs.len(),
            high = high_jobs.len(),
            low = low_jobs.len(),
            "Distributing GPU memory"
        );

        if over_max {
            warn!(
                gpu = gpu.index,
                total_mb = total,
                required_mb = %high_required,
                "Not enough GPU memory for high priority jobs, sharing proportionally"
            );
        }

        let mut left_mem = total;
        for job in &high_jobs {
            let grant = if over_max {
                capped(job, proportional_share(job.required_memory_mb, high_required, total))
            } else if left_mem >= job.required_memory_mb {
                left_mem -= job.required_memory_mb;
                job.required_memory_mb
            } else {
                MIN_GRANT_MB
            };
            insert(&mut allocations, gpu, job, grant);
        }

        // Oversubscribed high demand leaves nothing for the low tier, even if
        // truncation left a few MB unassigned.
        if over_max {
            left_mem = 0;
        }

        info!(
            gpu = gpu.index,
            left_mb = left_mem,
            low = low_jobs.len(),
            "Memory left for low priority jobs"
        );

        for job in &low_jobs {
            let grant = if left_mem == 0 {
                MIN_GRANT_MB
            } else if low_required == 0 {
                left_mem / low_jobs.len() as u64
            } else {
                proportional_share(job.required_memory_mb, low_required, left_mem)
            };
            insert(&mut allocations, gpu, job, capped(job, grant));
        }

        allocations
    }
}

/// Summed requests of a tier, wide enough to never overflow
fn total_required(jobs: &[&Job]) -> u128 {
    jobs.iter().map(|j| u128::from(j.required_memory_mb)).sum()
}

/// `floor(required / demand * pool)` without floating point error
///
/// `demand` must be non-zero and at least `required`, so the result never
/// exceeds `pool`.
fn proportional_share(required: u64, demand: u128, pool: u64) -> u64 {
    let share = u128::from(required) * u128::from(pool) / demand;
    u64::try_from(share).unwrap_or(pool)
}

/// Never grant more than a job asked for; jobs without a request are uncapped
fn capped(job: &Job, grant: u64) -> u64 {
    if job.has_requirement() {
        grant.min(job.required_memory_mb)
    } else {
        grant
    }
}

fn insert(allocations: &mut AllocationMap, gpu: &GpuTopologyEntry, job: &Job, grant: u64) {
    let grant = grant.max(MIN_GRANT_MB);
    debug!(
        job = %job.name,
        priority = %job.priority,
        gpu = gpu.index,
        required_mb = job.required_memory_mb,
        granted_mb = grant,
        "Allocated GPU memory"
    );
    allocations.insert(
        job.name.clone(),
        Allocation::new(job.priority, gpu.index, grant),
    );
}
