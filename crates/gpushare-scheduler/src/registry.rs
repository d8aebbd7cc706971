//! Registry of the jobs currently known on the node

use chrono::Utc;
use gpushare_core::{GpuTopologyEntry, Job};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// First difference found between the stored and an observed job set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeReason {
    /// A job appeared
    Added(String),
    /// A job disappeared
    Removed(String),
    /// A job was bound to a different GPU
    Moved { name: String, from: i64, to: i64 },
    /// A job changed its memory request
    Resized { name: String, from: u64, to: u64 },
}

impl std::fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeReason::Added(name) => write!(f, "job {} added", name),
            ChangeReason::Removed(name) => write!(f, "job {} removed", name),
            ChangeReason::Moved { name, from, to } => {
                write!(f, "job {} moved from GPU {} to GPU {}", name, from, to)
            }
            ChangeReason::Resized { name, from, to } => {
                write!(f, "job {} request changed from {}MB to {}MB", name, from, to)
            }
        }
    }
}

/// Jobs and GPU topology the current decision is based on
///
/// The version only moves when the job set changes in a way that affects
/// allocation, so callers compare versions to skip redundant decisions.
#[derive(Debug)]
pub struct JobRegistry {
    /// Jobs indexed by name
    jobs: BTreeMap<String, Job>,
    /// Topology captured with the last job set change
    topology: Vec<GpuTopologyEntry>,
    /// Current version, milliseconds since the epoch
    version: u64,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    /// Create an empty registry versioned with the current time
    pub fn new() -> Self {
        Self::with_version(now_millis())
    }

    /// Create an empty registry with an explicit initial version
    pub fn with_version(version: u64) -> Self {
        Self {
            jobs: BTreeMap::new(),
            topology: Vec::new(),
            version,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Jobs in name order
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.get(name)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn topology(&self) -> &[GpuTopologyEntry] {
        &self.topology
    }

    /// Feed a newly observed snapshot, returning the resulting version
    ///
    /// On any change the job set and topology are replaced wholesale and the
    /// version strictly increases. Otherwise nothing is touched, not even the
    /// topology.
    pub fn update(&mut self, observed_jobs: Vec<Job>, observed_topology: Vec<GpuTopologyEntry>) -> u64 {
        let mut observed = BTreeMap::new();
        for job in observed_jobs {
            if let Some(previous) = observed.insert(job.name.clone(), job) {
                debug!(job = %previous.name, "Duplicate job name, keeping last observed");
            }
        }

        let Some(reason) = self.detect_change(&observed) else {
            debug!(version = self.version, "Job set unchanged");
            return self.version;
        };

        let previous = self.version;
        self.jobs = observed;
        self.topology = observed_topology;
        self.version = next_version(previous);

        info!(
            reason = %reason,
            jobs = self.jobs.len(),
            gpus = self.topology.len(),
            previous_version = previous,
            version = self.version,
            "Job set changed"
        );

        self.version
    }

    /// Find the first difference that requires a new decision
    pub fn detect_change(&self, observed: &BTreeMap<String, Job>) -> Option<ChangeReason> {
        if let Some(name) = observed.keys().find(|name| !self.jobs.contains_key(*name)) {
            return Some(ChangeReason::Added(name.clone()));
        }

        for (name, stored) in &self.jobs {
            let Some(current) = observed.get(name) else {
                return Some(ChangeReason::Removed(name.clone()));
            };
            if stored.device_index != current.device_index {
                return Some(ChangeReason::Moved {
                    name: name.clone(),
                    from: stored.device_index,
                    to: current.device_index,
                });
            }
            if stored.required_memory_mb != current.required_memory_mb {
                return Some(ChangeReason::Resized {
                    name: name.clone(),
                    from: stored.required_memory_mb,
                    to: current.required_memory_mb,
                });
            }
        }

        None
    }
}

fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Wall-clock version, bumped past `previous` when the clock has not advanced
fn next_version(previous: u64) -> u64 {
    now_millis().max(previous.saturating_add(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpushare_core::Priority;

    fn topology() -> Vec<GpuTopologyEntry> {
        vec![GpuTopologyEntry::new(0, 8000), GpuTopologyEntry::new(1, 8000)]
    }

    fn jobs() -> Vec<Job> {
        vec![
            Job::new("a", Priority::High, 0, 4000),
            Job::new("b", Priority::Low, 1, 2000),
        ]
    }

    #[test]
    fn test_new_registry_is_empty() {
        let registry = JobRegistry::with_version(42);
        assert!(registry.is_empty());
        assert!(registry.topology().is_empty());
        assert_eq!(registry.version(), 42);
    }

    #[test]
    fn test_update_with_new_jobs_bumps_version() {
        let mut registry = JobRegistry::with_version(10);
        let version = registry.update(jobs(), topology());

        assert!(version > 10);
        assert_eq!(registry.version(), version);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.topology().len(), 2);
    }

    #[test]
    fn test_update_unchanged_keeps_version() {
        let mut registry = JobRegistry::new();
        let first = registry.update(jobs(), topology());
        let second = registry.update(jobs(), topology());
        assert_eq!(first, second);
    }

    #[test]
    fn test_unchanged_update_keeps_stored_topology() {
        let mut registry = JobRegistry::new();
        registry.update(jobs(), topology());

        let grown = vec![
            GpuTopologyEntry::new(0, 8000),
            GpuTopologyEntry::new(1, 8000),
            GpuTopologyEntry::new(2, 8000),
        ];
        registry.update(jobs(), grown);
        assert_eq!(registry.topology().len(), 2);
    }

    #[test]
    fn test_removed_job_is_a_change() {
        let mut registry = JobRegistry::new();
        let first = registry.update(jobs(), topology());
        let second = registry.update(vec![Job::new("a", Priority::High, 0, 4000)], topology());

        assert!(second > first);
        assert!(registry.job("b").is_none());
    }

    #[test]
    fn test_moved_and_resized_jobs_are_changes() {
        let mut registry = JobRegistry::new();
        let v1 = registry.update(jobs(), topology());

        let mut moved = jobs();
        moved[0].device_index = 1;
        let v2 = registry.update(moved.clone(), topology());
        assert!(v2 > v1);

        let mut resized = moved;
        resized[1].required_memory_mb = 3000;
        let v3 = registry.update(resized, topology());
        assert!(v3 > v2);
        assert_eq!(registry.job("b").unwrap().required_memory_mb, 3000);
    }

    #[test]
    fn test_priority_change_alone_is_not_a_change() {
        let mut registry = JobRegistry::new();
        let v1 = registry.update(jobs(), topology());

        let mut reprioritized = jobs();
        reprioritized[1].priority = Priority::High;
        let v2 = registry.update(reprioritized, topology());

        assert_eq!(v1, v2);
        assert_eq!(registry.job("b").unwrap().priority, Priority::Low);
    }

    #[test]
    fn test_duplicate_names_keep_last_observed() {
        let mut registry = JobRegistry::new();
        registry.update(
            vec![
                Job::new("a", Priority::High, 0, 1000),
                Job::new("a", Priority::Low, 1, 2000),
            ],
            topology(),
        );

        assert_eq!(registry.len(), 1);
        let job = registry.job("a").unwrap();
        assert_eq!(job.device_index, 1);
        assert_eq!(job.required_memory_mb, 2000);
    }

    #[test]
    fn test_version_strictly_increases_even_if_clock_is_behind() {
        let far_future = now_millis() + 1_000_000;
        let mut registry = JobRegistry::with_version(far_future);
        let version = registry.update(jobs(), topology());
        assert_eq!(version, far_future + 1);
    }

    #[test]
    fn test_detect_change_reports_first_reason() {
        let mut registry = JobRegistry::new();
        registry.update(jobs(), topology());

        let observed: BTreeMap<String, Job> = jobs()
            .into_iter()
            .map(|mut j| {
                if j.name == "a" {
                    j.required_memory_mb = 100;
                }
                (j.name.clone(), j)
            })
            .collect();

        assert_eq!(
            registry.detect_change(&observed),
            Some(ChangeReason::Resized {
                name: "a".to_string(),
                from: 4000,
                to: 100,
            })
        );
    }
}
