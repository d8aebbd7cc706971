//! Serialized access to the registry for the coordinator loop

use gpushare_core::{DecisionView, GpuTopologyEntry, Job};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::decision::DecisionBuilder;
use crate::registry::JobRegistry;

/// Result of feeding one snapshot to the manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The published decision is still current
    Unchanged { version: u64 },
    /// A decision that has not been published yet
    Changed(DecisionView),
}

impl RefreshOutcome {
    pub fn version(&self) -> u64 {
        match self {
            RefreshOutcome::Unchanged { version } => *version,
            RefreshOutcome::Changed(view) => view.version,
        }
    }
}

struct State {
    registry: JobRegistry,
    /// Version of the last decision the sink accepted
    published: Option<u64>,
}

/// Owns the job registry and hands out decisions
///
/// Update and build happen under one lock, so a decision always carries the
/// version of the job set it was computed from.
pub struct ResourceManager {
    state: Mutex<State>,
    builder: DecisionBuilder,
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new(JobRegistry::new())
    }
}

impl ResourceManager {
    /// Create a manager around an existing registry
    pub fn new(registry: JobRegistry) -> Self {
        info!(version = registry.version(), "Resource manager initialized");
        Self {
            state: Mutex::new(State {
                registry,
                published: None,
            }),
            builder: DecisionBuilder::default(),
        }
    }

    /// Feed a snapshot and build a decision if the result is unpublished
    pub async fn refresh(
        &self,
        jobs: Vec<Job>,
        topology: Vec<GpuTopologyEntry>,
    ) -> RefreshOutcome {
        let mut state = self.state.lock().await;
        let version = state.registry.update(jobs, topology);

        if state.published == Some(version) {
            debug!(version, "Decision unchanged, skipping");
            return RefreshOutcome::Unchanged { version };
        }

        RefreshOutcome::Changed(self.builder.build(&state.registry))
    }

    /// Record that the decision for `version` reached the sink
    ///
    /// Until this is called the same decision is rebuilt on every refresh.
    pub async fn mark_published(&self, version: u64) {
        let mut state = self.state.lock().await;
        state.published = Some(version);
        debug!(version, "Decision published");
    }

    /// Version of the last published decision
    pub async fn published_version(&self) -> Option<u64> {
        self.state.lock().await.published
    }

    /// Current registry version
    pub async fn version(&self) -> u64 {
        self.state.lock().await.registry.version()
    }

    /// Copy of the jobs currently in the registry
    pub async fn jobs(&self) -> Vec<Job> {
        let state = self.state.lock().await;
        state.registry.jobs().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpushare_core::Priority;

    fn topology() -> Vec<GpuTopologyEntry> {
        vec![GpuTopologyEntry::new(0, 8000)]
    }

    fn jobs() -> Vec<Job> {
        vec![
            Job::new("a", Priority::High, 0, 8000),
            Job::new("b", Priority::Low, 0, 1000),
            Job::new("c", Priority::Low, 0, 3000),
        ]
    }

    #[tokio::test]
    async fn test_first_refresh_builds_decision() {
        let manager = ResourceManager::default();
        let outcome = manager.refresh(jobs(), topology()).await;

        let RefreshOutcome::Changed(view) = outcome else {
            panic!("expected a new decision");
        };
        assert_eq!(view.get("a").unwrap().max_device_mem_mb, 8000);
        assert_eq!(view.get("b").unwrap().max_device_mem_mb, 1);
        assert_eq!(view.get("c").unwrap().max_device_mem_mb, 1);
        assert_eq!(view.version, manager.version().await);
    }

    #[tokio::test]
    async fn test_empty_node_still_publishes_initial_decision() {
        let manager = ResourceManager::new(JobRegistry::with_version(5));
        let outcome = manager.refresh(Vec::new(), Vec::new()).await;

        assert_eq!(outcome.version(), 5);
        assert!(matches!(outcome, RefreshOutcome::Changed(ref v) if v.is_empty()));
    }

    #[tokio::test]
    async fn test_published_decision_is_not_rebuilt() {
        let manager = ResourceManager::default();
        let first = manager.refresh(jobs(), topology()).await;
        manager.mark_published(first.version()).await;

        let second = manager.refresh(jobs(), topology()).await;
        assert_eq!(
            second,
            RefreshOutcome::Unchanged {
                version: first.version()
            }
        );
    }

    #[tokio::test]
    async fn test_unpublished_decision_is_rebuilt() {
        let manager = ResourceManager::default();
        let first = manager.refresh(jobs(), topology()).await;
        let second = manager.refresh(jobs(), topology()).await;

        assert_eq!(first.version(), second.version());
        assert!(matches!(second, RefreshOutcome::Changed(_)));
        assert_eq!(manager.published_version().await, None);
    }

    #[tokio::test]
    async fn test_changed_jobs_produce_newer_decision() {
        let manager = ResourceManager::default();
        let first = manager.refresh(jobs(), topology()).await;
        manager.mark_published(first.version()).await;

        let mut changed = jobs();
        changed.pop();
        let second = manager.refresh(changed, topology()).await;

        assert!(second.version() > first.version());
        let RefreshOutcome::Changed(view) = second else {
            panic!("expected a new decision");
        };
        assert!(view.get("c").is_none());
        assert_eq!(manager.jobs().await.len(), 2);
    }
}
