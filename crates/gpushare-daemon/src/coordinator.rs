//! Coordinator loop
//!
//! Polls the workload source, feeds the registry and publishes a decision
//! whenever the job set has changed since the last successful publish.

use gpushare_core::GpushareResult;
use gpushare_scheduler::{RefreshOutcome, ResourceManager};
use gpushare_store::DecisionSink;
use gpushare_watcher::WorkloadSource;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::diagnostics;

/// Drives one node's decision cycle
pub struct Coordinator {
    source: Arc<dyn WorkloadSource>,
    sink: Arc<dyn DecisionSink>,
    manager: ResourceManager,
    poll_interval: Duration,
    log_device_status: bool,
}

impl Coordinator {
    pub fn new(
        source: Arc<dyn WorkloadSource>,
        sink: Arc<dyn DecisionSink>,
        manager: ResourceManager,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            sink,
            manager,
            poll_interval,
            log_device_status: false,
        }
    }

    /// Log GPU telemetry after every published decision
    pub fn with_device_status(mut self, enabled: bool) -> Self {
        self.log_device_status = enabled;
        self
    }

    /// Run a single poll cycle
    ///
    /// Returns the version of the decision published in this cycle, if any.
    pub async fn poll_once(&self) -> GpushareResult<Option<u64>> {
        let gpus = self.source.gpu_topology().await?;
        let jobs = self.source.jobs().await?;

        match self.manager.refresh(jobs, gpus).await {
            RefreshOutcome::Unchanged { version } => {
                info!(version, "Unchanged, ignore");
                Ok(None)
            }
            RefreshOutcome::Changed(view) => {
                self.sink.publish(&view).await?;
                self.manager.mark_published(view.version).await;

                if self.log_device_status {
                    diagnostics::log_device_status(view.version, &self.manager.jobs().await);
                }
                Ok(Some(view.version))
            }
        }
    }

    /// Poll until `shutdown` resolves
    ///
    /// A failed cycle is logged and retried on the next tick.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            source = self.source.name(),
            interval_secs = self.poll_interval.as_secs(),
            "Coordinator running"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Ready to exit now");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(source = self.source.name(), error = %e, "Poll cycle failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gpushare_core::{
        DecisionView, GpuTopologyEntry, GpushareError, Job, Priority,
    };
    use gpushare_scheduler::JobRegistry;
    use gpushare_store::DecisionFile;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct FakeSource {
        jobs: Mutex<Vec<Job>>,
        gpus: Vec<GpuTopologyEntry>,
        fail: AtomicBool,
    }

    impl FakeSource {
        fn new(jobs: Vec<Job>) -> Self {
            Self {
                jobs: Mutex::new(jobs),
                gpus: vec![GpuTopologyEntry::new(0, 8000), GpuTopologyEntry::new(1, 8000)],
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl WorkloadSource for FakeSource {
        async fn gpu_topology(&self) -> GpushareResult<Vec<GpuTopologyEntry>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(GpushareError::Source("api server unreachable".to_string()));
            }
            Ok(self.gpus.clone())
        }

        async fn jobs(&self) -> GpushareResult<Vec<Job>> {
            Ok(self.jobs.lock().unwrap().clone())
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        published: Mutex<Vec<DecisionView>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl DecisionSink for RecordingSink {
        async fn publish(&self, view: &DecisionView) -> GpushareResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(GpushareError::Storage("disk full".to_string()));
            }
            self.published.lock().unwrap().push(view.clone());
            Ok(())
        }
    }

    fn coordinator(source: Arc<FakeSource>, sink: Arc<RecordingSink>) -> Coordinator {
        Coordinator::new(
            source,
            sink,
            ResourceManager::new(JobRegistry::with_version(1)),
            Duration::from_millis(10),
        )
    }

    fn jobs() -> Vec<Job> {
        vec![
            Job::new("a", Priority::High, 0, 6000),
            Job::new("b", Priority::Low, 0, 0),
            Job::new("c", Priority::High, 1, 2000),
        ]
    }

    #[tokio::test]
    async fn test_publishes_only_on_change() {
        let source = Arc::new(FakeSource::new(jobs()));
        let sink = Arc::new(RecordingSink::default());
        let coordinator = coordinator(source.clone(), sink.clone());

        let first = coordinator.poll_once().await.unwrap();
        assert!(first.is_some());
        assert_eq!(coordinator.poll_once().await.unwrap(), None);

        source.jobs.lock().unwrap().pop();
        let second = coordinator.poll_once().await.unwrap();
        assert!(second > first);

        let published = sink.published.lock().unwrap();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].get("b").unwrap().max_device_mem_mb, 2000);
        assert!(published[1].get("c").is_none());
    }

    #[tokio::test]
    async fn test_failed_publish_is_retried() {
        let source = Arc::new(FakeSource::new(jobs()));
        let sink = Arc::new(RecordingSink::default());
        let coordinator = coordinator(source, sink.clone());

        sink.fail.store(true, Ordering::SeqCst);
        assert!(coordinator.poll_once().await.is_err());

        sink.fail.store(false, Ordering::SeqCst);
        assert!(coordinator.poll_once().await.unwrap().is_some());
        assert_eq!(sink.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_source_failure_is_reported() {
        let source = Arc::new(FakeSource::new(jobs()));
        source.fail.store(true, Ordering::SeqCst);
        let sink = Arc::new(RecordingSink::default());
        let coordinator = coordinator(source, sink.clone());

        assert!(matches!(
            coordinator.poll_once().await,
            Err(GpushareError::Source(_))
        ));
        assert!(sink.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_writes_decision_file_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let file = DecisionFile::new(dir.path().join("gpu_config.json"));
        let coordinator = Coordinator::new(
            Arc::new(FakeSource::new(jobs())),
            Arc::new(file.clone()),
            ResourceManager::new(JobRegistry::with_version(1)),
            Duration::from_millis(10),
        );

        coordinator
            .run(tokio::time::sleep(Duration::from_millis(50)))
            .await;

        let view = file.read().await.unwrap().unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view.get("a").unwrap().max_device_mem_mb, 6000);
        assert_eq!(view.get("c").unwrap().host_device_index, 1);
    }
}
