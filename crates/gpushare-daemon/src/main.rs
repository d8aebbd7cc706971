//! gpushare daemon
//!
//! Node-local coordinator that arbitrates GPU memory between the jobs
//! scheduled on this host and publishes per-job limits to the decision file.

mod coordinator;
mod diagnostics;
mod logging;

use anyhow::Context;
use clap::Parser;
use coordinator::Coordinator;
use gpushare_core::{GpushareConfig, SourceKind};
use gpushare_scheduler::ResourceManager;
use gpushare_store::DecisionFile;
use gpushare_watcher::{KubernetesSource, PodParser, SnapshotSource, WorkloadSource};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// gpushare daemon - GPU memory arbiter for shared GPU nodes
#[derive(Parser, Debug)]
#[command(name = "gpushared")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "GPUSHARE_CONFIG")]
    config: Option<PathBuf>,

    /// Node to arbitrate for (overrides the config file)
    #[arg(long, env = "GPUSHARE_HOSTNAME")]
    hostname: Option<String>,

    /// Decision file path (overrides the config file)
    #[arg(long)]
    decision_file: Option<PathBuf>,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    /// Log file path (overrides the config file)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Run a single poll cycle and exit
    #[arg(long)]
    once: bool,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<GpushareConfig> {
        let mut config = match &self.config {
            Some(path) => GpushareConfig::from_file(path)?,
            None => GpushareConfig::default(),
        };

        if let Some(hostname) = &self.hostname {
            config.coordinator.hostname = hostname.clone();
        }
        if let Some(path) = &self.decision_file {
            config.coordinator.decision_file = path.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(path) = &self.log_file {
            config.logging.file = Some(path.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

async fn build_source(config: &GpushareConfig) -> anyhow::Result<Arc<dyn WorkloadSource>> {
    match config.source.kind {
        SourceKind::Kubernetes => {
            let parser = PodParser::new(
                config.coordinator.hostname.clone(),
                config.coordinator.mem_mb_per_share,
                config.coordinator.default_required_mb,
            );
            let source = KubernetesSource::connect(config.source.kubeconfig.clone(), parser)
                .await
                .context("failed to connect to Kubernetes")?;
            Ok(Arc::new(source))
        }
        SourceKind::Snapshot => {
            let path = config
                .source
                .snapshot_path
                .clone()
                .context("source.snapshot_path is required for the snapshot source")?;
            Ok(Arc::new(SnapshotSource::new(path)))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;
    let _guard = logging::init(&config.logging)?;

    info!("Starting gpushare daemon v{}", env!("CARGO_PKG_VERSION"));
    info!(
        hostname = %config.coordinator.hostname,
        decision_file = %config.coordinator.decision_file.display(),
        interval_secs = config.coordinator.poll_interval_secs,
        "Coordinator configured"
    );

    let source = build_source(&config).await?;
    let sink = Arc::new(DecisionFile::new(config.coordinator.decision_file.clone()));
    let coordinator = Coordinator::new(
        source,
        sink,
        ResourceManager::default(),
        config.coordinator.poll_interval(),
    )
    .with_device_status(config.coordinator.log_device_status);

    if args.once {
        match coordinator.poll_once().await? {
            Some(version) => info!(version, "Decision published"),
            None => info!("Nothing to publish"),
        }
        return Ok(());
    }

    coordinator.run(shutdown_signal()).await;
    Ok(())
}
