//! Configuration types for gpushare

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main coordinator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GpushareConfig {
    /// Coordinator loop configuration
    pub coordinator: CoordinatorConfig,
    /// Workload source configuration
    pub source: SourceConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl GpushareConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::GpushareError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::GpushareError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, crate::GpushareError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the coordinator cannot run with
    pub fn validate(&self) -> Result<(), crate::GpushareError> {
        if self.coordinator.poll_interval_secs == 0 {
            return Err(crate::GpushareError::Config(
                "coordinator.poll_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.coordinator.hostname.is_empty() {
            return Err(crate::GpushareError::Config(
                "coordinator.hostname must not be empty".to_string(),
            ));
        }
        if self.source.kind == SourceKind::Snapshot && self.source.snapshot_path.is_none() {
            return Err(crate::GpushareError::Config(
                "source.snapshot_path is required for the snapshot source".to_string(),
            ));
        }
        Ok(())
    }
}

/// Coordinator loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Node this coordinator arbitrates for
    pub hostname: String,
    /// Seconds between two snapshot polls
    pub poll_interval_secs: u64,
    /// Path of the decision file read by the virtualization layer
    pub decision_file: PathBuf,
    /// Device memory in MB represented by one unit of the GPU memory resource
    pub mem_mb_per_share: u64,
    /// Requirement assumed for a workload that requests no GPU memory
    pub default_required_mb: u64,
    /// Log per-GPU telemetry after every published decision
    pub log_device_status: bool,
}

impl CoordinatorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            hostname: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
            poll_interval_secs: 3,
            decision_file: PathBuf::from("/etc/gpushare/gpu_config.json"),
            mem_mb_per_share: 100,
            default_required_mb: 100,
            log_device_status: true,
        }
    }
}

/// Where workloads and topology come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Pods and node annotations from the Kubernetes API
    Kubernetes,
    /// A JSON snapshot file on local disk
    Snapshot,
}

/// Workload source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Source type
    pub kind: SourceKind,
    /// Snapshot file path (snapshot source only)
    pub snapshot_path: Option<PathBuf>,
    /// Kubeconfig path, in-cluster or default config when unset
    pub kubeconfig: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Kubernetes,
            snapshot_path: None,
            kubeconfig: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or text)
    pub format: String,
    /// Log file path (if any)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file: None,
        }
    }
}
