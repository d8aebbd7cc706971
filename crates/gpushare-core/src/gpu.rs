//! GPU detection for diagnostics
//!
//! Telemetry gathered here is only logged. Allocation decisions are made from
//! the topology supplied by the workload source.

use nvml_wrapper::error::NvmlError;
use nvml_wrapper::Nvml;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{GpushareError, GpushareResult};

/// Represents a GPU device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuDevice {
    /// Device index
    pub index: u32,
    /// Device name
    pub name: String,
    /// Total memory in bytes
    pub memory_total: u64,
    /// Used memory in bytes
    pub memory_used: u64,
    /// Current SM utilization percentage (0-100)
    pub utilization: Option<u32>,
}

impl GpuDevice {
    /// Used memory as a percentage of the total
    pub fn memory_utilization(&self) -> f64 {
        if self.memory_total == 0 {
            return 0.0;
        }
        self.memory_used as f64 / self.memory_total as f64 * 100.0
    }

    /// Total memory in MB
    pub fn memory_total_mb(&self) -> u64 {
        self.memory_total / (1024 * 1024)
    }
}

/// GPU information for the system
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GpuInfo {
    /// List of detected GPU devices
    pub devices: Vec<GpuDevice>,
}

impl GpuInfo {
    /// Create empty GPU info (no GPUs detected)
    pub fn empty() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.devices.len()
    }
}

/// Detect NVIDIA GPUs on the system
///
/// Returns empty info when NVML is not available.
pub fn detect_gpus() -> GpuInfo {
    match detect_nvidia_gpus() {
        Ok(info) => info,
        Err(e) => {
            debug!(error = %e, "GPU detection unavailable");
            GpuInfo::empty()
        }
    }
}

fn nvml_error(err: NvmlError) -> GpushareError {
    GpushareError::Gpu(err.to_string())
}

fn detect_nvidia_gpus() -> GpushareResult<GpuInfo> {
    let nvml = Nvml::init().map_err(nvml_error)?;
    let count = nvml.device_count().map_err(nvml_error)?;

    let mut devices = Vec::with_capacity(count as usize);
    for index in 0..count {
        let device = nvml.device_by_index(index).map_err(nvml_error)?;
        let memory = device.memory_info().map_err(nvml_error)?;
        devices.push(GpuDevice {
            index,
            name: device.name().unwrap_or_else(|_| format!("GPU {}", index)),
            memory_total: memory.total,
            memory_used: memory.used,
            utilization: device.utilization_rates().ok().map(|u| u.gpu),
        });
    }

    Ok(GpuInfo { devices })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_info_empty() {
        let info = GpuInfo::empty();
        assert_eq!(info.count(), 0);
        assert!(info.devices.is_empty());
    }

    #[test]
    fn test_memory_utilization() {
        let device = GpuDevice {
            index: 0,
            name: "GPU 0".to_string(),
            memory_total: 1024,
            memory_used: 256,
            utilization: Some(50),
        };
        assert!((device.memory_utilization() - 25.0).abs() < f64::EPSILON);

        let empty = GpuDevice {
            memory_total: 0,
            memory_used: 0,
            ..device
        };
        assert_eq!(empty.memory_utilization(), 0.0);
    }

    #[test]
    fn test_memory_total_mb() {
        let device = GpuDevice {
            index: 1,
            name: "GPU 1".to_string(),
            memory_total: 16 * 1024 * 1024 * 1024,
            memory_used: 0,
            utilization: None,
        };
        assert_eq!(device.memory_total_mb(), 16 * 1024);
    }
}
