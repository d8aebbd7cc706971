//! gpushare-watcher: Workload and topology sources
//!
//! This crate provides the snapshots the coordinator feeds to the registry:
//! - Kubernetes pods and node annotations
//! - Static snapshot files for nodes without Kubernetes

pub mod kubernetes;
pub mod snapshot;
pub mod traits;

pub use kubernetes::{parse_topology, KubernetesSource, PodParser};
pub use snapshot::{Snapshot, SnapshotSource};
pub use traits::WorkloadSource;
