//! Kubernetes-backed workload source
//!
//! Jobs are pods bound to this node that carry the GPU index and job name
//! annotations set by the cluster's GPU-sharing scheduler. The GPU topology
//! is published by the device plugin as a JSON annotation on the node.

use async_trait::async_trait;
use gpushare_core::{GpuTopologyEntry, GpushareError, GpushareResult, Job, Priority};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::traits::WorkloadSource;

/// Host GPU index the pod was bound to
pub const GPU_INDEX_ANNOTATION: &str = "BAIDU_COM_GPU_IDX";
/// Job name, unique across the node
pub const JOB_NAME_ANNOTATION: &str = "antman/job-name";
/// Priority ordinal, `0` high and anything else low
pub const PRIORITY_ANNOTATION: &str = "antman/priority";
/// Extended resource counting GPU memory shares
pub const GPU_MEMORY_RESOURCE: &str = "baidu.com/cgpu_memory";
/// Node annotation holding the GPU topology
pub const GPU_TOPOLOGY_ANNOTATION: &str = "kubernetes.io/baidu-cgpu.gpu-topo";

/// Pod phases whose containers hold GPU memory
const ACTIVE_PHASES: [&str; 2] = ["Pending", "Running"];

/// Turns pods into jobs for one node
#[derive(Debug, Clone)]
pub struct PodParser {
    /// Node whose pods are considered
    pub node_name: String,
    /// MB represented by one unit of the GPU memory resource
    pub mem_mb_per_share: u64,
    /// Requirement for pods without a GPU memory request
    pub default_required_mb: u64,
}

impl PodParser {
    pub fn new(node_name: String, mem_mb_per_share: u64, default_required_mb: u64) -> Self {
        Self {
            node_name,
            mem_mb_per_share,
            default_required_mb,
        }
    }

    /// Whether a pod is a GPU job running on this node
    pub fn is_candidate(&self, pod: &Pod) -> bool {
        let pod_name = pod.metadata.name.as_deref().unwrap_or("unknown");
        let Some(spec) = &pod.spec else {
            return false;
        };
        if spec.node_name.as_deref() != Some(self.node_name.as_str()) {
            return false;
        }

        let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
        if !phase.is_some_and(|p| ACTIVE_PHASES.contains(&p)) {
            return false;
        }

        let Some(annotations) = &pod.metadata.annotations else {
            return false;
        };
        if !annotations.contains_key(GPU_INDEX_ANNOTATION)
            || !annotations.contains_key(JOB_NAME_ANNOTATION)
        {
            return false;
        }

        if spec.containers.len() != 1 {
            warn!(
                pod = pod_name,
                containers = spec.containers.len(),
                "Only single-container pods are supported, skipping"
            );
            return false;
        }

        true
    }

    /// Build a job from a pod, `None` if the pod is not a usable GPU job
    pub fn parse(&self, pod: &Pod) -> Option<Job> {
        if !self.is_candidate(pod) {
            return None;
        }
        let pod_name = pod.metadata.name.as_deref().unwrap_or("unknown");
        let annotations = pod.metadata.annotations.as_ref()?;

        let name = annotations.get(JOB_NAME_ANNOTATION)?.clone();

        let device_index = match annotations.get(GPU_INDEX_ANNOTATION)?.trim().parse::<i64>() {
            Ok(idx) => idx,
            Err(e) => {
                warn!(pod = pod_name, job = %name, error = %e, "Invalid GPU index annotation, skipping");
                return None;
            }
        };

        let priority = match annotations.get(PRIORITY_ANNOTATION) {
            Some(value) => value.parse::<Priority>().unwrap_or_else(|e| {
                warn!(pod = pod_name, value = %value, error = %e, "Invalid priority annotation, using low");
                Priority::Low
            }),
            None => Priority::Low,
        };

        let required_memory_mb = self.required_memory_mb(pod, pod_name);

        let mut job = Job::new(name, priority, device_index, required_memory_mb);
        if let Some(created) = &pod.metadata.creation_timestamp {
            job = job.with_created_at(created.0);
        }

        info!(
            job = %job.name,
            priority = %job.priority,
            device_index = job.device_index,
            required_mb = job.required_memory_mb,
            "Found job"
        );

        Some(job)
    }

    fn required_memory_mb(&self, pod: &Pod, pod_name: &str) -> u64 {
        let request = pod
            .spec
            .as_ref()
            .and_then(|s| s.containers.first())
            .and_then(|c| c.resources.as_ref())
            .and_then(|r| r.requests.as_ref())
            .and_then(|r| r.get(GPU_MEMORY_RESOURCE));

        let Some(quantity) = request else {
            return self.default_required_mb;
        };

        match quantity.0.trim().parse::<u64>() {
            Ok(shares) => shares.saturating_mul(self.mem_mb_per_share),
            Err(e) => {
                warn!(
                    pod = pod_name,
                    quantity = %quantity.0,
                    error = %e,
                    "Invalid GPU memory request, using default"
                );
                self.default_required_mb
            }
        }
    }
}

/// One entry of the node topology annotation
#[derive(Debug, Deserialize)]
struct NodeGpu {
    #[serde(rename = "Index")]
    index: u32,
    #[serde(rename = "Memory")]
    memory: u64,
}

/// Parse the GPU topology from node annotations, sorted by index
///
/// A node without the annotation has no GPUs.
pub fn parse_topology(annotations: &BTreeMap<String, String>) -> GpushareResult<Vec<GpuTopologyEntry>> {
    let Some(raw) = annotations.get(GPU_TOPOLOGY_ANNOTATION) else {
        return Ok(Vec::new());
    };

    let gpus: Vec<NodeGpu> = serde_json::from_str(raw).map_err(|e| {
        GpushareError::Source(format!("invalid {} annotation: {}", GPU_TOPOLOGY_ANNOTATION, e))
    })?;

    let mut topology: Vec<GpuTopologyEntry> = gpus
        .into_iter()
        .map(|g| GpuTopologyEntry::new(g.index, g.memory))
        .collect();
    topology.sort_by_key(|g| g.index);
    Ok(topology)
}

fn kube_error(err: kube::Error) -> GpushareError {
    GpushareError::Kubernetes(err.to_string())
}

/// Workload source reading pods and the node object from the API server
pub struct KubernetesSource {
    client: Client,
    parser: PodParser,
}

impl KubernetesSource {
    /// Connect using a kubeconfig file, or the in-cluster/default config
    pub async fn connect(kubeconfig: Option<PathBuf>, parser: PodParser) -> GpushareResult<Self> {
        let client = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(&path).map_err(|e| {
                    GpushareError::Kubernetes(format!(
                        "failed to read kubeconfig {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                let config =
                    kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await
                        .map_err(|e| {
                            GpushareError::Kubernetes(format!(
                                "failed to load kubeconfig {}: {}",
                                path.display(),
                                e
                            ))
                        })?;
                Client::try_from(config).map_err(kube_error)?
            }
            None => Client::try_default().await.map_err(kube_error)?,
        };

        info!(node = %parser.node_name, "Connected to Kubernetes");
        Ok(Self { client, parser })
    }
}

#[async_trait]
impl WorkloadSource for KubernetesSource {
    async fn gpu_topology(&self) -> GpushareResult<Vec<GpuTopologyEntry>> {
        debug!(node = %self.parser.node_name, "Reading node GPU topology");
        let nodes: Api<Node> = Api::all(self.client.clone());
        let node = nodes.get(&self.parser.node_name).await.map_err(kube_error)?;
        let annotations = node.metadata.annotations.unwrap_or_default();
        parse_topology(&annotations)
    }

    async fn jobs(&self) -> GpushareResult<Vec<Job>> {
        debug!(node = %self.parser.node_name, "Listing pods");
        let pods: Api<Pod> = Api::all(self.client.clone());
        let params = ListParams::default().fields(&format!("spec.nodeName={}", self.parser.node_name));
        let list = pods.list(&params).await.map_err(kube_error)?;

        Ok(list
            .items
            .iter()
            .filter_map(|pod| self.parser.parse(pod))
            .collect())
    }

    fn name(&self) -> &'static str {
        "kubernetes"
    }
}
