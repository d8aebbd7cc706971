//! gpushare-scheduler: GPU memory allocation engine
//!
//! This crate decides how much device memory every job on the node may use:
//! - Job registry with change detection and versioning
//! - Per-GPU proportional allocation with two priority tiers
//! - Node-wide decision assembly
//! - Serialized update-then-build access for the coordinator

pub mod allocator;
pub mod decision;
pub mod manager;
pub mod registry;

pub use allocator::{GpuAllocator, MIN_GRANT_MB};
pub use decision::DecisionBuilder;
pub use manager::{RefreshOutcome, ResourceManager};
pub use registry::{ChangeReason, JobRegistry};
