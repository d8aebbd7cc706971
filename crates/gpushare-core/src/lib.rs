//! gpushare-core: Core types for the gpushare arbiter
//!
//! This crate provides the fundamental types used throughout gpushare:
//! - Jobs, priorities and GPU topology entries
//! - Allocation records and the decision view
//! - Configuration types
//! - Error handling
//! - GPU detection for diagnostics

pub mod config;
pub mod decision;
pub mod error;
pub mod gpu;
pub mod job;

pub use config::*;
pub use decision::*;
pub use error::*;
pub use gpu::*;
pub use job::*;
