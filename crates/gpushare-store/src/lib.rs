//! gpushare-store: Decision storage
//!
//! This crate persists allocation decisions for the GPU virtualization layer:
//! - Stable, sorted JSON rendering of the decision view
//! - Atomic whole-file replacement
//! - Reading back the last written decision

pub mod decision_file;

pub use decision_file::{render_decision, DecisionFile, DecisionSink};
