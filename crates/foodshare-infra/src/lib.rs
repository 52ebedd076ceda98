//! Foodshare Infrastructure
//!
//! Process-level plumbing shared by foodshare binaries.

pub mod telemetry;

pub use telemetry::{init_telemetry, shutdown_telemetry};
