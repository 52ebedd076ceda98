//! Tracing subscriber initialization

mod init;

pub use init::{default_filter, init_telemetry, shutdown_telemetry};
