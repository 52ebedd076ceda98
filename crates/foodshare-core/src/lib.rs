//! Foodshare Core Library
//!
//! Domain models, the capability bitmask, error types and configuration shared by
//! every foodshare crate.

pub mod config;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{BaseConfig, Config, LogFormat, WorkerConfig};
pub use error::{AppError, ErrorMetadata, LogLevel, StoreResultExt};
pub use models::{Capability, PermissionSet};
