//! Foodshare Database Layer
//!
//! Store traits for users, groups and uploaded files, their Postgres repositories,
//! and the atomic claim queue that hands uploaded files to storage workers.

pub mod db;
pub mod store;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use db::{FileRepository, GroupRepository, UserRepository, FILE_UPLOADED_CHANNEL};
pub use store::{FileStore, GroupScope, MembershipStore, UploadClaimQueue, UserDirectory};

/// Embedded schema migrations from the workspace `migrations/` directory.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");
