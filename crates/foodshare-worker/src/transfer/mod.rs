//! Blob transfer seam
//!
//! The worker pool calls [`BlobTransfer::transfer`] for every claimed file and records
//! the returned URL (or the failure) against the claim.

use async_trait::async_trait;
use thiserror::Error;

use foodshare_core::models::FileRecord;

mod local;

pub use local::LocalTransfer;

/// Transfer errors
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Staged bytes not found: {0}")]
    MissingSource(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type TransferResult<T> = Result<T, TransferError>;

/// Moves a client-uploaded file into durable storage.
///
/// Implementations must be safe to retry: after a lease expires the same file can be
/// handed to another worker.
#[async_trait]
pub trait BlobTransfer: Send + Sync {
    /// Returns the public URL of the stored object.
    async fn transfer(&self, file: &FileRecord) -> TransferResult<String>;
}
