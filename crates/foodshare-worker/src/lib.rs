//! Foodshare storage upload worker
//!
//! Claims files the client finished uploading, moves their bytes to durable storage
//! through a [`BlobTransfer`], and finalizes each claim with its lease token.

pub mod queue;
pub mod transfer;

pub use queue::{UploadWorkerConfig, UploadWorkerPool};
pub use transfer::{BlobTransfer, LocalTransfer, TransferError};
