//! Uploaded file records and their transfer status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "file_type", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Document,
    Other,
}

impl Display for FileType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            FileType::Image => write!(f, "image"),
            FileType::Document => write!(f, "document"),
            FileType::Other => write!(f, "other"),
        }
    }
}

impl FromStr for FileType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(FileType::Image),
            "document" => Ok(FileType::Document),
            "other" => Ok(FileType::Other),
            _ => Err(anyhow::anyhow!("Invalid file type: {}", s)),
        }
    }
}

/// Transfer status of a file.
///
/// ```text
/// ClientUploadInProgress --ClientSucceeded--> UploadedByClient --Claimed--> StorageUploadInProgress
///        |                                        ^      ^                     |          |
///   ClientFailed                        LeaseExpired  Requeued       StorageSucceeded  StorageFailed
///        v                                        |      |                     v          v
/// ClientUploadError                               +------+------ UploadedToStorage   StorageUploadError
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "file_status", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    ClientUploadInProgress,
    UploadedByClient,
    ClientUploadError,
    StorageUploadInProgress,
    UploadedToStorage,
    StorageUploadError,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::ClientUploadInProgress => "client_upload_in_progress",
            FileStatus::UploadedByClient => "uploaded_by_client",
            FileStatus::ClientUploadError => "client_upload_error",
            FileStatus::StorageUploadInProgress => "storage_upload_in_progress",
            FileStatus::UploadedToStorage => "uploaded_to_storage",
            FileStatus::StorageUploadError => "storage_upload_error",
        }
    }

    /// Target status for `event`, or `None` when the transition is illegal.
    pub fn apply(self, event: FileEvent) -> Option<FileStatus> {
        use FileEvent::*;
        use FileStatus::*;

        match (self, event) {
            (ClientUploadInProgress, ClientSucceeded) => Some(UploadedByClient),
            (ClientUploadInProgress, ClientFailed) => Some(ClientUploadError),
            (UploadedByClient, Claimed) => Some(StorageUploadInProgress),
            (StorageUploadInProgress, StorageSucceeded) => Some(UploadedToStorage),
            (StorageUploadInProgress, StorageFailed) => Some(StorageUploadError),
            (StorageUploadInProgress, LeaseExpired) => Some(UploadedByClient),
            (StorageUploadError, Requeued) => Some(UploadedByClient),
            _ => None,
        }
    }

    /// No transition leaves this status without an explicit operator call.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FileStatus::ClientUploadError
                | FileStatus::UploadedToStorage
                | FileStatus::StorageUploadError
        )
    }
}

impl Display for FileStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client_upload_in_progress" => Ok(FileStatus::ClientUploadInProgress),
            "uploaded_by_client" => Ok(FileStatus::UploadedByClient),
            "client_upload_error" => Ok(FileStatus::ClientUploadError),
            "storage_upload_in_progress" => Ok(FileStatus::StorageUploadInProgress),
            "uploaded_to_storage" => Ok(FileStatus::UploadedToStorage),
            "storage_upload_error" => Ok(FileStatus::StorageUploadError),
            _ => Err(anyhow::anyhow!("Invalid file status: {}", s)),
        }
    }
}

/// Something that happened to a file and may move its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEvent {
    ClientSucceeded,
    ClientFailed,
    Claimed,
    StorageSucceeded,
    StorageFailed,
    LeaseExpired,
    Requeued,
}

impl Display for FileEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            FileEvent::ClientSucceeded => write!(f, "client_succeeded"),
            FileEvent::ClientFailed => write!(f, "client_failed"),
            FileEvent::Claimed => write!(f, "claimed"),
            FileEvent::StorageSucceeded => write!(f, "storage_succeeded"),
            FileEvent::StorageFailed => write!(f, "storage_failed"),
            FileEvent::LeaseExpired => write!(f, "lease_expired"),
            FileEvent::Requeued => write!(f, "requeued"),
        }
    }
}

/// Result the client reports for its own upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientUploadOutcome {
    Succeeded,
    Failed,
}

impl ClientUploadOutcome {
    pub fn event(&self) -> FileEvent {
        match self {
            ClientUploadOutcome::Succeeded => FileEvent::ClientSucceeded,
            ClientUploadOutcome::Failed => FileEvent::ClientFailed,
        }
    }
}

/// Result a worker reports after attempting the storage transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransferOutcome {
    Success { url: String },
    Failure,
}

impl TransferOutcome {
    pub fn event(&self) -> FileEvent {
        match self {
            TransferOutcome::Success { .. } => FileEvent::StorageSucceeded,
            TransferOutcome::Failure => FileEvent::StorageFailed,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            TransferOutcome::Success { url } => Some(url.as_str()),
            TransferOutcome::Failure => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FileRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub file_type: FileType,
    pub content_type: String,
    pub name: String,
    pub size: i64,
    pub status: FileStatus,
    /// Final storage URL. Present iff `status == UploadedToStorage`.
    pub url: Option<String>,
    /// Token of the worker currently holding the claim.
    pub lease_token: Option<Uuid>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Checks `event` against the transition table without touching any store.
    pub fn next_status(&self, event: FileEvent) -> Result<FileStatus, AppError> {
        self.status
            .apply(event)
            .ok_or(AppError::InvalidTransition {
                file_id: self.id,
                from: self.status,
                event,
            })
    }

    /// The `url`/`status` pairing every persisted record must satisfy.
    pub fn url_matches_status(&self) -> bool {
        self.url.is_some() == (self.status == FileStatus::UploadedToStorage)
    }
}

/// Upload intent declared by the client before sending any bytes.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewFile {
    pub file_type: FileType,
    #[validate(length(min = 1, max = 255))]
    pub content_type: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(range(min = 0))]
    pub size: i64,
}

/// A file handed to exactly one worker by the claim queue.
///
/// The `lease_token` must accompany the finalize call; a claim that was reclaimed by
/// the reconciliation sweep carries a stale token and is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileClaim {
    pub file: FileRecord,
    pub lease_token: Uuid,
}

impl FileClaim {
    pub fn file_id(&self) -> Uuid {
        self.file.id
    }
}
