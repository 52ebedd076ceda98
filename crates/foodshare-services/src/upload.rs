//! Client-facing side of the upload lifecycle.
//!
//! A client declares an upload, sends the bytes elsewhere, then reports how it went.
//! Records the client reports as uploaded become claimable by storage workers.

use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use foodshare_core::models::{Capability, ClientUploadOutcome, FileRecord, NewFile};
use foodshare_core::AppError;
use foodshare_db::{FileStore, UploadClaimQueue, UserDirectory};

use crate::AuthorizationChecker;

#[derive(Clone)]
pub struct UploadService {
    authz: AuthorizationChecker,
    users: Arc<dyn UserDirectory>,
    files: Arc<dyn FileStore>,
    queue: Arc<dyn UploadClaimQueue>,
}

impl UploadService {
    pub fn new(
        authz: AuthorizationChecker,
        users: Arc<dyn UserDirectory>,
        files: Arc<dyn FileStore>,
        queue: Arc<dyn UploadClaimQueue>,
    ) -> Self {
        Self {
            authz,
            users,
            files,
            queue,
        }
    }

    /// Creates a record in `ClientUploadInProgress` owned by `user_id`.
    #[tracing::instrument(skip(self, file), fields(name = %file.name))]
    pub async fn register_intent(
        &self,
        user_id: Uuid,
        file: NewFile,
    ) -> Result<FileRecord, AppError> {
        file.validate()?;

        if self.users.get_user(user_id).await?.is_none() {
            return Err(AppError::not_found("User", user_id));
        }

        self.files.create_file(user_id, file).await
    }

    /// Owner (or an admin) reports the client-side transfer result.
    #[tracing::instrument(skip(self))]
    pub async fn report_client_result(
        &self,
        user_id: Uuid,
        file_id: Uuid,
        succeeded: bool,
    ) -> Result<FileRecord, AppError> {
        let file = self.get(file_id).await?;

        if file.user_id != user_id {
            self.authz.authorize(user_id, Capability::Admin).await?;
        }

        let outcome = if succeeded {
            ClientUploadOutcome::Succeeded
        } else {
            ClientUploadOutcome::Failed
        };

        self.files.record_client_result(file_id, outcome).await
    }

    pub async fn get(&self, file_id: Uuid) -> Result<FileRecord, AppError> {
        self.files
            .get_file(file_id)
            .await?
            .ok_or_else(|| AppError::not_found("File", file_id))
    }

    /// Operator retry of a failed storage transfer.
    #[tracing::instrument(skip(self))]
    pub async fn requeue_failed(&self, actor: Uuid, file_id: Uuid) -> Result<FileRecord, AppError> {
        self.authz.authorize(actor, Capability::Admin).await?;
        self.queue.requeue_failed(file_id).await
    }
}
