use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

use foodshare_core::models::{
    ClientUploadOutcome, FileClaim, FileEvent, FileRecord, FileStatus, NewFile, TransferOutcome,
};
use foodshare_core::{AppError, StoreResultExt};

use crate::db::is_foreign_key_violation;
use crate::store::{FileStore, UploadClaimQueue};

/// Channel notified when a client finishes uploading and a record becomes claimable.
pub const FILE_UPLOADED_CHANNEL: &str = "foodshare_file_uploaded";

#[derive(Clone)]
pub struct FileRepository {
    pool: PgPool,
}

impl FileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Explains why a conditional update matched no row.
    async fn rejected_transition(
        &self,
        file_id: Uuid,
        event: FileEvent,
    ) -> Result<AppError, AppError> {
        let current = self.get_file(file_id).await?;
        Ok(match current {
            None => AppError::not_found("File", file_id),
            Some(file) => AppError::InvalidTransition {
                file_id,
                from: file.status,
                event,
            },
        })
    }

    /// Conditional single-row transition `from -> apply(event)`; clears the lease.
    async fn transition(
        &self,
        operation: &'static str,
        file_id: Uuid,
        from: FileStatus,
        event: FileEvent,
    ) -> Result<FileRecord, AppError> {
        let to = from
            .apply(event)
            .ok_or_else(|| AppError::Internal(format!("{} is not legal from {}", event, from)))?;

        let updated: Option<FileRecord> = sqlx::query_as::<Postgres, FileRecord>(
            r#"
            UPDATE files
            SET status = $3,
                lease_token = NULL,
                claimed_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING
                id,
                user_id,
                file_type,
                content_type,
                name,
                size,
                status,
                url,
                lease_token,
                claimed_at,
                created_at,
                updated_at
            "#,
        )
        .bind(file_id)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await
        .store_context(operation, file_id)?;

        match updated {
            Some(file) => Ok(file),
            None => Err(self.rejected_transition(file_id, event).await?),
        }
    }
}

#[async_trait]
impl FileStore for FileRepository {
    #[tracing::instrument(skip(self, file), fields(name = %file.name))]
    async fn create_file(&self, user_id: Uuid, file: NewFile) -> Result<FileRecord, AppError> {
        file.validate()?;

        let created: FileRecord = sqlx::query_as::<Postgres, FileRecord>(
            r#"
            INSERT INTO files (id, user_id, file_type, content_type, name, size, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'client_upload_in_progress')
            RETURNING
                id,
                user_id,
                file_type,
                content_type,
                name,
                size,
                status,
                url,
                lease_token,
                claimed_at,
                created_at,
                updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(file.file_type)
        .bind(&file.content_type)
        .bind(&file.name)
        .bind(file.size)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::not_found("User", user_id)
            } else {
                AppError::store_failure("create_file", user_id, e)
            }
        })?;

        tracing::info!(
            file_id = %created.id,
            user_id = %user_id,
            file_type = %created.file_type,
            size = created.size,
            "File registered"
        );

        Ok(created)
    }

    #[tracing::instrument(skip(self))]
    async fn get_file(&self, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        sqlx::query_as::<Postgres, FileRecord>(
            r#"
            SELECT
                id,
                user_id,
                file_type,
                content_type,
                name,
                size,
                status,
                url,
                lease_token,
                claimed_at,
                created_at,
                updated_at
            FROM files
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .store_context("get_file", id)
    }

    #[tracing::instrument(skip(self))]
    async fn record_client_result(
        &self,
        id: Uuid,
        outcome: ClientUploadOutcome,
    ) -> Result<FileRecord, AppError> {
        let event = outcome.event();
        let to = FileStatus::ClientUploadInProgress
            .apply(event)
            .ok_or_else(|| AppError::Internal(format!("{} has no target status", event)))?;

        let updated: Option<FileRecord> = sqlx::query_as::<Postgres, FileRecord>(
            r#"
            UPDATE files
            SET status = $2,
                updated_at = NOW()
            WHERE id = $1 AND status = 'client_upload_in_progress'
            RETURNING
                id,
                user_id,
                file_type,
                content_type,
                name,
                size,
                status,
                url,
                lease_token,
                claimed_at,
                created_at,
                updated_at
            "#,
        )
        .bind(id)
        .bind(to)
        .fetch_optional(&self.pool)
        .await
        .store_context("record_client_result", id)?;

        let Some(file) = updated else {
            return Err(self.rejected_transition(id, event).await?);
        };

        // Only after the UPDATE has committed: a failed NOTIFY must not roll it back.
        if file.status == FileStatus::UploadedByClient {
            if let Err(e) = sqlx::query("SELECT pg_notify($1, $2)")
                .bind(FILE_UPLOADED_CHANNEL)
                .bind(id.to_string())
                .execute(&self.pool)
                .await
            {
                tracing::warn!(
                    error = %e,
                    file_id = %id,
                    "Failed to send pg_notify for uploaded file, workers will discover it via polling"
                );
            }
        }

        tracing::info!(file_id = %id, status = %file.status, "Client upload result recorded");

        Ok(file)
    }
}

#[async_trait]
impl UploadClaimQueue for FileRepository {
    /// Single statement: the row is locked by the sub-select and transitioned by the outer
    /// UPDATE, so concurrent callers skip it instead of observing it as claimable.
    #[tracing::instrument(skip(self))]
    async fn claim_next(&self) -> Result<Option<FileClaim>, AppError> {
        let lease_token = Uuid::new_v4();

        let claimed: Option<FileRecord> = sqlx::query_as::<Postgres, FileRecord>(
            r#"
            UPDATE files
            SET status = 'storage_upload_in_progress',
                lease_token = $1,
                claimed_at = NOW(),
                updated_at = NOW()
            WHERE id = (
                SELECT id
                FROM files
                WHERE status = 'uploaded_by_client'
                ORDER BY created_at ASC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            AND status = 'uploaded_by_client'
            RETURNING
                id,
                user_id,
                file_type,
                content_type,
                name,
                size,
                status,
                url,
                lease_token,
                claimed_at,
                created_at,
                updated_at
            "#,
        )
        .bind(lease_token)
        .fetch_optional(&self.pool)
        .await
        .store_context("claim_next", "files")?;

        Ok(claimed.map(|file| {
            tracing::debug!(file_id = %file.id, lease_token = %lease_token, "File claimed");
            FileClaim { file, lease_token }
        }))
    }

    #[tracing::instrument(skip(self, outcome), fields(outcome = %outcome.event()))]
    async fn finalize(
        &self,
        file_id: Uuid,
        lease_token: Uuid,
        outcome: TransferOutcome,
    ) -> Result<FileRecord, AppError> {
        let event = outcome.event();
        let to = FileStatus::StorageUploadInProgress
            .apply(event)
            .ok_or_else(|| AppError::Internal(format!("{} has no target status", event)))?;

        // Status and URL change in one statement; the table CHECK ties them together.
        let updated: Option<FileRecord> = sqlx::query_as::<Postgres, FileRecord>(
            r#"
            UPDATE files
            SET status = $3,
                url = $4,
                lease_token = NULL,
                updated_at = NOW()
            WHERE id = $1
                AND status = 'storage_upload_in_progress'
                AND lease_token = $2
            RETURNING
                id,
                user_id,
                file_type,
                content_type,
                name,
                size,
                status,
                url,
                lease_token,
                claimed_at,
                created_at,
                updated_at
            "#,
        )
        .bind(file_id)
        .bind(lease_token)
        .bind(to)
        .bind(outcome.url())
        .fetch_optional(&self.pool)
        .await
        .store_context("finalize", file_id)?;

        match updated {
            Some(file) => {
                tracing::info!(file_id = %file_id, status = %file.status, "File finalized");
                Ok(file)
            }
            None => {
                let err = self.rejected_transition(file_id, event).await?;
                tracing::warn!(file_id = %file_id, error = %err, "Finalize rejected");
                Err(err)
            }
        }
    }

    #[tracing::instrument(skip(self))]
    async fn reclaim_expired(&self, lease: Duration) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE files
            SET status = 'uploaded_by_client',
                lease_token = NULL,
                claimed_at = NULL,
                updated_at = NOW()
            WHERE status = 'storage_upload_in_progress'
                AND claimed_at < NOW() - make_interval(secs => $1)
            "#,
        )
        .bind(lease.as_secs_f64())
        .execute(&self.pool)
        .await
        .store_context("reclaim_expired", "files")?;

        let reclaimed = result.rows_affected();
        if reclaimed > 0 {
            tracing::warn!(
                reclaimed = reclaimed,
                lease_secs = lease.as_secs(),
                "Reclaimed files with expired claims"
            );
        }

        Ok(reclaimed)
    }

    #[tracing::instrument(skip(self))]
    async fn requeue_failed(&self, file_id: Uuid) -> Result<FileRecord, AppError> {
        let file = self
            .transition(
                "requeue_failed",
                file_id,
                FileStatus::StorageUploadError,
                FileEvent::Requeued,
            )
            .await?;

        tracing::info!(file_id = %file_id, "Failed file requeued");

        Ok(file)
    }
}
