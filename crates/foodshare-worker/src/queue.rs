//! Upload worker pool: LISTEN/NOTIFY or polling, bounded transfers, lease reaper.
//!
//! Shutdown: [`UploadWorkerPool::shutdown`] signals the pool to stop claiming; it does not
//! wait for in-flight transfers. A transfer cut short by process exit keeps its claim
//! until the lease expires and the reaper puts the file back in the queue.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;

use foodshare_core::models::{FileClaim, FileRecord, TransferOutcome};
use foodshare_core::{AppError, Config};
use foodshare_db::{UploadClaimQueue, FILE_UPLOADED_CHANNEL};

use crate::transfer::BlobTransfer;

/// Delay before reconnecting a dropped `PgListener`.
const LISTEN_RETRY_SECS: u64 = 5;

#[derive(Clone, Debug)]
pub struct UploadWorkerConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub transfer_timeout_secs: u64,
    /// Age after which a claim is considered abandoned.
    pub lease_secs: u64,
    /// Interval between lease reaper runs; 0 disables the reaper.
    pub lease_reap_interval_secs: u64,
}

impl Default for UploadWorkerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 1000,
            transfer_timeout_secs: 300,
            lease_secs: 900,
            lease_reap_interval_secs: 60,
        }
    }
}

impl From<&Config> for UploadWorkerConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_workers: config.upload_max_workers(),
            poll_interval_ms: config.upload_poll_interval_ms(),
            transfer_timeout_secs: config.upload_transfer_timeout_secs(),
            lease_secs: config.upload_lease_secs(),
            lease_reap_interval_secs: config.upload_lease_reap_interval_secs(),
        }
    }
}

#[derive(Clone)]
pub struct UploadWorkerPool {
    config: UploadWorkerConfig,
    shutdown_tx: mpsc::Sender<()>,
}

impl UploadWorkerPool {
    /// Spawns the pool.
    ///
    /// If `pool` is `Some`, the pool also wakes on `LISTEN` for new client uploads in
    /// addition to polling every `poll_interval_ms`. If `pool` is `None`, only polling is used.
    pub fn new(
        queue: Arc<dyn UploadClaimQueue>,
        transfer: Arc<dyn BlobTransfer>,
        config: UploadWorkerConfig,
        pool: Option<sqlx::PgPool>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let config_clone = config.clone();
        tokio::spawn(async move {
            Self::worker_pool(queue, transfer, config_clone, shutdown_rx, pool).await;
        });

        Self {
            config,
            shutdown_tx,
        }
    }

    pub fn config(&self) -> &UploadWorkerConfig {
        &self.config
    }

    async fn worker_pool(
        queue: Arc<dyn UploadClaimQueue>,
        transfer: Arc<dyn BlobTransfer>,
        config: UploadWorkerConfig,
        mut shutdown_rx: mpsc::Receiver<()>,
        pool: Option<sqlx::PgPool>,
    ) {
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            transfer_timeout_secs = config.transfer_timeout_secs,
            lease_secs = config.lease_secs,
            listen_notify = pool.is_some(),
            "Upload worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);
        let transfer_timeout = Duration::from_secs(config.transfer_timeout_secs);

        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        if let Some(pool) = pool {
            tokio::spawn(Self::listen(pool, notify_tx));
        }

        let (reaper_shutdown_tx, mut reaper_shutdown_rx) = mpsc::channel::<()>(1);
        if config.lease_reap_interval_secs > 0 {
            let reaper_queue = queue.clone();
            let reap_interval = Duration::from_secs(config.lease_reap_interval_secs);
            let lease = Duration::from_secs(config.lease_secs);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(reap_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            match reaper_queue.reclaim_expired(lease).await {
                                Ok(0) => {}
                                Ok(reclaimed) => {
                                    tracing::warn!(reclaimed, "Returned expired upload claims to the queue");
                                }
                                Err(e) => tracing::error!(error = %e, "Lease reaper failed"),
                            }
                        }
                        _ = reaper_shutdown_rx.recv() => break,
                    }
                }
            });
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Upload worker pool shutting down");
                    let _ = reaper_shutdown_tx.send(()).await;
                    break;
                }
                Some(()) = notify_rx.recv() => {
                    Self::claim_and_dispatch(&queue, &transfer, &semaphore, transfer_timeout).await;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch(&queue, &transfer, &semaphore, transfer_timeout).await;
                }
            }
        }

        tracing::info!("Upload worker pool stopped");
    }

    /// Forwards notifications on the upload channel until the pool goes away.
    async fn listen(pool: sqlx::PgPool, notify_tx: mpsc::Sender<()>) {
        loop {
            match sqlx::postgres::PgListener::connect_with(&pool).await {
                Ok(mut listener) => {
                    if let Err(e) = listener.listen(FILE_UPLOADED_CHANNEL).await {
                        tracing::warn!(error = %e, "LISTEN failed, will retry");
                        sleep(Duration::from_secs(LISTEN_RETRY_SECS)).await;
                        continue;
                    }
                    while listener.recv().await.is_ok() {
                        // A full channel already guarantees a wake-up.
                        if let Err(mpsc::error::TrySendError::Closed(())) = notify_tx.try_send(())
                        {
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "PgListener connect failed, will retry");
                    sleep(Duration::from_secs(LISTEN_RETRY_SECS)).await;
                }
            }
            if notify_tx.is_closed() {
                return;
            }
        }
    }

    /// Claims files while workers are free and the queue is non-empty.
    /// Returns the number of transfers dispatched.
    async fn claim_and_dispatch(
        queue: &Arc<dyn UploadClaimQueue>,
        transfer: &Arc<dyn BlobTransfer>,
        semaphore: &Arc<Semaphore>,
        transfer_timeout: Duration,
    ) -> usize {
        let mut dispatched = 0;
        loop {
            let permit = match semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::debug!("No workers available, skipping claim");
                    return dispatched;
                }
            };

            match queue.claim_next().await {
                Ok(Some(claim)) => {
                    let queue = queue.clone();
                    let transfer = transfer.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        let file_id = claim.file_id();
                        if let Err(e) =
                            Self::process_claim(claim, queue, transfer, transfer_timeout).await
                        {
                            tracing::error!(file_id = %file_id, error = %e, "Failed to finalize upload claim");
                        }
                    });
                    dispatched += 1;
                }
                Ok(None) => {
                    tracing::trace!("No uploaded files waiting for storage");
                    return dispatched;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim upload from queue");
                    return dispatched;
                }
            }
        }
    }

    /// Runs one transfer under the timeout and finalizes the claim with its outcome.
    #[tracing::instrument(skip_all, fields(file.id = %claim.file_id(), file.name = %claim.file.name))]
    pub(crate) async fn process_claim(
        claim: FileClaim,
        queue: Arc<dyn UploadClaimQueue>,
        transfer: Arc<dyn BlobTransfer>,
        transfer_timeout: Duration,
    ) -> Result<FileRecord, AppError> {
        let outcome = match tokio::time::timeout(transfer_timeout, transfer.transfer(&claim.file))
            .await
        {
            Ok(Ok(url)) => TransferOutcome::Success { url },
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Storage transfer failed");
                TransferOutcome::Failure
            }
            Err(_) => {
                tracing::error!(
                    timeout_secs = transfer_timeout.as_secs_f64(),
                    "Storage transfer timed out"
                );
                TransferOutcome::Failure
            }
        };

        let file = queue
            .finalize(claim.file_id(), claim.lease_token, outcome)
            .await?;

        tracing::info!(status = %file.status, "Upload claim finalized");
        Ok(file)
    }

    /// Signals the pool to stop claiming and exit its loop.
    ///
    /// Returns immediately after sending the signal. Transfers already running continue
    /// until they finish or time out.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating upload worker pool shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}
