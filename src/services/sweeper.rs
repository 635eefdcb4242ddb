//! Periodic queue sweeps.
//!
//! One background task drives three interval-based sweeps: pending jobs,
//! retry jobs whose backoff has elapsed, and reconciliation of provisionally
//! accepted jobs plus rescue of attempts abandoned mid-processing. Jobs are
//! processed serially with a jittered pause between items; the provider is
//! rate-sensitive and bursts from a batch look nothing like a human.

use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::{interval, sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::QueueConfig;
use crate::database::Database;
use crate::errors::{AppError, JobError};
use crate::models::OutreachJob;

use super::processor::JobProcessor;

pub struct QueueSweeper {
    database: Database,
    processor: JobProcessor,
    config: QueueConfig,
}

impl QueueSweeper {
    pub fn new(database: Database, processor: JobProcessor, config: QueueConfig) -> Self {
        Self {
            database,
            processor,
            config,
        }
    }

    /// Run the sweep loop until cancelled.
    pub async fn run(self, cancellation_token: CancellationToken) {
        info!(
            "Starting queue sweeper (pending every {}s, retries every {}s, reconcile every {}s)",
            self.config.pending_sweep_interval_secs,
            self.config.retry_sweep_interval_secs,
            self.config.reconcile_sweep_interval_secs
        );

        let mut pending_tick = interval(Duration::from_secs(self.config.pending_sweep_interval_secs));
        let mut retry_tick = interval(Duration::from_secs(self.config.retry_sweep_interval_secs));
        let mut reconcile_tick =
            interval(Duration::from_secs(self.config.reconcile_sweep_interval_secs));

        loop {
            tokio::select! {
                _ = pending_tick.tick() => {
                    if let Err(e) = self.sweep_pending().await {
                        error!("Pending sweep failed: {}", e);
                    }
                }
                _ = retry_tick.tick() => {
                    if let Err(e) = self.sweep_due_retries().await {
                        error!("Retry sweep failed: {}", e);
                    }
                }
                _ = reconcile_tick.tick() => {
                    if let Err(e) = self.sweep_reconciliation().await {
                        error!("Reconciliation sweep failed: {}", e);
                    }
                }
                _ = cancellation_token.cancelled() => {
                    info!("Queue sweeper received cancellation signal");
                    break;
                }
            }
        }

        info!("Queue sweeper stopped");
    }

    /// Pick up a bounded batch of pending jobs and process them serially.
    pub async fn sweep_pending(&self) -> crate::errors::AppResult<()> {
        let jobs = self.database.list_pending_jobs(self.config.batch_size).await?;
        if !jobs.is_empty() {
            debug!("Pending sweep picked up {} job(s)", jobs.len());
        }
        self.process_batch(jobs).await;
        Ok(())
    }

    /// Pick up retry jobs whose `next_retry_at` has elapsed.
    pub async fn sweep_due_retries(&self) -> crate::errors::AppResult<()> {
        let jobs = self
            .database
            .list_due_retry_jobs(Utc::now(), self.config.batch_size)
            .await?;
        if !jobs.is_empty() {
            debug!("Retry sweep picked up {} due job(s)", jobs.len());
        }
        self.process_batch(jobs).await;
        Ok(())
    }

    /// Settle provisionally accepted jobs the webhook never confirmed, and
    /// rescue attempts abandoned mid-processing.
    pub async fn sweep_reconciliation(&self) -> crate::errors::AppResult<()> {
        let now = Utc::now();

        let queued_cutoff = now - ChronoDuration::minutes(self.config.reconcile_after_mins);
        let queued = self
            .database
            .list_reconcilable_queued_jobs(queued_cutoff, self.config.batch_size)
            .await?;
        for job in queued {
            match self.processor.confirm_queued_job(job.id, "reconciliation").await {
                Ok(true) => debug!("Reconciled queued job {}", job.id),
                Ok(false) => {} // settled by the webhook in the meantime
                Err(e) => error!("Failed to reconcile job {}: {}", job.id, e),
            }
        }

        let stale_cutoff = now - ChronoDuration::minutes(self.config.stale_processing_after_mins);
        let stale = self
            .database
            .list_stale_processing_jobs(stale_cutoff, self.config.batch_size)
            .await?;
        for job in stale {
            if let Err(e) = self.processor.recover_stale_job(&job).await {
                error!("Failed to recover stale job {}: {}", job.id, e);
            }
        }

        Ok(())
    }

    /// Process jobs one at a time with a jittered pause between them.
    ///
    /// The pause is a self-imposed throttle distinct from the daily quota.
    async fn process_batch(&self, jobs: Vec<OutreachJob>) {
        let mut first = true;
        for job in jobs {
            if !first {
                sleep(self.inter_job_pause()).await;
            }
            first = false;

            match self.processor.process_job(job.id).await {
                Ok(outcome) => debug!("Processed job {}: {:?}", job.id, outcome),
                // Lost the claim to a racing sweep or manual retry
                Err(AppError::Job(JobError::InvalidState { .. })) => {
                    debug!("Job {} was claimed elsewhere, skipping", job.id)
                }
                Err(e) => error!("Processing job {} failed: {}", job.id, e),
            }
        }
    }

    fn inter_job_pause(&self) -> Duration {
        let jitter = if self.config.inter_job_jitter_ms > 0 {
            fastrand::u64(0..=self.config.inter_job_jitter_ms)
        } else {
            0
        };
        Duration::from_millis(self.config.inter_job_delay_ms + jitter)
    }
}
