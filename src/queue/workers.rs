//! Worker Loop
//!
//! One long-lived loop per process:
//!
//! ```text
//! startup: recover_interrupted()
//! loop:
//!     drain: claim → drive to terminal state → claim again … until empty
//!     sleep poll interval (or stop on shutdown)
//! ```
//!
//! Jobs are processed strictly one at a time. Store errors end the current
//! tick and are retried on the next one. A job whose run was cut short by a
//! store error is requeued at the start of the next successful tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use uuid::Uuid;

use crate::content::{KeywordStatus, KeywordStore};
use crate::pipeline::{JobOutcome, Orchestrator};
use crate::queue::{GenerationJob, JobStatus, JobStore};
use crate::types::{AppError, AppResult};

pub struct Worker {
    jobs: Arc<dyn JobStore>,
    keywords: Arc<dyn KeywordStore>,
    orchestrator: Orchestrator,
    poll_interval: Duration,
    /// Held for the whole of a drain
    draining: Mutex<()>,
    /// Job left `PROCESSING` when `drive` failed against the store
    abandoned: Mutex<Option<Uuid>>,
}

impl Worker {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        keywords: Arc<dyn KeywordStore>,
        orchestrator: Orchestrator,
        poll_interval: Duration,
    ) -> Self {
        Self {
            jobs,
            keywords,
            orchestrator,
            poll_interval,
            draining: Mutex::new(()),
            abandoned: Mutex::new(None),
        }
    }

    /// Settle jobs a previous process left `PROCESSING`. Returns how many
    /// were touched.
    pub async fn recover(&self) -> AppResult<usize> {
        let recovered = self.jobs.recover_interrupted().await?;
        for job in &recovered {
            self.after_recovery(job).await;
        }
        Ok(recovered.len())
    }

    async fn after_recovery(&self, job: &GenerationJob) {
        match job.status {
            JobStatus::Queued => {
                info!(job_id = %job.id, "Requeued interrupted job");
            }
            JobStatus::Cancelled => {
                info!(job_id = %job.id, "Interrupted job had a pending cancel");
                if let Some(keyword_id) = job.keyword_id {
                    if let Err(e) = self
                        .keywords
                        .set_status(keyword_id, KeywordStatus::Pending)
                        .await
                    {
                        warn!(job_id = %job.id, error = %e, "Could not restore keyword");
                    }
                }
            }
            _ => {}
        }
    }

    /// Requeue the job a previous tick abandoned. Leaves it recorded if the
    /// store is still unreachable.
    async fn settle_abandoned(&self) -> AppResult<()> {
        let mut abandoned = self.abandoned.lock().await;
        let Some(job_id) = *abandoned else {
            return Ok(());
        };

        match self.jobs.requeue_interrupted(job_id).await {
            Ok(job) => self.after_recovery(&job).await,
            // Already settled elsewhere
            Err(AppError::InvalidTransition(_)) | Err(AppError::NotFound(_)) => {
                debug!(%job_id, "Abandoned job no longer processing");
            }
            Err(e) => return Err(e),
        }
        *abandoned = None;
        Ok(())
    }

    /// Claim and drive jobs until none are queued or shutdown is signalled.
    /// Returns the number of jobs driven; zero if another drain is running.
    pub async fn drain(&self, shutdown: &watch::Receiver<bool>) -> AppResult<usize> {
        let Ok(_guard) = self.draining.try_lock() else {
            debug!("Drain already in progress");
            return Ok(0);
        };

        self.settle_abandoned().await?;

        let mut processed = 0;
        while !*shutdown.borrow() {
            let Some(job) = self.jobs.claim_next().await? else {
                break;
            };
            let job_id = job.id;
            info!(%job_id, keyword = %job.input.keyword, "Claimed job");

            let outcome = match self.orchestrator.drive(job).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    *self.abandoned.lock().await = Some(job_id);
                    return Err(e);
                }
            };
            match outcome {
                JobOutcome::Completed { article_id } => {
                    info!(%job_id, %article_id, "Job finished")
                }
                JobOutcome::Failed { stage, error } => {
                    warn!(%job_id, %stage, %error, "Job failed")
                }
                JobOutcome::Cancelled { at_stage } => {
                    info!(%job_id, ?at_stage, "Job stopped by cancellation")
                }
            }
            processed += 1;
        }
        Ok(processed)
    }

    /// Run until `shutdown` flips to true. An in-flight job is always driven
    /// to its terminal state first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(poll_interval_secs = self.poll_interval.as_secs(), "Worker starting");

        match self.recover().await {
            Ok(0) => {}
            Ok(n) => info!(count = n, "Recovered interrupted jobs"),
            Err(e) => error!(error = %e, "Recovery of interrupted jobs failed"),
        }

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.drain(&shutdown).await {
                error!(error = %e, "Worker tick failed, retrying next poll");
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Worker stopped");
    }
}
