//! Durable job scheduling
//!
//! Jobs live in the `scheduled_jobs` table until due, so a daemon restart
//! loses nothing. Dispatch is at-least-once: the publish worker's status
//! re-check makes a duplicate or stale fire harmless. Retry behavior is owned
//! here as an explicit policy rather than delegated to a queue library.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::db::Database;
use crate::error::Result;
use crate::types::{PostStatus, ScheduledJob, TriggerSource};
use crate::worker::PublishWorker;

/// Job-level retry policy: attempt ceiling plus exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_secs(config.retry_delay))
    }

    /// Delay before the given retry. `attempt` is 1-based: the first retry
    /// waits `base_delay`, the second twice that, and so on.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(60))
    }
}

/// Result of an enqueue call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new job was created
    Created(i64),
    /// A pending job for the same due time already exists
    Unchanged,
    /// The due time changed: the old job was canceled and replaced
    Superseded(i64),
}

/// Scheduler: owns queue bookkeeping and the dispatch loop.
#[derive(Clone)]
pub struct Scheduler {
    db: Database,
    policy: RetryPolicy,
}

impl Scheduler {
    pub fn new(db: Database, policy: RetryPolicy) -> Self {
        Self { db, policy }
    }

    /// Enqueue a publish job for a post.
    ///
    /// Idempotent per post: a pending job at the same due time is left alone;
    /// a pending job at a different due time is superseded so the post never
    /// has two outstanding jobs.
    pub async fn enqueue(
        &self,
        post_id: &str,
        due_at: i64,
        trigger: TriggerSource,
    ) -> Result<EnqueueOutcome> {
        if let Some(existing) = self.db.pending_job_for_post(post_id).await? {
            if existing.due_at == due_at {
                debug!("Job for post {} already pending at {}", post_id, due_at);
                return Ok(EnqueueOutcome::Unchanged);
            }

            if let Some(id) = existing.id {
                self.db.cancel_job(id).await?;
            }
            let new_id = self.db.insert_job(post_id, due_at, trigger).await?;
            info!(
                "Superseded job for post {}: due {} -> {}",
                post_id, existing.due_at, due_at
            );
            return Ok(EnqueueOutcome::Superseded(new_id));
        }

        let id = self.db.insert_job(post_id, due_at, trigger).await?;
        debug!("Enqueued job {} for post {} due at {}", id, post_id, due_at);
        Ok(EnqueueOutcome::Created(id))
    }

    /// Cancel all pending jobs for a post. Returns the number canceled.
    pub async fn cancel(&self, post_id: &str) -> Result<u64> {
        self.db.cancel_jobs_for_post(post_id).await
    }

    /// Dispatch all jobs due at `now` through the worker, at most
    /// `pool_size` concurrently. Returns the number of jobs dispatched.
    ///
    /// Each job's outcome is settled before this returns: completed jobs are
    /// marked done, failed jobs are pushed out with backoff or exhausted.
    pub async fn tick(&self, worker: &PublishWorker, pool_size: usize, now: i64) -> Result<usize> {
        let due = self.db.due_jobs(now, pool_size.max(1) * 8).await?;
        if due.is_empty() {
            return Ok(0);
        }

        info!("Dispatching {} due job(s)", due.len());

        let semaphore = Arc::new(Semaphore::new(pool_size.max(1)));
        let mut tasks = JoinSet::new();

        let dispatched = due.len();
        for job in due {
            let permit_source = Arc::clone(&semaphore);
            let worker = worker.clone();
            let scheduler = self.clone();

            tasks.spawn(async move {
                // Semaphore is never closed while tasks run
                let Ok(_permit) = permit_source.acquire().await else {
                    return;
                };
                scheduler.run_job(&worker, job).await;
            });
        }

        while tasks.join_next().await.is_some() {}

        Ok(dispatched)
    }

    /// Run one job and settle its queue state.
    async fn run_job(&self, worker: &PublishWorker, job: ScheduledJob) {
        let Some(job_id) = job.id else { return };
        let post_id = job.post_id.clone();

        match worker.execute(&job).await {
            Ok(outcome) => {
                debug!("Job {} for post {} finished: {:?}", job_id, post_id, outcome);
                if let Err(e) = self.db.mark_job_done(job_id).await {
                    error!("Failed to mark job {} done: {}", job_id, e);
                }
            }
            Err(e) => {
                let attempts = (job.attempts + 1) as u32;
                if attempts < self.policy.max_attempts {
                    let delay = self.policy.backoff(attempts);
                    let next_due = chrono::Utc::now().timestamp() + delay.as_secs() as i64;
                    warn!(
                        "Job {} for post {} failed (attempt {}/{}): {}. Retrying in {}s",
                        job_id,
                        post_id,
                        attempts,
                        self.policy.max_attempts,
                        e,
                        delay.as_secs()
                    );
                    if let Err(e) = self
                        .db
                        .reschedule_job(job_id, next_due, attempts as i64)
                        .await
                    {
                        error!("Failed to reschedule job {}: {}", job_id, e);
                    }
                } else {
                    error!(
                        "Job {} for post {} exhausted {} attempts: {}. Marking post failed",
                        job_id, post_id, attempts, e
                    );
                    if let Err(e) = self.db.mark_job_exhausted(job_id, attempts as i64).await {
                        error!("Failed to mark job {} exhausted: {}", job_id, e);
                    }
                    if let Err(e) = self
                        .db
                        .update_post_status(&post_id, PostStatus::Failed)
                        .await
                    {
                        error!("Failed to mark post {} failed: {}", post_id, e);
                    }
                }
            }
        }
    }
}
