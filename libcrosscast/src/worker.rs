//! Publish worker
//!
//! Consumes due jobs: re-validates post state, fans the publish out to every
//! platform target concurrently, aggregates the outcome, persists it, and
//! kicks off the best-effort side effects (repeat regeneration and webhook
//! notification).

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::{PlatformError, Result};
use crate::events::{Event, EventBus, TargetOutcome};
use crate::notify::{Notifier, NotifyEvent, NotifyPayload};
use crate::platforms::PublisherRegistry;
use crate::repeat::RepeatScheduler;
use crate::scheduler::Scheduler;
use crate::types::{PlatformTarget, Post, PostStatus, ScheduledJob, TargetStatus, TriggerSource};

/// What a job execution amounted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// The post was no longer eligible; nothing happened
    Skipped,
    /// At least one target succeeded and the post is published
    Published { succeeded: usize, failed: usize },
    /// Every target failed and the post is marked failed
    Failed,
}

/// Worker that executes publish jobs.
#[derive(Clone)]
pub struct PublishWorker {
    db: Database,
    registry: Arc<PublisherRegistry>,
    scheduler: Scheduler,
    notifier: Notifier,
    events: EventBus,
    publish_timeout: Duration,
}

impl PublishWorker {
    pub fn new(
        db: Database,
        registry: Arc<PublisherRegistry>,
        scheduler: Scheduler,
        notifier: Notifier,
        events: EventBus,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            db,
            registry,
            scheduler,
            notifier,
            events,
            publish_timeout,
        }
    }

    /// Execute one publish job.
    ///
    /// Per-target publish errors (provider rejection, network failure,
    /// timeout) are captured on the target and never propagate. An `Err`
    /// from this function means the infrastructure itself failed
    /// (persistence, aggregation) and the job is eligible for the
    /// scheduler's retry.
    pub async fn execute(&self, job: &ScheduledJob) -> Result<ExecuteOutcome> {
        let post = match self.db.get_post(&job.post_id).await? {
            Some(post) => post,
            None => {
                debug!("Job references deleted post {}; skipping", job.post_id);
                return Ok(ExecuteOutcome::Skipped);
            }
        };

        // Idempotency guard: claim the post atomically. A stale job (the
        // post was edited, canceled, or already executed) claims nothing
        // and aborts without side effects.
        let eligible = eligible_statuses(job.trigger);
        if !self.db.claim_post_publishing(&post.id, eligible).await? {
            debug!(
                "Post {} is not eligible for publishing (status {}); skipping stale job",
                post.id, post.status
            );
            return Ok(ExecuteOutcome::Skipped);
        }

        info!("Publishing post {} (trigger: {})", post.id, job.trigger);

        let targets = self.db.get_targets(&post.id).await?;
        let attempted = self.fan_out(&post, &targets).await;

        // Persist every attempted target's outcome before aggregating
        for target in &attempted {
            if target.id.is_some() {
                self.db.update_target_outcome(target).await?;
            }
        }

        // Targets that succeeded on a previous attempt still count toward
        // the aggregate; they were skipped, not re-published.
        let already_published = targets
            .iter()
            .filter(|t| t.status == TargetStatus::Published)
            .count();
        let newly_published = attempted
            .iter()
            .filter(|t| t.status == TargetStatus::Published)
            .count();
        let succeeded = already_published + newly_published;
        let failed = attempted
            .iter()
            .filter(|t| t.status == TargetStatus::Failed)
            .count();

        if succeeded > 0 {
            self.finish_published(&post, &attempted, succeeded, failed)
                .await?;
            Ok(ExecuteOutcome::Published { succeeded, failed })
        } else {
            self.finish_failed(&post).await?;
            Ok(ExecuteOutcome::Failed)
        }
    }

    /// Attempt every non-published target concurrently, each under its own
    /// timeout. Already-published targets are never re-attempted; a post is
    /// not published twice to the same destination.
    async fn fan_out(&self, post: &Post, targets: &[PlatformTarget]) -> Vec<PlatformTarget> {
        self.events.emit(Event::PublishStarted {
            post_id: post.id.clone(),
            platforms: targets.iter().map(|t| t.platform.clone()).collect(),
        });

        let attempts = targets
            .iter()
            .filter(|t| t.status != TargetStatus::Published)
            .map(|target| self.attempt_target(post, target.clone()));

        join_all(attempts).await
    }

    /// Publish one target, converting any failure into a recorded error.
    async fn attempt_target(&self, post: &Post, mut target: PlatformTarget) -> PlatformTarget {
        let platform = target.platform.clone();

        let publisher = match self.registry.get(&platform) {
            Some(publisher) => publisher,
            None => {
                warn!("No publisher registered for platform {}", platform);
                target.mark_failed(format!("No publisher registered for platform {}", platform));
                return target;
            }
        };

        let result =
            tokio::time::timeout(self.publish_timeout, publisher.publish(post, &target)).await;

        match result {
            Ok(Ok(external_id)) => {
                info!(
                    "Published post {} to {} as {}",
                    post.id, platform, external_id
                );
                target.mark_published(external_id, chrono::Utc::now().timestamp());
            }
            Ok(Err(e)) => {
                warn!("Failed to publish post {} to {}: {}", post.id, platform, e);
                target.mark_failed(e.to_string());
            }
            Err(_) => {
                let e = PlatformError::Timeout(format!(
                    "{} did not respond within {}s",
                    platform,
                    self.publish_timeout.as_secs()
                ));
                warn!("Failed to publish post {} to {}: {}", post.id, platform, e);
                target.mark_failed(e.to_string());
            }
        }

        target
    }

    /// Commit the published status, then run the best-effort side effects.
    async fn finish_published(
        &self,
        post: &Post,
        attempted: &[PlatformTarget],
        succeeded: usize,
        failed: usize,
    ) -> Result<()> {
        let published_at = chrono::Utc::now().timestamp();
        self.db.set_post_published(&post.id, published_at).await?;

        info!(
            "Post {} published ({} target(s) succeeded, {} failed)",
            post.id, succeeded, failed
        );

        self.events.emit(Event::PublishCompleted {
            post_id: post.id.clone(),
            results: attempted
                .iter()
                .map(|t| TargetOutcome {
                    platform: t.platform.clone(),
                    account_id: t.account_id.clone(),
                    success: t.status == TargetStatus::Published,
                    external_id: t.external_id.clone(),
                    error: t.error_message.clone(),
                })
                .collect(),
        });

        // Side effects never roll back the commit above. The repeat clone is
        // created synchronously so the next occurrence exists by the time
        // this job completes; webhook delivery is detached.
        let repeat = RepeatScheduler::new(self.db.clone(), self.scheduler.clone());
        if let Err(e) = repeat.schedule_next(post).await {
            warn!("Failed to schedule repeat of post {}: {}", post.id, e);
        }

        self.dispatch_notification(post, failed).await;

        Ok(())
    }

    /// Every target failed: the post itself is failed. No webhook fires;
    /// the failure is surfaced on the channel's queue and in the logs.
    async fn finish_failed(&self, post: &Post) -> Result<()> {
        self.db
            .update_post_status(&post.id, PostStatus::Failed)
            .await?;

        warn!("Post {} failed on every target", post.id);

        self.events.emit(Event::PublishFailed {
            post_id: post.id.clone(),
            error: "All platform targets failed".to_string(),
        });

        Ok(())
    }

    /// Fire the `published` webhook for the post's channel, detached.
    async fn dispatch_notification(&self, post: &Post, failed: usize) {
        let channel = match self.db.get_channel(&post.channel_id).await {
            Ok(Some(channel)) => channel,
            Ok(None) => {
                warn!(
                    "Post {} references missing channel {}",
                    post.id, post.channel_id
                );
                return;
            }
            Err(e) => {
                warn!("Failed to load channel for notification: {}", e);
                return;
            }
        };

        let webhooks = match self.db.webhooks_for_channel(&channel.id).await {
            Ok(webhooks) => webhooks,
            Err(e) => {
                warn!("Failed to load webhooks for notification: {}", e);
                return;
            }
        };

        let targets = self.db.get_targets(&post.id).await.unwrap_or_default();
        let detail = if failed > 0 {
            Some(format!("{} platform(s) failed and need manual retry", failed))
        } else {
            None
        };
        let payload = NotifyPayload::for_post(post, &channel, &targets, detail);

        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            notifier
                .dispatch(NotifyEvent::Published, &webhooks, &payload)
                .await;
        });
    }
}

/// Statuses a job may claim from, by trigger source.
fn eligible_statuses(trigger: TriggerSource) -> &'static [PostStatus] {
    match trigger {
        TriggerSource::Scheduler | TriggerSource::Repeat => &[PostStatus::Scheduled],
        TriggerSource::Manual => &[
            PostStatus::Scheduled,
            PostStatus::Approved,
            PostStatus::Failed,
        ],
    }
}
