//! Post service
//!
//! The write-side API for posts: creation, editing, resubmission, and
//! deletion. All status decisions flow through [`crate::lifecycle`] so the
//! channel policy is applied identically everywhere, and job bookkeeping
//! (enqueue, supersede, cancel) tracks every schedule change.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::{CrosscastError, Result};
use crate::events::{Event, EventBus};
use crate::lifecycle::{can_edit, next_status};
use crate::notify::{Notifier, NotifyEvent, NotifyPayload};
use crate::scheduler::Scheduler;
use crate::types::{Channel, PlatformTarget, Post, PostStatus, TriggerSource};

/// One (platform, account) destination requested for a post
#[derive(Debug, Clone)]
pub struct TargetSpec {
    pub platform: String,
    pub account_id: String,
    pub settings: Option<serde_json::Value>,
}

/// Recurrence settings for a repeating post
#[derive(Debug, Clone, Copy)]
pub struct RepeatSpec {
    pub interval_days: i64,
    /// Occurrences after the first. `None` repeats forever.
    pub count: Option<i64>,
}

/// Request to create a post
#[derive(Debug, Clone)]
pub struct CreatePostRequest {
    pub channel_id: String,
    pub author_id: String,
    pub content: String,
    pub variants: HashMap<String, String>,
    pub media: Vec<String>,
    pub targets: Vec<TargetSpec>,
    pub scheduled_at: Option<i64>,
    /// Save as a draft without entering the pipeline
    pub draft: bool,
    /// Explicitly ask for review (relevant on `optional` channels)
    pub request_review: bool,
    pub repeat: Option<RepeatSpec>,
}

/// Request to edit a post. Unset fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct EditPostRequest {
    pub content: Option<String>,
    pub variants: Option<HashMap<String, String>>,
    pub media: Option<Vec<String>>,
    /// `Some(None)` clears the schedule, `Some(Some(t))` sets it
    pub scheduled_at: Option<Option<i64>>,
    /// Explicitly ask for review
    pub request_review: bool,
    /// Put a draft or rejected post (back) into the publishing flow
    pub resubmit: bool,
    /// `Some(None)` stops the post repeating, `Some(Some(spec))` updates it
    pub repeat: Option<Option<RepeatSpec>>,
}

/// Write-side service for posts.
#[derive(Clone)]
pub struct PostService {
    db: Database,
    scheduler: Scheduler,
    notifier: Notifier,
    events: EventBus,
}

impl PostService {
    pub fn new(db: Database, scheduler: Scheduler, notifier: Notifier, events: EventBus) -> Self {
        Self {
            db,
            scheduler,
            notifier,
            events,
        }
    }

    /// Create a post on a channel.
    ///
    /// The channel policy decides the initial status; a post that lands in
    /// `Scheduled` gets its job enqueued, one that lands in
    /// `PendingApproval` notifies the channel's reviewers.
    pub async fn create_post(&self, request: CreatePostRequest) -> Result<Post> {
        let channel = self
            .db
            .get_channel(&request.channel_id)
            .await?
            .ok_or_else(|| {
                CrosscastError::InvalidInput(format!("Channel not found: {}", request.channel_id))
            })?;

        validate_content(&request.content)?;
        if !request.draft {
            validate_targets(&request.targets)?;
        }
        validate_repeat(request.repeat.as_ref(), request.scheduled_at)?;

        let mut post = Post::new(
            request.channel_id.clone(),
            request.author_id.clone(),
            request.content.clone(),
        );
        post.variants = request.variants.clone();
        post.media = request.media.clone();
        post.scheduled_at = request.scheduled_at;
        if let Some(repeat) = request.repeat {
            post.is_repeat = true;
            post.repeat_interval_days = Some(repeat.interval_days);
            post.repeat_count = repeat.count;
        }

        let requested = if request.draft {
            PostStatus::Draft
        } else if request.request_review {
            PostStatus::PendingApproval
        } else {
            PostStatus::Scheduled
        };
        post.status = next_status(
            PostStatus::Draft,
            channel.approval_policy,
            post.scheduled_at.is_some(),
            Some(requested),
            None,
        );

        self.db.create_post(&post).await?;
        for spec in &request.targets {
            let mut target = PlatformTarget::new_pending(
                post.id.clone(),
                spec.platform.clone(),
                spec.account_id.clone(),
            );
            target.settings = spec.settings.clone();
            self.db.create_target(&target).await?;
        }

        info!(
            "Created post {} on channel {} with status {}",
            post.id, channel.name, post.status
        );

        self.apply_status_effects(&post, &channel, None).await?;

        Ok(post)
    }

    /// Edit a post.
    ///
    /// Rejected for posts that are `Published` or `Publishing`. The status
    /// is recomputed under the channel policy (a `required` channel sends
    /// any non-draft edit back through review), and the post's job is
    /// enqueued, superseded, or canceled to match the new schedule.
    pub async fn edit_post(&self, post_id: &str, request: EditPostRequest) -> Result<Post> {
        let mut post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or_else(|| CrosscastError::InvalidInput(format!("Post not found: {}", post_id)))?;

        if !can_edit(post.status) {
            return Err(CrosscastError::InvalidInput(format!(
                "Post {} cannot be edited in status {}",
                post_id, post.status
            )));
        }

        let channel = self.db.get_channel(&post.channel_id).await?.ok_or_else(|| {
            CrosscastError::InvalidInput(format!("Channel not found: {}", post.channel_id))
        })?;

        let previous_status = post.status;

        if let Some(content) = request.content {
            post.content = content;
        }
        if let Some(variants) = request.variants {
            post.variants = variants;
        }
        if let Some(media) = request.media {
            post.media = media;
        }
        if let Some(scheduled_at) = request.scheduled_at {
            post.scheduled_at = scheduled_at;
        }
        if let Some(repeat) = request.repeat {
            match repeat {
                Some(spec) => {
                    post.is_repeat = true;
                    post.repeat_interval_days = Some(spec.interval_days);
                    post.repeat_count = spec.count;
                }
                None => {
                    post.is_repeat = false;
                    post.repeat_interval_days = None;
                    post.repeat_count = None;
                }
            }
        }

        validate_content(&post.content)?;
        if post.is_repeat {
            let spec = RepeatSpec {
                interval_days: post.repeat_interval_days.unwrap_or(0),
                count: post.repeat_count,
            };
            validate_repeat(Some(&spec), post.scheduled_at)?;
        }

        let requested = if request.request_review {
            Some(PostStatus::PendingApproval)
        } else if request.resubmit {
            Some(PostStatus::Scheduled)
        } else {
            None
        };
        post.status = next_status(
            previous_status,
            channel.approval_policy,
            post.scheduled_at.is_some(),
            requested,
            None,
        );

        // A draft can exist without destinations, but nothing target-less
        // may enter the pipeline
        if matches!(
            post.status,
            PostStatus::PendingApproval | PostStatus::Scheduled
        ) && self.db.get_targets(post_id).await?.is_empty()
        {
            return Err(CrosscastError::InvalidInput(
                "Post has no platform targets to publish to".to_string(),
            ));
        }

        self.db.update_post(&post).await?;

        debug!(
            "Edited post {}: status {} -> {}",
            post.id, previous_status, post.status
        );

        self.apply_status_effects(&post, &channel, Some(previous_status))
            .await?;

        Ok(post)
    }

    /// Delete a post and its pending jobs.
    pub async fn delete_post(&self, post_id: &str) -> Result<bool> {
        self.scheduler.cancel(post_id).await?;
        self.db.delete_post(post_id).await
    }

    /// Reconcile jobs and notifications with a post's (new) status.
    async fn apply_status_effects(
        &self,
        post: &Post,
        channel: &Channel,
        previous_status: Option<PostStatus>,
    ) -> Result<()> {
        match post.status {
            PostStatus::Scheduled => {
                // `Scheduled` implies a schedule; the decision table never
                // assigns it without one
                if let Some(scheduled_at) = post.scheduled_at {
                    self.scheduler
                        .enqueue(&post.id, scheduled_at, TriggerSource::Scheduler)
                        .await?;
                }
            }
            PostStatus::PendingApproval => {
                self.scheduler.cancel(&post.id).await?;
                if previous_status != Some(PostStatus::PendingApproval) {
                    self.announce_review_request(post, channel).await;
                }
            }
            _ => {
                // Any other status has no business keeping a pending job
                self.scheduler.cancel(&post.id).await?;
            }
        }

        Ok(())
    }

    /// Emit the in-app event and webhook notification for a post entering
    /// review.
    async fn announce_review_request(&self, post: &Post, channel: &Channel) {
        self.events.emit(Event::ApprovalRequested {
            post_id: post.id.clone(),
            channel_id: channel.id.clone(),
            author_id: post.author_id.clone(),
        });

        match self.db.webhooks_for_channel(&channel.id).await {
            Ok(webhooks) => {
                let targets = self.db.get_targets(&post.id).await.unwrap_or_default();
                let payload = NotifyPayload::for_post(post, channel, &targets, None);
                let notifier = self.notifier.clone();
                tokio::spawn(async move {
                    notifier
                        .dispatch(NotifyEvent::PendingApproval, &webhooks, &payload)
                        .await;
                });
            }
            Err(e) => warn!("Failed to load webhooks for review notification: {}", e),
        }
    }
}

fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(CrosscastError::InvalidInput(
            "Content cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_targets(targets: &[TargetSpec]) -> Result<()> {
    if targets.is_empty() {
        return Err(CrosscastError::InvalidInput(
            "At least one platform target is required".to_string(),
        ));
    }
    for spec in targets {
        if spec.platform.trim().is_empty() || spec.account_id.trim().is_empty() {
            return Err(CrosscastError::InvalidInput(
                "Platform targets need a platform name and account id".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_repeat(repeat: Option<&RepeatSpec>, scheduled_at: Option<i64>) -> Result<()> {
    let Some(spec) = repeat else { return Ok(()) };

    if spec.interval_days < 1 {
        return Err(CrosscastError::InvalidInput(
            "Repeat interval must be at least one day".to_string(),
        ));
    }
    if let Some(count) = spec.count {
        if count < 1 {
            return Err(CrosscastError::InvalidInput(
                "Repeat count must be at least 1".to_string(),
            ));
        }
    }
    if scheduled_at.is_none() {
        return Err(CrosscastError::InvalidInput(
            "Repeating posts require a schedule to anchor the next occurrence".to_string(),
        ));
    }

    Ok(())
}
