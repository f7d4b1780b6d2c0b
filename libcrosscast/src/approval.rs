//! Approval gate
//!
//! Records human accept/reject decisions and drives the resulting status
//! transition. The audit record is written before the status so the trail
//! can never reference a transition it didn't cause. Notification delivery
//! is best-effort and never rolls back a decision.

use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::{CrosscastError, Result};
use crate::events::{Event, EventBus};
use crate::lifecycle::next_status;
use crate::notify::{Notifier, NotifyEvent, NotifyPayload};
use crate::scheduler::Scheduler;
use crate::types::{Approval, ApprovalAction, PostStatus, TriggerSource};

/// Gate that applies review decisions to posts awaiting approval.
#[derive(Clone)]
pub struct ApprovalGate {
    db: Database,
    scheduler: Scheduler,
    notifier: Notifier,
    events: EventBus,
}

impl ApprovalGate {
    pub fn new(db: Database, scheduler: Scheduler, notifier: Notifier, events: EventBus) -> Self {
        Self {
            db,
            scheduler,
            notifier,
            events,
        }
    }

    /// Apply a review decision to a post.
    ///
    /// Appends the approval record, computes and persists the new status,
    /// emits the author's in-app event, fires the channel webhooks, and
    /// enqueues the publish job when an approved post carries a schedule.
    ///
    /// Returns the post's new status.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when the reviewer id is empty, the post does
    /// not exist, or the post is not awaiting approval. Authorization of the
    /// reviewer against the owning channel is the caller's concern.
    pub async fn decide(
        &self,
        post_id: &str,
        reviewer_id: &str,
        action: ApprovalAction,
        comment: Option<String>,
    ) -> Result<PostStatus> {
        if reviewer_id.trim().is_empty() {
            return Err(CrosscastError::InvalidInput(
                "Reviewer id cannot be empty".to_string(),
            ));
        }

        let post = self
            .db
            .get_post(post_id)
            .await?
            .ok_or_else(|| CrosscastError::InvalidInput(format!("Post not found: {}", post_id)))?;

        if post.status != PostStatus::PendingApproval {
            return Err(CrosscastError::InvalidInput(format!(
                "Post {} is not awaiting approval (status: {})",
                post_id, post.status
            )));
        }

        let channel = self.db.get_channel(&post.channel_id).await?.ok_or_else(|| {
            CrosscastError::InvalidInput(format!("Channel not found: {}", post.channel_id))
        })?;

        // Audit record first. The status write below must never be visible
        // without the record that caused it.
        let approval = Approval::new(
            post_id.to_string(),
            reviewer_id.to_string(),
            action,
            comment.clone(),
        );
        self.db.create_approval(&approval).await?;

        let new_status = next_status(
            post.status,
            channel.approval_policy,
            post.scheduled_at.is_some(),
            None,
            Some(action),
        );
        self.db.update_post_status(post_id, new_status).await?;

        info!(
            "Post {} {} by {} -> {}",
            post_id, action, reviewer_id, new_status
        );

        // In-app notice to the author
        self.events.emit(Event::ApprovalDecided {
            post_id: post_id.to_string(),
            author_id: post.author_id.clone(),
            reviewer_id: reviewer_id.to_string(),
            action,
            comment: comment.clone(),
        });

        // Webhook notification, detached. A delivery failure must not
        // affect the decision that was just committed.
        let notify_event = match action {
            ApprovalAction::Approved => NotifyEvent::Approved,
            ApprovalAction::Rejected => NotifyEvent::Rejected,
        };
        match self.db.webhooks_for_channel(&channel.id).await {
            Ok(webhooks) => {
                let targets = self.db.get_targets(post_id).await.unwrap_or_default();
                let payload = NotifyPayload::for_post(&post, &channel, &targets, comment);
                let notifier = self.notifier.clone();
                tokio::spawn(async move {
                    notifier.dispatch(notify_event, &webhooks, &payload).await;
                });
            }
            Err(e) => warn!("Failed to load webhooks for decision notification: {}", e),
        }

        // An approved post with a schedule goes straight into the queue
        if new_status == PostStatus::Scheduled {
            if let Some(scheduled_at) = post.scheduled_at {
                self.scheduler
                    .enqueue(post_id, scheduled_at, TriggerSource::Scheduler)
                    .await?;
                debug!("Enqueued publish job for approved post {}", post_id);
            }
        }

        Ok(new_status)
    }
}
