//! Repeat scheduling
//!
//! After a repeating post publishes successfully, the next occurrence is
//! derived as a brand-new post. The original row is never mutated into the
//! next cycle, so each occurrence keeps its own history.

use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::Result;
use crate::scheduler::Scheduler;
use crate::types::{PlatformTarget, Post, PostStatus, TriggerSource};

const SECONDS_PER_DAY: i64 = 24 * 3600;

/// Creates and enqueues the next occurrence of a repeating post.
pub struct RepeatScheduler {
    db: Database,
    scheduler: Scheduler,
}

impl RepeatScheduler {
    pub fn new(db: Database, scheduler: Scheduler) -> Self {
        Self { db, scheduler }
    }

    /// Derive and enqueue the next occurrence of `post`, if it repeats.
    ///
    /// The next due time is `scheduled_at + repeat_interval_days` in whole
    /// days, anchored on the planned time rather than the actual publish
    /// time so delayed publishes don't drift the time of day. A finite
    /// `repeat_count` is decremented on the clone; a count of zero creates
    /// nothing.
    ///
    /// Returns the clone when one was created.
    pub async fn schedule_next(&self, post: &Post) -> Result<Option<Post>> {
        if !post.is_repeat {
            return Ok(None);
        }

        let Some(interval_days) = post.repeat_interval_days else {
            warn!(
                "Repeating post {} has no repeat interval; skipping regeneration",
                post.id
            );
            return Ok(None);
        };

        if let Some(count) = post.repeat_count {
            if count <= 0 {
                debug!("Repeating post {} has no occurrences left", post.id);
                return Ok(None);
            }
        }

        let base = post
            .scheduled_at
            .unwrap_or_else(|| chrono::Utc::now().timestamp());
        let next_scheduled_at = base + interval_days * SECONDS_PER_DAY;

        let mut clone = Post::new(
            post.channel_id.clone(),
            post.author_id.clone(),
            post.content.clone(),
        );
        clone.variants = post.variants.clone();
        clone.media = post.media.clone();
        clone.status = PostStatus::Scheduled;
        clone.scheduled_at = Some(next_scheduled_at);
        clone.is_repeat = true;
        clone.repeat_interval_days = Some(interval_days);
        clone.repeat_count = post.repeat_count.map(|c| c - 1);

        self.db.create_post(&clone).await?;

        // Fresh pending targets for the same destinations
        for target in self.db.get_targets(&post.id).await? {
            let mut next_target = PlatformTarget::new_pending(
                clone.id.clone(),
                target.platform.clone(),
                target.account_id.clone(),
            );
            next_target.settings = target.settings.clone();
            self.db.create_target(&next_target).await?;
        }

        self.scheduler
            .enqueue(&clone.id, next_scheduled_at, TriggerSource::Repeat)
            .await?;

        info!(
            "Scheduled repeat of post {} as {} at {} ({} occurrence(s) remaining)",
            post.id,
            clone.id,
            next_scheduled_at,
            clone
                .repeat_count
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unlimited".to_string())
        );

        Ok(Some(clone))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::RetryPolicy;
    use crate::types::{ApprovalPolicy, Channel};
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Database, RepeatScheduler) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(&db_path.to_string_lossy()).await.unwrap();
        let scheduler = Scheduler::new(db.clone(), RetryPolicy::default());
        let repeat = RepeatScheduler::new(db.clone(), scheduler);
        (temp_dir, db, repeat)
    }

    async fn seed_repeating_post(
        db: &Database,
        interval_days: i64,
        count: Option<i64>,
    ) -> Post {
        let channel = Channel::new("chan".to_string(), ApprovalPolicy::None);
        db.create_channel(&channel).await.unwrap();

        let mut post = Post::new(
            channel.id.clone(),
            "author".to_string(),
            "weekly update".to_string(),
        );
        post.status = PostStatus::Published;
        post.scheduled_at = Some(1_700_000_000);
        post.is_repeat = true;
        post.repeat_interval_days = Some(interval_days);
        post.repeat_count = count;
        db.create_post(&post).await.unwrap();

        let mut target = PlatformTarget::new_pending(
            post.id.clone(),
            "mastodon".to_string(),
            "acct-1".to_string(),
        );
        target.settings = Some(serde_json::json!({ "visibility": "public" }));
        db.create_target(&target).await.unwrap();

        post
    }

    #[tokio::test]
    async fn test_non_repeating_post_creates_nothing() {
        let (_temp, db, repeat) = setup().await;
        let channel = Channel::new("chan".to_string(), ApprovalPolicy::None);
        db.create_channel(&channel).await.unwrap();
        let post = Post::new(channel.id, "author".to_string(), "one-off".to_string());
        db.create_post(&post).await.unwrap();

        let clone = repeat.schedule_next(&post).await.unwrap();
        assert!(clone.is_none());
    }

    #[tokio::test]
    async fn test_clone_scheduled_interval_days_later() {
        let (_temp, db, repeat) = setup().await;
        let post = seed_repeating_post(&db, 7, None).await;

        let clone = repeat.schedule_next(&post).await.unwrap().unwrap();

        assert_eq!(
            clone.scheduled_at,
            Some(1_700_000_000 + 7 * SECONDS_PER_DAY)
        );
        assert_eq!(clone.status, PostStatus::Scheduled);
        assert_eq!(clone.content, "weekly update");
        assert!(clone.is_repeat);
        assert_eq!(clone.repeat_count, None, "infinite repeat stays infinite");

        // The clone is a distinct row; the original is untouched
        assert_ne!(clone.id, post.id);
        let original = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(original.status, PostStatus::Published);
        assert_eq!(original.scheduled_at, Some(1_700_000_000));
    }

    #[tokio::test]
    async fn test_clone_carries_targets_as_pending() {
        let (_temp, db, repeat) = setup().await;
        let post = seed_repeating_post(&db, 7, None).await;

        let clone = repeat.schedule_next(&post).await.unwrap().unwrap();

        let targets = db.get_targets(&clone.id).await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].platform, "mastodon");
        assert_eq!(targets[0].account_id, "acct-1");
        assert_eq!(targets[0].status, crate::types::TargetStatus::Pending);
        assert_eq!(targets[0].external_id, None);
        assert_eq!(
            targets[0].settings.as_ref().unwrap()["visibility"],
            "public"
        );
    }

    #[tokio::test]
    async fn test_clone_enqueues_repeat_job() {
        let (_temp, db, repeat) = setup().await;
        let post = seed_repeating_post(&db, 2, None).await;

        let clone = repeat.schedule_next(&post).await.unwrap().unwrap();

        let job = db.pending_job_for_post(&clone.id).await.unwrap().unwrap();
        assert_eq!(job.due_at, 1_700_000_000 + 2 * SECONDS_PER_DAY);
        assert_eq!(job.trigger, TriggerSource::Repeat);
    }

    #[tokio::test]
    async fn test_finite_count_decrements() {
        let (_temp, _db, repeat) = setup().await;
        let post = seed_repeating_post(&repeat.db, 7, Some(3)).await;

        let clone = repeat.schedule_next(&post).await.unwrap().unwrap();
        assert_eq!(clone.repeat_count, Some(2));
    }

    #[tokio::test]
    async fn test_count_of_one_produces_final_clone() {
        let (_temp, db, repeat) = setup().await;
        let post = seed_repeating_post(&db, 7, Some(1)).await;

        let clone = repeat.schedule_next(&post).await.unwrap().unwrap();
        assert_eq!(clone.repeat_count, Some(0));

        // The final clone's own success produces no further occurrences
        let next = repeat.schedule_next(&clone).await.unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_missing_interval_skips_quietly() {
        let (_temp, db, repeat) = setup().await;
        let mut post = seed_repeating_post(&db, 7, None).await;
        post.repeat_interval_days = None;

        let clone = repeat.schedule_next(&post).await.unwrap();
        assert!(clone.is_none());
    }
}
