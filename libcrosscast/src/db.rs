//! Database operations for Crosscast

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::Row;
use std::path::Path;

use crate::error::{DbError, Result};
use crate::types::{
    Approval, ApprovalAction, ApprovalPolicy, Channel, JobStatus, PlatformTarget, Post,
    PostStatus, ScheduledJob, TargetStatus, TriggerSource, Webhook, WebhookKind,
};

/// A post with all its platform targets
#[derive(Debug, Clone)]
pub struct PostWithTargets {
    pub post: Post,
    pub targets: Vec<PlatformTarget>,
}

/// Per-status job counts for queue statistics
#[derive(Debug, Clone, Default)]
pub struct JobStats {
    pub pending: i64,
    pub done: i64,
    pub canceled: i64,
    pub exhausted: i64,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if necessary) the database at `db_path` and bring the
    /// schema up to date.
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded = shellexpand::tilde(db_path).to_string();
        if let Some(parent) = Path::new(&expanded).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(DbError::Io)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&expanded)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(DbError::Query)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::Migration)?;

        Ok(Self { pool })
    }

    /// Access the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ========================================================================
    // Channels
    // ========================================================================

    /// Create a new channel
    pub async fn create_channel(&self, channel: &Channel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO channels (id, name, approval_policy, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&channel.id)
        .bind(&channel.name)
        .bind(channel.approval_policy.as_str())
        .bind(channel.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(())
    }

    /// Get a channel by ID
    pub async fn get_channel(&self, channel_id: &str) -> Result<Option<Channel>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, approval_policy, created_at
            FROM channels WHERE id = ?
            "#,
        )
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(row.map(|r| Channel {
            id: r.get("id"),
            name: r.get("name"),
            approval_policy: ApprovalPolicy::parse(&r.get::<String, _>("approval_policy"))
                .unwrap_or(ApprovalPolicy::None),
            created_at: r.get("created_at"),
        }))
    }

    /// Add a webhook target to a channel
    pub async fn add_webhook(&self, webhook: &Webhook) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhooks (channel_id, kind, url)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&webhook.channel_id)
        .bind(webhook.kind.as_str())
        .bind(&webhook.url)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(result.last_insert_rowid())
    }

    /// Get all webhook targets for a channel
    pub async fn webhooks_for_channel(&self, channel_id: &str) -> Result<Vec<Webhook>> {
        let rows = sqlx::query(
            r#"
            SELECT id, channel_id, kind, url
            FROM webhooks WHERE channel_id = ?
            "#,
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(rows
            .iter()
            .map(|r| Webhook {
                id: r.get("id"),
                channel_id: r.get("channel_id"),
                kind: WebhookKind::parse(&r.get::<String, _>("kind"))
                    .unwrap_or(WebhookKind::Generic),
                url: r.get("url"),
            })
            .collect())
    }

    // ========================================================================
    // Posts
    // ========================================================================

    /// Create a new post
    pub async fn create_post(&self, post: &Post) -> Result<()> {
        let variants = if post.variants.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&post.variants).unwrap_or_default())
        };
        let media = if post.media.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&post.media).unwrap_or_default())
        };

        sqlx::query(
            r#"
            INSERT INTO posts (id, channel_id, author_id, content, variants, media, status,
                               created_at, scheduled_at, published_at, is_repeat,
                               repeat_interval_days, repeat_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.channel_id)
        .bind(&post.author_id)
        .bind(&post.content)
        .bind(variants)
        .bind(media)
        .bind(post.status.as_str())
        .bind(post.created_at)
        .bind(post.scheduled_at)
        .bind(post.published_at)
        .bind(post.is_repeat as i32)
        .bind(post.repeat_interval_days)
        .bind(post.repeat_count)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(())
    }

    /// Get a post by ID
    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT id, channel_id, author_id, content, variants, media, status,
                   created_at, scheduled_at, published_at, is_repeat,
                   repeat_interval_days, repeat_count
            FROM posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(row.map(row_to_post))
    }

    /// Update the mutable fields of a post (content, schedule, repeat settings)
    pub async fn update_post(&self, post: &Post) -> Result<()> {
        let variants = if post.variants.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&post.variants).unwrap_or_default())
        };
        let media = if post.media.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&post.media).unwrap_or_default())
        };

        sqlx::query(
            r#"
            UPDATE posts
            SET content = ?, variants = ?, media = ?, status = ?, scheduled_at = ?,
                is_repeat = ?, repeat_interval_days = ?, repeat_count = ?
            WHERE id = ?
            "#,
        )
        .bind(&post.content)
        .bind(variants)
        .bind(media)
        .bind(post.status.as_str())
        .bind(post.scheduled_at)
        .bind(post.is_repeat as i32)
        .bind(post.repeat_interval_days)
        .bind(post.repeat_count)
        .bind(&post.id)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(())
    }

    /// Update post status
    pub async fn update_post_status(&self, post_id: &str, status: PostStatus) -> Result<()> {
        sqlx::query("UPDATE posts SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;

        Ok(())
    }

    /// Mark a post published at the given time
    pub async fn set_post_published(&self, post_id: &str, published_at: i64) -> Result<()> {
        sqlx::query("UPDATE posts SET status = 'published', published_at = ? WHERE id = ?")
            .bind(published_at)
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;

        Ok(())
    }

    /// Atomically move a post into `publishing` if its current status is one
    /// of `eligible`.
    ///
    /// Returns false when the post was already claimed, edited away, or
    /// deleted; the caller must treat that as a no-op. This is the guard that
    /// makes duplicate and stale job executions harmless.
    pub async fn claim_post_publishing(
        &self,
        post_id: &str,
        eligible: &[PostStatus],
    ) -> Result<bool> {
        if eligible.is_empty() {
            return Ok(false);
        }

        let placeholders = vec!["?"; eligible.len()].join(", ");
        let sql = format!(
            "UPDATE posts SET status = 'publishing' WHERE id = ? AND status IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql).bind(post_id);
        for status in eligible {
            query = query.bind(status.as_str());
        }

        let result = query.execute(&self.pool).await.map_err(DbError::Query)?;

        Ok(result.rows_affected() > 0)
    }

    /// List posts with a given status, most recently created first
    pub async fn posts_with_status(&self, status: PostStatus, limit: usize) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"
            SELECT id, channel_id, author_id, content, variants, media, status,
                   created_at, scheduled_at, published_at, is_repeat,
                   repeat_interval_days, repeat_count
            FROM posts WHERE status = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(status.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(rows.into_iter().map(row_to_post).collect())
    }

    /// Get a post together with all its platform targets
    pub async fn get_post_with_targets(&self, post_id: &str) -> Result<Option<PostWithTargets>> {
        let post = match self.get_post(post_id).await? {
            Some(post) => post,
            None => return Ok(None),
        };
        let targets = self.get_targets(post_id).await?;
        Ok(Some(PostWithTargets { post, targets }))
    }

    /// Delete a post. Targets, approvals, and jobs cascade.
    pub async fn delete_post(&self, post_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;

        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Platform targets
    // ========================================================================

    /// Create a platform target for a post
    pub async fn create_target(&self, target: &PlatformTarget) -> Result<i64> {
        let settings = target
            .settings
            .as_ref()
            .map(|s| serde_json::to_string(s).unwrap_or_default());

        let result = sqlx::query(
            r#"
            INSERT INTO platform_targets (post_id, platform, account_id, settings, status,
                                          external_id, error_message, published_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&target.post_id)
        .bind(&target.platform)
        .bind(&target.account_id)
        .bind(settings)
        .bind(target.status.as_str())
        .bind(&target.external_id)
        .bind(&target.error_message)
        .bind(target.published_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(result.last_insert_rowid())
    }

    /// Get all platform targets for a post
    pub async fn get_targets(&self, post_id: &str) -> Result<Vec<PlatformTarget>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, platform, account_id, settings, status,
                   external_id, error_message, published_at
            FROM platform_targets
            WHERE post_id = ?
            ORDER BY id
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(rows
            .iter()
            .map(|r| PlatformTarget {
                id: r.get("id"),
                post_id: r.get("post_id"),
                platform: r.get("platform"),
                account_id: r.get("account_id"),
                settings: r
                    .get::<Option<String>, _>("settings")
                    .and_then(|s| serde_json::from_str(&s).ok()),
                status: TargetStatus::parse(&r.get::<String, _>("status"))
                    .unwrap_or(TargetStatus::Pending),
                external_id: r.get("external_id"),
                error_message: r.get("error_message"),
                published_at: r.get("published_at"),
            })
            .collect())
    }

    /// Record the outcome of a publish attempt on a target
    pub async fn update_target_outcome(&self, target: &PlatformTarget) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE platform_targets
            SET status = ?, external_id = ?, error_message = ?, published_at = ?
            WHERE id = ?
            "#,
        )
        .bind(target.status.as_str())
        .bind(&target.external_id)
        .bind(&target.error_message)
        .bind(target.published_at)
        .bind(target.id)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(())
    }

    // ========================================================================
    // Approvals
    // ========================================================================

    /// Append an approval record. The approvals table is append-only.
    pub async fn create_approval(&self, approval: &Approval) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO approvals (post_id, reviewer_id, action, comment, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&approval.post_id)
        .bind(&approval.reviewer_id)
        .bind(approval.action.as_str())
        .bind(&approval.comment)
        .bind(approval.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(result.last_insert_rowid())
    }

    /// Get all approval records for a post, oldest first
    pub async fn get_approvals(&self, post_id: &str) -> Result<Vec<Approval>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, reviewer_id, action, comment, created_at
            FROM approvals
            WHERE post_id = ?
            ORDER BY id
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(rows.iter().map(row_to_approval).collect())
    }

    /// Get the most recent approval decision for a post
    pub async fn latest_approval(&self, post_id: &str) -> Result<Option<Approval>> {
        let row = sqlx::query(
            r#"
            SELECT id, post_id, reviewer_id, action, comment, created_at
            FROM approvals
            WHERE post_id = ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(row.as_ref().map(row_to_approval))
    }

    // ========================================================================
    // Scheduled jobs
    // ========================================================================

    /// Insert a new pending job
    pub async fn insert_job(
        &self,
        post_id: &str,
        due_at: i64,
        trigger: TriggerSource,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO scheduled_jobs (post_id, due_at, trigger_source, attempts, status)
            VALUES (?, ?, ?, 0, 'pending')
            "#,
        )
        .bind(post_id)
        .bind(due_at)
        .bind(trigger.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(result.last_insert_rowid())
    }

    /// Get the pending job for a post, if one exists
    pub async fn pending_job_for_post(&self, post_id: &str) -> Result<Option<ScheduledJob>> {
        let row = sqlx::query(
            r#"
            SELECT id, post_id, due_at, trigger_source, attempts, status
            FROM scheduled_jobs
            WHERE post_id = ? AND status = 'pending'
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(row.as_ref().map(row_to_job))
    }

    /// Get pending jobs that are due at or before `now`
    pub async fn due_jobs(&self, now: i64, limit: usize) -> Result<Vec<ScheduledJob>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, due_at, trigger_source, attempts, status
            FROM scheduled_jobs
            WHERE status = 'pending' AND due_at <= ?
            ORDER BY due_at
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(rows.iter().map(row_to_job).collect())
    }

    /// Mark a job as completed
    pub async fn mark_job_done(&self, job_id: i64) -> Result<()> {
        sqlx::query("UPDATE scheduled_jobs SET status = 'done' WHERE id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;

        Ok(())
    }

    /// Push a job's due time out for a retry and record the attempt
    pub async fn reschedule_job(&self, job_id: i64, due_at: i64, attempts: i64) -> Result<()> {
        sqlx::query("UPDATE scheduled_jobs SET due_at = ?, attempts = ? WHERE id = ?")
            .bind(due_at)
            .bind(attempts)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;

        Ok(())
    }

    /// Mark a job as having exhausted its retries
    pub async fn mark_job_exhausted(&self, job_id: i64, attempts: i64) -> Result<()> {
        sqlx::query("UPDATE scheduled_jobs SET status = 'exhausted', attempts = ? WHERE id = ?")
            .bind(attempts)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;

        Ok(())
    }

    /// Cancel a single job
    pub async fn cancel_job(&self, job_id: i64) -> Result<()> {
        sqlx::query("UPDATE scheduled_jobs SET status = 'canceled' WHERE id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::Query)?;

        Ok(())
    }

    /// Cancel all pending jobs for a post. Returns the number canceled.
    pub async fn cancel_jobs_for_post(&self, post_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE scheduled_jobs SET status = 'canceled' WHERE post_id = ? AND status = 'pending'",
        )
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(result.rows_affected())
    }

    /// Count jobs by status for queue statistics
    pub async fn job_stats(&self) -> Result<JobStats> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS n
            FROM scheduled_jobs
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        let mut stats = JobStats::default();
        for row in rows {
            let n: i64 = row.get("n");
            match JobStatus::parse(&row.get::<String, _>("status")) {
                Some(JobStatus::Pending) => stats.pending = n,
                Some(JobStatus::Done) => stats.done = n,
                Some(JobStatus::Canceled) => stats.canceled = n,
                Some(JobStatus::Exhausted) => stats.exhausted = n,
                None => {}
            }
        }

        Ok(stats)
    }
}

fn row_to_post(r: sqlx::sqlite::SqliteRow) -> Post {
    Post {
        id: r.get("id"),
        channel_id: r.get("channel_id"),
        author_id: r.get("author_id"),
        content: r.get("content"),
        variants: r
            .get::<Option<String>, _>("variants")
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        media: r
            .get::<Option<String>, _>("media")
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        status: PostStatus::parse(&r.get::<String, _>("status")).unwrap_or(PostStatus::Draft),
        created_at: r.get("created_at"),
        scheduled_at: r.get("scheduled_at"),
        published_at: r.get("published_at"),
        is_repeat: r.get::<i32, _>("is_repeat") != 0,
        repeat_interval_days: r.get("repeat_interval_days"),
        repeat_count: r.get("repeat_count"),
    }
}

fn row_to_approval(r: &sqlx::sqlite::SqliteRow) -> Approval {
    Approval {
        id: r.get("id"),
        post_id: r.get("post_id"),
        reviewer_id: r.get("reviewer_id"),
        action: ApprovalAction::parse(&r.get::<String, _>("action"))
            .unwrap_or(ApprovalAction::Rejected),
        comment: r.get("comment"),
        created_at: r.get("created_at"),
    }
}

fn row_to_job(r: &sqlx::sqlite::SqliteRow) -> ScheduledJob {
    ScheduledJob {
        id: r.get("id"),
        post_id: r.get("post_id"),
        due_at: r.get("due_at"),
        trigger: TriggerSource::parse(&r.get::<String, _>("trigger_source"))
            .unwrap_or(TriggerSource::Scheduler),
        attempts: r.get("attempts"),
        status: JobStatus::parse(&r.get::<String, _>("status")).unwrap_or(JobStatus::Pending),
    }
}
