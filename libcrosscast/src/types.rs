//! Core types for Crosscast

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a post.
///
/// `Approved` without a scheduled time is a terminal manual-publish state;
/// with a scheduled time the post moves straight to `Scheduled`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    PendingApproval,
    Approved,
    Rejected,
    Scheduled,
    Publishing,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Scheduled => "scheduled",
            Self::Publishing => "publishing",
            Self::Published => "published",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "pending_approval" => Some(Self::PendingApproval),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "scheduled" => Some(Self::Scheduled),
            "publishing" => Some(Self::Publishing),
            "published" => Some(Self::Published),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of content targeted at one channel, fanned out to one or more
/// platform accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    /// Base content, used for every platform without an explicit variant.
    pub content: String,
    /// Per-platform content overrides, keyed by platform name.
    pub variants: HashMap<String, String>,
    /// Opaque media references carried through to publishers and clones.
    pub media: Vec<String>,
    pub status: PostStatus,
    pub created_at: i64,
    pub scheduled_at: Option<i64>,
    pub published_at: Option<i64>,
    pub is_repeat: bool,
    pub repeat_interval_days: Option<i64>,
    /// Remaining occurrences after this one. `None` repeats forever.
    pub repeat_count: Option<i64>,
}

impl Post {
    pub fn new(channel_id: String, author_id: String, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel_id,
            author_id,
            content,
            variants: HashMap::new(),
            media: Vec::new(),
            status: PostStatus::Draft,
            created_at: chrono::Utc::now().timestamp(),
            scheduled_at: None,
            published_at: None,
            is_repeat: false,
            repeat_interval_days: None,
            repeat_count: None,
        }
    }

    /// Content to publish for the given platform, falling back to the base
    /// content when no variant exists.
    pub fn content_for(&self, platform: &str) -> &str {
        self.variants
            .get(platform)
            .map(String::as_str)
            .unwrap_or(&self.content)
    }
}

/// Outcome status of a single platform target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Pending,
    Published,
    Failed,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Published => "published",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "published" => Some(Self::Published),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One (platform, account) destination attached to a post.
///
/// Targets are attempted independently: one target's failure never blocks
/// another's attempt, and a target is mutated at most once per publish job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformTarget {
    /// Database row ID (None for new records)
    pub id: Option<i64>,
    pub post_id: String,
    /// Platform name (e.g., "mastodon", "bluesky")
    pub platform: String,
    /// Opaque account identifier resolved by the external publisher
    pub account_id: String,
    /// Platform-specific settings blob, validated at the publisher boundary
    pub settings: Option<serde_json::Value>,
    pub status: TargetStatus,
    /// Post ID assigned by the platform, once known
    pub external_id: Option<String>,
    pub error_message: Option<String>,
    pub published_at: Option<i64>,
}

impl PlatformTarget {
    /// Create a new pending target for a post
    pub fn new_pending(post_id: String, platform: String, account_id: String) -> Self {
        Self {
            id: None,
            post_id,
            platform,
            account_id,
            settings: None,
            status: TargetStatus::Pending,
            external_id: None,
            error_message: None,
            published_at: None,
        }
    }

    /// Mark the target as successfully published
    pub fn mark_published(&mut self, external_id: String, published_at: i64) {
        self.external_id = Some(external_id);
        self.published_at = Some(published_at);
        self.status = TargetStatus::Published;
        self.error_message = None;
    }

    /// Mark the target as failed with an error message
    pub fn mark_failed(&mut self, error_message: String) {
        self.status = TargetStatus::Failed;
        self.error_message = Some(error_message);
    }
}

/// Approval decision action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approved,
    Rejected,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable record of a human approval decision.
///
/// The approvals table is an append-only audit trail; only the latest
/// decision drives the current status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: Option<i64>,
    pub post_id: String,
    pub reviewer_id: String,
    pub action: ApprovalAction,
    pub comment: Option<String>,
    pub created_at: i64,
}

impl Approval {
    pub fn new(
        post_id: String,
        reviewer_id: String,
        action: ApprovalAction,
        comment: Option<String>,
    ) -> Self {
        Self {
            id: None,
            post_id,
            reviewer_id,
            action,
            comment,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Channel-level review policy applied when posts are created or edited.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalPolicy {
    /// Posts never require review
    None,
    /// Posts require review only when the author explicitly requests one
    Optional,
    /// Every non-draft post requires review
    Required,
}

impl ApprovalPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Optional => "optional",
            Self::Required => "required",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "optional" => Some(Self::Optional),
            "required" => Some(Self::Required),
            _ => None,
        }
    }
}

/// The tenant-level grouping that owns posts and platform connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub approval_policy: ApprovalPolicy,
    pub created_at: i64,
}

impl Channel {
    pub fn new(name: String, approval_policy: ApprovalPolicy) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            approval_policy,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Payload shape expected by a webhook target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WebhookKind {
    Slack,
    Discord,
    Generic,
}

impl WebhookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slack => "slack",
            Self::Discord => "discord",
            Self::Generic => "generic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "slack" => Some(Self::Slack),
            "discord" => Some(Self::Discord),
            "generic" => Some(Self::Generic),
            _ => None,
        }
    }
}

/// A configured outbound webhook target owned by a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: Option<i64>,
    pub channel_id: String,
    pub kind: WebhookKind,
    pub url: String,
}

/// What caused a job to be enqueued.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// Normal due-time fire
    Scheduler,
    /// Immediate re-publish or retry requested by a human
    Manual,
    /// Auto-generated next occurrence of a repeating post
    Repeat,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduler => "scheduler",
            Self::Manual => "manual",
            Self::Repeat => "repeat",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduler" => Some(Self::Scheduler),
            "manual" => Some(Self::Manual),
            "repeat" => Some(Self::Repeat),
            _ => None,
        }
    }
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Queue state of a scheduled job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Done,
    Canceled,
    /// Retries exhausted; the post was marked failed
    Exhausted,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
            Self::Canceled => "canceled",
            Self::Exhausted => "exhausted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "done" => Some(Self::Done),
            "canceled" => Some(Self::Canceled),
            "exhausted" => Some(Self::Exhausted),
            _ => None,
        }
    }
}

/// A deferred invocation of the publish worker for one post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: Option<i64>,
    pub post_id: String,
    pub due_at: i64,
    pub trigger: TriggerSource,
    pub attempts: i64,
    pub status: JobStatus,
}
