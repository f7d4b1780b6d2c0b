//! Outbound webhook notifications
//!
//! Delivers approval and publish events to the chat webhooks configured on a
//! channel. Delivery is strictly best-effort: all targets are POSTed
//! concurrently, failures are logged and never retried, and nothing here can
//! fail a pipeline transition.

use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CrosscastError, Result};
use crate::types::{Channel, PlatformTarget, Post, Webhook, WebhookKind};

/// Cap on content previews embedded in notification payloads
pub const PREVIEW_MAX_CHARS: usize = 200;

/// Notification event kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotifyEvent {
    PendingApproval,
    Approved,
    Rejected,
    Published,
}

impl NotifyEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Published => "published",
        }
    }
}

impl std::fmt::Display for NotifyEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payload describing the post an event refers to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyPayload {
    pub post_id: String,
    pub channel_id: String,
    pub channel_name: String,
    pub author_id: String,
    /// Truncated content preview, never longer than [`PREVIEW_MAX_CHARS`]
    pub preview: String,
    pub platforms: Vec<String>,
    /// Event-specific detail (reviewer comment, failure summary)
    pub detail: Option<String>,
}

impl NotifyPayload {
    /// Build a payload for a post and its targets
    pub fn for_post(
        post: &Post,
        channel: &Channel,
        targets: &[PlatformTarget],
        detail: Option<String>,
    ) -> Self {
        Self {
            post_id: post.id.clone(),
            channel_id: channel.id.clone(),
            channel_name: channel.name.clone(),
            author_id: post.author_id.clone(),
            preview: preview(&post.content),
            platforms: targets.iter().map(|t| t.platform.clone()).collect(),
            detail,
        }
    }
}

/// Truncate content for inclusion in a notification payload.
///
/// Caps at [`PREVIEW_MAX_CHARS`] characters on a character boundary and
/// appends an ellipsis when anything was cut.
pub fn preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_MAX_CHARS {
        return content.to_string();
    }
    let truncated: String = content.chars().take(PREVIEW_MAX_CHARS).collect();
    format!("{}...", truncated)
}

/// Fire-and-forget webhook dispatcher
#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
}

impl Notifier {
    /// Create a notifier with the given per-request timeout
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| CrosscastError::Notification(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self { client })
    }

    /// Deliver an event to every webhook target, concurrently.
    ///
    /// Failures are logged at warn level and swallowed; there is no delivery
    /// guarantee and no retry.
    pub async fn dispatch(&self, event: NotifyEvent, webhooks: &[Webhook], payload: &NotifyPayload) {
        if webhooks.is_empty() {
            debug!("No webhooks configured for channel {}", payload.channel_id);
            return;
        }

        let deliveries = webhooks.iter().map(|webhook| {
            let body = format_body(webhook.kind, event, payload);
            let client = self.client.clone();
            let url = webhook.url.clone();
            let kind = webhook.kind;

            async move {
                match client.post(&url).json(&body).send().await {
                    Ok(response) if response.status().is_success() => {
                        debug!("Delivered {} notification to {} webhook", event, kind.as_str());
                    }
                    Ok(response) => {
                        warn!(
                            "Webhook {} rejected {} notification: HTTP {}",
                            url,
                            event,
                            response.status()
                        );
                    }
                    Err(e) => {
                        warn!("Failed to deliver {} notification to {}: {}", event, url, e);
                    }
                }
            }
        });

        join_all(deliveries).await;
    }
}

/// Human-readable summary line for chat-style sinks
fn summary_line(event: NotifyEvent, payload: &NotifyPayload) -> String {
    let platforms = if payload.platforms.is_empty() {
        "no platforms".to_string()
    } else {
        payload.platforms.join(", ")
    };

    let mut line = match event {
        NotifyEvent::PendingApproval => format!(
            "[{}] Post by {} awaits approval ({}): {}",
            payload.channel_name, payload.author_id, platforms, payload.preview
        ),
        NotifyEvent::Approved => format!(
            "[{}] Post by {} was approved ({}): {}",
            payload.channel_name, payload.author_id, platforms, payload.preview
        ),
        NotifyEvent::Rejected => format!(
            "[{}] Post by {} was rejected ({}): {}",
            payload.channel_name, payload.author_id, platforms, payload.preview
        ),
        NotifyEvent::Published => format!(
            "[{}] Post by {} went live ({}): {}",
            payload.channel_name, payload.author_id, platforms, payload.preview
        ),
    };

    if let Some(detail) = &payload.detail {
        line.push_str(&format!(" ({})", detail));
    }

    line
}

/// Build the request body expected by the webhook's payload shape
fn format_body(kind: WebhookKind, event: NotifyEvent, payload: &NotifyPayload) -> serde_json::Value {
    match kind {
        WebhookKind::Slack => serde_json::json!({
            "text": summary_line(event, payload),
        }),
        WebhookKind::Discord => serde_json::json!({
            "content": summary_line(event, payload),
        }),
        WebhookKind::Generic => serde_json::json!({
            "event": event.as_str(),
            "post_id": payload.post_id,
            "channel_id": payload.channel_id,
            "channel_name": payload.channel_name,
            "author_id": payload.author_id,
            "preview": payload.preview,
            "platforms": payload.platforms,
            "detail": payload.detail,
        }),
    }
}
