//! In-process pipeline events
//!
//! Approval and publish progress fan out to in-app subscribers (author
//! notification feeds, dashboards, a CLI tailing a run) over a
//! `tokio::sync::broadcast` channel. Emitting never blocks: with no
//! subscribers an event is dropped on the floor, and a lagging subscriber
//! loses old events instead of stalling the pipeline.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::ApprovalAction;

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` bounds the per-subscriber backlog before old events drop.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Start receiving events emitted after this call.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Broadcast an event. Never blocks, never fails.
    pub fn emit(&self, event: Event) {
        // send() errs only when nobody is listening
        let _ = self.sender.send(event);
    }

    /// Active subscriber count, for diagnostics only.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Events emitted by the pipeline during operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A post entered review and awaits a decision
    ApprovalRequested {
        post_id: String,
        channel_id: String,
        author_id: String,
    },

    /// A reviewer decided on a post; this is the author's in-app notice
    ApprovalDecided {
        post_id: String,
        author_id: String,
        reviewer_id: String,
        action: ApprovalAction,
        comment: Option<String>,
    },

    /// A publish job claimed the post and began fan-out
    PublishStarted {
        post_id: String,
        platforms: Vec<String>,
    },

    /// Fan-out finished with at least one successful target
    PublishCompleted {
        post_id: String,
        results: Vec<TargetOutcome>,
    },

    /// Every target failed, or the job exhausted its retries
    PublishFailed { post_id: String, error: String },
}

/// Outcome of publishing to a single platform target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub platform: String,
    pub account_id: String,
    pub success: bool,
    pub external_id: Option<String>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit(Event::PublishStarted {
            post_id: "post-1".to_string(),
            platforms: vec!["mastodon".to_string()],
        });

        match rx.recv().await.unwrap() {
            Event::PublishStarted { post_id, platforms } => {
                assert_eq!(post_id, "post-1");
                assert_eq!(platforms, vec!["mastodon"]);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let bus = EventBus::new(8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(Event::ApprovalRequested {
            post_id: "post-2".to_string(),
            channel_id: "chan".to_string(),
            author_id: "author".to_string(),
        });

        for rx in [&mut rx1, &mut rx2] {
            assert!(matches!(
                rx.recv().await.unwrap(),
                Event::ApprovalRequested { .. }
            ));
        }
    }

    #[tokio::test]
    async fn emitting_without_subscribers_is_harmless() {
        let bus = EventBus::new(8);
        assert_eq!(bus.subscriber_count(), 0);

        bus.emit(Event::PublishFailed {
            post_id: "post-3".to_string(),
            error: "all targets failed".to_string(),
        });
    }

    #[tokio::test]
    async fn events_serialize_with_snake_case_tags() {
        let event = Event::ApprovalDecided {
            post_id: "post-4".to_string(),
            author_id: "author".to_string(),
            reviewer_id: "reviewer".to_string(),
            action: ApprovalAction::Rejected,
            comment: Some("tone".to_string()),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"approval_decided""#));
        assert!(json.contains(r#""action":"rejected""#));

        match serde_json::from_str::<Event>(&json).unwrap() {
            Event::ApprovalDecided { action, comment, .. } => {
                assert_eq!(action, ApprovalAction::Rejected);
                assert_eq!(comment, Some("tone".to_string()));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn completion_event_carries_per_target_outcomes() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit(Event::PublishCompleted {
            post_id: "post-5".to_string(),
            results: vec![TargetOutcome {
                platform: "mastodon".to_string(),
                account_id: "acct-1".to_string(),
                success: true,
                external_id: Some("ext-1".to_string()),
                error: None,
            }],
        });

        match rx.recv().await.unwrap() {
            Event::PublishCompleted { results, .. } => {
                assert_eq!(results.len(), 1);
                assert!(results[0].success);
                assert_eq!(results[0].external_id.as_deref(), Some("ext-1"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
