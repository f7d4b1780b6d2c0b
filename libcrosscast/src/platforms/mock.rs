//! Configurable mock publisher
//!
//! Simulates a platform for integration tests and credential-free demos:
//! fixed success or failure, artificial latency for timeout testing, and an
//! optional character limit. Ships in all builds, matching how the rest of
//! the crate treats publishers as pluggable.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::platforms::Publisher;
use crate::types::{PlatformTarget, Post};

/// One successful publish captured by the mock.
#[derive(Debug, Clone)]
pub struct PublishRecord {
    pub post_id: String,
    pub account_id: String,
    pub content: String,
}

pub struct MockPublisher {
    name: String,
    failure: Option<String>,
    delay: Duration,
    character_limit: Option<usize>,
    calls: Arc<Mutex<usize>>,
    published: Arc<Mutex<Vec<PublishRecord>>>,
}

impl MockPublisher {
    /// A mock whose publishes always succeed.
    pub fn succeeding(name: &str) -> Self {
        Self {
            name: name.to_string(),
            failure: None,
            delay: Duration::ZERO,
            character_limit: None,
            calls: Arc::new(Mutex::new(0)),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A mock whose publishes always fail with `error`.
    pub fn failing(name: &str, error: &str) -> Self {
        Self {
            failure: Some(error.to_string()),
            ..Self::succeeding(name)
        }
    }

    /// A mock that sleeps for `delay` before answering, for timeout tests.
    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::succeeding(name)
        }
    }

    /// A mock that enforces a character limit.
    pub fn with_limit(name: &str, limit: usize) -> Self {
        Self {
            character_limit: Some(limit),
            ..Self::succeeding(name)
        }
    }

    /// How many publish calls this mock has seen.
    pub fn publish_call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    /// Every successful publish, in order.
    pub fn published(&self) -> Vec<PublishRecord> {
        self.published.lock().unwrap().clone()
    }

    /// Shared handles for asserting on calls after the mock is boxed away.
    #[allow(clippy::type_complexity)]
    pub fn probes(&self) -> (Arc<Mutex<usize>>, Arc<Mutex<Vec<PublishRecord>>>) {
        (Arc::clone(&self.calls), Arc::clone(&self.published))
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, post: &Post, target: &PlatformTarget) -> Result<String> {
        *self.calls.lock().unwrap() += 1;

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let content = post.content_for(&self.name);
        self.validate_content(content)?;

        if let Some(error) = &self.failure {
            return Err(PlatformError::Publishing(error.clone()).into());
        }

        self.published.lock().unwrap().push(PublishRecord {
            post_id: post.id.clone(),
            account_id: target.account_id.clone(),
            content: content.to_string(),
        });

        Ok(format!("{}:mock-{}", self.name, uuid::Uuid::new_v4()))
    }

    fn character_limit(&self) -> Option<usize> {
        self.character_limit
    }
}
