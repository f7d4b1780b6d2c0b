//! Publisher abstraction
//!
//! The pipeline treats each social platform as an opaque publisher behind one
//! trait: given a post and a (platform, account) target, attempt to publish
//! and return the platform-assigned post id. Concrete integrations live in
//! the embedding application; this crate ships the trait, a name-keyed
//! registry, and a configurable mock for tests and demos.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{PlatformError, Result};
use crate::types::{PlatformTarget, Post};

pub mod mock;

/// Unified interface to one social platform.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Lowercase platform identifier (e.g., "mastodon", "bluesky")
    fn name(&self) -> &str;

    /// Publish the post's content for this target.
    ///
    /// Implementations resolve the target's `account_id` to credentials on
    /// their own side and read platform-specific options from the target's
    /// settings blob via [`TargetSettings`].
    ///
    /// # Returns
    ///
    /// The platform-assigned post id.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` for credential problems,
    /// `PlatformError::Validation` when content violates platform rules, and
    /// `PlatformError::Publishing`/`Network` for delivery failures. Errors
    /// are captured per target by the publish worker and never abort the
    /// other targets of the same post.
    async fn publish(&self, post: &Post, target: &PlatformTarget) -> Result<String>;

    /// Validate content before publishing
    fn validate_content(&self, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(PlatformError::Validation("Content cannot be empty".to_string()).into());
        }
        if let Some(limit) = self.character_limit() {
            let len = content.chars().count();
            if len > limit {
                return Err(PlatformError::Validation(format!(
                    "Content exceeds {} character limit (got {} characters)",
                    limit, len
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Maximum characters per post, or `None` when the platform has no hard
    /// limit
    fn character_limit(&self) -> Option<usize> {
        None
    }
}

/// Name-keyed collection of publishers available to the worker.
#[derive(Default)]
pub struct PublisherRegistry {
    publishers: HashMap<String, Box<dyn Publisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a publisher under its own name. A later registration for the
    /// same name replaces the earlier one.
    pub fn register(&mut self, publisher: Box<dyn Publisher>) {
        self.publishers
            .insert(publisher.name().to_string(), publisher);
    }

    /// Look up the publisher for a platform name
    pub fn get(&self, platform: &str) -> Option<&dyn Publisher> {
        self.publishers.get(platform).map(|p| p.as_ref())
    }

    /// Names of all registered platforms
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.publishers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }

    /// Build a registry from configuration.
    ///
    /// Platform names listed under `[platforms] mock` get the built-in mock
    /// publisher; real integrations are registered by the embedding
    /// application before this registry is handed to the worker.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        for name in &config.platforms.mock {
            registry.register(Box::new(mock::MockPublisher::succeeding(name)));
        }
        registry
    }
}

/// Typed accessors over a target's platform-specific settings blob.
///
/// The pipeline carries settings as opaque JSON; publishers validate the
/// fields they need at their boundary instead of threading untyped values
/// through the core.
pub struct TargetSettings<'a>(Option<&'a serde_json::Value>);

impl<'a> TargetSettings<'a> {
    pub fn of(target: &'a PlatformTarget) -> Self {
        Self(target.settings.as_ref())
    }

    /// Optional string field
    pub fn get_str(&self, key: &str) -> Option<&'a str> {
        self.0.and_then(|v| v.get(key)).and_then(|v| v.as_str())
    }

    /// Optional boolean field
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.and_then(|v| v.get(key)).and_then(|v| v.as_bool())
    }

    /// Optional integer field
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.and_then(|v| v.get(key)).and_then(|v| v.as_i64())
    }

    /// Required string field; errors with a validation message naming the key
    pub fn require_str(&self, key: &str) -> Result<&'a str> {
        self.get_str(key).ok_or_else(|| {
            PlatformError::Validation(format!("Missing required setting: {}", key)).into()
        })
    }
}
