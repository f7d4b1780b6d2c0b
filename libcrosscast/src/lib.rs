//! Crosscast - scheduled publishing pipeline for social channels
//!
//! This library provides the core pipeline for scheduling posts, gating them
//! behind human approval, fanning publishes out to independent platform
//! accounts, regenerating recurring posts, and notifying chat webhooks of
//! approval and publish events.

pub mod approval;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod logging;
pub mod notify;
pub mod platforms;
pub mod repeat;
pub mod scheduler;
pub mod scheduling;
pub mod service;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use db::{Database, PostWithTargets};
pub use error::{CrosscastError, Result};
pub use types::{
    Approval, ApprovalAction, ApprovalPolicy, Channel, PlatformTarget, Post, PostStatus,
    ScheduledJob, TargetStatus, TriggerSource, Webhook, WebhookKind,
};
