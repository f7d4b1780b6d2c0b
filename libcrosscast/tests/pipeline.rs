//! End-to-end pipeline tests
//!
//! Drives the full flow against a temp database with mock publishers:
//! creation under channel policy, the approval gate, due-job dispatch,
//! per-target fan-out with partial failure, repeat regeneration, and the
//! stale-job guard.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use libcrosscast::approval::ApprovalGate;
use libcrosscast::db::Database;
use libcrosscast::events::{Event, EventBus};
use libcrosscast::notify::Notifier;
use libcrosscast::platforms::mock::MockPublisher;
use libcrosscast::platforms::PublisherRegistry;
use libcrosscast::scheduler::{RetryPolicy, Scheduler};
use libcrosscast::service::{CreatePostRequest, EditPostRequest, PostService, RepeatSpec, TargetSpec};
use libcrosscast::types::{
    ApprovalAction, ApprovalPolicy, Channel, PostStatus, TargetStatus, TriggerSource,
};
use libcrosscast::worker::PublishWorker;
use tempfile::TempDir;

const POOL_SIZE: usize = 4;

struct Pipeline {
    _temp: TempDir,
    db: Database,
    scheduler: Scheduler,
    worker: PublishWorker,
    service: PostService,
    gate: ApprovalGate,
    events: EventBus,
}

async fn pipeline(registry: PublisherRegistry, publish_timeout: Duration) -> Pipeline {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("pipeline.db");
    let db = Database::new(&db_path.to_string_lossy()).await.unwrap();

    let scheduler = Scheduler::new(db.clone(), RetryPolicy::default());
    let notifier = Notifier::new(Duration::from_millis(200)).unwrap();
    let events = EventBus::new(64);

    let worker = PublishWorker::new(
        db.clone(),
        Arc::new(registry),
        scheduler.clone(),
        notifier.clone(),
        events.clone(),
        publish_timeout,
    );
    let service = PostService::new(db.clone(), scheduler.clone(), notifier.clone(), events.clone());
    let gate = ApprovalGate::new(db.clone(), scheduler.clone(), notifier, events.clone());

    Pipeline {
        _temp: temp,
        db,
        scheduler,
        worker,
        service,
        gate,
        events,
    }
}

async fn seed_channel(db: &Database, policy: ApprovalPolicy) -> Channel {
    let channel = Channel::new("acme-main".to_string(), policy);
    db.create_channel(&channel).await.unwrap();
    channel
}

fn two_platform_request(channel_id: &str, scheduled_at: i64) -> CreatePostRequest {
    CreatePostRequest {
        channel_id: channel_id.to_string(),
        author_id: "author-1".to_string(),
        content: "Launch day!".to_string(),
        variants: HashMap::new(),
        media: Vec::new(),
        targets: vec![
            TargetSpec {
                platform: "mastodon".to_string(),
                account_id: "acct-masto".to_string(),
                settings: None,
            },
            TargetSpec {
                platform: "bluesky".to_string(),
                account_id: "acct-bsky".to_string(),
                settings: None,
            },
        ],
        scheduled_at: Some(scheduled_at),
        draft: false,
        request_review: false,
        repeat: None,
    }
}

// SCENARIO A: scheduled post, no approval policy, both platforms succeed

#[tokio::test]
async fn test_scheduled_post_publishes_to_all_platforms() {
    let mut registry = PublisherRegistry::new();
    registry.register(Box::new(MockPublisher::succeeding("mastodon")));
    registry.register(Box::new(MockPublisher::succeeding("bluesky")));
    let p = pipeline(registry, Duration::from_secs(5)).await;

    let channel = seed_channel(&p.db, ApprovalPolicy::None).await;
    let due = chrono::Utc::now().timestamp() + 3600;
    let post = p
        .service
        .create_post(two_platform_request(&channel.id, due))
        .await
        .unwrap();

    assert_eq!(post.status, PostStatus::Scheduled);
    assert!(p.db.pending_job_for_post(&post.id).await.unwrap().is_some());

    // Before the due time nothing fires
    let dispatched = p
        .scheduler
        .tick(&p.worker, POOL_SIZE, due - 1)
        .await
        .unwrap();
    assert_eq!(dispatched, 0);

    let mut events = p.events.subscribe();

    // At the due time the job fires and both targets publish
    let dispatched = p.scheduler.tick(&p.worker, POOL_SIZE, due).await.unwrap();
    assert_eq!(dispatched, 1);

    let fetched = p.db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, PostStatus::Published);
    assert!(fetched.published_at.is_some());

    let targets = p.db.get_targets(&post.id).await.unwrap();
    assert_eq!(targets.len(), 2);
    for target in &targets {
        assert_eq!(target.status, TargetStatus::Published);
        assert!(target.external_id.is_some());
        assert!(target.published_at.is_some());
        assert_eq!(target.error_message, None);
    }

    // The job is settled and will not fire again
    assert!(p.db.pending_job_for_post(&post.id).await.unwrap().is_none());
    assert_eq!(p.scheduler.tick(&p.worker, POOL_SIZE, due).await.unwrap(), 0);

    // One completion event went out with both outcomes
    let mut saw_completed = false;
    while let Ok(event) = events.try_recv() {
        if let Event::PublishCompleted { post_id, results } = event {
            assert_eq!(post_id, post.id);
            assert_eq!(results.len(), 2);
            assert!(results.iter().all(|r| r.success));
            saw_completed = true;
        }
    }
    assert!(saw_completed, "expected a publish completion event");
}

// SCENARIO B: required policy forces review; approval schedules the job

#[tokio::test]
async fn test_required_policy_gates_then_schedules_on_approval() {
    let mut registry = PublisherRegistry::new();
    registry.register(Box::new(MockPublisher::succeeding("mastodon")));
    let p = pipeline(registry, Duration::from_secs(5)).await;

    let channel = seed_channel(&p.db, ApprovalPolicy::Required).await;

    // Created as a draft first
    let post = p
        .service
        .create_post(CreatePostRequest {
            channel_id: channel.id.clone(),
            author_id: "author-1".to_string(),
            content: "Needs sign-off".to_string(),
            variants: HashMap::new(),
            media: Vec::new(),
            targets: vec![TargetSpec {
                platform: "mastodon".to_string(),
                account_id: "acct-masto".to_string(),
                settings: None,
            }],
            scheduled_at: None,
            draft: true,
            request_review: false,
            repeat: None,
        })
        .await
        .unwrap();
    assert_eq!(post.status, PostStatus::Draft);

    // Editing it toward a schedule forces pending approval on this channel
    let due = chrono::Utc::now().timestamp() + 3600;
    let edited = p
        .service
        .edit_post(
            &post.id,
            EditPostRequest {
                scheduled_at: Some(Some(due)),
                resubmit: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(edited.status, PostStatus::PendingApproval);
    assert!(p.db.pending_job_for_post(&post.id).await.unwrap().is_none());

    // Approval moves it to scheduled and enqueues the job
    let new_status = p
        .gate
        .decide(&post.id, "reviewer-1", ApprovalAction::Approved, None)
        .await
        .unwrap();
    assert_eq!(new_status, PostStatus::Scheduled);

    let job = p.db.pending_job_for_post(&post.id).await.unwrap().unwrap();
    assert_eq!(job.due_at, due);

    // The audit trail precedes and matches the transition
    let approvals = p.db.get_approvals(&post.id).await.unwrap();
    assert_eq!(approvals.len(), 1);
    assert_eq!(approvals[0].action, ApprovalAction::Approved);
}

// SCENARIO C: partial failure with a timeout

#[tokio::test]
async fn test_partial_failure_with_timeout_still_publishes() {
    let mut registry = PublisherRegistry::new();
    registry.register(Box::new(MockPublisher::succeeding("mastodon")));
    // Slower than the worker's per-target timeout
    registry.register(Box::new(MockPublisher::with_delay(
        "bluesky",
        Duration::from_millis(500),
    )));
    let p = pipeline(registry, Duration::from_millis(100)).await;

    let channel = seed_channel(&p.db, ApprovalPolicy::None).await;
    let due = chrono::Utc::now().timestamp() - 1;
    let post = p
        .service
        .create_post(two_platform_request(&channel.id, due))
        .await
        .unwrap();

    p.scheduler
        .tick(&p.worker, POOL_SIZE, chrono::Utc::now().timestamp())
        .await
        .unwrap();

    // Mixed outcome surfaces as published overall
    let fetched = p.db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, PostStatus::Published);

    let targets = p.db.get_targets(&post.id).await.unwrap();
    let masto = targets.iter().find(|t| t.platform == "mastodon").unwrap();
    let bsky = targets.iter().find(|t| t.platform == "bluesky").unwrap();

    assert_eq!(masto.status, TargetStatus::Published);
    assert!(masto.external_id.is_some());

    assert_eq!(bsky.status, TargetStatus::Failed);
    assert_eq!(bsky.external_id, None);
    let error = bsky.error_message.as_ref().unwrap();
    assert!(error.contains("timed out"), "got: {}", error);
}

// All targets fail: the post fails, with per-target truth preserved

#[tokio::test]
async fn test_all_targets_failing_fails_the_post() {
    let mut registry = PublisherRegistry::new();
    registry.register(Box::new(MockPublisher::failing("mastodon", "instance down")));
    registry.register(Box::new(MockPublisher::failing("bluesky", "PDS unreachable")));
    let p = pipeline(registry, Duration::from_secs(5)).await;

    let channel = seed_channel(&p.db, ApprovalPolicy::None).await;
    let due = chrono::Utc::now().timestamp() - 1;
    let post = p
        .service
        .create_post(two_platform_request(&channel.id, due))
        .await
        .unwrap();

    let mut events = p.events.subscribe();
    p.scheduler
        .tick(&p.worker, POOL_SIZE, chrono::Utc::now().timestamp())
        .await
        .unwrap();

    let fetched = p.db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, PostStatus::Failed);
    assert_eq!(fetched.published_at, None);

    let targets = p.db.get_targets(&post.id).await.unwrap();
    assert!(targets.iter().all(|t| t.status == TargetStatus::Failed));
    assert!(targets.iter().all(|t| t.error_message.is_some()));

    // Per-target failure is final for this job: no retry is pending
    assert!(p.db.pending_job_for_post(&post.id).await.unwrap().is_none());

    let mut saw_failed = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, Event::PublishFailed { .. }) {
            saw_failed = true;
        }
    }
    assert!(saw_failed, "expected a publish failure event");
}

// SCENARIO D: repeat chain creates exactly one clone per cycle and stops

#[tokio::test]
async fn test_repeat_chain_terminates_after_final_count() {
    let mut registry = PublisherRegistry::new();
    registry.register(Box::new(MockPublisher::succeeding("mastodon")));
    let p = pipeline(registry, Duration::from_secs(5)).await;

    let channel = seed_channel(&p.db, ApprovalPolicy::None).await;
    let due = chrono::Utc::now().timestamp() - 1;

    let mut request = two_platform_request(&channel.id, due);
    request.targets.truncate(1);
    request.repeat = Some(RepeatSpec {
        interval_days: 7,
        count: Some(1),
    });
    let post = p.service.create_post(request).await.unwrap();

    p.scheduler
        .tick(&p.worker, POOL_SIZE, chrono::Utc::now().timestamp())
        .await
        .unwrap();

    // The original published and exactly one clone was scheduled 7 days out
    let original = p.db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(original.status, PostStatus::Published);

    let scheduled = p.db.posts_with_status(PostStatus::Scheduled, 50).await.unwrap();
    assert_eq!(scheduled.len(), 1, "exactly one repeat occurrence");
    let clone = &scheduled[0];
    assert_ne!(clone.id, post.id);
    assert_eq!(clone.scheduled_at, Some(due + 7 * 24 * 3600));
    assert_eq!(clone.repeat_count, Some(0));
    assert_eq!(clone.content, post.content);

    let clone_targets = p.db.get_targets(&clone.id).await.unwrap();
    assert_eq!(clone_targets.len(), 1);
    assert_eq!(clone_targets[0].status, TargetStatus::Pending);

    // Publish the clone at its own due time: no further occurrence appears
    let clone_due = clone.scheduled_at.unwrap();
    p.scheduler
        .tick(&p.worker, POOL_SIZE, clone_due)
        .await
        .unwrap();

    let published_clone = p.db.get_post(&clone.id).await.unwrap().unwrap();
    assert_eq!(published_clone.status, PostStatus::Published);

    let still_scheduled = p.db.posts_with_status(PostStatus::Scheduled, 50).await.unwrap();
    assert!(
        still_scheduled.is_empty(),
        "the final occurrence must not regenerate"
    );
}

// Stale jobs are no-ops: the status re-check absorbs races with edits

#[tokio::test]
async fn test_stale_job_is_a_noop() {
    let mock = MockPublisher::succeeding("mastodon");
    let (calls, _) = mock.probes();
    let mut registry = PublisherRegistry::new();
    registry.register(Box::new(mock));
    let p = pipeline(registry, Duration::from_secs(5)).await;

    let channel = seed_channel(&p.db, ApprovalPolicy::None).await;
    let due = chrono::Utc::now().timestamp() - 1;
    let post = p
        .service
        .create_post(two_platform_request(&channel.id, due))
        .await
        .unwrap();

    // The post is edited away from its schedulable status, but a stale job
    // row is planted as if the cancellation raced the queue
    p.service
        .edit_post(
            &post.id,
            EditPostRequest {
                scheduled_at: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    p.db.insert_job(&post.id, due, TriggerSource::Scheduler)
        .await
        .unwrap();

    p.scheduler
        .tick(&p.worker, POOL_SIZE, chrono::Utc::now().timestamp())
        .await
        .unwrap();

    // Nothing was published and nothing changed
    assert_eq!(*calls.lock().unwrap(), 0);
    let fetched = p.db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, PostStatus::Approved);
    let targets = p.db.get_targets(&post.id).await.unwrap();
    assert!(targets.iter().all(|t| t.status == TargetStatus::Pending));
}

#[tokio::test]
async fn test_duplicate_jobs_publish_once() {
    let mock = MockPublisher::succeeding("mastodon");
    let (calls, _) = mock.probes();
    let mut registry = PublisherRegistry::new();
    registry.register(Box::new(mock));
    let p = pipeline(registry, Duration::from_secs(5)).await;

    let channel = seed_channel(&p.db, ApprovalPolicy::None).await;
    let due = chrono::Utc::now().timestamp() - 1;

    let mut request = two_platform_request(&channel.id, due);
    request.targets.truncate(1);
    let post = p.service.create_post(request).await.unwrap();

    // A second job row for the same post (duplicate fire)
    p.db.insert_job(&post.id, due, TriggerSource::Scheduler)
        .await
        .unwrap();

    p.scheduler
        .tick(&p.worker, POOL_SIZE, chrono::Utc::now().timestamp())
        .await
        .unwrap();

    // Only one job claimed the post; the other aborted on the guard
    assert_eq!(*calls.lock().unwrap(), 1, "post must not publish twice");
    let fetched = p.db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, PostStatus::Published);
}

// Manual retry after partial failure re-attempts only the failed target

#[tokio::test]
async fn test_manual_retry_skips_already_published_targets() {
    let masto = MockPublisher::succeeding("mastodon");
    let (masto_calls, _) = masto.probes();
    let mut registry = PublisherRegistry::new();
    registry.register(Box::new(masto));
    registry.register(Box::new(MockPublisher::failing("bluesky", "PDS unreachable")));
    let p = pipeline(registry, Duration::from_secs(5)).await;

    let channel = seed_channel(&p.db, ApprovalPolicy::None).await;
    let due = chrono::Utc::now().timestamp() - 1;
    let post = p
        .service
        .create_post(two_platform_request(&channel.id, due))
        .await
        .unwrap();

    p.scheduler
        .tick(&p.worker, POOL_SIZE, chrono::Utc::now().timestamp())
        .await
        .unwrap();
    assert_eq!(*masto_calls.lock().unwrap(), 1);

    // Manual re-publish of the (published) post: queue a manual job
    let now = chrono::Utc::now().timestamp();
    p.db.insert_job(&post.id, now, TriggerSource::Manual)
        .await
        .unwrap();

    // A published post is not manual-retry eligible; guard absorbs it
    p.scheduler.tick(&p.worker, POOL_SIZE, now).await.unwrap();
    assert_eq!(
        *masto_calls.lock().unwrap(),
        1,
        "published post must not re-publish"
    );

    // Force the post back to failed, as an operator would for a dead post,
    // then manual retry attempts only the failed target
    p.db.update_post_status(&post.id, PostStatus::Failed)
        .await
        .unwrap();
    p.db.insert_job(&post.id, now, TriggerSource::Manual)
        .await
        .unwrap();
    p.scheduler.tick(&p.worker, POOL_SIZE, now).await.unwrap();

    assert_eq!(
        *masto_calls.lock().unwrap(),
        1,
        "already-published target must not be re-attempted"
    );
    let fetched = p.db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, PostStatus::Published);
}

// A post with no registered publisher records the failure per target

#[tokio::test]
async fn test_unregistered_platform_fails_cleanly() {
    let registry = PublisherRegistry::new();
    let p = pipeline(registry, Duration::from_secs(5)).await;

    let channel = seed_channel(&p.db, ApprovalPolicy::None).await;
    let due = chrono::Utc::now().timestamp() - 1;
    let mut request = two_platform_request(&channel.id, due);
    request.targets.truncate(1);
    let post = p.service.create_post(request).await.unwrap();

    p.scheduler
        .tick(&p.worker, POOL_SIZE, chrono::Utc::now().timestamp())
        .await
        .unwrap();

    let fetched = p.db.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, PostStatus::Failed);

    let targets = p.db.get_targets(&post.id).await.unwrap();
    assert_eq!(targets[0].status, TargetStatus::Failed);
    assert!(targets[0]
        .error_message
        .as_ref()
        .unwrap()
        .contains("No publisher registered"));
}

// Platform variants flow through the fan-out

#[tokio::test]
async fn test_variant_content_reaches_the_right_platform() {
    let masto = MockPublisher::succeeding("mastodon");
    let bsky = MockPublisher::succeeding("bluesky");
    let (_, masto_published) = masto.probes();
    let (_, bsky_published) = bsky.probes();
    let mut registry = PublisherRegistry::new();
    registry.register(Box::new(masto));
    registry.register(Box::new(bsky));
    let p = pipeline(registry, Duration::from_secs(5)).await;

    let channel = seed_channel(&p.db, ApprovalPolicy::None).await;
    let due = chrono::Utc::now().timestamp() - 1;
    let mut request = two_platform_request(&channel.id, due);
    request.variants.insert(
        "mastodon".to_string(),
        "Launch day! #fediverse".to_string(),
    );
    p.service.create_post(request).await.unwrap();

    p.scheduler
        .tick(&p.worker, POOL_SIZE, chrono::Utc::now().timestamp())
        .await
        .unwrap();

    assert_eq!(
        masto_published.lock().unwrap()[0].content,
        "Launch day! #fediverse"
    );
    assert_eq!(bsky_published.lock().unwrap()[0].content, "Launch day!");
}
