//! Post lifecycle rules
//!
//! All status recomputation lives in one decision table so creation, editing,
//! and the approval gate cannot drift apart. Callers validate their inputs
//! (e.g. a schedule request needs a time) before consulting the table.

use crate::types::{ApprovalAction, ApprovalPolicy, PostStatus, TriggerSource};

/// Compute the next status of a post.
///
/// When `approval` is present it is an approval-gate decision and takes
/// precedence over the requested status. Otherwise the transition is a
/// create/edit: the channel policy may override the caller's request.
///
/// Statuses the pipeline assigns itself (`Publishing`, `Published`, `Failed`)
/// pass through unchanged; the service layer refuses them from callers.
pub fn next_status(
    current: PostStatus,
    policy: ApprovalPolicy,
    has_scheduled_at: bool,
    requested: Option<PostStatus>,
    approval: Option<ApprovalAction>,
) -> PostStatus {
    if let Some(action) = approval {
        return match action {
            ApprovalAction::Rejected => PostStatus::Rejected,
            ApprovalAction::Approved if has_scheduled_at => PostStatus::Scheduled,
            ApprovalAction::Approved => PostStatus::Approved,
        };
    }

    let requested = requested.unwrap_or(current);

    match requested {
        PostStatus::Draft => PostStatus::Draft,
        // Terminal decision states and pipeline-owned states pass through;
        // a rejected post re-enters the flow only on an explicit request.
        PostStatus::Rejected
        | PostStatus::Publishing
        | PostStatus::Published
        | PostStatus::Failed => requested,
        // A `required` channel intercepts every create/edit headed for the
        // pipeline.
        _ if policy == ApprovalPolicy::Required => PostStatus::PendingApproval,
        // An `optional` channel intercepts only an explicit review request.
        PostStatus::PendingApproval if policy == ApprovalPolicy::Optional => {
            PostStatus::PendingApproval
        }
        // Review requested on a channel with no reviewers: fall through to
        // the schedule path instead of parking the post forever.
        PostStatus::PendingApproval | PostStatus::Approved | PostStatus::Scheduled => {
            if has_scheduled_at {
                PostStatus::Scheduled
            } else {
                PostStatus::Approved
            }
        }
    }
}

/// Whether a post may be edited. Posts are immutable once publishing has
/// started.
pub fn can_edit(status: PostStatus) -> bool {
    !matches!(status, PostStatus::Published | PostStatus::Publishing)
}

/// Whether a job firing against a post in `status` may proceed to publish.
///
/// This is the idempotency guard: a stale or duplicate job finds the post in
/// an ineligible status and aborts without effect. A manual trigger may also
/// re-drive an approved (unscheduled) or failed post.
pub fn publish_eligible(status: PostStatus, trigger: TriggerSource) -> bool {
    match trigger {
        TriggerSource::Scheduler | TriggerSource::Repeat => {
            matches!(status, PostStatus::Scheduled)
        }
        TriggerSource::Manual => matches!(
            status,
            PostStatus::Scheduled | PostStatus::Approved | PostStatus::Failed
        ),
    }
}
