// Enforcement coordinator tests against the dry-run platform.
//
// The dry-run platform records every call, and can be told to fail or
// stall individual actions, so ordering, partial failure, and timeouts
// are all observable without a real chat platform.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};

use sentinel::db::{Database, MemoryDatabase};
use sentinel::detect::{ActionWindow, PrivilegedActionDetector, WindowStore};
use sentinel::enforce::{
    ActionKind, ActionOutcome, DryRunPlatform, EnforcementContext, EnforcementCoordinator,
    PlatformCall,
};
use sentinel::events::{MessageEvent, PrivilegedActionEvent, PrivilegedActionKind};
use sentinel::policy::{Policy, Punishment};
use sentinel::verdict::{RecommendedAction, Violation, ViolationReason};

const TIMEOUT: StdDuration = StdDuration::from_millis(200);

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

struct Harness {
    platform: Arc<DryRunPlatform>,
    windows: Arc<WindowStore<ActionWindow>>,
    coordinator: EnforcementCoordinator,
}

fn harness(platform: DryRunPlatform) -> Harness {
    let platform = Arc::new(platform);
    let windows = Arc::new(WindowStore::new());
    let coordinator = EnforcementCoordinator::new(platform.clone(), windows.clone(), TIMEOUT);
    Harness {
        platform,
        windows,
        coordinator,
    }
}

fn message_ctx() -> EnforcementContext {
    let mut event = MessageEvent::new("g1", "u1", "whatever");
    event.channel_id = "c1".into();
    event.message_id = "m1".into();
    EnforcementContext::from_message(&event)
}

fn action_ctx() -> EnforcementContext {
    EnforcementContext::from_action(&PrivilegedActionEvent::new(
        "g1",
        "u1",
        PrivilegedActionKind::Ban,
    ))
}

fn content_violation() -> Violation {
    Violation::new(
        ViolationReason::BlockedWord,
        "Blocked word detected",
        RecommendedAction::DeleteMessage,
    )
}

fn rate_violation() -> Violation {
    Violation::new(
        ViolationReason::MessageSpam,
        "Message spam detected (5 messages in 5s)",
        RecommendedAction::DeleteAndMute {
            duration: Duration::seconds(300),
        },
    )
}

fn nuke_violation(policy: &Policy) -> Violation {
    Violation::new(
        ViolationReason::BanNuke,
        "Banned 5 members rapidly",
        RecommendedAction::Punish {
            punishment: policy.anti_nuke.punishment,
            remove_roles: policy.anti_nuke.remove_roles,
            notify_user: policy.anti_nuke.notify_user,
            mute_duration: policy.anti_nuke.mute_duration(),
        },
    )
}

// ============================================================
// Content and rate
// ============================================================

#[tokio::test]
async fn content_violation_deletes_then_posts_short_advisory() {
    let h = harness(DryRunPlatform::new());
    let policy = Policy::for_tenant("g1", None);

    let result = h
        .coordinator
        .enforce(&policy, &content_violation(), &message_ctx())
        .await;

    assert!(result.fully_applied());
    assert!(!result.tracking_reset);
    let calls = h.platform.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[0].call,
        PlatformCall::DeleteMessage {
            channel_id: "c1".into(),
            message_id: "m1".into()
        }
    );
    match &calls[1].call {
        PlatformCall::Post {
            channel_id,
            advisory,
        } => {
            assert_eq!(channel_id.as_deref(), Some("c1"));
            assert_eq!(advisory.expires_after, Some(StdDuration::from_secs(5)));
            assert!(advisory.body.contains("Blocked word detected"));
        }
        other => panic!("expected an advisory, got {other:?}"),
    }
}

#[tokio::test]
async fn rate_violation_deletes_mutes_and_posts() {
    let h = harness(DryRunPlatform::new());
    let policy = Policy::for_tenant("g1", None);

    let result = h
        .coordinator
        .enforce(&policy, &rate_violation(), &message_ctx())
        .await;

    assert!(result.fully_applied());
    assert_eq!(
        h.platform.kinds(),
        vec![
            ActionKind::DeleteMessage,
            ActionKind::Mute,
            ActionKind::PostAdvisory
        ]
    );
    let calls = h.platform.calls();
    assert_eq!(
        calls[1].call,
        PlatformCall::Mute {
            actor_id: "u1".into(),
            duration: Duration::seconds(300)
        }
    );
    match &calls[2].call {
        PlatformCall::Post { advisory, .. } => {
            assert_eq!(advisory.expires_after, Some(StdDuration::from_secs(10)));
            assert!(advisory.body.contains("300s"));
        }
        other => panic!("expected an advisory, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_message_reference_skips_delete() {
    let h = harness(DryRunPlatform::new());
    let policy = Policy::for_tenant("g1", None);
    let ctx = EnforcementContext::from_message(&MessageEvent::new("g1", "u1", "x"));

    let result = h.coordinator.enforce(&policy, &content_violation(), &ctx).await;

    assert!(matches!(
        result.outcome_of(ActionKind::DeleteMessage),
        Some(ActionOutcome::Skipped(_))
    ));
    // The advisory is still attempted
    assert_eq!(h.platform.kinds(), vec![ActionKind::PostAdvisory]);
}

// ============================================================
// Privileged actions
// ============================================================

#[tokio::test]
async fn nuke_strips_notifies_bans_and_reports() {
    let h = harness(DryRunPlatform::new());
    let mut policy = Policy::for_tenant("g1", Some("Test Guild"));
    policy.log_channel = Some("mod-log".into());

    let result = h
        .coordinator
        .enforce(&policy, &nuke_violation(&policy), &action_ctx())
        .await;

    assert!(result.fully_applied());
    assert!(result.tracking_reset);
    assert_eq!(
        h.platform.kinds(),
        vec![
            ActionKind::StripRoles,
            ActionKind::DirectNotice,
            ActionKind::Ban,
            ActionKind::PostAdvisory
        ]
    );

    let calls = h.platform.calls();
    match &calls[1].call {
        PlatformCall::DirectNotice { text, .. } => {
            assert!(text.contains("banned"));
            assert!(text.contains("Test Guild"));
        }
        other => panic!("expected a direct notice, got {other:?}"),
    }
    match &calls[3].call {
        PlatformCall::Post {
            channel_id,
            advisory,
        } => {
            assert_eq!(channel_id.as_deref(), Some("mod-log"));
            assert_eq!(advisory.expires_after, None);
            assert!(advisory.body.contains("Banned 5 members rapidly"));
        }
        other => panic!("expected an advisory, got {other:?}"),
    }
}

#[tokio::test]
async fn strip_roles_punishment_strips_once() {
    let h = harness(DryRunPlatform::new());
    let mut policy = Policy::for_tenant("g1", None);
    policy.anti_nuke.punishment = Punishment::StripRoles;
    policy.anti_nuke.notify_user = false;

    h.coordinator
        .enforce(&policy, &nuke_violation(&policy), &action_ctx())
        .await;

    assert_eq!(
        h.platform.kinds(),
        vec![ActionKind::StripRoles, ActionKind::PostAdvisory]
    );
}

#[tokio::test]
async fn mute_punishment_uses_nuke_mute_time() {
    let h = harness(DryRunPlatform::new());
    let mut policy = Policy::for_tenant("g1", None);
    policy.anti_nuke.punishment = Punishment::Mute;
    policy.anti_nuke.remove_roles = false;
    policy.anti_nuke.notify_user = false;

    h.coordinator
        .enforce(&policy, &nuke_violation(&policy), &action_ctx())
        .await;

    assert_eq!(
        h.platform.calls()[0].call,
        PlatformCall::Mute {
            actor_id: "u1".into(),
            duration: Duration::hours(1)
        }
    );
}

#[tokio::test]
async fn exempt_actor_is_never_punished() {
    let h = harness(DryRunPlatform::new());
    let mut policy = Policy::for_tenant("g1", None);
    policy.owner_id = Some("u1".into());

    let result = h
        .coordinator
        .enforce(&policy, &nuke_violation(&policy), &action_ctx())
        .await;

    assert!(h.platform.calls().is_empty());
    assert!(matches!(
        result.outcome_of(ActionKind::Ban),
        Some(ActionOutcome::Skipped(_))
    ));
}

#[tokio::test]
async fn nuke_enforcement_clears_all_categories() {
    let h = harness(DryRunPlatform::new());
    let policy = Policy::for_tenant("g1", None);
    let detector = PrivilegedActionDetector::new(h.windows.clone(), None);

    detector.observe(
        &policy,
        &PrivilegedActionEvent::new("g1", "u1", PrivilegedActionKind::ChannelDelete),
        t0(),
    );
    detector.observe(
        &policy,
        &PrivilegedActionEvent::new("g1", "u1", PrivilegedActionKind::Kick),
        t0(),
    );

    h.coordinator
        .enforce(&policy, &nuke_violation(&policy), &action_ctx())
        .await;

    assert_eq!(detector.count("g1", "u1", PrivilegedActionKind::ChannelDelete), 0);
    assert_eq!(detector.count("g1", "u1", PrivilegedActionKind::Kick), 0);
}

// ============================================================
// Failures and timeouts
// ============================================================

#[tokio::test]
async fn failed_ban_is_recorded_and_tracking_still_resets() {
    let h = harness(DryRunPlatform::new().failing(ActionKind::Ban));
    let policy = Policy::for_tenant("g1", None);
    h.windows.with_window(
        sentinel::detect::WindowKey::new("g1", "u1"),
        |_| (),
    );

    let result = h
        .coordinator
        .enforce(&policy, &nuke_violation(&policy), &action_ctx())
        .await;

    assert!(!result.fully_applied());
    assert!(matches!(
        result.outcome_of(ActionKind::Ban),
        Some(ActionOutcome::Failed(_))
    ));
    // Advisory still attempted after the failure
    assert_eq!(
        result.outcome_of(ActionKind::PostAdvisory),
        Some(&ActionOutcome::Applied)
    );
    assert!(result.tracking_reset);
    assert!(h.windows.is_empty());
}

#[tokio::test]
async fn stalled_call_times_out_without_blocking_the_rest() {
    let h = harness(
        DryRunPlatform::new().stalling(ActionKind::Mute, StdDuration::from_secs(5)),
    );
    let policy = Policy::for_tenant("g1", None);

    let started = std::time::Instant::now();
    let result = h
        .coordinator
        .enforce(&policy, &rate_violation(), &message_ctx())
        .await;

    assert!(started.elapsed() < StdDuration::from_secs(4));
    assert_eq!(
        result.outcome_of(ActionKind::Mute),
        Some(&ActionOutcome::TimedOut)
    );
    assert_eq!(
        result.outcome_of(ActionKind::PostAdvisory),
        Some(&ActionOutcome::Applied)
    );
    assert!(!result.fully_applied());
}

#[tokio::test]
async fn every_run_is_audited() {
    let db = Arc::new(MemoryDatabase::new());
    let platform = Arc::new(DryRunPlatform::new().failing(ActionKind::DeleteMessage));
    let coordinator =
        EnforcementCoordinator::new(platform, Arc::new(WindowStore::new()), TIMEOUT)
            .with_audit(db.clone());
    let policy = Policy::for_tenant("g1", None);

    coordinator
        .enforce(&policy, &content_violation(), &message_ctx())
        .await;

    let records = db.recent_enforcements(Some("g1"), 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reason_code, "blocked_word");
    assert_eq!(records[0].actor_id, "u1");
    assert!(!records[0].fully_applied);
    assert!(records[0].actions_json.contains("\"failed\""));
}
