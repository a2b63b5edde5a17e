// Enforcement coordinator: turns a violation into platform actions.
//
// Each external call is bounded by `action_timeout`, logged on failure, and
// recorded as an ActionRecord. Nothing is retried. Tracking state is reset
// whether or not the actions succeeded, and every run lands in the audit
// trail when a database is attached.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::traits::{Advisory, PlatformActions};
use crate::db::models::EnforcementRecord;
use crate::db::Database;
use crate::detect::privileged::ActionWindow;
use crate::detect::window::{WindowKey, WindowStore};
use crate::events::{MessageEvent, PrivilegedActionEvent};
use crate::policy::{Policy, Punishment};
use crate::verdict::{RecommendedAction, Violation, ViolationClass, ViolationReason};

/// Content advisories disappear after this long.
pub const CONTENT_ADVISORY_TTL: StdDuration = StdDuration::from_secs(5);
/// Rate advisories disappear after this long.
pub const RATE_ADVISORY_TTL: StdDuration = StdDuration::from_secs(10);

/// Where a violation happened.
#[derive(Debug, Clone, PartialEq)]
pub struct EnforcementContext {
    pub tenant_id: String,
    pub actor_id: String,
    pub channel_id: Option<String>,
    pub message_id: Option<String>,
}

impl EnforcementContext {
    pub fn from_message(event: &MessageEvent) -> Self {
        Self {
            tenant_id: event.tenant_id.clone(),
            actor_id: event.actor_id.clone(),
            channel_id: non_empty(&event.channel_id),
            message_id: non_empty(&event.message_id),
        }
    }

    pub fn from_action(event: &PrivilegedActionEvent) -> Self {
        Self {
            tenant_id: event.tenant_id.clone(),
            actor_id: event.actor_id.clone(),
            channel_id: None,
            message_id: None,
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    DeleteMessage,
    Mute,
    Ban,
    Kick,
    StripRoles,
    DirectNotice,
    PostAdvisory,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::DeleteMessage => "delete_message",
            ActionKind::Mute => "mute",
            ActionKind::Ban => "ban",
            ActionKind::Kick => "kick",
            ActionKind::StripRoles => "strip_roles",
            ActionKind::DirectNotice => "direct_notice",
            ActionKind::PostAdvisory => "post_advisory",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ActionOutcome {
    Applied,
    Failed(String),
    TimedOut,
    /// Deliberately not attempted.
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRecord {
    pub action: ActionKind,
    pub outcome: ActionOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnforcementResult {
    pub tenant_id: String,
    pub actor_id: String,
    pub reason: ViolationReason,
    pub human_reason: String,
    pub actions: Vec<ActionRecord>,
    /// The coordinator cleared the actor's privileged-action windows. Rate
    /// windows are cleared by the detector itself.
    pub tracking_reset: bool,
}

impl EnforcementResult {
    /// No attempted action failed or timed out.
    pub fn fully_applied(&self) -> bool {
        self.actions.iter().all(|a| {
            matches!(a.outcome, ActionOutcome::Applied | ActionOutcome::Skipped(_))
        })
    }

    pub fn outcome_of(&self, action: ActionKind) -> Option<&ActionOutcome> {
        self.actions
            .iter()
            .find(|a| a.action == action)
            .map(|a| &a.outcome)
    }
}

pub struct EnforcementCoordinator {
    platform: Arc<dyn PlatformActions>,
    nuke_windows: Arc<WindowStore<ActionWindow>>,
    audit: Option<Arc<dyn Database>>,
    action_timeout: StdDuration,
}

impl EnforcementCoordinator {
    pub fn new(
        platform: Arc<dyn PlatformActions>,
        nuke_windows: Arc<WindowStore<ActionWindow>>,
        action_timeout: StdDuration,
    ) -> Self {
        Self {
            platform,
            nuke_windows,
            audit: None,
            action_timeout,
        }
    }

    /// Record every enforcement run in `db`.
    pub fn with_audit(mut self, db: Arc<dyn Database>) -> Self {
        self.audit = Some(db);
        self
    }

    pub async fn enforce(
        &self,
        policy: &Policy,
        violation: &Violation,
        ctx: &EnforcementContext,
    ) -> EnforcementResult {
        let (actions, tracking_reset) = match violation.reason.class() {
            ViolationClass::Content => (self.enforce_content(violation, ctx).await, false),
            ViolationClass::Rate => (self.enforce_rate(policy, violation, ctx).await, false),
            ViolationClass::PrivilegedAction => {
                let actions = self.enforce_privileged(policy, violation, ctx).await;
                // Every category, not just the one that tripped
                self.nuke_windows
                    .clear(&WindowKey::new(&ctx.tenant_id, &ctx.actor_id));
                (actions, true)
            }
        };

        let result = EnforcementResult {
            tenant_id: ctx.tenant_id.clone(),
            actor_id: ctx.actor_id.clone(),
            reason: violation.reason,
            human_reason: violation.human_reason.clone(),
            actions,
            tracking_reset,
        };

        info!(
            tenant = %result.tenant_id,
            actor = %result.actor_id,
            reason = %result.reason,
            fully_applied = result.fully_applied(),
            "Violation enforced"
        );

        self.record(&result).await;
        result
    }

    async fn enforce_content(
        &self,
        violation: &Violation,
        ctx: &EnforcementContext,
    ) -> Vec<ActionRecord> {
        let mut actions = vec![self.delete_origin(ctx).await];

        let advisory = Advisory::transient(
            "Auto-Moderation",
            format!(
                "A message from {} was removed. Reason: {}",
                ctx.actor_id, violation.human_reason
            ),
            CONTENT_ADVISORY_TTL,
        );
        actions.push(self.post(ctx, ctx.channel_id.as_deref(), &advisory).await);
        actions
    }

    async fn enforce_rate(
        &self,
        policy: &Policy,
        violation: &Violation,
        ctx: &EnforcementContext,
    ) -> Vec<ActionRecord> {
        let duration = match &violation.action {
            RecommendedAction::DeleteAndMute { duration } => *duration,
            _ => policy.anti_spam.mute_duration(),
        };

        let mut actions = vec![self.delete_origin(ctx).await];
        actions.push(
            self.run(
                ctx,
                ActionKind::Mute,
                self.platform
                    .mute(&ctx.tenant_id, &ctx.actor_id, duration, &violation.human_reason),
            )
            .await,
        );

        let advisory = Advisory::transient(
            "Anti-Spam Action",
            format!(
                "{} was timed out for {}. Reason: {}",
                ctx.actor_id,
                format_duration(duration),
                violation.human_reason
            ),
            RATE_ADVISORY_TTL,
        );
        actions.push(self.post(ctx, ctx.channel_id.as_deref(), &advisory).await);
        actions
    }

    async fn enforce_privileged(
        &self,
        policy: &Policy,
        violation: &Violation,
        ctx: &EnforcementContext,
    ) -> Vec<ActionRecord> {
        let (punishment, remove_roles, notify_user, mute_duration) = match &violation.action {
            RecommendedAction::Punish {
                punishment,
                remove_roles,
                notify_user,
                mute_duration,
            } => (*punishment, *remove_roles, *notify_user, *mute_duration),
            _ => (
                policy.anti_nuke.punishment,
                policy.anti_nuke.remove_roles,
                policy.anti_nuke.notify_user,
                policy.anti_nuke.mute_duration(),
            ),
        };

        if policy.is_exempt(&ctx.actor_id) {
            warn!(
                tenant = %ctx.tenant_id,
                actor = %ctx.actor_id,
                "Refusing to punish an exempt actor"
            );
            return vec![ActionRecord {
                action: punishment_action(punishment),
                outcome: ActionOutcome::Skipped("actor is exempt".to_string()),
            }];
        }

        let reason = format!("Anti-Nuke: {}", violation.human_reason);
        let mut actions = Vec::new();

        if remove_roles && punishment != Punishment::StripRoles {
            actions.push(
                self.run(
                    ctx,
                    ActionKind::StripRoles,
                    self.platform
                        .strip_roles(&ctx.tenant_id, &ctx.actor_id, &reason),
                )
                .await,
            );
        }

        // Before the punishment: a banned or kicked actor may no longer be reachable
        if notify_user {
            let notice = format!(
                "You were {} in {}. Reason: {}",
                punishment_verb(punishment),
                policy.tenant_name,
                violation.human_reason
            );
            actions.push(
                self.run(
                    ctx,
                    ActionKind::DirectNotice,
                    self.platform
                        .send_direct_notice(&ctx.tenant_id, &ctx.actor_id, &notice),
                )
                .await,
            );
        }

        let platform = &self.platform;
        let punish = async {
            match punishment {
                Punishment::Ban => platform.ban(&ctx.tenant_id, &ctx.actor_id, &reason).await,
                Punishment::Kick => platform.kick(&ctx.tenant_id, &ctx.actor_id, &reason).await,
                Punishment::StripRoles => {
                    platform
                        .strip_roles(&ctx.tenant_id, &ctx.actor_id, &reason)
                        .await
                }
                Punishment::Mute => {
                    platform
                        .mute(&ctx.tenant_id, &ctx.actor_id, mute_duration, &reason)
                        .await
                }
            }
        };
        actions.push(self.run(ctx, punishment_action(punishment), punish).await);

        let advisory = Advisory::durable(
            "Anti-Nuke Protection",
            format!(
                "Suspicious activity detected. {} was {}. Reason: {}",
                ctx.actor_id,
                punishment_verb(punishment),
                reason
            ),
        );
        actions.push(self.post(ctx, policy.log_channel.as_deref(), &advisory).await);
        actions
    }

    async fn delete_origin(&self, ctx: &EnforcementContext) -> ActionRecord {
        match (&ctx.channel_id, &ctx.message_id) {
            (Some(channel), Some(message)) => {
                self.run(
                    ctx,
                    ActionKind::DeleteMessage,
                    self.platform.delete_message(&ctx.tenant_id, channel, message),
                )
                .await
            }
            _ => ActionRecord {
                action: ActionKind::DeleteMessage,
                outcome: ActionOutcome::Skipped("no message reference".to_string()),
            },
        }
    }

    async fn post(
        &self,
        ctx: &EnforcementContext,
        channel_id: Option<&str>,
        advisory: &Advisory,
    ) -> ActionRecord {
        self.run(
            ctx,
            ActionKind::PostAdvisory,
            self.platform.post_message(&ctx.tenant_id, channel_id, advisory),
        )
        .await
    }

    /// Await one platform call under the action timeout.
    async fn run(
        &self,
        ctx: &EnforcementContext,
        action: ActionKind,
        call: impl Future<Output = anyhow::Result<()>>,
    ) -> ActionRecord {
        let outcome = match tokio::time::timeout(self.action_timeout, call).await {
            Ok(Ok(())) => ActionOutcome::Applied,
            Ok(Err(e)) => {
                warn!(
                    tenant = %ctx.tenant_id,
                    actor = %ctx.actor_id,
                    action = %action,
                    error = %e,
                    "Enforcement action failed"
                );
                ActionOutcome::Failed(e.to_string())
            }
            Err(_) => {
                warn!(
                    tenant = %ctx.tenant_id,
                    actor = %ctx.actor_id,
                    action = %action,
                    timeout_ms = self.action_timeout.as_millis() as u64,
                    "Enforcement action timed out"
                );
                ActionOutcome::TimedOut
            }
        };
        ActionRecord { action, outcome }
    }

    async fn record(&self, result: &EnforcementResult) {
        let Some(db) = &self.audit else {
            return;
        };

        let actions_json = match serde_json::to_string(&result.actions) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize enforcement actions");
                "[]".to_string()
            }
        };
        let record = EnforcementRecord {
            tenant_id: result.tenant_id.clone(),
            actor_id: result.actor_id.clone(),
            reason_code: result.reason.code().to_string(),
            human_reason: result.human_reason.clone(),
            fully_applied: result.fully_applied(),
            actions_json,
            enforced_at: Utc::now().to_rfc3339(),
        };

        if let Err(e) = db.record_enforcement(&record).await {
            warn!(
                tenant = %result.tenant_id,
                actor = %result.actor_id,
                error = %e,
                "Failed to write enforcement audit record"
            );
        }
    }
}

fn punishment_action(punishment: Punishment) -> ActionKind {
    match punishment {
        Punishment::Ban => ActionKind::Ban,
        Punishment::Kick => ActionKind::Kick,
        Punishment::StripRoles => ActionKind::StripRoles,
        Punishment::Mute => ActionKind::Mute,
    }
}

fn punishment_verb(punishment: Punishment) -> &'static str {
    match punishment {
        Punishment::Ban => "banned",
        Punishment::Kick => "kicked",
        Punishment::StripRoles => "stripped of all roles",
        Punishment::Mute => "muted",
    }
}

/// "300s", "1h", "90m" style rendering for advisories.
fn format_duration(d: Duration) -> String {
    let secs = d.num_seconds();
    if secs > 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs > 0 && secs % 60 == 0 && secs >= 600 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}
