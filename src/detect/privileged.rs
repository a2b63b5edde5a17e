// Privileged-action anomaly detector ("anti-nuke").
//
// Tracks destructive administrative actions per (tenant, actor), one
// sliding window per category. Crossing any category's limit flags the
// actor; the coordinator then punishes them and clears every category for
// that actor, not just the one that tripped.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::detect::window::{crossed, prune, Tracked, WindowKey, WindowStore};
use crate::events::{PrivilegedActionEvent, PrivilegedActionKind};
use crate::policy::Policy;
use crate::verdict::{RecommendedAction, Verdict, Violation, ViolationReason};

/// Webhook creations within one window that count as a burst. Not
/// configurable per tenant.
pub const WEBHOOK_BURST: u32 = 3;

/// Per-category action timestamps for one actor.
#[derive(Debug, Default)]
pub struct ActionWindow {
    by_kind: HashMap<PrivilegedActionKind, VecDeque<DateTime<Utc>>>,
    last_seen: Option<DateTime<Utc>>,
}

impl ActionWindow {
    pub fn count(&self, kind: PrivilegedActionKind) -> usize {
        self.by_kind.get(&kind).map_or(0, VecDeque::len)
    }
}

impl Tracked for ActionWindow {
    fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }
}

pub struct PrivilegedActionDetector {
    windows: Arc<WindowStore<ActionWindow>>,
    /// The engine's own platform identity. Its actions are never tracked.
    self_id: Option<String>,
}

impl PrivilegedActionDetector {
    pub fn new(windows: Arc<WindowStore<ActionWindow>>, self_id: Option<String>) -> Self {
        Self { windows, self_id }
    }

    pub fn windows(&self) -> &Arc<WindowStore<ActionWindow>> {
        &self.windows
    }

    /// How many `kind` actions are currently retained for an actor.
    pub fn count(&self, tenant_id: &str, actor_id: &str, kind: PrivilegedActionKind) -> usize {
        self.windows
            .inspect(&WindowKey::new(tenant_id, actor_id), |w| w.count(kind))
            .unwrap_or(0)
    }

    /// Forget every category for an actor.
    pub fn clear(&self, tenant_id: &str, actor_id: &str) -> bool {
        self.windows.clear(&WindowKey::new(tenant_id, actor_id))
    }

    /// Record one privileged action and check the category's limit.
    pub fn observe(
        &self,
        policy: &Policy,
        event: &PrivilegedActionEvent,
        now: DateTime<Utc>,
    ) -> Verdict {
        let limits = &policy.anti_nuke;
        if !limits.enabled || policy.is_exempt(&event.actor_id) {
            return Verdict::Clean;
        }
        if self.self_id.as_deref() == Some(event.actor_id.as_str()) {
            debug!(tenant = %event.tenant_id, kind = %event.kind, "Ignoring our own action");
            return Verdict::Clean;
        }

        let key = WindowKey::new(&event.tenant_id, &event.actor_id);
        let count = self.windows.with_window(key, |window| {
            window.last_seen = Some(now);
            let stamps = window.by_kind.entry(event.kind).or_default();
            stamps.push_back(now);
            prune(stamps, now, limits.window(), |t| *t);
            stamps.len()
        });

        let (limit, reason, human) = match event.kind {
            PrivilegedActionKind::ChannelDelete => (
                limits.max_channel_deletes,
                ViolationReason::ChannelDeleteNuke,
                format!("Deleted {count} channels rapidly"),
            ),
            PrivilegedActionKind::RoleDelete => (
                limits.max_role_deletes,
                ViolationReason::RoleDeleteNuke,
                format!("Deleted {count} roles rapidly"),
            ),
            PrivilegedActionKind::Ban => (
                limits.max_bans,
                ViolationReason::BanNuke,
                format!("Banned {count} members rapidly"),
            ),
            PrivilegedActionKind::Kick => (
                limits.max_kicks,
                ViolationReason::KickNuke,
                format!("Kicked {count} members rapidly"),
            ),
            PrivilegedActionKind::WebhookCreate => (
                WEBHOOK_BURST,
                ViolationReason::WebhookNuke,
                format!("Created {count} webhooks rapidly"),
            ),
        };

        if !crossed(count, limit) {
            return Verdict::Clean;
        }

        Verdict::Violation(Violation::new(
            reason,
            human,
            RecommendedAction::Punish {
                punishment: limits.punishment,
                remove_roles: limits.remove_roles,
                notify_user: limits.notify_user,
                mute_duration: limits.mute_duration(),
            },
        ))
    }
}
