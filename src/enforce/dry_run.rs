// DryRunPlatform: a PlatformActions that only logs and records.
//
// Used by `sentinel replay` to show what would have happened, and by tests
// to assert on the exact calls made. Individual actions can be told to fail
// or to stall so error and timeout paths can be exercised.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;
use tracing::info;

use super::coordinator::ActionKind;
use super::traits::{Advisory, PlatformActions};

#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCall {
    DeleteMessage {
        channel_id: String,
        message_id: String,
    },
    Mute {
        actor_id: String,
        duration: Duration,
    },
    Ban {
        actor_id: String,
    },
    Kick {
        actor_id: String,
    },
    StripRoles {
        actor_id: String,
    },
    Post {
        channel_id: Option<String>,
        advisory: Advisory,
    },
    DirectNotice {
        actor_id: String,
        text: String,
    },
}

impl PlatformCall {
    pub fn kind(&self) -> ActionKind {
        match self {
            PlatformCall::DeleteMessage { .. } => ActionKind::DeleteMessage,
            PlatformCall::Mute { .. } => ActionKind::Mute,
            PlatformCall::Ban { .. } => ActionKind::Ban,
            PlatformCall::Kick { .. } => ActionKind::Kick,
            PlatformCall::StripRoles { .. } => ActionKind::StripRoles,
            PlatformCall::Post { .. } => ActionKind::PostAdvisory,
            PlatformCall::DirectNotice { .. } => ActionKind::DirectNotice,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub tenant_id: String,
    pub call: PlatformCall,
}

#[derive(Default)]
pub struct DryRunPlatform {
    calls: Mutex<Vec<RecordedCall>>,
    failing: HashSet<ActionKind>,
    stalls: HashMap<ActionKind, StdDuration>,
}

impl DryRunPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `action` call return an error.
    pub fn failing(mut self, action: ActionKind) -> Self {
        self.failing.insert(action);
        self
    }

    /// Make every `action` call sleep for `delay` before succeeding.
    pub fn stalling(mut self, action: ActionKind, delay: StdDuration) -> Self {
        self.stalls.insert(action, delay);
        self
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// The kinds of every call made so far, in order.
    pub fn kinds(&self) -> Vec<ActionKind> {
        self.calls().iter().map(|c| c.call.kind()).collect()
    }

    async fn perform(&self, tenant_id: &str, call: PlatformCall) -> Result<()> {
        let kind = call.kind();
        info!(tenant = %tenant_id, action = %kind, call = ?call, "Dry run");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                tenant_id: tenant_id.to_string(),
                call,
            });
        }

        if let Some(delay) = self.stalls.get(&kind) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&kind) {
            anyhow::bail!("{kind} rejected by platform");
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformActions for DryRunPlatform {
    async fn delete_message(
        &self,
        tenant_id: &str,
        channel_id: &str,
        message_id: &str,
    ) -> Result<()> {
        self.perform(
            tenant_id,
            PlatformCall::DeleteMessage {
                channel_id: channel_id.to_string(),
                message_id: message_id.to_string(),
            },
        )
        .await
    }

    async fn mute(
        &self,
        tenant_id: &str,
        actor_id: &str,
        duration: Duration,
        _reason: &str,
    ) -> Result<()> {
        self.perform(
            tenant_id,
            PlatformCall::Mute {
                actor_id: actor_id.to_string(),
                duration,
            },
        )
        .await
    }

    async fn ban(&self, tenant_id: &str, actor_id: &str, _reason: &str) -> Result<()> {
        self.perform(
            tenant_id,
            PlatformCall::Ban {
                actor_id: actor_id.to_string(),
            },
        )
        .await
    }

    async fn kick(&self, tenant_id: &str, actor_id: &str, _reason: &str) -> Result<()> {
        self.perform(
            tenant_id,
            PlatformCall::Kick {
                actor_id: actor_id.to_string(),
            },
        )
        .await
    }

    async fn strip_roles(&self, tenant_id: &str, actor_id: &str, _reason: &str) -> Result<()> {
        self.perform(
            tenant_id,
            PlatformCall::StripRoles {
                actor_id: actor_id.to_string(),
            },
        )
        .await
    }

    async fn post_message(
        &self,
        tenant_id: &str,
        channel_id: Option<&str>,
        advisory: &Advisory,
    ) -> Result<()> {
        self.perform(
            tenant_id,
            PlatformCall::Post {
                channel_id: channel_id.map(str::to_string),
                advisory: advisory.clone(),
            },
        )
        .await
    }

    async fn send_direct_notice(&self, tenant_id: &str, actor_id: &str, text: &str) -> Result<()> {
        self.perform(
            tenant_id,
            PlatformCall::DirectNotice {
                actor_id: actor_id.to_string(),
                text: text.to_string(),
            },
        )
        .await
    }
}
