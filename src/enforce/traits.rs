// Platform actions trait: everything the coordinator is allowed to do to
// the outside world.
//
// Implementations talk to a real chat platform; DryRunPlatform logs and
// records calls for replays and tests. Every method is fallible and the
// coordinator bounds each call with a timeout, so implementations don't
// need their own.

use std::time::Duration as StdDuration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;

/// A notice posted to a channel after enforcement.
#[derive(Debug, Clone, PartialEq)]
pub struct Advisory {
    pub title: String,
    pub body: String,
    /// Remove the notice after this long. `None` keeps it.
    pub expires_after: Option<StdDuration>,
}

impl Advisory {
    pub fn transient(title: &str, body: String, expires_after: StdDuration) -> Self {
        Self {
            title: title.to_string(),
            body,
            expires_after: Some(expires_after),
        }
    }

    pub fn durable(title: &str, body: String) -> Self {
        Self {
            title: title.to_string(),
            body,
            expires_after: None,
        }
    }
}

#[async_trait]
pub trait PlatformActions: Send + Sync {
    async fn delete_message(&self, tenant_id: &str, channel_id: &str, message_id: &str)
        -> Result<()>;

    /// Time the actor out for `duration`.
    async fn mute(&self, tenant_id: &str, actor_id: &str, duration: Duration, reason: &str)
        -> Result<()>;

    async fn ban(&self, tenant_id: &str, actor_id: &str, reason: &str) -> Result<()>;

    async fn kick(&self, tenant_id: &str, actor_id: &str, reason: &str) -> Result<()>;

    /// Remove every role the actor holds.
    async fn strip_roles(&self, tenant_id: &str, actor_id: &str, reason: &str) -> Result<()>;

    /// Post an advisory. `channel_id = None` means the tenant's system
    /// channel, or whatever the platform picks as a fallback.
    async fn post_message(
        &self,
        tenant_id: &str,
        channel_id: Option<&str>,
        advisory: &Advisory,
    ) -> Result<()>;

    /// Send the actor a private notice.
    async fn send_direct_notice(&self, tenant_id: &str, actor_id: &str, text: &str)
        -> Result<()>;
}
