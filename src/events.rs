// Events: the tenant-scoped inputs the platform adapter hands to the engine.
//
// Events are immutable and consumed exactly once. The adapter is responsible
// for filling in derived counts (mentions, attachments); an absent emoji count
// is derived from the content on deserialize. `validate`
// rejects structurally broken events at the boundary so detectors never have
// to second-guess their input.

use std::sync::LazyLock;

use anyhow::Result;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// A single event observed on the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    Message(MessageEvent),
    PrivilegedAction(PrivilegedActionEvent),
}

impl Event {
    pub fn tenant_id(&self) -> &str {
        match self {
            Event::Message(m) => &m.tenant_id,
            Event::PrivilegedAction(p) => &p.tenant_id,
        }
    }

    pub fn actor_id(&self) -> &str {
        match self {
            Event::Message(m) => &m.actor_id,
            Event::PrivilegedAction(p) => &p.actor_id,
        }
    }

    /// Reject events that are missing required identity fields or carry
    /// inconsistent counts.
    pub fn validate(&self) -> Result<()> {
        if self.tenant_id().trim().is_empty() {
            anyhow::bail!("event is missing a tenant id");
        }
        if self.actor_id().trim().is_empty() {
            anyhow::bail!("event for tenant {} is missing an actor id", self.tenant_id());
        }
        if let Event::Message(m) = self {
            if m.image_count > m.attachment_count {
                anyhow::bail!(
                    "message {} reports {} images but only {} attachments",
                    m.message_id,
                    m.image_count,
                    m.attachment_count
                );
            }
        }
        Ok(())
    }
}

/// A chat message posted by an actor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "MessageFields")]
pub struct MessageEvent {
    pub tenant_id: String,
    pub actor_id: String,
    pub channel_id: String,
    pub message_id: String,
    pub content: String,
    pub mention_count: u32,
    pub emoji_count: u32,
    pub attachment_count: u32,
    /// Subset of `attachment_count` that are images.
    pub image_count: u32,
    /// Actor holds an administrator-equivalent permission in the tenant.
    pub elevated: bool,
}

/// Wire shape of a message; `emojiCount` is optional.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageFields {
    tenant_id: String,
    actor_id: String,
    #[serde(default)]
    channel_id: String,
    #[serde(default)]
    message_id: String,
    content: String,
    #[serde(default)]
    mention_count: u32,
    #[serde(default)]
    emoji_count: Option<u32>,
    #[serde(default)]
    attachment_count: u32,
    #[serde(default)]
    image_count: u32,
    #[serde(default)]
    elevated: bool,
}

impl From<MessageFields> for MessageEvent {
    fn from(f: MessageFields) -> Self {
        let emoji_count = f.emoji_count.unwrap_or_else(|| count_emojis(&f.content));
        Self {
            tenant_id: f.tenant_id,
            actor_id: f.actor_id,
            channel_id: f.channel_id,
            message_id: f.message_id,
            content: f.content,
            mention_count: f.mention_count,
            emoji_count,
            attachment_count: f.attachment_count,
            image_count: f.image_count,
            elevated: f.elevated,
        }
    }
}

impl MessageEvent {
    /// Build a message event, deriving the emoji count from the content.
    pub fn new(tenant_id: &str, actor_id: &str, content: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            actor_id: actor_id.to_string(),
            content: content.to_string(),
            emoji_count: count_emojis(content),
            ..Default::default()
        }
    }
}

/// A privileged administrative action taken by an actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivilegedActionEvent {
    pub tenant_id: String,
    pub actor_id: String,
    pub kind: PrivilegedActionKind,
}

impl PrivilegedActionEvent {
    pub fn new(tenant_id: &str, actor_id: &str, kind: PrivilegedActionKind) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            actor_id: actor_id.to_string(),
            kind,
        }
    }
}

/// Destructive administrative action categories tracked for anti-nuke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PrivilegedActionKind {
    ChannelDelete,
    RoleDelete,
    Ban,
    Kick,
    WebhookCreate,
}

impl PrivilegedActionKind {
    pub const ALL: [PrivilegedActionKind; 5] = [
        PrivilegedActionKind::ChannelDelete,
        PrivilegedActionKind::RoleDelete,
        PrivilegedActionKind::Ban,
        PrivilegedActionKind::Kick,
        PrivilegedActionKind::WebhookCreate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PrivilegedActionKind::ChannelDelete => "channelDelete",
            PrivilegedActionKind::RoleDelete => "roleDelete",
            PrivilegedActionKind::Ban => "ban",
            PrivilegedActionKind::Kick => "kick",
            PrivilegedActionKind::WebhookCreate => "webhookCreate",
        }
    }
}

impl std::fmt::Display for PrivilegedActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static CUSTOM_EMOJI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<a?:\w+:\d+>").expect("custom emoji pattern is valid")
});

/// Count emojis in message content.
///
/// Custom platform emoji (`<:name:id>` / `<a:name:id>`) count once each, as
/// does every code point in the pictograph block U+1F300..=U+1F9FF.
pub fn count_emojis(content: &str) -> u32 {
    let custom = CUSTOM_EMOJI.find_iter(content).count();
    let pictographs = content
        .chars()
        .filter(|c| ('\u{1F300}'..='\u{1F9FF}').contains(c))
        .count();
    (custom + pictographs) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_emojis_mixes_custom_and_unicode() {
        assert_eq!(count_emojis("hi <:wave:1234> <a:dance:99> 🎉🔥"), 4);
        assert_eq!(count_emojis("plain text :)"), 0);
    }

    #[test]
    fn test_validate_rejects_missing_ids() {
        let event = Event::Message(MessageEvent::new("", "u1", "hello"));
        assert!(event.validate().is_err());

        let event = Event::PrivilegedAction(PrivilegedActionEvent::new(
            "g1",
            " ",
            PrivilegedActionKind::Ban,
        ));
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_more_images_than_attachments() {
        let mut msg = MessageEvent::new("g1", "u1", "pics");
        msg.attachment_count = 1;
        msg.image_count = 2;
        assert!(Event::Message(msg).validate().is_err());
    }

    #[test]
    fn test_event_json_uses_type_tag() {
        let json = r#"{"type":"privilegedAction","tenantId":"g1","actorId":"u9","kind":"channelDelete"}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.tenant_id(), "g1");
        assert_eq!(
            event,
            Event::PrivilegedAction(PrivilegedActionEvent::new(
                "g1",
                "u9",
                PrivilegedActionKind::ChannelDelete
            ))
        );
    }

    #[test]
    fn test_missing_emoji_count_is_derived_from_content() {
        let json = r#"{"type":"message","tenantId":"g1","actorId":"u1","content":"🎉🔥 <:wave:1>"}"#;
        let Event::Message(msg) = serde_json::from_str::<Event>(json).unwrap() else {
            panic!("expected a message event");
        };
        assert_eq!(msg.emoji_count, 3);

        let json = r#"{"type":"message","tenantId":"g1","actorId":"u1","content":"🎉🔥","emojiCount":0}"#;
        let Event::Message(msg) = serde_json::from_str::<Event>(json).unwrap() else {
            panic!("expected a message event");
        };
        assert_eq!(msg.emoji_count, 0);
    }
}
