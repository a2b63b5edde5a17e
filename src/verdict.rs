// Verdicts: what a detector concluded about an event.
//
// Detectors return a Verdict synchronously; nothing here is persisted. The
// coordinator decides what to do from the violation's class and its
// recommended action.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::policy::Punishment;

/// Output of a detector.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Clean,
    Violation(Violation),
}

impl Verdict {
    pub fn is_violation(&self) -> bool {
        matches!(self, Verdict::Violation(_))
    }

    pub fn violation(&self) -> Option<&Violation> {
        match self {
            Verdict::Clean => None,
            Verdict::Violation(v) => Some(v),
        }
    }

    /// The stable reason code, if this is a violation.
    pub fn code(&self) -> Option<&'static str> {
        self.violation().map(|v| v.reason.code())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub reason: ViolationReason,
    /// Short sentence shown in advisories and audit reasons.
    pub human_reason: String,
    pub action: RecommendedAction,
}

impl Violation {
    pub fn new(reason: ViolationReason, human_reason: impl Into<String>, action: RecommendedAction) -> Self {
        Self {
            reason,
            human_reason: human_reason.into(),
            action,
        }
    }
}

/// Which detector family a violation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationClass {
    Content,
    Rate,
    PrivilegedAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationReason {
    // Content scanner
    BlockedWord,
    ExcessiveCaps,
    InviteLink,
    LinkDetected,
    ExcessiveNewlines,
    RepeatedCharacters,
    ZalgoText,
    SpoilerText,
    // Message-rate detector
    MessageSpam,
    DuplicateSpam,
    MentionSpam,
    EmojiSpam,
    ImageSpam,
    FileSpam,
    // Privileged-action detector
    ChannelDeleteNuke,
    RoleDeleteNuke,
    BanNuke,
    KickNuke,
    WebhookNuke,
}

impl ViolationReason {
    pub fn code(&self) -> &'static str {
        match self {
            ViolationReason::BlockedWord => "blocked_word",
            ViolationReason::ExcessiveCaps => "excessive_caps",
            ViolationReason::InviteLink => "invite_link",
            ViolationReason::LinkDetected => "link_detected",
            ViolationReason::ExcessiveNewlines => "excessive_newlines",
            ViolationReason::RepeatedCharacters => "repeated_characters",
            ViolationReason::ZalgoText => "zalgo_text",
            ViolationReason::SpoilerText => "spoiler_text",
            ViolationReason::MessageSpam => "message_spam",
            ViolationReason::DuplicateSpam => "duplicate_spam",
            ViolationReason::MentionSpam => "mention_spam",
            ViolationReason::EmojiSpam => "emoji_spam",
            ViolationReason::ImageSpam => "image_spam",
            ViolationReason::FileSpam => "file_spam",
            ViolationReason::ChannelDeleteNuke => "channel_delete_nuke",
            ViolationReason::RoleDeleteNuke => "role_delete_nuke",
            ViolationReason::BanNuke => "ban_nuke",
            ViolationReason::KickNuke => "kick_nuke",
            ViolationReason::WebhookNuke => "webhook_nuke",
        }
    }

    pub fn class(&self) -> ViolationClass {
        match self {
            ViolationReason::BlockedWord
            | ViolationReason::ExcessiveCaps
            | ViolationReason::InviteLink
            | ViolationReason::LinkDetected
            | ViolationReason::ExcessiveNewlines
            | ViolationReason::RepeatedCharacters
            | ViolationReason::ZalgoText
            | ViolationReason::SpoilerText => ViolationClass::Content,
            ViolationReason::MessageSpam
            | ViolationReason::DuplicateSpam
            | ViolationReason::MentionSpam
            | ViolationReason::EmojiSpam
            | ViolationReason::ImageSpam
            | ViolationReason::FileSpam => ViolationClass::Rate,
            ViolationReason::ChannelDeleteNuke
            | ViolationReason::RoleDeleteNuke
            | ViolationReason::BanNuke
            | ViolationReason::KickNuke
            | ViolationReason::WebhookNuke => ViolationClass::PrivilegedAction,
        }
    }
}

impl std::fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// What the detector suggests the coordinator should do.
#[derive(Debug, Clone, PartialEq)]
pub enum RecommendedAction {
    /// Remove the offending message only.
    DeleteMessage,
    /// Remove the triggering message and time the actor out.
    DeleteAndMute { duration: Duration },
    /// Apply the tenant's anti-nuke punishment.
    Punish {
        punishment: Punishment,
        remove_roles: bool,
        notify_user: bool,
        mute_duration: Duration,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes_match_serde_names() {
        for reason in [
            ViolationReason::BlockedWord,
            ViolationReason::MessageSpam,
            ViolationReason::ChannelDeleteNuke,
            ViolationReason::ZalgoText,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.code()));
        }
    }

    #[test]
    fn test_reason_classes() {
        assert_eq!(ViolationReason::InviteLink.class(), ViolationClass::Content);
        assert_eq!(ViolationReason::EmojiSpam.class(), ViolationClass::Rate);
        assert_eq!(
            ViolationReason::WebhookNuke.class(),
            ViolationClass::PrivilegedAction
        );
    }

    #[test]
    fn test_clean_verdict_has_no_code() {
        assert_eq!(Verdict::Clean.code(), None);
        assert!(!Verdict::Clean.is_violation());
    }
}
