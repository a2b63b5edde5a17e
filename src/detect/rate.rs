// Message-rate anomaly detector: per-(tenant, actor) sliding window over
// message events.
//
// A flood of distinct short messages, a flood of identical messages, and a
// single heavily decorated message are different abuses, so each dimension
// has its own threshold. Checks run in a fixed priority; the first crossing
// wins.
//
// Verdicts computed from the whole window (message, duplicate, image, file
// spam) clear the window, since the history that triggered them has been
// acted on. Per-message verdicts (mentions, emojis) leave it in place.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::detect::window::{crossed, prune, Tracked, WindowKey, WindowStore};
use crate::events::MessageEvent;
use crate::policy::Policy;
use crate::verdict::{RecommendedAction, Verdict, Violation, ViolationReason};

#[derive(Debug, Clone)]
struct MessageEntry {
    at: DateTime<Utc>,
    content: String,
    images: u32,
    files: u32,
}

/// Recent messages for one actor.
#[derive(Debug, Default)]
pub struct MessageWindow {
    entries: VecDeque<MessageEntry>,
    last_seen: Option<DateTime<Utc>>,
}

impl MessageWindow {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Tracked for MessageWindow {
    fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }
}

pub struct MessageRateDetector {
    windows: Arc<WindowStore<MessageWindow>>,
}

impl MessageRateDetector {
    pub fn new(windows: Arc<WindowStore<MessageWindow>>) -> Self {
        Self { windows }
    }

    pub fn windows(&self) -> &Arc<WindowStore<MessageWindow>> {
        &self.windows
    }

    /// Number of messages currently retained for an actor.
    pub fn window_len(&self, tenant_id: &str, actor_id: &str) -> usize {
        self.windows
            .inspect(&WindowKey::new(tenant_id, actor_id), MessageWindow::len)
            .unwrap_or(0)
    }

    /// Record one message and check it against the tenant's rate limits.
    ///
    /// Exempt, elevated, or disabled cases return `Clean` without touching
    /// any window.
    pub fn observe(&self, policy: &Policy, event: &MessageEvent, now: DateTime<Utc>) -> Verdict {
        let limits = &policy.anti_spam;
        if !limits.enabled || event.elevated || policy.is_exempt(&event.actor_id) {
            return Verdict::Clean;
        }

        let key = WindowKey::new(&event.tenant_id, &event.actor_id);
        let hit = self.windows.with_window(key, |window| {
            window.entries.push_back(MessageEntry {
                at: now,
                content: event.content.clone(),
                images: event.image_count,
                files: event.attachment_count.saturating_sub(event.image_count),
            });
            window.last_seen = Some(now);
            prune(&mut window.entries, now, limits.window(), |e| e.at);

            let (reason, human, clears) = evaluate(policy, event, window)?;
            if clears {
                window.entries.clear();
            }
            Some((reason, human))
        });

        match hit {
            Some((reason, human)) => Verdict::Violation(Violation::new(
                reason,
                human,
                RecommendedAction::DeleteAndMute {
                    duration: limits.mute_duration(),
                },
            )),
            None => Verdict::Clean,
        }
    }
}

/// Priority-ordered threshold checks over an already-pruned window.
///
/// Returns the reason, a human-readable explanation, and whether the window
/// should be cleared.
fn evaluate(
    policy: &Policy,
    event: &MessageEvent,
    window: &MessageWindow,
) -> Option<(ViolationReason, String, bool)> {
    let limits = &policy.anti_spam;
    let seconds = limits.time_window as f64 / 1000.0;

    let count = window.entries.len();
    if crossed(count, limits.max_messages) {
        return Some((
            ViolationReason::MessageSpam,
            format!("Message spam detected ({count} messages in {seconds}s)"),
            true,
        ));
    }

    let duplicates = window
        .entries
        .iter()
        .filter(|e| e.content == event.content)
        .count();
    if crossed(duplicates, limits.max_duplicates) {
        return Some((
            ViolationReason::DuplicateSpam,
            format!("Duplicate message spam detected ({duplicates} identical messages)"),
            true,
        ));
    }

    if crossed(event.mention_count as usize, limits.max_mentions) {
        return Some((
            ViolationReason::MentionSpam,
            format!("Mention spam detected ({} mentions)", event.mention_count),
            false,
        ));
    }

    if crossed(event.emoji_count as usize, limits.max_emojis) {
        return Some((
            ViolationReason::EmojiSpam,
            format!("Emoji spam detected ({} emojis)", event.emoji_count),
            false,
        ));
    }

    if limits.image_spam {
        let images: u32 = window.entries.iter().map(|e| e.images).sum();
        if crossed(images as usize, limits.max_images) {
            return Some((
                ViolationReason::ImageSpam,
                format!("Image spam detected ({images} images in {seconds}s)"),
                true,
            ));
        }
    }

    if limits.file_spam {
        let files: u32 = window.entries.iter().map(|e| e.files).sum();
        if crossed(files as usize, limits.max_files) {
            return Some((
                ViolationReason::FileSpam,
                format!("File spam detected ({files} files in {seconds}s)"),
                true,
            ));
        }
    }

    None
}
