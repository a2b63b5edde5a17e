// Content policy scanner: stateless per-message inspection.
//
// Rules are an explicit ordered table evaluated first-match-wins, so the
// priority between e.g. a blocklisted phrase and a shouting message is a
// visible contract rather than an accident of code order. The scanner is
// pure: it returns a Verdict and the coordinator does any deleting.
//
// Order:
//   1. blocked_word          blocklist literal or `*` wildcard
//   2. excessive_caps        uppercase ratio on long-enough messages
//   3. invite_link           platform invite URLs
//   4. link_detected         any http(s) URL
//   5. excessive_newlines    newline flood
//   6. repeated_characters   one character repeated in a long run
//   7. zalgo_text            stacked combining marks
//   8. spoiler_text          ||spoiler|| markup

use std::sync::LazyLock;

use dashmap::DashMap;
use regex_lite::Regex;
use tracing::warn;

use crate::detect::window::crossed;
use crate::events::MessageEvent;
use crate::policy::{ContentRules, Policy};
use crate::verdict::{RecommendedAction, Verdict, Violation, ViolationReason};

static INVITE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(discord\.gg|discord\.com/invite|discordapp\.com/invite)/[a-z0-9]+")
        .expect("invite pattern is valid")
});

static ANY_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://\S+").expect("link pattern is valid"));

static SPOILER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\|\|.+?\|\|").expect("spoiler pattern is valid"));

/// Combining marks stacked on one base character before text counts as zalgo.
const ZALGO_MIN_MARKS: usize = 3;

type RuleCheck = fn(&ContentScanner, &ContentRules, &str) -> Option<String>;

/// One entry in the ordered rule table.
pub struct ContentRule {
    pub reason: ViolationReason,
    check: RuleCheck,
}

/// Evaluation order for the scanner. First match wins.
pub static RULES: [ContentRule; 8] = [
    ContentRule {
        reason: ViolationReason::BlockedWord,
        check: ContentScanner::check_blocked_words,
    },
    ContentRule {
        reason: ViolationReason::ExcessiveCaps,
        check: ContentScanner::check_caps,
    },
    ContentRule {
        reason: ViolationReason::InviteLink,
        check: ContentScanner::check_invites,
    },
    ContentRule {
        reason: ViolationReason::LinkDetected,
        check: ContentScanner::check_links,
    },
    ContentRule {
        reason: ViolationReason::ExcessiveNewlines,
        check: ContentScanner::check_newlines,
    },
    ContentRule {
        reason: ViolationReason::RepeatedCharacters,
        check: ContentScanner::check_repeated_chars,
    },
    ContentRule {
        reason: ViolationReason::ZalgoText,
        check: ContentScanner::check_zalgo,
    },
    ContentRule {
        reason: ViolationReason::SpoilerText,
        check: ContentScanner::check_spoilers,
    },
];

/// Blocklist scanner with a cache of compiled wildcard patterns.
#[derive(Default)]
pub struct ContentScanner {
    /// Lowercased wildcard pattern -> compiled regex (None if it failed to compile).
    wildcards: DashMap<String, Option<Regex>>,
}

impl ContentScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan one message against the tenant's content rules.
    pub fn scan(&self, policy: &Policy, event: &MessageEvent) -> Verdict {
        let rules = &policy.auto_mod;
        if !rules.enabled || event.elevated || policy.is_exempt(&event.actor_id) {
            return Verdict::Clean;
        }

        for rule in &RULES {
            if let Some(human_reason) = (rule.check)(self, rules, &event.content) {
                return Verdict::Violation(Violation::new(
                    rule.reason,
                    human_reason,
                    RecommendedAction::DeleteMessage,
                ));
            }
        }
        Verdict::Clean
    }

    /// Does `content` match a single blocklist entry?
    ///
    /// Literal entries match as case-insensitive substrings, so `ass` also
    /// matches inside `class`. Entries containing `*` are globs anchored to
    /// the whole message.
    pub fn matches_pattern(&self, pattern: &str, content: &str) -> bool {
        let pattern = pattern.to_lowercase();
        if pattern.is_empty() {
            return false;
        }
        if !pattern.contains('*') {
            return content.to_lowercase().contains(&pattern);
        }

        let compiled = self
            .wildcards
            .entry(pattern.clone())
            .or_insert_with(|| compile_wildcard(&pattern))
            .clone();
        compiled.is_some_and(|re| re.is_match(&content.to_lowercase()))
    }

    fn check_blocked_words(&self, rules: &ContentRules, content: &str) -> Option<String> {
        rules
            .blocked_words
            .iter()
            .any(|word| self.matches_pattern(word, content))
            .then(|| "Blocked word detected".to_string())
    }

    fn check_caps(&self, rules: &ContentRules, content: &str) -> Option<String> {
        let total = content.chars().count();
        if total == 0 || total < rules.max_caps_min_length as usize || rules.max_caps_percent == 0 {
            return None;
        }
        let upper = content.chars().filter(|c| c.is_uppercase()).count();
        let percent = upper as f64 / total as f64 * 100.0;
        (percent >= f64::from(rules.max_caps_percent))
            .then(|| format!("Excessive caps detected ({percent:.0}% uppercase)"))
    }

    fn check_invites(&self, rules: &ContentRules, content: &str) -> Option<String> {
        (rules.block_invites && INVITE_LINK.is_match(content))
            .then(|| "Invite link detected".to_string())
    }

    fn check_links(&self, rules: &ContentRules, content: &str) -> Option<String> {
        (rules.block_links && ANY_LINK.is_match(content)).then(|| "Link detected".to_string())
    }

    fn check_newlines(&self, rules: &ContentRules, content: &str) -> Option<String> {
        let newlines = content.matches('\n').count();
        crossed(newlines, rules.max_newlines)
            .then(|| format!("Too many line breaks ({newlines})"))
    }

    fn check_repeated_chars(&self, rules: &ContentRules, content: &str) -> Option<String> {
        let run = longest_run(content);
        crossed(run, rules.repeated_chars).then(|| format!("Repeated characters ({run} in a row)"))
    }

    fn check_zalgo(&self, rules: &ContentRules, content: &str) -> Option<String> {
        (rules.block_zalgo && has_zalgo(content)).then(|| "Zalgo text detected".to_string())
    }

    fn check_spoilers(&self, rules: &ContentRules, content: &str) -> Option<String> {
        (rules.block_spoilers && SPOILER.is_match(content)).then(|| "Spoiler text detected".to_string())
    }
}

fn compile_wildcard(pattern: &str) -> Option<Regex> {
    let body = regex_lite::escape(pattern).replace(r"\*", ".*");
    match Regex::new(&format!("(?is)^{body}$")) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(pattern, error = %e, "Ignoring blocklist pattern that failed to compile");
            None
        }
    }
}

/// Longest run of one repeated non-whitespace character.
fn longest_run(content: &str) -> usize {
    let mut best = 0;
    let mut current = 0;
    let mut prev: Option<char> = None;
    for c in content.chars() {
        if c.is_whitespace() {
            current = 0;
            prev = None;
            continue;
        }
        if prev == Some(c) {
            current += 1;
        } else {
            current = 1;
            prev = Some(c);
        }
        best = best.max(current);
    }
    best
}

fn is_combining_mark(c: char) -> bool {
    matches!(c,
        '\u{0300}'..='\u{036F}'
        | '\u{1AB0}'..='\u{1AFF}'
        | '\u{1DC0}'..='\u{1DFF}'
        | '\u{20D0}'..='\u{20FF}'
        | '\u{FE20}'..='\u{FE2F}')
}

fn has_zalgo(content: &str) -> bool {
    let mut stacked = 0;
    for c in content.chars() {
        if is_combining_mark(c) {
            stacked += 1;
            if stacked >= ZALGO_MIN_MARKS {
                return true;
            }
        } else {
            stacked = 0;
        }
    }
    false
}
