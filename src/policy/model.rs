// Tenant policy: the per-tenant configuration every detector reads.
//
// Stored as camelCase JSON so dot paths read the way moderators type them
// (`antiSpam.maxMessages`). Every section carries `#[serde(default)]`, which
// gives deep-merge semantics for free: a stored document that only mentions
// a handful of fields loads with everything else at its default.

use anyhow::{anyhow, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Full policy for one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Policy {
    pub tenant_id: String,
    pub tenant_name: String,
    /// Tenant owner. Implicitly exempt from every detector.
    pub owner_id: Option<String>,
    /// Channel for durable anti-nuke advisories. When unset the platform
    /// picks its own system channel.
    pub log_channel: Option<String>,
    /// Actors exempt from all detectors.
    #[serde(alias = "whitelist")]
    pub exempt_users: Vec<String>,
    pub auto_mod: ContentRules,
    pub anti_spam: RateLimits,
    pub anti_nuke: NukeLimits,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            tenant_name: "Unknown Server".to_string(),
            owner_id: None,
            log_channel: None,
            exempt_users: Vec::new(),
            auto_mod: ContentRules::default(),
            anti_spam: RateLimits::default(),
            anti_nuke: NukeLimits::default(),
        }
    }
}

/// Content scanner rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContentRules {
    pub enabled: bool,
    /// Literal substrings, or `*` wildcard patterns matched against the whole message.
    pub blocked_words: Vec<String>,
    pub max_caps_percent: u32,
    pub max_caps_min_length: u32,
    pub block_links: bool,
    pub block_invites: bool,
    pub max_emojis: u32,
    pub max_mentions: u32,
    pub max_duplicates: u32,
    pub block_zalgo: bool,
    pub block_spoilers: bool,
    pub max_newlines: u32,
    pub repeated_chars: u32,
}

impl Default for ContentRules {
    fn default() -> Self {
        Self {
            enabled: true,
            blocked_words: Vec::new(),
            max_caps_percent: 70,
            max_caps_min_length: 10,
            block_links: false,
            block_invites: true,
            max_emojis: 10,
            max_mentions: 5,
            max_duplicates: 3,
            block_zalgo: true,
            block_spoilers: false,
            max_newlines: 15,
            repeated_chars: 10,
        }
    }
}

/// Message-rate thresholds. Durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimits {
    pub enabled: bool,
    pub max_messages: u32,
    pub time_window: u64,
    pub mute_time: u64,
    pub max_duplicates: u32,
    pub max_mentions: u32,
    pub max_emojis: u32,
    pub image_spam: bool,
    pub max_images: u32,
    pub file_spam: bool,
    pub max_files: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            enabled: true,
            max_messages: 5,
            time_window: 5_000,
            mute_time: 300_000,
            max_duplicates: 3,
            max_mentions: 5,
            max_emojis: 10,
            image_spam: true,
            max_images: 3,
            file_spam: true,
            max_files: 3,
        }
    }
}

impl RateLimits {
    pub fn window(&self) -> Duration {
        millis(self.time_window)
    }

    pub fn mute_duration(&self) -> Duration {
        millis(self.mute_time)
    }
}

/// Privileged-action thresholds. Durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NukeLimits {
    pub enabled: bool,
    pub max_channel_deletes: u32,
    pub max_role_deletes: u32,
    pub max_bans: u32,
    pub max_kicks: u32,
    pub time_window: u64,
    pub punishment: Punishment,
    pub mute_time: u64,
    /// Send the punished actor a direct notice.
    pub notify_user: bool,
    /// Strip the actor's roles before applying the punishment.
    pub remove_roles: bool,
}

impl Default for NukeLimits {
    fn default() -> Self {
        Self {
            enabled: true,
            max_channel_deletes: 3,
            max_role_deletes: 3,
            max_bans: 5,
            max_kicks: 5,
            time_window: 10_000,
            punishment: Punishment::Ban,
            mute_time: 3_600_000,
            notify_user: true,
            remove_roles: true,
        }
    }
}

impl NukeLimits {
    pub fn window(&self) -> Duration {
        millis(self.time_window)
    }

    pub fn mute_duration(&self) -> Duration {
        millis(self.mute_time)
    }
}

/// Punishment applied to an actor caught nuking a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Punishment {
    #[default]
    Ban,
    Kick,
    StripRoles,
    Mute,
}

impl Punishment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Punishment::Ban => "ban",
            Punishment::Kick => "kick",
            Punishment::StripRoles => "strip_roles",
            Punishment::Mute => "mute",
        }
    }
}

impl std::fmt::Display for Punishment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn millis(ms: u64) -> Duration {
    Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

impl Policy {
    /// Fresh defaults stamped with the tenant's identity.
    pub fn for_tenant(tenant_id: &str, tenant_name: Option<&str>) -> Self {
        let mut policy = Policy {
            tenant_id: tenant_id.to_string(),
            ..Default::default()
        };
        if let Some(name) = tenant_name {
            policy.tenant_name = name.to_string();
        }
        policy
    }

    /// Parse a stored document, deep-merging it against defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// True if the actor is the tenant owner or explicitly exempt.
    pub fn is_exempt(&self, actor_id: &str) -> bool {
        self.owner_id.as_deref() == Some(actor_id) || self.exempt_users.iter().any(|u| u == actor_id)
    }

    /// Look up a setting by dot path (e.g. `antiNuke.maxBans`).
    ///
    /// Returns `None` if any segment is missing. A present-but-unset
    /// optional field comes back as `Value::Null`.
    pub fn get_setting(&self, path: &str) -> Option<Value> {
        let root = serde_json::to_value(self).ok()?;
        let mut current = &root;
        for key in path.split('.') {
            current = current.as_object()?.get(key)?;
        }
        Some(current.clone())
    }

    /// Return a copy of this policy with the setting at `path` replaced.
    ///
    /// Intermediate sections are created as needed. Fails if the path is
    /// empty, names a field the schema doesn't have, or the value has the
    /// wrong type for that field. `tenantId` is the storage key and can't be
    /// changed.
    pub fn with_setting(&self, path: &str, value: Value) -> Result<Policy> {
        let keys: Vec<&str> = path.split('.').collect();
        if keys.iter().any(|k| k.is_empty()) {
            anyhow::bail!("invalid setting path '{path}'");
        }
        if keys[0] == "tenantId" {
            anyhow::bail!("'tenantId' is read-only");
        }
        let Some((last, parents)) = keys.split_last() else {
            anyhow::bail!("invalid setting path '{path}'");
        };

        let mut root = serde_json::to_value(self)?;
        let mut current = &mut root;
        for key in parents {
            let section = current
                .as_object_mut()
                .ok_or_else(|| anyhow!("'{key}' in '{path}' is not inside a section"))?;
            current = section
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        current
            .as_object_mut()
            .ok_or_else(|| anyhow!("parent of '{last}' in '{path}' is not a section"))?
            .insert(last.to_string(), value);

        let updated: Policy = serde_json::from_value(root)
            .map_err(|e| anyhow!("invalid value for '{path}': {e}"))?;

        // serde silently drops unknown keys, so check the path survived.
        if updated.get_setting(path).is_none() {
            anyhow::bail!("unknown setting '{path}'");
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_document_merges_with_defaults() {
        let policy = Policy::from_json(r#"{"antiSpam":{"maxMessages":2}}"#).unwrap();
        assert_eq!(policy.anti_spam.max_messages, 2);
        assert_eq!(policy.anti_spam.time_window, 5_000);
        assert_eq!(policy.anti_nuke, NukeLimits::default());
        assert_eq!(policy.auto_mod, ContentRules::default());
    }

    #[test]
    fn test_whitelist_alias_loads_exemptions() {
        let policy = Policy::from_json(r#"{"whitelist":["u1","u2"]}"#).unwrap();
        assert_eq!(policy.exempt_users, vec!["u1", "u2"]);
    }

    #[test]
    fn test_with_setting_updates_nested_field() {
        let policy = Policy::default();
        let updated = policy.with_setting("antiNuke.maxBans", json!(2)).unwrap();
        assert_eq!(updated.anti_nuke.max_bans, 2);
        assert_eq!(policy.anti_nuke.max_bans, 5);
    }

    #[test]
    fn test_with_setting_rejects_type_mismatch() {
        let err = Policy::default()
            .with_setting("antiSpam.maxMessages", json!("lots"))
            .unwrap_err();
        assert!(err.to_string().contains("antiSpam.maxMessages"));
    }

    #[test]
    fn test_with_setting_rejects_unknown_path() {
        assert!(Policy::default()
            .with_setting("antiSpam.bogus", json!(1))
            .is_err());
        assert!(Policy::default().with_setting("", json!(1)).is_err());
        assert!(Policy::default().with_setting("antiSpam..x", json!(1)).is_err());
    }

    #[test]
    fn test_with_setting_refuses_tenant_id() {
        let policy = Policy::for_tenant("g1", None);
        assert!(policy.with_setting("tenantId", json!("g2")).is_err());
        assert!(policy.with_setting("tenantName", json!("Renamed")).is_ok());
    }

    #[test]
    fn test_set_punishment_by_name() {
        let updated = Policy::default()
            .with_setting("antiNuke.punishment", json!("strip_roles"))
            .unwrap();
        assert_eq!(updated.anti_nuke.punishment, Punishment::StripRoles);
    }

    #[test]
    fn test_owner_is_implicitly_exempt() {
        let mut policy = Policy::for_tenant("g1", Some("Guild"));
        policy.owner_id = Some("owner".to_string());
        policy.exempt_users.push("helper".to_string());
        assert!(policy.is_exempt("owner"));
        assert!(policy.is_exempt("helper"));
        assert!(!policy.is_exempt("someone"));
    }

    #[test]
    fn test_get_setting_reports_unset_optional_as_null() {
        let policy = Policy::default();
        assert_eq!(policy.get_setting("ownerId"), Some(Value::Null));
        assert_eq!(policy.get_setting("antiSpam.muteTime"), Some(json!(300_000)));
        assert_eq!(policy.get_setting("nope.nothing"), None);
    }
}
