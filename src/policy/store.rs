// PolicyStore: per-tenant policy with lazy creation, deep-merge, and a
// write-through cache.
//
// Reads never fail: a missing tenant is created with defaults (and persisted
// immediately), and malformed stored data degrades to defaults with a
// warning. Availability beats strictness here because every incoming event
// needs a policy before any detector can run.
//
// Mutations and first loads are serialized behind one async lock; cached
// reads skip it. Documents are always saved under the store key, never under
// whatever `tenantId` the document claims.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::model::Policy;
use crate::db::Database;

pub struct PolicyStore {
    db: Arc<dyn Database>,
    cache: DashMap<String, Policy>,
    write_lock: Mutex<()>,
}

impl PolicyStore {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            cache: DashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.db
    }

    /// Get a tenant's policy, creating it with defaults if absent.
    pub async fn get(&self, tenant_id: &str) -> Policy {
        self.get_or_create(tenant_id, None).await
    }

    /// Like `get`, but records the tenant's display name on first creation.
    /// Called when the bot joins a new tenant.
    pub async fn ensure(&self, tenant_id: &str, tenant_name: &str) -> Policy {
        self.get_or_create(tenant_id, Some(tenant_name)).await
    }

    async fn get_or_create(&self, tenant_id: &str, tenant_name: Option<&str>) -> Policy {
        if let Some(cached) = self.cache.get(tenant_id) {
            return cached.clone();
        }
        // First loads take the write lock so a concurrent update can't be
        // overwritten by a slower load finishing after it.
        let _guard = self.write_lock.lock().await;
        self.cached_or_load(tenant_id, tenant_name).await
    }

    /// Caller must hold `write_lock`.
    async fn cached_or_load(&self, tenant_id: &str, tenant_name: Option<&str>) -> Policy {
        if let Some(cached) = self.cache.get(tenant_id) {
            return cached.clone();
        }

        match self.db.load_policy(tenant_id).await {
            Ok(Some(json)) => {
                let policy = match Policy::from_json(&json) {
                    Ok(mut policy) => {
                        if policy.tenant_id != tenant_id {
                            if !policy.tenant_id.is_empty() {
                                warn!(
                                    tenant = tenant_id,
                                    stored = %policy.tenant_id,
                                    "Stored policy names another tenant, using the row key"
                                );
                            }
                            policy.tenant_id = tenant_id.to_string();
                        }
                        policy
                    }
                    Err(e) => {
                        warn!(
                            tenant = tenant_id,
                            error = %e,
                            "Stored policy is malformed, falling back to defaults"
                        );
                        Policy::for_tenant(tenant_id, tenant_name)
                    }
                };
                self.cache.insert(tenant_id.to_string(), policy.clone());
                policy
            }
            Ok(None) => {
                let policy = Policy::for_tenant(tenant_id, tenant_name);
                match self.persist(tenant_id, &policy).await {
                    Ok(()) => info!(tenant = tenant_id, "Created default policy"),
                    Err(e) => warn!(
                        tenant = tenant_id,
                        error = %e,
                        "Failed to persist default policy"
                    ),
                }
                self.cache.insert(tenant_id.to_string(), policy.clone());
                policy
            }
            Err(e) => {
                // Not cached, so the next event retries the backend.
                warn!(
                    tenant = tenant_id,
                    error = %e,
                    "Failed to load policy, using defaults"
                );
                Policy::for_tenant(tenant_id, tenant_name)
            }
        }
    }

    async fn persist(&self, tenant_id: &str, policy: &Policy) -> anyhow::Result<()> {
        let json = policy.to_json()?;
        self.db.save_policy(tenant_id, &json).await
    }

    /// Apply `change` to the tenant's policy and persist it.
    ///
    /// `change` returns false to abort without saving. Returns true only if
    /// the change was applied and stored.
    async fn update<F>(&self, tenant_id: &str, change: F) -> bool
    where
        F: FnOnce(&mut Policy) -> bool,
    {
        let _guard = self.write_lock.lock().await;
        let mut policy = self.cached_or_load(tenant_id, None).await;
        if !change(&mut policy) {
            return false;
        }
        policy.tenant_id = tenant_id.to_string();
        if let Err(e) = self.persist(tenant_id, &policy).await {
            warn!(tenant = tenant_id, error = %e, "Failed to save policy");
            return false;
        }
        self.cache.insert(tenant_id.to_string(), policy);
        true
    }

    /// Update one setting by dot path (e.g. `antiSpam.maxMessages`).
    ///
    /// Returns false if the path is unknown, the value has the wrong type, or
    /// the save failed. The stored policy is unchanged in every false case.
    pub async fn set(&self, tenant_id: &str, path: &str, value: Value) -> bool {
        self.update(tenant_id, |policy| match policy.with_setting(path, value) {
            Ok(updated) => {
                debug!(tenant = tenant_id, path, "Policy setting updated");
                *policy = updated;
                true
            }
            Err(e) => {
                warn!(tenant = tenant_id, path, error = %e, "Rejected policy setting");
                false
            }
        })
        .await
    }

    /// Read one setting by dot path.
    pub async fn get_setting(&self, tenant_id: &str, path: &str) -> Option<Value> {
        self.get(tenant_id).await.get_setting(path)
    }

    /// True iff the actor is the tenant owner or on the exemption list.
    pub async fn is_exempt(&self, tenant_id: &str, actor_id: &str) -> bool {
        self.get(tenant_id).await.is_exempt(actor_id)
    }

    /// Add an actor to the exemption list. False if already present.
    pub async fn add_exemption(&self, tenant_id: &str, actor_id: &str) -> bool {
        self.update(tenant_id, |policy| {
            if policy.exempt_users.iter().any(|u| u == actor_id) {
                return false;
            }
            policy.exempt_users.push(actor_id.to_string());
            true
        })
        .await
    }

    /// Remove an actor from the exemption list. False if not present.
    pub async fn remove_exemption(&self, tenant_id: &str, actor_id: &str) -> bool {
        self.update(tenant_id, |policy| {
            let before = policy.exempt_users.len();
            policy.exempt_users.retain(|u| u != actor_id);
            policy.exempt_users.len() != before
        })
        .await
    }

    pub async fn clear_exemptions(&self, tenant_id: &str) -> bool {
        self.update(tenant_id, |policy| {
            policy.exempt_users.clear();
            true
        })
        .await
    }

    /// Add a blocklist entry. Entries are stored lowercased; false if the
    /// entry already exists.
    pub async fn add_blocked_word(&self, tenant_id: &str, word: &str) -> bool {
        let word = word.trim().to_lowercase();
        if word.is_empty() {
            return false;
        }
        self.update(tenant_id, |policy| {
            if policy.auto_mod.blocked_words.contains(&word) {
                return false;
            }
            policy.auto_mod.blocked_words.push(word);
            true
        })
        .await
    }

    /// Remove a blocklist entry. False if it wasn't there.
    pub async fn remove_blocked_word(&self, tenant_id: &str, word: &str) -> bool {
        let word = word.trim().to_lowercase();
        self.update(tenant_id, |policy| {
            let before = policy.auto_mod.blocked_words.len();
            policy.auto_mod.blocked_words.retain(|w| *w != word);
            policy.auto_mod.blocked_words.len() != before
        })
        .await
    }

    pub async fn blocked_words(&self, tenant_id: &str) -> Vec<String> {
        self.get(tenant_id).await.auto_mod.blocked_words
    }

    /// Forget a tenant entirely (the bot left it).
    pub async fn delete(&self, tenant_id: &str) -> bool {
        let _guard = self.write_lock.lock().await;
        self.cache.remove(tenant_id);
        match self.db.delete_policy(tenant_id).await {
            Ok(removed) => {
                if removed {
                    info!(tenant = tenant_id, "Deleted tenant policy");
                }
                removed
            }
            Err(e) => {
                warn!(tenant = tenant_id, error = %e, "Failed to delete tenant policy");
                false
            }
        }
    }

    /// Tenant ids with a stored policy.
    pub async fn tenants(&self) -> anyhow::Result<Vec<String>> {
        self.db.tenant_ids().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::EnforcementRecord;
    use crate::db::MemoryDatabase;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Delegates to a MemoryDatabase, but the first policy load stalls.
    struct SlowFirstLoad {
        inner: MemoryDatabase,
        stalled: AtomicBool,
    }

    #[async_trait]
    impl Database for SlowFirstLoad {
        async fn table_count(&self) -> anyhow::Result<i64> {
            self.inner.table_count().await
        }

        async fn load_policy(&self, tenant_id: &str) -> anyhow::Result<Option<String>> {
            let loaded = self.inner.load_policy(tenant_id).await;
            if !self.stalled.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            loaded
        }

        async fn save_policy(&self, tenant_id: &str, policy_json: &str) -> anyhow::Result<()> {
            self.inner.save_policy(tenant_id, policy_json).await
        }

        async fn delete_policy(&self, tenant_id: &str) -> anyhow::Result<bool> {
            self.inner.delete_policy(tenant_id).await
        }

        async fn tenant_ids(&self) -> anyhow::Result<Vec<String>> {
            self.inner.tenant_ids().await
        }

        async fn record_enforcement(&self, record: &EnforcementRecord) -> anyhow::Result<()> {
            self.inner.record_enforcement(record).await
        }

        async fn recent_enforcements(
            &self,
            tenant_id: Option<&str>,
            limit: u32,
        ) -> anyhow::Result<Vec<EnforcementRecord>> {
            self.inner.recent_enforcements(tenant_id, limit).await
        }
    }

    fn store() -> (Arc<MemoryDatabase>, PolicyStore) {
        let db = Arc::new(MemoryDatabase::new());
        let store = PolicyStore::new(db.clone());
        (db, store)
    }

    #[tokio::test]
    async fn test_get_creates_and_persists_defaults() {
        let (db, store) = store();
        let policy = store.get("g1").await;
        assert_eq!(policy.tenant_id, "g1");
        assert_eq!(policy.anti_spam.max_messages, 5);
        assert!(db.load_policy("g1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_malformed_document_degrades_to_defaults() {
        let (db, store) = store();
        db.save_policy("g1", "{not json").await.unwrap();
        let policy = store.get("g1").await;
        assert_eq!(policy, Policy::for_tenant("g1", None));
    }

    #[tokio::test]
    async fn test_set_persists_and_rejects_bad_values() {
        let (db, store) = store();
        assert!(store.set("g1", "antiNuke.maxBans", json!(2)).await);
        assert!(!store.set("g1", "antiNuke.maxBans", json!("two")).await);
        assert!(!store.set("g1", "antiNuke.nothing", json!(2)).await);

        assert_eq!(store.get_setting("g1", "antiNuke.maxBans").await, Some(json!(2)));
        let stored = Policy::from_json(&db.load_policy("g1").await.unwrap().unwrap()).unwrap();
        assert_eq!(stored.anti_nuke.max_bans, 2);
    }

    #[tokio::test]
    async fn test_blocked_words_are_lowercased_and_deduplicated() {
        let (_db, store) = store();
        assert!(store.add_blocked_word("g1", "FREE Nitro").await);
        assert!(!store.add_blocked_word("g1", "free nitro").await);
        assert_eq!(store.blocked_words("g1").await, vec!["free nitro"]);
        assert!(store.remove_blocked_word("g1", "Free Nitro").await);
        assert!(!store.remove_blocked_word("g1", "free nitro").await);
    }

    #[tokio::test]
    async fn test_exemption_management() {
        let (_db, store) = store();
        assert!(store.add_exemption("g1", "u1").await);
        assert!(!store.add_exemption("g1", "u1").await);
        assert!(store.is_exempt("g1", "u1").await);
        assert!(store.remove_exemption("g1", "u1").await);
        assert!(!store.is_exempt("g1", "u1").await);

        store.add_exemption("g1", "u2").await;
        assert!(store.clear_exemptions("g1").await);
        assert!(store.get("g1").await.exempt_users.is_empty());
    }

    #[tokio::test]
    async fn test_delete_drops_cache_and_row() {
        let (db, store) = store();
        store.set("g1", "antiSpam.maxMessages", json!(9)).await;
        assert!(store.delete("g1").await);
        assert!(db.load_policy("g1").await.unwrap().is_none());
        // Recreated fresh on next reference
        assert_eq!(store.get("g1").await.anti_spam.max_messages, 5);
    }

    #[tokio::test]
    async fn test_update_during_first_load_is_not_lost() {
        let db = Arc::new(SlowFirstLoad {
            inner: MemoryDatabase::new(),
            stalled: AtomicBool::new(false),
        });
        let store = PolicyStore::new(db.clone());

        let (first, changed) = tokio::join!(store.get("g1"), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            store.set("g1", "antiSpam.maxMessages", json!(9)).await
        });
        assert_eq!(first.anti_spam.max_messages, 5);
        assert!(changed);

        let stored = Policy::from_json(&db.load_policy("g1").await.unwrap().unwrap()).unwrap();
        assert_eq!(stored.anti_spam.max_messages, 9);
        assert_eq!(store.get("g1").await.anti_spam.max_messages, 9);
    }

    #[tokio::test]
    async fn test_tenant_id_cannot_be_redirected() {
        let (db, store) = store();
        assert!(!store.set("g1", "tenantId", json!("g2")).await);
        assert!(db.load_policy("g2").await.unwrap().is_none());
        assert_eq!(store.get("g1").await.tenant_id, "g1");
    }

    #[tokio::test]
    async fn test_mismatched_stored_tenant_id_saves_under_row_key() {
        let (db, store) = store();
        db.save_policy("g1", r#"{"tenantId":"g2"}"#).await.unwrap();
        assert_eq!(store.get("g1").await.tenant_id, "g1");

        assert!(store.add_exemption("g1", "u1").await);
        assert!(db.load_policy("g2").await.unwrap().is_none());
        let stored = Policy::from_json(&db.load_policy("g1").await.unwrap().unwrap()).unwrap();
        assert_eq!(stored.tenant_id, "g1");
        assert_eq!(stored.exempt_users, vec!["u1"]);
    }

    #[tokio::test]
    async fn test_ensure_records_name_on_first_creation_only() {
        let (db, store) = store();
        assert_eq!(store.ensure("g1", "Guild One").await.tenant_name, "Guild One");
        let stored = Policy::from_json(&db.load_policy("g1").await.unwrap().unwrap()).unwrap();
        assert_eq!(stored.tenant_name, "Guild One");

        // Already known: the stored name wins
        assert_eq!(store.ensure("g1", "Other").await.tenant_name, "Guild One");
        assert_eq!(store.get("g2").await.tenant_name, "Unknown Server");
    }
}
