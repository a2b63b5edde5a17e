// MemoryDatabase: process-local storage for tests and dry runs.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::models::EnforcementRecord;
use super::traits::Database;

#[derive(Default)]
pub struct MemoryDatabase {
    policies: Mutex<BTreeMap<String, String>>,
    enforcements: Mutex<Vec<EnforcementRecord>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn table_count(&self) -> Result<i64> {
        Ok(0)
    }

    async fn load_policy(&self, tenant_id: &str) -> Result<Option<String>> {
        Ok(self.policies.lock().await.get(tenant_id).cloned())
    }

    async fn save_policy(&self, tenant_id: &str, policy_json: &str) -> Result<()> {
        self.policies
            .lock()
            .await
            .insert(tenant_id.to_string(), policy_json.to_string());
        Ok(())
    }

    async fn delete_policy(&self, tenant_id: &str) -> Result<bool> {
        Ok(self.policies.lock().await.remove(tenant_id).is_some())
    }

    async fn tenant_ids(&self) -> Result<Vec<String>> {
        Ok(self.policies.lock().await.keys().cloned().collect())
    }

    async fn record_enforcement(&self, record: &EnforcementRecord) -> Result<()> {
        self.enforcements.lock().await.push(record.clone());
        Ok(())
    }

    async fn recent_enforcements(
        &self,
        tenant_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<EnforcementRecord>> {
        let records = self.enforcements.lock().await;
        Ok(records
            .iter()
            .rev()
            .filter(|r| tenant_id.is_none_or(|t| r.tenant_id == t))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
