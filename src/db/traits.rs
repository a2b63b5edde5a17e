// Database trait: backend-agnostic async interface for all persistence.
//
// Implementors: SqliteDatabase (wraps rusqlite), MemoryDatabase (in-process).
// Backends only move JSON text and audit rows around; defaulting and
// deep-merge live in PolicyStore so every backend behaves the same way on
// malformed data.

use anyhow::Result;
use async_trait::async_trait;

use super::models::EnforcementRecord;

#[async_trait]
pub trait Database: Send + Sync {
    // --- Lifecycle ---

    /// Count the number of user-created tables (0 for non-SQL backends).
    async fn table_count(&self) -> Result<i64>;

    // --- Tenant policies ---

    /// Load the raw policy JSON for a tenant, if one is stored.
    async fn load_policy(&self, tenant_id: &str) -> Result<Option<String>>;

    /// Store (upsert) the policy JSON for a tenant.
    async fn save_policy(&self, tenant_id: &str, policy_json: &str) -> Result<()>;

    /// Remove a tenant's policy. Returns true if a row was deleted.
    async fn delete_policy(&self, tenant_id: &str) -> Result<bool>;

    /// All tenant ids with a stored policy, sorted.
    async fn tenant_ids(&self) -> Result<Vec<String>>;

    // --- Enforcement audit trail ---

    /// Append one enforcement outcome.
    async fn record_enforcement(&self, record: &EnforcementRecord) -> Result<()>;

    /// Most recent enforcement outcomes, newest first. `tenant_id` narrows
    /// to one tenant.
    async fn recent_enforcements(
        &self,
        tenant_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<EnforcementRecord>>;
}
