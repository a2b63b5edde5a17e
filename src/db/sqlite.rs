// SqliteDatabase: rusqlite backend implementing the Database trait.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Sync.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::EnforcementRecord;
use super::traits::Database;

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn)
    }

    async fn load_policy(&self, tenant_id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        super::queries::load_policy(&conn, tenant_id)
    }

    async fn save_policy(&self, tenant_id: &str, policy_json: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::save_policy(&conn, tenant_id, policy_json)
    }

    async fn delete_policy(&self, tenant_id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        super::queries::delete_policy(&conn, tenant_id)
    }

    async fn tenant_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        super::queries::tenant_ids(&conn)
    }

    async fn record_enforcement(&self, record: &EnforcementRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::insert_enforcement(&conn, record)
    }

    async fn recent_enforcements(
        &self,
        tenant_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<EnforcementRecord>> {
        let conn = self.conn.lock().await;
        super::queries::recent_enforcements(&conn, tenant_id, limit)
    }
}
