// Database queries: CRUD operations for all tables.
//
// Every SQL statement lives here, which keeps the rest of the crate on clean
// Rust interfaces.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use super::models::EnforcementRecord;

// --- Tenant policies ---

/// Load a tenant's policy JSON.
pub fn load_policy(conn: &Connection, tenant_id: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT policy_json FROM tenant_policies WHERE tenant_id = ?1")?;
    let result = stmt
        .query_row(params![tenant_id], |row| row.get(0))
        .optional()?;
    Ok(result)
}

/// Store a tenant's policy JSON (upsert).
pub fn save_policy(conn: &Connection, tenant_id: &str, policy_json: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO tenant_policies (tenant_id, policy_json, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(tenant_id) DO UPDATE SET
            policy_json = ?2,
            updated_at = datetime('now')",
        params![tenant_id, policy_json],
    )?;
    Ok(())
}

/// Delete a tenant's policy. Returns true if a row was removed.
pub fn delete_policy(conn: &Connection, tenant_id: &str) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM tenant_policies WHERE tenant_id = ?1",
        params![tenant_id],
    )?;
    Ok(removed > 0)
}

/// List every tenant with a stored policy.
pub fn tenant_ids(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT tenant_id FROM tenant_policies ORDER BY tenant_id")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

// --- Enforcement audit trail ---

/// Append an enforcement outcome.
pub fn insert_enforcement(conn: &Connection, record: &EnforcementRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO enforcement_log
            (tenant_id, actor_id, reason_code, human_reason, fully_applied, actions_json, enforced_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.tenant_id,
            record.actor_id,
            record.reason_code,
            record.human_reason,
            record.fully_applied,
            record.actions_json,
            record.enforced_at,
        ],
    )?;
    Ok(())
}

/// Most recent enforcement outcomes, newest first.
pub fn recent_enforcements(
    conn: &Connection,
    tenant_id: Option<&str>,
    limit: u32,
) -> Result<Vec<EnforcementRecord>> {
    let mut stmt = conn.prepare(
        "SELECT tenant_id, actor_id, reason_code, human_reason, fully_applied, actions_json, enforced_at
         FROM enforcement_log
         WHERE ?1 IS NULL OR tenant_id = ?1
         ORDER BY id DESC
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![tenant_id, limit], |row| {
            Ok(EnforcementRecord {
                tenant_id: row.get(0)?,
                actor_id: row.get(1)?,
                reason_code: row.get(2)?,
                human_reason: row.get(3)?,
                fully_applied: row.get(4)?,
                actions_json: row.get(5)?,
                enforced_at: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::create_tables;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn
    }

    #[test]
    fn test_policy_upsert_replaces_document() {
        let conn = test_conn();
        save_policy(&conn, "g1", r#"{"tenantName":"one"}"#).unwrap();
        save_policy(&conn, "g1", r#"{"tenantName":"two"}"#).unwrap();

        let stored = load_policy(&conn, "g1").unwrap().unwrap();
        assert!(stored.contains("two"));
        assert_eq!(tenant_ids(&conn).unwrap(), vec!["g1"]);
    }

    #[test]
    fn test_delete_missing_policy_returns_false() {
        let conn = test_conn();
        assert!(!delete_policy(&conn, "nope").unwrap());
        save_policy(&conn, "g1", "{}").unwrap();
        assert!(delete_policy(&conn, "g1").unwrap());
        assert!(load_policy(&conn, "g1").unwrap().is_none());
    }

    #[test]
    fn test_recent_enforcements_filters_by_tenant() {
        let conn = test_conn();
        for (tenant, code) in [("g1", "ban_nuke"), ("g2", "emoji_spam"), ("g1", "invite_link")] {
            insert_enforcement(
                &conn,
                &EnforcementRecord {
                    tenant_id: tenant.to_string(),
                    actor_id: "u1".to_string(),
                    reason_code: code.to_string(),
                    human_reason: "reason".to_string(),
                    fully_applied: code != "ban_nuke",
                    actions_json: "[]".to_string(),
                    enforced_at: "2026-01-01 00:00:00".to_string(),
                },
            )
            .unwrap();
        }

        let all = recent_enforcements(&conn, None, 10).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].reason_code, "invite_link");

        let g1 = recent_enforcements(&conn, Some("g1"), 10).unwrap();
        assert_eq!(g1.len(), 2);
        assert!(!g1[1].fully_applied);
    }
}
