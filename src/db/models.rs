// Data models: Rust structs that map to database rows.
//
// Kept separate from the queries so other modules can use them without
// depending on rusqlite directly.

use serde::{Deserialize, Serialize};

/// One row of the enforcement audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnforcementRecord {
    pub tenant_id: String,
    pub actor_id: String,
    pub reason_code: String,
    pub human_reason: String,
    /// Every external action succeeded.
    pub fully_applied: bool,
    /// JSON array of `{action, outcome}` pairs.
    pub actions_json: String,
    pub enforced_at: String,
}
