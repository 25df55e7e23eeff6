use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Failure,
}

/// Caller provenance captured at the transport boundary and threaded
/// through into audit rows. Never influences engine decisions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestProvenance {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Id,
    pub actor: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub status: AuditStatus,
    pub error: Option<String>,
    pub provenance: RequestProvenance,
    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    pub fn success(
        actor: impl Into<String>,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
        provenance: RequestProvenance,
        now: DateTime<Utc>,
    ) -> Self {
        AuditLog {
            id: Id::generate(),
            actor: actor.into(),
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            before,
            after,
            status: AuditStatus::Success,
            error: None,
            provenance,
            created_at: now,
        }
    }

    pub const SYSTEM_ACTOR: &'static str = "system";
}
