use chrono::{DateTime, Utc};
use expr_core::Role;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The persisted summary for one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub session_id: String,
    pub summary: String,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(session_id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            summary: summary.into(),
            updated_at: Utc::now(),
        }
    }
}

/// One write-once row of the audit log.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub entry_id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(session_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            entry_id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}
