use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One request/response turn inside a conversation. Stored embedded in the
/// conversation's queries column, never as a standalone row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Sequence position at append time. Entries are never removed, so
    /// positions stay contiguous. This value never leaves the service;
    /// every external reference goes through `uuid`.
    pub id: i64,
    pub uuid: Uuid,
    pub query: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
    /// Set only when the entry is edited in place.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// True once an earlier entry in the same conversation was edited after
    /// this one existed. Never cleared.
    #[serde(default)]
    pub is_affected: Option<bool>,
}

/// Durable, owned container for an ordered query sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub uuid: Uuid,
    pub created_by_user_id: Uuid,
    pub queries: Vec<Query>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
}
