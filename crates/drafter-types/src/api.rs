use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Conversation, Query};

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoogleAuthRequest {
    /// ID token obtained from Google sign-in on the client.
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub profile_image_url: String,
    pub role: String,
}

// -- Chat --

/// Required fields are Options so handlers can reject with a 400 and a
/// descriptive detail instead of the framework's 422.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatRequest {
    pub message: Option<String>,
    pub follow_up: Option<String>,
    pub image_url: Option<String>,
    pub conversation_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub conversation_id: i64,
    pub query_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateQueryRequest {
    pub query: Option<String>,
    pub response: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppendQueryRequest {
    pub query: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
}

// -- Conversations --

/// A query as exposed over the API: the position-derived numeric id stays
/// internal, the uuid is the stable reference.
#[derive(Debug, Clone, Serialize)]
pub struct QueryView {
    pub uuid: Uuid,
    pub query: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_affected: Option<bool>,
}

impl From<Query> for QueryView {
    fn from(q: Query) -> Self {
        QueryView {
            uuid: q.uuid,
            query: q.query,
            response: q.response,
            created_at: q.created_at,
            updated_at: q.updated_at,
            is_affected: q.is_affected,
        }
    }
}

/// Listing shape: everything but the queries payload.
#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub id: i64,
    pub uuid: Uuid,
    pub created_by_user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub id: i64,
    pub uuid: Uuid,
    pub created_by_user_id: Uuid,
    pub queries: Vec<QueryView>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
}

impl From<Conversation> for ConversationSummary {
    fn from(c: Conversation) -> Self {
        ConversationSummary {
            id: c.id,
            uuid: c.uuid,
            created_by_user_id: c.created_by_user_id,
            created_at: c.created_at,
            deleted_at: c.deleted_at,
            is_deleted: c.is_deleted,
        }
    }
}

impl From<Conversation> for ConversationResponse {
    fn from(c: Conversation) -> Self {
        ConversationResponse {
            id: c.id,
            uuid: c.uuid,
            created_by_user_id: c.created_by_user_id,
            queries: c.queries.into_iter().map(QueryView::from).collect(),
            created_at: c.created_at,
            deleted_at: c.deleted_at,
            is_deleted: c.is_deleted,
        }
    }
}

// -- Generate --

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub response: String,
}
