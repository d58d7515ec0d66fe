/// Row types mapping directly to SQLite rows. Distinct from the
/// drafter-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub profile_image_url: String,
    pub role: String,
    pub created_at: String,
}

pub struct ConversationRow {
    pub id: i64,
    pub uuid: String,
    pub created_by_user_id: String,
    /// Serialized query ledger. Encoding and decoding happen above the
    /// DB layer; rows only move the JSON text around.
    pub queries: String,
    pub created_at: String,
    pub deleted_at: Option<String>,
    pub is_deleted: bool,
}
