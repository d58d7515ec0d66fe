use crate::Database;
use crate::models::{ConversationRow, UserRow};
use anyhow::{Result, anyhow};
use rusqlite::Connection;

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        username: &str,
        password_hash: &str,
        profile_image_url: &str,
        role: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, username, password, profile_image_url, role)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, email, username, password_hash, profile_image_url, role],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Conversations --

    /// Insert an empty conversation and return its rowid.
    pub fn create_conversation(&self, uuid: &str, owner_id: &str, created_at: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations (uuid, created_by_user_id, created_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![uuid, owner_id, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Fetch a live conversation, scoped to its owner.
    pub fn get_conversation(&self, id: i64, owner_id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, uuid, created_by_user_id, queries, created_at, deleted_at, is_deleted
                 FROM conversations
                 WHERE id = ?1 AND created_by_user_id = ?2 AND is_deleted = 0",
            )?;

            let row = stmt
                .query_row(rusqlite::params![id, owner_id], conversation_from_row)
                .optional()?;

            Ok(row)
        })
    }

    /// All live conversations for one owner, oldest first.
    pub fn list_conversations(&self, owner_id: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, uuid, created_by_user_id, queries, created_at, deleted_at, is_deleted
                 FROM conversations
                 WHERE created_by_user_id = ?1 AND is_deleted = 0
                 ORDER BY id",
            )?;

            let rows = stmt
                .query_map([owner_id], conversation_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Overwrite the serialized query ledger. The sole mutation primitive
    /// for conversation content: callers read, rewrite, then store.
    pub fn replace_queries(&self, id: i64, queries_json: &str) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE conversations SET queries = ?2 WHERE id = ?1 AND is_deleted = 0",
                rusqlite::params![id, queries_json],
            )?;

            if updated == 0 {
                return Err(anyhow!("Conversation not found: {}", id));
            }
            Ok(())
        })
    }

    /// Mark a conversation deleted. Returns false when there was no live
    /// row to delete, so repeat deletes do not succeed twice.
    pub fn soft_delete_conversation(&self, id: i64, owner_id: &str, deleted_at: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE conversations SET is_deleted = 1, deleted_at = ?3
                 WHERE id = ?1 AND created_by_user_id = ?2 AND is_deleted = 0",
                rusqlite::params![id, owner_id, deleted_at],
            )?;

            Ok(updated > 0)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, email, username, password, profile_image_url, role, created_at
         FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                username: row.get(2)?,
                password: row.get(3)?,
                profile_image_url: row.get(4)?,
                role: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn conversation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        uuid: row.get(1)?,
        created_by_user_id: row.get(2)?,
        queries: row.get(3)?,
        created_at: row.get(4)?,
        deleted_at: row.get(5)?,
        is_deleted: row.get(6)?,
    })
}

/// Maps rusqlite's no-rows error to `None` instead of bubbling it.
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Database;

    const CREATED_AT: &str = "2026-01-05T10:00:00Z";

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn seed_user(db: &Database, id: &str, username: &str) {
        db.create_user(
            id,
            &format!("{username}@example.com"),
            username,
            "argon2-hash",
            "https://cdn.example.com/default.png",
            "user",
        )
        .unwrap();
    }

    #[test]
    fn user_roundtrips_through_every_lookup() {
        let db = test_db();
        seed_user(&db, "u-1", "alice");

        let by_id = db.get_user_by_id("u-1").unwrap().unwrap();
        let by_name = db.get_user_by_username("alice").unwrap().unwrap();
        let by_email = db.get_user_by_email("alice@example.com").unwrap().unwrap();

        assert_eq!(by_id.username, "alice");
        assert_eq!(by_name.email, "alice@example.com");
        assert_eq!(by_email.id, "u-1");
        assert_eq!(by_id.role, "user");
    }

    #[test]
    fn missing_user_lookups_return_none() {
        let db = test_db();

        assert!(db.get_user_by_id("nope").unwrap().is_none());
        assert!(db.get_user_by_username("nope").unwrap().is_none());
        assert!(db.get_user_by_email("nope@example.com").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let db = test_db();
        seed_user(&db, "u-1", "alice");

        let dup = db.create_user(
            "u-2",
            "other@example.com",
            "alice",
            "hash",
            "https://cdn.example.com/default.png",
            "user",
        );
        assert!(dup.is_err());
    }

    #[test]
    fn new_conversation_starts_with_empty_ledger() {
        let db = test_db();
        seed_user(&db, "u-1", "alice");

        let id = db.create_conversation("c-uuid-1", "u-1", CREATED_AT).unwrap();
        let row = db.get_conversation(id, "u-1").unwrap().unwrap();

        assert_eq!(row.queries, "[]");
        assert_eq!(row.uuid, "c-uuid-1");
        assert_eq!(row.created_at, CREATED_AT);
        assert!(!row.is_deleted);
        assert!(row.deleted_at.is_none());
    }

    #[test]
    fn get_conversation_is_scoped_to_owner() {
        let db = test_db();
        seed_user(&db, "u-1", "alice");
        seed_user(&db, "u-2", "bob");

        let id = db.create_conversation("c-uuid-1", "u-1", CREATED_AT).unwrap();

        assert!(db.get_conversation(id, "u-1").unwrap().is_some());
        assert!(db.get_conversation(id, "u-2").unwrap().is_none());
    }

    #[test]
    fn list_skips_deleted_and_foreign_conversations() {
        let db = test_db();
        seed_user(&db, "u-1", "alice");
        seed_user(&db, "u-2", "bob");

        let keep = db.create_conversation("c-keep", "u-1", CREATED_AT).unwrap();
        let gone = db.create_conversation("c-gone", "u-1", CREATED_AT).unwrap();
        db.create_conversation("c-bob", "u-2", CREATED_AT).unwrap();

        assert!(db.soft_delete_conversation(gone, "u-1", CREATED_AT).unwrap());

        let rows = db.list_conversations("u-1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, keep);
    }

    #[test]
    fn list_preserves_creation_order() {
        let db = test_db();
        seed_user(&db, "u-1", "alice");

        let first = db.create_conversation("c-1", "u-1", CREATED_AT).unwrap();
        let second = db.create_conversation("c-2", "u-1", CREATED_AT).unwrap();

        let ids: Vec<i64> = db
            .list_conversations("u-1")
            .unwrap()
            .iter()
            .map(|row| row.id)
            .collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn soft_delete_succeeds_only_once() {
        let db = test_db();
        seed_user(&db, "u-1", "alice");
        let id = db.create_conversation("c-uuid-1", "u-1", CREATED_AT).unwrap();

        assert!(db.soft_delete_conversation(id, "u-1", CREATED_AT).unwrap());
        assert!(db.get_conversation(id, "u-1").unwrap().is_none());
        assert!(!db.soft_delete_conversation(id, "u-1", CREATED_AT).unwrap());
    }

    #[test]
    fn soft_delete_ignores_foreign_owner() {
        let db = test_db();
        seed_user(&db, "u-1", "alice");
        seed_user(&db, "u-2", "bob");
        let id = db.create_conversation("c-uuid-1", "u-1", CREATED_AT).unwrap();

        assert!(!db.soft_delete_conversation(id, "u-2", CREATED_AT).unwrap());
        assert!(db.get_conversation(id, "u-1").unwrap().is_some());
    }

    #[test]
    fn replace_queries_roundtrips() {
        let db = test_db();
        seed_user(&db, "u-1", "alice");
        let id = db.create_conversation("c-uuid-1", "u-1", CREATED_AT).unwrap();

        let ledger = r#"[{"id":0,"query":"hi","response":"hello"}]"#;
        db.replace_queries(id, ledger).unwrap();

        let row = db.get_conversation(id, "u-1").unwrap().unwrap();
        assert_eq!(row.queries, ledger);
    }

    #[test]
    fn replace_queries_fails_for_missing_or_deleted_rows() {
        let db = test_db();
        seed_user(&db, "u-1", "alice");

        assert!(db.replace_queries(999, "[]").is_err());

        let id = db.create_conversation("c-uuid-1", "u-1", CREATED_AT).unwrap();
        db.soft_delete_conversation(id, "u-1", CREATED_AT).unwrap();
        assert!(db.replace_queries(id, "[]").is_err());
    }
}
