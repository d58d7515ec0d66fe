use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::error;

use crate::error::ApiError;
use crate::google::GoogleVerifier;
use drafter_db::Database;
use drafter_llm::CompletionService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub llm: CompletionService,
    pub google: GoogleVerifier,
    pub auth: AuthConfig,
    pub conversation_locks: ConversationLocks,
}

pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub default_profile_image: String,
}

/// Per-conversation mutexes. Ledger mutations are read-modify-write over
/// the whole queries sequence, so every mutating handler holds the
/// conversation's lock from load to store; without it, concurrent writes
/// to one conversation would silently drop each other's entries.
#[derive(Default)]
pub struct ConversationLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ConversationLocks {
    pub async fn acquire(&self, conversation_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            // An entry only the map still points at has no holder and no
            // waiter left, so the registry stays bounded by the number of
            // conversations being written right now.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(conversation_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    pub(crate) async fn tracked(&self) -> usize {
        self.inner.lock().await.len()
    }
}

/// Run a blocking DB closure off the async runtime.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed"))
        })?
        .map_err(ApiError::from)
}

/// Fully wired state over an in-memory database, for handler tests.
#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    use drafter_llm::CompletionConfig;

    Arc::new(AppStateInner {
        db: Database::open_in_memory().expect("in-memory db"),
        llm: CompletionService::new(CompletionConfig::new("test-key")),
        google: GoogleVerifier::new("test-client-id").expect("verifier"),
        auth: AuthConfig {
            jwt_secret: "test-secret".into(),
            access_token_minutes: 30,
            refresh_token_days: 7,
            default_profile_image: "https://cdn.example.com/default.png".into(),
        },
        conversation_locks: ConversationLocks::default(),
    })
}

/// Insert a user row and return claims for it, for handler tests.
#[cfg(test)]
pub(crate) async fn seeded_claims(state: &AppState) -> crate::middleware::Claims {
    let user_id = uuid::Uuid::new_v4();
    let db = state.clone();
    let id_string = user_id.to_string();
    run_blocking(move || {
        let username = format!("user-{}", &id_string[..8]);
        db.db.create_user(
            &id_string,
            &format!("{username}@example.com"),
            &username,
            "argon2-hash",
            "https://cdn.example.com/default.png",
            "user",
        )
    })
    .await
    .expect("seed user");

    crate::middleware::Claims {
        sub: user_id,
        username: "tester".into(),
        exp: 4102444800,
    }
}

#[cfg(test)]
mod tests {
    use super::ConversationLocks;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn same_conversation_is_serialized() {
        let locks = Arc::new(ConversationLocks::default());
        let running = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let locks = locks.clone();
            let running = running.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(7).await;
                let inside = running.fetch_add(1, Ordering::SeqCst);
                assert_eq!(inside, 0, "two tasks held the same conversation lock");
                tokio::task::yield_now().await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn different_conversations_do_not_block_each_other() {
        let locks = ConversationLocks::default();

        let _first = locks.acquire(1).await;
        // Would deadlock if conversation 2 shared conversation 1's mutex.
        let _second = locks.acquire(2).await;
    }

    #[tokio::test]
    async fn idle_locks_are_evicted() {
        let locks = ConversationLocks::default();

        drop(locks.acquire(1).await);
        assert_eq!(locks.tracked().await, 1);

        // The next acquire sweeps the now-idle entry 1.
        let _guard = locks.acquire(2).await;
        assert_eq!(locks.tracked().await, 1);
    }

    #[tokio::test]
    async fn held_locks_survive_the_sweep() {
        let locks = ConversationLocks::default();

        let _first = locks.acquire(1).await;
        let _second = locks.acquire(2).await;

        assert_eq!(locks.tracked().await, 2);
    }
}
