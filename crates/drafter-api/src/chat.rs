use axum::{
    Extension, Json,
    extract::{Path, State},
};
use uuid::Uuid;

use drafter_ledger as ledger;
use drafter_llm::prompt::{self, ChatTurn};
use drafter_types::api::{ChatRequest, ChatResponse, UpdateQueryRequest};

use crate::conversations::{load_conversation, store_queries};
use crate::error::ApiError;
use crate::middleware::Claims;
use crate::state::AppState;

/// One chat turn: replay the ledger tail to the provider, then append
/// the new exchange. Nothing is persisted unless the completion
/// succeeds.
pub async fn chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = match req.message {
        Some(text) if !text.trim().is_empty() => text,
        _ => return Err(ApiError::InvalidInput("Message is required".into())),
    };
    let conversation_id = req
        .conversation_id
        .ok_or_else(|| ApiError::InvalidInput("conversation_id is required".into()))?;

    // Held across load, completion, and store: concurrent turns on one
    // conversation would otherwise drop each other's ledger writes.
    let _guard = state.conversation_locks.acquire(conversation_id).await;

    let mut conversation = load_conversation(&state, conversation_id, claims.sub).await?;

    let turn = ChatTurn {
        message,
        follow_up: req.follow_up,
        image_url: req.image_url,
        file_text: None,
    };
    let messages = prompt::chat_messages(&conversation.queries, &turn);
    let response_text = state.llm.complete(messages).await?;

    let recorded_text = turn.text().to_string();
    let query = ledger::append(&mut conversation, recorded_text, response_text.clone());
    store_queries(&state, conversation_id, &conversation.queries).await?;

    Ok(Json(ChatResponse {
        response: response_text,
        conversation_id,
        query_id: query.uuid,
    }))
}

/// Rewrite one past entry and flag everything after it as affected.
pub async fn update_query(
    State(state): State<AppState>,
    Path((conversation_id, query_id)): Path<(i64, Uuid)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateQueryRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (Some(new_text), Some(new_response)) = (req.query, req.response) else {
        return Err(ApiError::InvalidInput("query and response are required".into()));
    };

    let _guard = state.conversation_locks.acquire(conversation_id).await;

    let mut conversation = load_conversation(&state, conversation_id, claims.sub).await?;
    ledger::edit(&mut conversation, query_id, new_text, new_response)?;
    store_queries(&state, conversation_id, &conversation.queries).await?;

    Ok(Json(serde_json::json!({ "message": "Query updated successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{run_blocking, seeded_claims, test_state};
    use chrono::Utc;

    async fn seeded_conversation(state: &AppState, owner: Uuid) -> i64 {
        let db = state.clone();
        let owner_string = owner.to_string();
        let uuid = Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();
        run_blocking(move || db.db.create_conversation(&uuid, &owner_string, &created_at))
            .await
            .unwrap()
    }

    fn chat_request(conversation_id: Option<i64>, message: Option<&str>) -> Json<ChatRequest> {
        Json(ChatRequest {
            message: message.map(str::to_string),
            follow_up: None,
            image_url: None,
            conversation_id,
        })
    }

    #[tokio::test]
    async fn chat_requires_a_message() {
        let state = test_state();
        let claims = seeded_claims(&state).await;

        let err = chat(State(state), Extension(claims), chat_request(Some(1), None))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn chat_requires_a_conversation_id() {
        let state = test_state();
        let claims = seeded_claims(&state).await;

        let err = chat(State(state), Extension(claims), chat_request(None, Some("hi")))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn chat_rejects_unknown_conversations_before_completing() {
        let state = test_state();
        let claims = seeded_claims(&state).await;

        let err = chat(State(state), Extension(claims), chat_request(Some(42), Some("hi")))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn edit_rewrites_entry_and_flags_later_ones() {
        let state = test_state();
        let claims = seeded_claims(&state).await;
        let id = seeded_conversation(&state, claims.sub).await;

        let mut conversation = load_conversation(&state, id, claims.sub).await.unwrap();
        ledger::append(&mut conversation, "first", "answer one");
        let target = ledger::append(&mut conversation, "second", "answer two");
        ledger::append(&mut conversation, "third", "answer three");
        store_queries(&state, id, &conversation.queries).await.unwrap();

        let Json(body) = update_query(
            State(state.clone()),
            Path((id, target.uuid)),
            Extension(claims.clone()),
            Json(UpdateQueryRequest {
                query: Some("second, revised".into()),
                response: Some("revised answer".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(body["message"], "Query updated successfully");

        let reloaded = load_conversation(&state, id, claims.sub).await.unwrap();
        assert_eq!(reloaded.queries[0].is_affected, None);
        assert!(reloaded.queries[0].updated_at.is_none());
        assert_eq!(reloaded.queries[1].query, "second, revised");
        assert!(reloaded.queries[1].updated_at.is_some());
        assert_eq!(reloaded.queries[1].is_affected, None);
        assert_eq!(reloaded.queries[2].is_affected, Some(true));
    }

    #[tokio::test]
    async fn edit_of_unknown_query_is_not_found() {
        let state = test_state();
        let claims = seeded_claims(&state).await;
        let id = seeded_conversation(&state, claims.sub).await;

        let err = update_query(
            State(state),
            Path((id, Uuid::new_v4())),
            Extension(claims),
            Json(UpdateQueryRequest {
                query: Some("x".into()),
                response: Some("y".into()),
            }),
        )
        .await
        .unwrap_err();

        match err {
            ApiError::NotFound(detail) => assert_eq!(detail, "Query not found"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn edit_requires_both_fields() {
        let state = test_state();
        let claims = seeded_claims(&state).await;
        let id = seeded_conversation(&state, claims.sub).await;

        let err = update_query(
            State(state),
            Path((id, Uuid::new_v4())),
            Extension(claims),
            Json(UpdateQueryRequest {
                query: Some("x".into()),
                response: None,
            }),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ApiError::InvalidInput(_)));
    }
}
