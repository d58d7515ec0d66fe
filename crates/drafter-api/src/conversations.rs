use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use drafter_db::models::ConversationRow;
use drafter_ledger as ledger;
use drafter_types::api::{AppendQueryRequest, ConversationResponse, ConversationSummary, QueryView};
use drafter_types::models::{Conversation, Query};

use crate::error::ApiError;
use crate::middleware::Claims;
use crate::state::{AppState, run_blocking};

pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uuid = Uuid::new_v4();
    let created_at = Utc::now();

    let db = state.clone();
    let owner = claims.sub.to_string();
    let uuid_string = uuid.to_string();
    let timestamp = created_at.to_rfc3339();
    let id = run_blocking(move || db.db.create_conversation(&uuid_string, &owner, &timestamp)).await?;

    let conversation = Conversation {
        id,
        uuid,
        created_by_user_id: claims.sub,
        queries: Vec::new(),
        created_at,
        deleted_at: None,
        is_deleted: false,
    };

    Ok((StatusCode::CREATED, Json(ConversationResponse::from(conversation))))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let db = state.clone();
    let owner = claims.sub.to_string();
    let rows = run_blocking(move || db.db.list_conversations(&owner)).await?;

    let summaries = rows
        .into_iter()
        .map(|row| conversation_from_row(row).map(ConversationSummary::from))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(summaries))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let conversation = load_conversation(&state, id, claims.sub).await?;
    Ok(Json(ConversationResponse::from(conversation)))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    // Serialize with in-flight ledger writes so they fail cleanly after
    // the delete instead of interleaving with it.
    let _guard = state.conversation_locks.acquire(id).await;

    let db = state.clone();
    let owner = claims.sub.to_string();
    let deleted_at = Utc::now().to_rfc3339();
    let deleted =
        run_blocking(move || db.db.soft_delete_conversation(id, &owner, &deleted_at)).await?;

    if !deleted {
        return Err(ApiError::NotFound("Conversation not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Append a bare query/response pair to the ledger without calling the
/// completion provider.
pub async fn append_query(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AppendQueryRequest>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let text = match req.query {
        Some(text) if !text.trim().is_empty() => text,
        _ => return Err(ApiError::InvalidInput("Query text is required".into())),
    };

    let _guard = state.conversation_locks.acquire(id).await;

    let mut conversation = load_conversation(&state, id, claims.sub).await?;
    let query = ledger::append(&mut conversation, text, req.response.unwrap_or_default());
    store_queries(&state, id, &conversation.queries).await?;

    Ok((StatusCode::CREATED, Json(QueryView::from(query))))
}

// -- Shared row handling --

pub(crate) fn conversation_from_row(row: ConversationRow) -> anyhow::Result<Conversation> {
    let queries: Vec<Query> = serde_json::from_str(&row.queries)
        .with_context(|| format!("conversation {} has a malformed queries payload", row.id))?;

    Ok(Conversation {
        id: row.id,
        uuid: row.uuid.parse().context("conversation uuid malformed")?,
        created_by_user_id: row
            .created_by_user_id
            .parse()
            .context("conversation owner id malformed")?,
        queries,
        created_at: parse_timestamp(&row.created_at)?,
        deleted_at: row.deleted_at.as_deref().map(parse_timestamp).transpose()?,
        is_deleted: row.is_deleted,
    })
}

fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

/// Fetch one live conversation scoped to its owner, decoded from its row.
pub(crate) async fn load_conversation(
    state: &AppState,
    id: i64,
    owner: Uuid,
) -> Result<Conversation, ApiError> {
    let db = state.clone();
    let owner_string = owner.to_string();
    let row = run_blocking(move || db.db.get_conversation(id, &owner_string))
        .await?
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;

    conversation_from_row(row).map_err(ApiError::Internal)
}

/// Persist the full query sequence in one write.
pub(crate) async fn store_queries(
    state: &AppState,
    id: i64,
    queries: &[Query],
) -> Result<(), ApiError> {
    let payload = serde_json::to_string(queries)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("queries serialization failed: {e}")))?;

    let db = state.clone();
    run_blocking(move || db.db.replace_queries(id, &payload)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{seeded_claims, test_state};
    use axum::body::to_bytes;
    use axum::response::Response;

    async fn created_id(state: &AppState, claims: &Claims) -> i64 {
        let response = create_conversation(State(state.clone()), Extension(claims.clone()))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["id"].as_i64().unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn new_conversation_has_no_queries() {
        let state = test_state();
        let claims = seeded_claims(&state).await;

        let response = create_conversation(State(state), Extension(claims))
            .await
            .unwrap()
            .into_response();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["queries"].as_array().unwrap().len(), 0);
        assert_eq!(body["is_deleted"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn listing_is_scoped_to_the_owner() {
        let state = test_state();
        let alice = seeded_claims(&state).await;
        let bob = seeded_claims(&state).await;

        created_id(&state, &alice).await;
        created_id(&state, &alice).await;
        created_id(&state, &bob).await;

        let Json(listed) = list_conversations(State(state), Extension(alice))
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn missing_conversation_is_not_found() {
        let state = test_state();
        let claims = seeded_claims(&state).await;

        let err = get_conversation(State(state.clone()), Path(999), Extension(claims.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = delete_conversation(State(state), Path(999), Extension(claims))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn other_owners_conversation_stays_hidden() {
        let state = test_state();
        let alice = seeded_claims(&state).await;
        let bob = seeded_claims(&state).await;

        let id = created_id(&state, &alice).await;

        let err = get_conversation(State(state), Path(id), Extension(bob))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_hides_and_refuses_a_second_time() {
        let state = test_state();
        let claims = seeded_claims(&state).await;
        let id = created_id(&state, &claims).await;

        let response =
            delete_conversation(State(state.clone()), Path(id), Extension(claims.clone()))
                .await
                .unwrap()
                .into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let err = get_conversation(State(state.clone()), Path(id), Extension(claims.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = delete_conversation(State(state), Path(id), Extension(claims))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn append_persists_and_returns_the_query() {
        let state = test_state();
        let claims = seeded_claims(&state).await;
        let id = created_id(&state, &claims).await;

        let response = append_query(
            State(state.clone()),
            Path(id),
            Extension(claims.clone()),
            Json(AppendQueryRequest {
                query: Some("design a pets API".into()),
                response: Some("here it is".into()),
            }),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        assert!(body["uuid"].as_str().unwrap().parse::<Uuid>().is_ok());
        assert_eq!(body["query"], serde_json::json!("design a pets API"));

        let reloaded = load_conversation(&state, id, claims.sub).await.unwrap();
        assert_eq!(reloaded.queries.len(), 1);
        assert_eq!(reloaded.queries[0].response, "here it is");
    }

    #[tokio::test]
    async fn append_requires_query_text() {
        let state = test_state();
        let claims = seeded_claims(&state).await;
        let id = created_id(&state, &claims).await;

        let err = append_query(
            State(state),
            Path(id),
            Extension(claims),
            Json(AppendQueryRequest {
                query: Some("   ".into()),
                response: None,
            }),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ApiError::InvalidInput(_)));
    }
}
