//! HTTP route handlers: identity, chat storage and answer generation.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};

use chatline_core::provider::GenerationRequest;
use chatline_core::wire::{DeleteResponse, GenerateRequest, LoginRequest};
use chatline_core::{ChatSession, OwnerId, SessionId, User};

use crate::error::ApiError;
use crate::server::AppState;

/// Error text for any generation failure before the first byte is sent.
pub const GENERATE_FAILED: &str = "Failed to generate response";

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<User>, ApiError> {
    let user = User::from_display_name(&body.name)
        .ok_or_else(|| ApiError::bad_request("name is required"))?;
    let stored = state.users.get_or_create(&user)?;
    info!(owner_id = %stored.id, "user logged in");
    Ok(Json(stored))
}

#[derive(Debug, Deserialize)]
pub struct ListChatsQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

pub async fn list_chats(
    State(state): State<AppState>,
    Query(query): Query<ListChatsQuery>,
) -> Result<Json<Vec<ChatSession>>, ApiError> {
    let owner = query
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("userId is required"))?;
    Ok(Json(state.chats.list_for_owner(&OwnerId::from_raw(owner))?))
}

pub async fn get_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChatSession>, ApiError> {
    state
        .chats
        .get(&SessionId::from_raw(id))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("chat"))
}

/// Insert or fully replace a chat document.
pub async fn save_chat(
    State(state): State<AppState>,
    Json(chat): Json<ChatSession>,
) -> Result<Json<ChatSession>, ApiError> {
    state.chats.upsert(&chat)?;
    Ok(Json(chat))
}

/// Deleting an unknown id still succeeds.
pub async fn delete_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.chats.delete(&SessionId::from_raw(id))?;
    Ok(Json(DeleteResponse { success: true }))
}

/// Stream the answer as chunked `text/plain`.
///
/// Errors before the first fragment become a 500 JSON body. Once bytes are
/// flowing the status is already sent, so a later error aborts the body.
#[instrument(skip_all, fields(history = body.history.len()))]
pub async fn generate(
    State(state): State<AppState>,
    Json(body): Json<GenerateRequest>,
) -> Result<Response, ApiError> {
    let request = GenerationRequest {
        system_instruction: state.system_instruction.clone(),
        history: body.history,
        message: body.message,
    };

    let mut stream = state.generator.stream(&request).await.map_err(|e| {
        error!(error = %e, kind = e.error_kind(), "generation request failed");
        ApiError::internal(GENERATE_FAILED)
    })?;

    let first = loop {
        match stream.next().await {
            Some(Ok(text)) if text.is_empty() => continue,
            Some(Ok(text)) => break Some(text),
            Some(Err(e)) => {
                error!(error = %e, kind = e.error_kind(), "generation failed before first chunk");
                return Err(ApiError::internal(GENERATE_FAILED));
            }
            None => break None,
        }
    };

    let rest = stream.filter(|item| {
        let empty = matches!(item, Ok(text) if text.is_empty());
        futures::future::ready(!empty)
    });
    let body = futures::stream::iter(first.map(Ok))
        .chain(rest)
        .then(|item| async move {
            if let Err(e) = &item {
                warn!(error = %e, kind = e.error_kind(), "generation failed mid-stream, aborting body");
                // Returning Pending once lets the connection flush the headers
                // and every fragment already written before it is torn down.
                tokio::task::yield_now().await;
            }
            item
        });

    Ok((
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response())
}
