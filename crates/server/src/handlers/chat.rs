//! Messaging handlers

use crate::config::AppState;
use crate::ctx::Ctx;
use crate::error::{Error, Result};
use crate::models::{DeleteMode, Entry, SendOutcome, UserId, VisibleEntry};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct MessageInput {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<VisibleEntry>,
}

/// POST /messages/{receiver_id}
pub async fn send_message(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(receiver_id): Path<String>,
    Json(input): Json<MessageInput>,
) -> Result<(StatusCode, Json<SendOutcome>)> {
    info!("POST /messages/{}", receiver_id);

    let receiver = UserId::from(receiver_id);
    let outcome = state
        .messages
        .send(ctx.user_id(), &receiver, &input.message)
        .await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /messages/{other_user_id}
pub async fn get_messages(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(other_user_id): Path<String>,
) -> Result<Json<MessagesResponse>> {
    info!("GET /messages/{}", other_user_id);

    let other = UserId::from(other_user_id);
    let messages = state.messages.list_visible(ctx.user_id(), &other).await?;

    Ok(Json(MessagesResponse { messages }))
}

/// PUT /messages/{receiver_id}/{thread_id}/{entry_id}
pub async fn update_message(
    State(state): State<AppState>,
    ctx: Ctx,
    Path((receiver_id, thread_id, entry_id)): Path<(String, String, String)>,
    Json(input): Json<MessageInput>,
) -> Result<Json<Entry>> {
    info!("PUT /messages/{}/{}/{}", receiver_id, thread_id, entry_id);

    let receiver = UserId::from(receiver_id);
    let entry = state
        .messages
        .edit_entry(ctx.user_id(), &receiver, &thread_id, &entry_id, &input.message)
        .await?;

    Ok(Json(entry))
}

/// DELETE /messages/{receiver_id}/{thread_id}/{entry_id}?mode=for_me|for_everyone
pub async fn delete_message(
    State(state): State<AppState>,
    ctx: Ctx,
    Path((receiver_id, thread_id, entry_id)): Path<(String, String, String)>,
    Query(params): Query<DeleteParams>,
) -> Result<StatusCode> {
    info!("DELETE /messages/{}/{}/{}", receiver_id, thread_id, entry_id);

    let mode = params
        .mode
        .as_deref()
        .and_then(DeleteMode::parse)
        .ok_or_else(|| {
            Error::InvalidArgument("mode must be 'for_me' or 'for_everyone'".into())
        })?;

    let receiver = UserId::from(receiver_id);
    state
        .messages
        .delete_entry(ctx.user_id(), &receiver, &thread_id, &entry_id, mode)
        .await?;

    Ok(StatusCode::OK)
}

/// DELETE /conversations/{conversation_id}
pub async fn delete_conversation(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(conversation_id): Path<String>,
) -> Result<StatusCode> {
    info!("DELETE /conversations/{}", conversation_id);

    state
        .messages
        .delete_conversation(ctx.user_id(), &conversation_id)
        .await?;
    Ok(StatusCode::OK)
}
