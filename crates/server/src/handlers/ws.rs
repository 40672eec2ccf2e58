//! WebSocket connect handler
//!
//! Browsers cannot attach headers to a WebSocket handshake, so the
//! session token rides in the query string instead of going through the
//! auth middleware.

use crate::config::AppState;
use crate::error::{Error, Result};
use crate::realtime;
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: String,
}

/// GET /ws?token=<session token>
pub async fn ws_connect(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response> {
    let user_id = state
        .auth
        .validate_session(&query.token)
        .await
        .map_err(|_| Error::LoginFail)?;

    info!("GET /ws - {}", user_id);

    let presence = state.presence.clone();
    Ok(ws.on_upgrade(move |socket| realtime::run_connection(socket, presence, user_id)))
}
