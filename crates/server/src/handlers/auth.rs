//! Auth handlers

use crate::auth::UserInfo;
use crate::config::AppState;
use crate::ctx::Ctx;
use crate::error::{Error, Result};
use crate::models::UserId;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: UserId,
    pub username: String,
}

/// POST /auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    info!("POST /auth/signup - {}", req.email);

    if req.username.trim().is_empty() || req.email.trim().is_empty() {
        return Err(Error::InvalidArgument("username and email are required".into()));
    }

    let user = state
        .auth
        .signup(req.username, req.email.clone(), req.password.clone())
        .await
        .map_err(|e| {
            warn!("Signup failed for {}: {}", req.email, e);
            Error::InvalidArgument(e.to_string())
        })?;

    let (_, session) = state
        .auth
        .login(req.email, req.password)
        .await
        .map_err(|e| Error::Internal(format!("login after signup failed: {}", e)))?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token: session.token,
            user_id: user.id,
            username: user.username,
        }),
    ))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    info!("POST /auth/login - {}", req.email);

    let (user, session) = state.auth.login(req.email.clone(), req.password).await.map_err(|e| {
        warn!("Login failed for {}: {}", req.email, e);
        Error::LoginFail
    })?;

    Ok(Json(AuthResponse {
        token: session.token,
        user_id: user.id,
        username: user.username,
    }))
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    _ctx: Ctx,
    Json(req): Json<LogoutRequest>,
) -> Result<StatusCode> {
    info!("POST /auth/logout");

    state.auth.logout(&req.token).await?;
    Ok(StatusCode::OK)
}

/// GET /users - everyone except the requester, for the contact sidebar.
pub async fn list_users(
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<Vec<UserInfo>>> {
    info!("GET /users - for {}", ctx.user_id());

    let users = state.auth.list_users_except(ctx.user_id()).await?;
    Ok(Json(users))
}
