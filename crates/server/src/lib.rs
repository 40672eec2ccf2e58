//! Direct-messaging backend
//!
//! Authenticated users exchange text messages organized into per-pair
//! conversations, with real-time delivery to online recipients and
//! delete-for-me / delete-for-everyone semantics.

pub mod auth;
pub mod chat;
pub mod config;
pub mod ctx;
pub mod error;
pub mod handlers;
pub mod models;
pub mod presence;
pub mod realtime;
pub mod store;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use auth::AuthManager;
use chat::MessageService;
use config::{AppState, ServerConfig};
use handlers::{
    delete_conversation, delete_message, get_messages, list_users, login, logout, send_message,
    signup, update_message, ws_connect,
};
use presence::PresenceRegistry;
use realtime::Dispatcher;
use store::ConversationStore;

/// Build the router over an already-constructed state. Split out of
/// `run` so tests can drive the full HTTP surface in-process.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/users", get(list_users))
        .route("/auth/logout", post(logout))
        .route("/messages/{user_id}", post(send_message).get(get_messages))
        .route(
            "/messages/{receiver_id}/{thread_id}/{entry_id}",
            put(update_message).delete(delete_message),
        )
        .route("/conversations/{conversation_id}", delete(delete_conversation))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::mw_require_auth,
        ));

    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        // Session token rides in the query string for the WS handshake
        .route("/ws", get(ws_connect))
        .route("/health", get(health_check))
        .merge(protected)
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Construct every manager and the shared state from config.
pub async fn build_state(config: &ServerConfig) -> anyhow::Result<AppState> {
    config.ensure_dirs().await?;

    let auth_manager = Arc::new(AuthManager::new(&config.users_db).await?);
    let store = Arc::new(ConversationStore::new(&config.conversations_dir).await?);
    let presence = Arc::new(PresenceRegistry::new());
    let dispatcher = Dispatcher::new(presence.clone());
    let messages = Arc::new(MessageService::new(store.clone(), dispatcher));

    Ok(AppState {
        auth: auth_manager,
        presence,
        messages,
    })
}

pub async fn run() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let config = ServerConfig::from_env();

    info!("=== DM Server ===");
    info!("Data directory: {:?}", config.data_dir);
    info!("Users database: {:?}", config.users_db);

    let state = build_state(&config).await?;
    let app = router(state);

    info!("Listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK - DM Server"
}
