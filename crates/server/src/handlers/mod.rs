//! HTTP handlers
//!
//! Thin translation layer between routes and the managers in `AppState`.

pub mod auth;
pub mod chat;
pub mod ws;

pub use auth::{list_users, login, logout, signup};
pub use chat::{delete_conversation, delete_message, get_messages, send_message, update_message};
pub use ws::ws_connect;
