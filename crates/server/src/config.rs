//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::AuthManager;
use crate::chat::MessageService;
use crate::presence::PresenceRegistry;

/// Configuration for the messaging server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Base data directory
    pub data_dir: PathBuf,
    /// Conversation document storage
    pub conversations_dir: PathBuf,
    /// Users + sessions database
    pub users_db: PathBuf,
    /// Listen address
    pub bind_addr: SocketAddr,
}

impl ServerConfig {
    /// Read config from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("DM_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("dm_data"));
        let bind_addr = std::env::var("DM_BIND_ADDR")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3001)));
        Self::with_base_dir(data_dir, bind_addr)
    }

    pub fn with_base_dir(data_dir: impl Into<PathBuf>, bind_addr: SocketAddr) -> Self {
        let data_dir = data_dir.into();
        Self {
            conversations_dir: data_dir.join("conversations"),
            users_db: data_dir.join("users.sqlite"),
            data_dir,
            bind_addr,
        }
    }

    /// Ensure all directories exist.
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        tokio::fs::create_dir_all(&self.conversations_dir).await?;
        Ok(())
    }
}

/// App state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthManager>,
    pub presence: Arc<PresenceRegistry>,
    pub messages: Arc<MessageService>,
}
