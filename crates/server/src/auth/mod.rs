//! Authentication
//!
//! User signup, login, and session validation over SQLite. Password
//! hashing stays behind this boundary; the rest of the system only sees
//! `UserId`s pulled out of validated sessions.

pub mod middleware;

use crate::models::UserId;
use anyhow::{Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Public user info (no credential material).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Session token for authenticated requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub struct AuthManager {
    pool: SqlitePool,
    /// In-memory session cache, checked before the database.
    sessions: RwLock<HashMap<String, Session>>,
}

impl AuthManager {
    pub async fn new(db_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .context("Invalid users database path")?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .context("Failed to open users database")?;

        let manager = Self {
            pool,
            sessions: RwLock::new(HashMap::new()),
        };
        manager.init_db().await?;

        info!("[Auth] Initialized at {:?}", db_path);
        Ok(manager)
    }

    async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Register a new user.
    pub async fn signup(&self, username: String, email: String, password: String) -> Result<UserInfo> {
        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            anyhow::bail!("Email already registered");
        }

        let password_hash = hash(&password, DEFAULT_COST).context("Failed to hash password")?;
        let user = UserInfo {
            id: UserId::new(Uuid::new_v4().to_string()),
            username,
            email,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user.id.as_str())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&password_hash)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        info!("[Auth] User registered: {} ({})", user.username, user.email);
        Ok(user)
    }

    /// Verify credentials and open a session.
    pub async fn login(&self, email: String, password: String) -> Result<(UserInfo, Session)> {
        let row: Option<(String, String, String, String)> = sqlx::query_as(
            "SELECT id, username, password_hash, created_at FROM users WHERE email = ?",
        )
        .bind(&email)
        .fetch_optional(&self.pool)
        .await?;

        let (user_id, username, password_hash, created_at) =
            row.ok_or_else(|| anyhow::anyhow!("Invalid email or password"))?;

        let valid = verify(&password, &password_hash).context("Failed to verify password")?;
        if !valid {
            warn!("[Auth] Failed login attempt for {}", email);
            anyhow::bail!("Invalid email or password");
        }

        let user = UserInfo {
            id: UserId::new(user_id),
            username,
            email,
            created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
        };
        let session = self.create_session(&user.id).await?;

        info!("[Auth] User logged in: {}", user.username);
        Ok((user, session))
    }

    async fn create_session(&self, user_id: &UserId) -> Result<Session> {
        let session = Session {
            token: Uuid::new_v4().to_string(),
            user_id: user_id.clone(),
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::days(30),
        };

        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&session.token)
        .bind(session.user_id.as_str())
        .bind(session.created_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());

        Ok(session)
    }

    /// Resolve a session token to its user id.
    pub async fn validate_session(&self, token: &str) -> Result<UserId> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(token) {
                if session.expires_at > Utc::now() {
                    return Ok(session.user_id.clone());
                }
            }
        }

        let row: Option<(String, String)> =
            sqlx::query_as("SELECT user_id, expires_at FROM sessions WHERE token = ?")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;

        if let Some((user_id, expires_at)) = row {
            let expires: DateTime<Utc> = expires_at
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid session expiry"))?;
            if expires > Utc::now() {
                return Ok(UserId::new(user_id));
            }
        }

        anyhow::bail!("Invalid or expired session")
    }

    /// Invalidate a session.
    pub async fn logout(&self, token: &str) -> Result<()> {
        self.sessions.write().await.remove(token);

        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        info!("[Auth] Session invalidated");
        Ok(())
    }

    /// All users except the requester (sidebar contact list).
    pub async fn list_users_except(&self, user_id: &UserId) -> Result<Vec<UserInfo>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT id, username, email, created_at FROM users WHERE id != ? ORDER BY username",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, username, email, created_at)| UserInfo {
                id: UserId::new(id),
                username,
                email,
                created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_signup_login_session_roundtrip() {
        let dir = TempDir::new().unwrap();
        let auth = AuthManager::new(&dir.path().join("users.sqlite")).await.unwrap();

        let user = auth
            .signup("alice".into(), "alice@example.com".into(), "hunter2".into())
            .await
            .unwrap();

        let (logged_in, session) = auth
            .login("alice@example.com".into(), "hunter2".into())
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);

        let resolved = auth.validate_session(&session.token).await.unwrap();
        assert_eq!(resolved, user.id);

        auth.logout(&session.token).await.unwrap();
        assert!(auth.validate_session(&session.token).await.is_err());
    }

    #[tokio::test]
    async fn test_wrong_password_is_rejected() {
        let dir = TempDir::new().unwrap();
        let auth = AuthManager::new(&dir.path().join("users.sqlite")).await.unwrap();

        auth.signup("bob".into(), "bob@example.com".into(), "secret".into())
            .await
            .unwrap();

        assert!(auth
            .login("bob@example.com".into(), "wrong".into())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_list_users_excludes_requester() {
        let dir = TempDir::new().unwrap();
        let auth = AuthManager::new(&dir.path().join("users.sqlite")).await.unwrap();

        let a = auth
            .signup("alice".into(), "alice@example.com".into(), "pw".into())
            .await
            .unwrap();
        auth.signup("bob".into(), "bob@example.com".into(), "pw".into())
            .await
            .unwrap();

        let others = auth.list_users_except(&a.id).await.unwrap();
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].username, "bob");
    }
}
