//! Presence Registry
//!
//! Live user -> channel mapping, the single source of truth for "is this
//! user reachable right now". One owned registry object per process,
//! created at startup and reached only through register/unregister/lookup.

use crate::models::{RealtimeEvent, UserId};
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// A delivery channel to one live connection.
#[derive(Clone)]
pub struct Channel {
    id: String,
    tx: mpsc::UnboundedSender<RealtimeEvent>,
}

impl Channel {
    pub fn new(tx: mpsc::UnboundedSender<RealtimeEvent>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Push an event onto the channel. Returns false if the connection's
    /// receive side is gone; callers treat that like an offline recipient.
    pub fn push(&self, event: RealtimeEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// At most one channel per user at any instant. A new registration for an
/// already-present user supersedes the previous mapping; a disconnect only
/// removes the mapping when it still matches that connection's channel id.
pub struct PresenceRegistry {
    online: RwLock<HashMap<UserId, Channel>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            online: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection, unconditionally replacing any existing
    /// channel for the user, then broadcast the online-users snapshot.
    pub fn register(&self, user_id: UserId, channel: Channel) {
        {
            let mut online = self.online.write();
            online.insert(user_id.clone(), channel);
        }
        info!("[Presence] {} online", user_id);
        self.broadcast_online_users();
    }

    /// Remove the mapping only if it still belongs to `channel_id`. A
    /// stale disconnect racing a newer connection is a no-op.
    pub fn unregister(&self, user_id: &UserId, channel_id: &str) {
        let removed = {
            let mut online = self.online.write();
            match online.get(user_id) {
                Some(current) if current.id() == channel_id => {
                    online.remove(user_id);
                    true
                }
                _ => false,
            }
        };

        if removed {
            info!("[Presence] {} offline", user_id);
            self.broadcast_online_users();
        } else {
            debug!("[Presence] Stale disconnect for {} ignored", user_id);
        }
    }

    /// Current channel for a user, or None if offline.
    pub fn lookup(&self, user_id: &UserId) -> Option<Channel> {
        self.online.read().get(user_id).cloned()
    }

    /// Currently-registered user ids.
    pub fn online_users(&self) -> Vec<UserId> {
        self.online.read().keys().cloned().collect()
    }

    /// Send the online-users snapshot to every registered channel.
    fn broadcast_online_users(&self) {
        let (channels, users): (Vec<Channel>, Vec<UserId>) = {
            let online = self.online.read();
            (
                online.values().cloned().collect(),
                online.keys().cloned().collect(),
            )
        };
        for channel in channels {
            channel.push(RealtimeEvent::GetOnlineUsers {
                users: users.clone(),
            });
        }
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
