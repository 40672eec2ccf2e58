use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque user identifier. Equality-comparable handle shared by every
/// component; carries no behavior of its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A conversation between one unordered pair of participants.
///
/// Threads are embedded in the record so every mutation of the message
/// history is a read-modify-write of one document under one lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participants: [UserId; 2],
    pub threads: Vec<MessageThread>,
    #[serde(default)]
    pub is_chat_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(a: UserId, b: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            participants: [a, b],
            threads: Vec::new(),
            is_chat_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// The directional thread originated by `sender`, if one exists.
    /// A conversation holds at most two threads (one per direction).
    pub fn thread_for_sender(&mut self, sender: &UserId) -> Option<&mut MessageThread> {
        self.threads.iter_mut().find(|t| &t.sender_id == sender)
    }

    pub fn thread_by_id(&mut self, thread_id: &str) -> Option<&mut MessageThread> {
        self.threads.iter_mut().find(|t| t.id == thread_id)
    }
}

/// One direction of a conversation: the ordered entries `sender_id` has
/// sent to `receiver_id`. The pair is fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageThread {
    pub id: String,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub entries: Vec<Entry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageThread {
    pub fn new(sender_id: UserId, receiver_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            sender_id,
            receiver_id,
            entries: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn entry_by_id(&mut self, entry_id: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.id == entry_id)
    }
}

/// One piece of sent text with independent edit/delete state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted_for_sender: bool,
}

impl Entry {
    pub fn new(text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            created_at: now,
            updated_at: now,
            is_deleted_for_sender: false,
        }
    }
}

/// How a delete request should be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    /// Hide the entry from the sender only; other readers keep it.
    ForMe,
    /// Remove the entry for every reader. Irreversible.
    ForEveryone,
}

impl DeleteMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "for_me" => Some(DeleteMode::ForMe),
            "for_everyone" => Some(DeleteMode::ForEveryone),
            _ => None,
        }
    }
}

/// An entry paired with the thread context a reader needs to render it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibleEntry {
    pub conversation_id: String,
    pub thread_id: String,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(flatten)]
    pub entry: Entry,
}

/// Outcome of a send: where the entry landed.
#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    pub conversation_id: String,
    pub thread_id: String,
    pub entry: Entry,
}

/// Events pushed to a recipient's live channel.
///
/// Variant names are the wire event names clients subscribe to.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum RealtimeEvent {
    NewMessage {
        conversation_id: String,
        thread_id: String,
        sender_id: UserId,
        entry: Entry,
    },
    UpdateMessage {
        thread_id: String,
        entry: Entry,
    },
    DeleteMessage {
        thread_id: String,
        entry_id: String,
    },
    GetOnlineUsers {
        users: Vec<UserId>,
    },
}
