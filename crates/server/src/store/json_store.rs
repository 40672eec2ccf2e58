//! JSON-based conversation storage
//!
//! One JSON document per conversation, written atomically (temp file +
//! rename). The in-memory pair index is the authority for pair
//! uniqueness: find-or-create serializes its check-then-insert on the
//! index write lock, so two racing calls for the same pair resolve to
//! one record with the loser re-reading the winner's.

use crate::error::{Error, Result};
use crate::models::{Conversation, MessageThread, UserId};
use anyhow::Context;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Normalized key for an unordered participant pair.
fn pair_key(a: &UserId, b: &UserId) -> String {
    if a.as_str() <= b.as_str() {
        format!("{}|{}", a, b)
    } else {
        format!("{}|{}", b, a)
    }
}

/// Document store for conversation records.
pub struct ConversationStore {
    storage_dir: PathBuf,
    /// conversation id -> loaded record
    records: RwLock<HashMap<String, Arc<RwLock<Conversation>>>>,
    /// normalized pair key -> conversation id
    pairs: RwLock<HashMap<String, String>>,
}

impl ConversationStore {
    /// Create a store rooted at `storage_dir`, loading any existing records.
    pub async fn new(storage_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let storage_dir = storage_dir.into();
        fs::create_dir_all(&storage_dir)
            .await
            .context("Failed to create conversation storage dir")?;

        let store = Self {
            storage_dir,
            records: RwLock::new(HashMap::new()),
            pairs: RwLock::new(HashMap::new()),
        };

        store.load_existing().await?;

        info!(
            "[Store] Initialized with {} conversations",
            store.records.read().await.len()
        );

        Ok(store)
    }

    fn record_path(&self, conversation_id: &str) -> PathBuf {
        self.storage_dir.join(format!("{}.json", conversation_id))
    }

    /// Load all existing conversation documents from disk.
    async fn load_existing(&self) -> anyhow::Result<()> {
        let mut entries = fs::read_dir(&self.storage_dir).await?;
        let mut records = self.records.write().await;
        let mut pairs = self.pairs.write().await;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path).await?;
            match serde_json::from_str::<Conversation>(&content) {
                Ok(conversation) => {
                    let key = pair_key(&conversation.participants[0], &conversation.participants[1]);
                    pairs.insert(key, conversation.id.clone());
                    records.insert(
                        conversation.id.clone(),
                        Arc::new(RwLock::new(conversation)),
                    );
                }
                Err(e) => {
                    warn!("[Store] Skipping unreadable record {:?}: {}", path, e);
                }
            }
        }

        Ok(())
    }

    /// Persist a conversation document atomically.
    async fn save_to_disk(&self, conversation: &Conversation) -> Result<()> {
        let path = self.record_path(&conversation.id);
        let temp_path = path.with_extension("tmp");

        let json = serde_json::to_string_pretty(conversation)
            .map_err(|e| Error::Unavailable(format!("serialize conversation: {}", e)))?;

        fs::write(&temp_path, json)
            .await
            .map_err(|e| Error::Unavailable(format!("write conversation: {}", e)))?;
        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| Error::Unavailable(format!("commit conversation: {}", e)))?;

        Ok(())
    }

    /// Look up the conversation for an unordered pair, creating it with an
    /// empty thread list if absent. At most one conversation exists per
    /// pair even under concurrent identical calls.
    pub async fn find_or_create(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<Arc<RwLock<Conversation>>> {
        let key = pair_key(a, b);

        // Fast path: pair already known.
        {
            let pairs = self.pairs.read().await;
            if let Some(id) = pairs.get(&key) {
                if let Some(record) = self.records.read().await.get(id) {
                    return Ok(record.clone());
                }
            }
        }

        // Authoritative check-then-insert under the index write lock.
        let mut pairs = self.pairs.write().await;
        if let Some(id) = pairs.get(&key) {
            // Lost the race; re-read the winner's record.
            return self
                .records
                .read()
                .await
                .get(id)
                .cloned()
                .ok_or_else(|| Error::Conflict(format!("conversation {} vanished mid-create", id)));
        }

        let conversation = Conversation::new(a.clone(), b.clone());
        self.save_to_disk(&conversation).await?;

        let id = conversation.id.clone();
        let record = Arc::new(RwLock::new(conversation));
        self.records.write().await.insert(id.clone(), record.clone());
        pairs.insert(key, id.clone());

        info!("[Store] Created conversation {} for pair ({}, {})", id, a, b);

        Ok(record)
    }

    /// Look up a conversation by its unordered pair without creating one.
    pub async fn find_by_pair(&self, a: &UserId, b: &UserId) -> Option<Arc<RwLock<Conversation>>> {
        let key = pair_key(a, b);
        let pairs = self.pairs.read().await;
        let id = pairs.get(&key)?;
        self.records.read().await.get(id).cloned()
    }

    /// Get a conversation record by id.
    pub async fn get(&self, conversation_id: &str) -> Result<Arc<RwLock<Conversation>>> {
        self.records
            .read()
            .await
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("conversation {}", conversation_id)))
    }

    /// Transactional read-modify-write on one conversation document.
    ///
    /// The record stays write-locked across the mutation and the disk
    /// write, so entry-level edits on the same conversation serialize.
    /// The disk is the authority: if the mutation or the write fails,
    /// the cached record rolls back to its prior state so reads never
    /// reflect an operation that failed.
    pub async fn update<R, F>(&self, conversation_id: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut Conversation) -> Result<R>,
    {
        let record = self.get(conversation_id).await?;
        let mut conversation = record.write().await;
        let snapshot = conversation.clone();

        let out = match f(&mut conversation) {
            Ok(out) => out,
            Err(e) => {
                *conversation = snapshot;
                return Err(e);
            }
        };
        conversation.updated_at = Utc::now();

        if let Err(e) = self.save_to_disk(&conversation).await {
            *conversation = snapshot;
            return Err(e);
        }

        Ok(out)
    }

    /// Add a thread reference to the conversation's ordered list.
    /// Idempotent if the thread is already present.
    pub async fn append_thread(
        &self,
        conversation_id: &str,
        thread: MessageThread,
    ) -> Result<()> {
        self.update(conversation_id, |conversation| {
            if !conversation.threads.iter().any(|t| t.id == thread.id) {
                conversation.threads.push(thread);
            }
            Ok(())
        })
        .await
    }

    /// Soft-delete the whole conversation. Irreversible.
    pub async fn mark_deleted(&self, conversation_id: &str) -> Result<()> {
        self.update(conversation_id, |conversation| {
            conversation.is_chat_deleted = true;
            Ok(())
        })
        .await?;

        info!("[Store] Conversation {} marked deleted", conversation_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn uid(s: &str) -> UserId {
        UserId::from(s)
    }

    #[tokio::test]
    async fn test_find_or_create_is_pair_order_insensitive() {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path()).await.unwrap();

        let c1 = store.find_or_create(&uid("alice"), &uid("bob")).await.unwrap();
        let c2 = store.find_or_create(&uid("bob"), &uid("alice")).await.unwrap();

        assert_eq!(c1.read().await.id, c2.read().await.id);
    }

    #[tokio::test]
    async fn test_concurrent_find_or_create_yields_one_record() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ConversationStore::new(dir.path()).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let (a, b) = if i % 2 == 0 {
                    (uid("alice"), uid("bob"))
                } else {
                    (uid("bob"), uid("alice"))
                };
                let record = store.find_or_create(&a, &b).await.unwrap();
                let id = record.read().await.id.clone();
                id
            }));
        }

        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1, "all racers must resolve to one conversation");
    }

    #[tokio::test]
    async fn test_records_survive_reload() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = ConversationStore::new(dir.path()).await.unwrap();
            let record = store.find_or_create(&uid("alice"), &uid("bob")).await.unwrap();
            let id = record.read().await.id.clone();
            store.mark_deleted(&id).await.unwrap();
            id
        };

        let store = ConversationStore::new(dir.path()).await.unwrap();
        let record = store.get(&id).await.unwrap();
        assert!(record.read().await.is_chat_deleted);

        // Pair index rebuilt too
        let by_pair = store.find_by_pair(&uid("bob"), &uid("alice")).await.unwrap();
        assert_eq!(by_pair.read().await.id, id);
    }

    #[tokio::test]
    async fn test_stale_id_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path()).await.unwrap();

        let err = store.mark_deleted("no-such-conversation").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_append_thread_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path()).await.unwrap();

        let record = store.find_or_create(&uid("alice"), &uid("bob")).await.unwrap();
        let id = record.read().await.id.clone();

        let thread = MessageThread::new(uid("alice"), uid("bob"));
        store.append_thread(&id, thread.clone()).await.unwrap();
        store.append_thread(&id, thread).await.unwrap();

        assert_eq!(record.read().await.threads.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_cache_unchanged() {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path()).await.unwrap();

        let record = store.find_or_create(&uid("alice"), &uid("bob")).await.unwrap();
        let id = record.read().await.id.clone();

        // Make the commit rename fail by putting a directory where the
        // record document lives.
        let path = dir.path().join(format!("{}.json", id));
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        let err = store.mark_deleted(&id).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));

        // The cached record must still reflect the last persisted state.
        assert!(!record.read().await.is_chat_deleted);
    }

    #[tokio::test]
    async fn test_failed_mutation_rolls_back_cache() {
        let dir = TempDir::new().unwrap();
        let store = ConversationStore::new(dir.path()).await.unwrap();

        let record = store.find_or_create(&uid("alice"), &uid("bob")).await.unwrap();
        let id = record.read().await.id.clone();

        let err = store
            .update(&id, |conversation| {
                conversation.is_chat_deleted = true;
                Err::<(), _>(Error::InvalidArgument("bad edit".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(!record.read().await.is_chat_deleted);
    }
}
