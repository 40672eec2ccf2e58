//! Message threads and soft-delete semantics
//!
//! All mutations go through the conversation store's transactional
//! read-modify-write, so concurrent writers on the same conversation
//! serialize on the record lock and last writer wins on conflicting
//! fields.

use crate::error::{Error, Result};
use crate::models::{
    DeleteMode, Entry, MessageThread, RealtimeEvent, SendOutcome, UserId, VisibleEntry,
};
use crate::realtime::Dispatcher;
use crate::store::ConversationStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// Orchestrates sends, edits, deletes, and reads over conversation
/// records, notifying recipients through the dispatcher.
pub struct MessageService {
    store: Arc<ConversationStore>,
    dispatcher: Dispatcher,
}

impl MessageService {
    pub fn new(store: Arc<ConversationStore>, dispatcher: Dispatcher) -> Self {
        Self { store, dispatcher }
    }

    /// Append `text` to the sender's directional thread in the pair's
    /// conversation, creating conversation and thread as needed. Two
    /// consecutive sends in the same direction land in one thread.
    pub async fn send(&self, sender: &UserId, receiver: &UserId, text: &str) -> Result<SendOutcome> {
        if text.trim().is_empty() {
            return Err(Error::InvalidArgument("message text is empty".into()));
        }

        let record = self.store.find_or_create(sender, receiver).await?;
        let conversation_id = record.read().await.id.clone();

        let outcome = self
            .store
            .update(&conversation_id, |conversation| {
                if conversation.thread_for_sender(sender).is_none() {
                    conversation
                        .threads
                        .push(MessageThread::new(sender.clone(), receiver.clone()));
                }
                let thread = conversation
                    .thread_for_sender(sender)
                    .ok_or_else(|| Error::Internal("thread missing after insert".into()))?;

                let entry = Entry::new(text);
                thread.entries.push(entry.clone());
                thread.updated_at = Utc::now();
                let thread_id = thread.id.clone();

                Ok(SendOutcome {
                    conversation_id: conversation.id.clone(),
                    thread_id,
                    entry,
                })
            })
            .await?;

        info!(
            "[Chat] {} -> {}: entry {} in thread {}",
            sender, receiver, outcome.entry.id, outcome.thread_id
        );

        self.dispatcher.notify(
            receiver,
            RealtimeEvent::NewMessage {
                conversation_id: outcome.conversation_id.clone(),
                thread_id: outcome.thread_id.clone(),
                sender_id: sender.clone(),
                entry: outcome.entry.clone(),
            },
        );

        Ok(outcome)
    }

    /// Replace an entry's text. Only the thread's originating sender may
    /// edit; the receiver is notified of the new content.
    pub async fn edit_entry(
        &self,
        requester: &UserId,
        other_user: &UserId,
        thread_id: &str,
        entry_id: &str,
        new_text: &str,
    ) -> Result<Entry> {
        if new_text.trim().is_empty() {
            return Err(Error::InvalidArgument("message text is empty".into()));
        }

        let conversation_id = self.conversation_id_for_pair(requester, other_user).await?;

        let (receiver, entry) = self
            .store
            .update(&conversation_id, |conversation| {
                let thread = conversation
                    .thread_by_id(thread_id)
                    .ok_or_else(|| Error::NotFound(format!("thread {}", thread_id)))?;
                if &thread.sender_id != requester {
                    return Err(Error::Forbidden(
                        "only the sender may edit this message".into(),
                    ));
                }
                let receiver = thread.receiver_id.clone();
                let entry = thread
                    .entry_by_id(entry_id)
                    .ok_or_else(|| Error::NotFound(format!("entry {}", entry_id)))?;
                entry.text = new_text.to_string();
                entry.updated_at = Utc::now();
                Ok((receiver, entry.clone()))
            })
            .await?;

        info!("[Chat] {} edited entry {} in thread {}", requester, entry_id, thread_id);

        self.dispatcher.notify(
            &receiver,
            RealtimeEvent::UpdateMessage {
                thread_id: thread_id.to_string(),
                entry: entry.clone(),
            },
        );

        Ok(entry)
    }

    /// Delete an entry, either for the sender alone (flag flip, entry
    /// retained) or for everyone (entry excised). Ownership rules match
    /// edit. Already-delivered events are not revoked.
    pub async fn delete_entry(
        &self,
        requester: &UserId,
        other_user: &UserId,
        thread_id: &str,
        entry_id: &str,
        mode: DeleteMode,
    ) -> Result<()> {
        let conversation_id = self.conversation_id_for_pair(requester, other_user).await?;

        let receiver = self
            .store
            .update(&conversation_id, |conversation| {
                let thread = conversation
                    .thread_by_id(thread_id)
                    .ok_or_else(|| Error::NotFound(format!("thread {}", thread_id)))?;
                if &thread.sender_id != requester {
                    return Err(Error::Forbidden(
                        "only the sender may delete this message".into(),
                    ));
                }
                let receiver = thread.receiver_id.clone();
                match mode {
                    DeleteMode::ForMe => {
                        let entry = thread
                            .entry_by_id(entry_id)
                            .ok_or_else(|| Error::NotFound(format!("entry {}", entry_id)))?;
                        entry.is_deleted_for_sender = true;
                    }
                    DeleteMode::ForEveryone => {
                        let before = thread.entries.len();
                        thread.entries.retain(|e| e.id != entry_id);
                        if thread.entries.len() == before {
                            return Err(Error::NotFound(format!("entry {}", entry_id)));
                        }
                    }
                }
                Ok(receiver)
            })
            .await?;

        info!(
            "[Chat] {} deleted entry {} in thread {} ({:?})",
            requester, entry_id, thread_id, mode
        );

        // delete-for-me is invisible to the other side
        if mode == DeleteMode::ForEveryone {
            self.dispatcher.notify(
                &receiver,
                RealtimeEvent::DeleteMessage {
                    thread_id: thread_id.to_string(),
                    entry_id: entry_id.to_string(),
                },
            );
        }

        Ok(())
    }

    /// Every entry of the pair's conversation that `reader` may see, in
    /// thread order then entry order. An absent conversation reads as
    /// empty, not as an error.
    pub async fn list_visible(&self, reader: &UserId, other_user: &UserId) -> Result<Vec<VisibleEntry>> {
        let Some(record) = self.store.find_by_pair(reader, other_user).await else {
            return Ok(Vec::new());
        };
        let conversation = record.read().await;

        if conversation.is_chat_deleted {
            return Ok(Vec::new());
        }

        let mut visible = Vec::new();
        for thread in &conversation.threads {
            let reader_is_sender = &thread.sender_id == reader;
            for entry in &thread.entries {
                if entry.is_deleted_for_sender && reader_is_sender {
                    continue;
                }
                visible.push(VisibleEntry {
                    conversation_id: conversation.id.clone(),
                    thread_id: thread.id.clone(),
                    sender_id: thread.sender_id.clone(),
                    receiver_id: thread.receiver_id.clone(),
                    entry: entry.clone(),
                });
            }
        }

        Ok(visible)
    }

    /// Soft-delete the whole conversation. Only a participant may do so.
    pub async fn delete_conversation(&self, requester: &UserId, conversation_id: &str) -> Result<()> {
        let record = self.store.get(conversation_id).await?;
        {
            let conversation = record.read().await;
            if !conversation.participants.contains(requester) {
                return Err(Error::Forbidden(
                    "only a participant may delete this conversation".into(),
                ));
            }
        }
        self.store.mark_deleted(conversation_id).await
    }

    async fn conversation_id_for_pair(&self, a: &UserId, b: &UserId) -> Result<String> {
        let record = self
            .store
            .find_by_pair(a, b)
            .await
            .ok_or_else(|| Error::NotFound(format!("conversation for ({}, {})", a, b)))?;
        let conversation = record.read().await;
        Ok(conversation.id.clone())
    }
}
