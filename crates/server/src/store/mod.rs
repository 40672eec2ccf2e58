//! Conversation storage module
//!
//! JSON-document persistence for conversations: one file per record,
//! atomic writes, in-memory cache as the single serialization point.

pub mod json_store;

pub use json_store::ConversationStore;
