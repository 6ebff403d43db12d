//! Narrow interfaces onto the persistent chat/social backend.
//!
//! The relay never owns users, friendships, conversations or call history.
//! It reads them through these traits so the storage layer can be swapped
//! (SQLite here, the chat backend's own database in production).

pub mod sqlite;

use async_trait::async_trait;
use std::collections::HashSet;
use uuid::Uuid;

use crate::db::models::{CallRecord, CallUpdate, Participant};
use crate::error::StoreError;

pub use sqlite::SqliteStore;

/// Friend lookup used by presence.
#[async_trait]
pub trait SocialGraph: Send + Sync {
    /// Users this user added plus users who added this user, deduplicated.
    async fn friend_ids(&self, user_id: &str) -> Result<HashSet<String>, StoreError>;
}

/// Conversation membership and push-token lookup used by the delivery fallback.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn participants(&self, conversation_id: &str) -> Result<Vec<Participant>, StoreError>;

    async fn push_token(&self, user_id: &str) -> Result<Option<String>, StoreError>;
}

/// Call history sink. Invoked by the application layer, never by the relay.
#[async_trait]
pub trait CallLog: Send + Sync {
    async fn persist_call_record(&self, record: &CallRecord) -> Result<(), StoreError>;

    /// Returns `None` when no record with `id` exists.
    async fn update_call_record(
        &self,
        id: Uuid,
        update: &CallUpdate,
    ) -> Result<Option<CallRecord>, StoreError>;
}
