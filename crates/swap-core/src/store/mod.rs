//! Interfaces to the external record stores.
//!
//! Users, skills, matches and messages live outside the engine. Components
//! talk to them through these narrow traits; [`MemoryStore`] implements all of
//! them for tests and single-process deployments.

mod memory;

pub use memory::{MemoryStore, Seed};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::model::{
    ChatMessage, Match, MatchStatus, MessageId, NewMatch, NewMessage, Skill, UserProfile,
};

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A record targeted by an update does not exist.
    #[error("{0} does not exist")]
    Missing(String),

    /// The store did not answer in time.
    #[error("Store timed out")]
    Timeout,

    /// The store is unreachable or failed.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Match records.
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Persist a new pending match.
    async fn insert_match(&self, new: NewMatch) -> Result<Match, StoreError>;

    /// Find a match by id.
    async fn find_match(&self, id: &str) -> Result<Option<Match>, StoreError>;

    /// All matches between two users, in either orientation.
    async fn matches_between(&self, user_a: &str, user_b: &str) -> Result<Vec<Match>, StoreError>;

    /// Matches in which `user` participates, newest first, optionally filtered by status.
    async fn matches_for_user(
        &self,
        user: &str,
        status: Option<MatchStatus>,
    ) -> Result<Vec<Match>, StoreError>;

    /// Set the status of a match and bump its update time.
    async fn update_status(&self, id: &str, status: MatchStatus) -> Result<Match, StoreError>;

    /// Append a message id to a match and bump its update time.
    async fn append_message(&self, match_id: &str, message_id: &str) -> Result<(), StoreError>;
}

/// Message records.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new unread message.
    async fn insert_message(&self, new: NewMessage) -> Result<ChatMessage, StoreError>;

    /// Messages of a match, oldest first.
    async fn messages_for_match(&self, match_id: &str) -> Result<Vec<ChatMessage>, StoreError>;

    /// Most recent message of a match.
    async fn last_message(&self, match_id: &str) -> Result<Option<ChatMessage>, StoreError>;

    /// Remove a message that never made it into its match.
    ///
    /// Returns whether a message was removed.
    async fn delete_message(&self, match_id: &str, message_id: &str) -> Result<bool, StoreError>;

    /// Mark the listed messages of the match as read, if they are addressed
    /// to `recipient` and still unread.
    ///
    /// Returns the number of messages updated.
    async fn mark_read(
        &self,
        match_id: &str,
        recipient: &str,
        message_ids: &[MessageId],
    ) -> Result<usize, StoreError>;

    /// Count unread messages of the match addressed to `recipient`.
    async fn count_unread(&self, match_id: &str, recipient: &str) -> Result<usize, StoreError>;
}

/// Read access to skill records.
#[async_trait]
pub trait SkillDirectory: Send + Sync {
    /// Find a skill by id, only if it belongs to `owner`.
    async fn find_skill(&self, id: &str, owner: &str) -> Result<Option<Skill>, StoreError>;

    /// Active skills with the given offered flag, excluding those owned by `exclude_owner`.
    async fn find_skills(
        &self,
        is_offered: bool,
        exclude_owner: &str,
    ) -> Result<Vec<Skill>, StoreError>;
}

/// Read access to user records.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find a user's display fields by id.
    async fn find_user(&self, id: &str) -> Result<Option<UserProfile>, StoreError>;
}

/// The set of stores the engine depends on.
#[derive(Clone)]
pub struct Stores {
    pub matches: Arc<dyn MatchStore>,
    pub messages: Arc<dyn MessageStore>,
    pub skills: Arc<dyn SkillDirectory>,
    pub users: Arc<dyn UserDirectory>,
}

impl Stores {
    /// Back every store with one in-memory store.
    #[must_use]
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            matches: store.clone(),
            messages: store.clone(),
            skills: store.clone(),
            users: store,
        }
    }
}
