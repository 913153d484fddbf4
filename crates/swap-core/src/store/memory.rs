//! In-memory implementation of every store trait.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use super::{MatchStore, MessageStore, SkillDirectory, StoreError, UserDirectory};
use crate::model::{
    generate_id, now_millis, ChatMessage, Match, MatchId, MatchStatus, MessageId, NewMatch,
    NewMessage, Skill, SkillId, UserId, UserProfile,
};

/// Users and skills loaded into a fresh store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub users: Vec<UserProfile>,
    #[serde(default)]
    pub skills: Vec<Skill>,
}

/// A process-local store. Contents vanish on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<UserId, UserProfile>,
    skills: DashMap<SkillId, Skill>,
    matches: DashMap<MatchId, Match>,
    /// Messages per match, in persistence order.
    messages: DashMap<MatchId, Vec<ChatMessage>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the users and skills of a seed.
    #[must_use]
    pub fn with_seed(seed: Seed) -> Self {
        let store = Self::new();
        for user in seed.users {
            store.insert_user(user);
        }
        for skill in seed.skills {
            store.insert_skill(skill);
        }
        store
    }

    /// Load a JSON seed file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid seed.
    pub fn from_seed_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Unavailable(format!("cannot read seed {}: {e}", path.display()))
        })?;
        let seed: Seed = serde_json::from_str(&contents).map_err(|e| {
            StoreError::Unavailable(format!("cannot parse seed {}: {e}", path.display()))
        })?;
        info!(
            users = seed.users.len(),
            skills = seed.skills.len(),
            "Loaded store seed from {}",
            path.display()
        );
        Ok(Self::with_seed(seed))
    }

    /// Add or replace a user.
    pub fn insert_user(&self, user: UserProfile) {
        self.users.insert(user.id.clone(), user);
    }

    /// Add or replace a skill.
    pub fn insert_skill(&self, skill: Skill) {
        self.skills.insert(skill.id.clone(), skill);
    }

    /// Number of stored matches.
    #[must_use]
    pub fn match_count(&self) -> usize {
        self.matches.len()
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn insert_match(&self, new: NewMatch) -> Result<Match, StoreError> {
        let now = now_millis();
        let record = Match {
            id: generate_id("match"),
            user1: new.user1,
            user2: new.user2,
            user1_skill: new.user1_skill,
            user2_skill: new.user2_skill,
            status: MatchStatus::Pending,
            score: new.score,
            initiated_by: new.initiated_by,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        debug!(id = %record.id, "Stored match");
        self.matches.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn find_match(&self, id: &str) -> Result<Option<Match>, StoreError> {
        Ok(self.matches.get(id).map(|m| m.clone()))
    }

    async fn matches_between(&self, user_a: &str, user_b: &str) -> Result<Vec<Match>, StoreError> {
        Ok(self
            .matches
            .iter()
            .filter(|m| {
                (m.user1 == user_a && m.user2 == user_b) || (m.user1 == user_b && m.user2 == user_a)
            })
            .map(|m| m.clone())
            .collect())
    }

    async fn matches_for_user(
        &self,
        user: &str,
        status: Option<MatchStatus>,
    ) -> Result<Vec<Match>, StoreError> {
        let mut found: Vec<Match> = self
            .matches
            .iter()
            .filter(|m| m.is_participant(user))
            .filter(|m| status.map_or(true, |s| m.status == s))
            .map(|m| m.clone())
            .collect();
        found.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(found)
    }

    async fn update_status(&self, id: &str, status: MatchStatus) -> Result<Match, StoreError> {
        let mut record = self
            .matches
            .get_mut(id)
            .ok_or_else(|| StoreError::Missing(format!("match {id}")))?;
        record.status = status;
        record.updated_at = now_millis();
        Ok(record.clone())
    }

    async fn append_message(&self, match_id: &str, message_id: &str) -> Result<(), StoreError> {
        let mut record = self
            .matches
            .get_mut(match_id)
            .ok_or_else(|| StoreError::Missing(format!("match {match_id}")))?;
        record.messages.push(message_id.to_string());
        record.updated_at = now_millis();
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert_message(&self, new: NewMessage) -> Result<ChatMessage, StoreError> {
        let message = ChatMessage {
            id: generate_id("msg"),
            sender: new.sender,
            recipient: new.recipient,
            match_id: new.match_id,
            content: new.content,
            is_read: false,
            created_at: now_millis(),
        };
        self.messages
            .entry(message.match_id.clone())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn messages_for_match(&self, match_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self
            .messages
            .get(match_id)
            .map(|m| m.clone())
            .unwrap_or_default())
    }

    async fn last_message(&self, match_id: &str) -> Result<Option<ChatMessage>, StoreError> {
        Ok(self
            .messages
            .get(match_id)
            .and_then(|m| m.last().cloned()))
    }

    async fn delete_message(&self, match_id: &str, message_id: &str) -> Result<bool, StoreError> {
        let Some(mut messages) = self.messages.get_mut(match_id) else {
            return Ok(false);
        };
        let before = messages.len();
        messages.retain(|m| m.id != message_id);
        Ok(messages.len() < before)
    }

    async fn mark_read(
        &self,
        match_id: &str,
        recipient: &str,
        message_ids: &[MessageId],
    ) -> Result<usize, StoreError> {
        let Some(mut messages) = self.messages.get_mut(match_id) else {
            return Ok(0);
        };
        let mut updated = 0;
        for message in messages.iter_mut() {
            if message.recipient == recipient
                && !message.is_read
                && message_ids.contains(&message.id)
            {
                message.is_read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn count_unread(&self, match_id: &str, recipient: &str) -> Result<usize, StoreError> {
        Ok(self
            .messages
            .get(match_id)
            .map(|m| {
                m.iter()
                    .filter(|msg| msg.recipient == recipient && !msg.is_read)
                    .count()
            })
            .unwrap_or(0))
    }
}

#[async_trait]
impl SkillDirectory for MemoryStore {
    async fn find_skill(&self, id: &str, owner: &str) -> Result<Option<Skill>, StoreError> {
        Ok(self
            .skills
            .get(id)
            .filter(|s| s.owner == owner)
            .map(|s| s.clone()))
    }

    async fn find_skills(
        &self,
        is_offered: bool,
        exclude_owner: &str,
    ) -> Result<Vec<Skill>, StoreError> {
        Ok(self
            .skills
            .iter()
            .filter(|s| s.is_active && s.is_offered == is_offered && s.owner != exclude_owner)
            .map(|s| s.clone())
            .collect())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, id: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.users.get(id).map(|u| u.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_message(sender: &str, recipient: &str) -> NewMessage {
        NewMessage {
            sender: sender.into(),
            recipient: recipient.into(),
            match_id: "m1".into(),
            content: "hi".into(),
        }
    }

    #[tokio::test]
    async fn test_mark_read_only_for_recipient() {
        let store = MemoryStore::new();
        let mut ids = Vec::new();
        for (sender, recipient) in [("alice", "bob"), ("alice", "bob"), ("bob", "alice")] {
            let m = store.insert_message(new_message(sender, recipient)).await.unwrap();
            ids.push(m.id);
        }

        assert_eq!(store.count_unread("m1", "bob").await.unwrap(), 2);
        assert_eq!(store.mark_read("m1", "bob", &ids).await.unwrap(), 2);
        assert_eq!(store.count_unread("m1", "bob").await.unwrap(), 0);
        assert_eq!(store.count_unread("m1", "alice").await.unwrap(), 1);
        assert_eq!(store.mark_read("m1", "bob", &ids).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_read_leaves_unlisted_messages() {
        let store = MemoryStore::new();
        let seen = store.insert_message(new_message("alice", "bob")).await.unwrap();
        store.insert_message(new_message("alice", "bob")).await.unwrap();

        assert_eq!(store.mark_read("m1", "bob", &[seen.id]).await.unwrap(), 1);
        assert_eq!(store.count_unread("m1", "bob").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_message() {
        let store = MemoryStore::new();
        let kept = store.insert_message(new_message("alice", "bob")).await.unwrap();
        let dropped = store.insert_message(new_message("bob", "alice")).await.unwrap();

        assert!(store.delete_message("m1", &dropped.id).await.unwrap());
        assert!(!store.delete_message("m1", &dropped.id).await.unwrap());
        assert!(!store.delete_message("other", &kept.id).await.unwrap());

        let left = store.messages_for_match("m1").await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, kept.id);
    }

    #[tokio::test]
    async fn test_last_message_follows_insert_order() {
        let store = MemoryStore::new();
        store.insert_message(new_message("alice", "bob")).await.unwrap();
        let second = store.insert_message(new_message("bob", "alice")).await.unwrap();

        let last = store.last_message("m1").await.unwrap().unwrap();
        assert_eq!(last.id, second.id);
        assert!(store.last_message("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_match() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.update_status("nope", MatchStatus::Accepted).await,
            Err(StoreError::Missing(_))
        ));
        assert!(store.append_message("nope", "msg_1").await.is_err());
    }

    #[test]
    fn test_seed_from_json() {
        let seed: Seed = serde_json::from_str(
            r#"{
                "users": [{"id": "alice", "name": "Alice"}],
                "skills": [{
                    "id": "s1", "owner": "alice", "name": "Guitar",
                    "category": "Music", "level": "Advanced", "mode": "Online"
                }]
            }"#,
        )
        .unwrap();
        let store = MemoryStore::with_seed(seed);
        assert_eq!(store.users.len(), 1);
        assert_eq!(store.skills.len(), 1);
    }
}
