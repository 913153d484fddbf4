//! Conversation history and summaries for initial page loads.

use serde::Serialize;
use skillswap_protocol::{MessageRecord, SenderInfo};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::error::{bounded, ChatError};
use crate::model::{Match, MatchId, MatchStatus, MessageId, UserId, UserProfile};
use crate::store::Stores;

/// A match together with its messages, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct MatchHistory {
    #[serde(rename = "match")]
    pub record: Match,
    pub messages: Vec<MessageRecord>,
}

/// Preview of the newest message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastMessage {
    pub content: String,
    pub sender: UserId,
    pub created_at: u64,
}

/// One row of a user's conversation list.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub match_id: MatchId,
    pub status: MatchStatus,
    pub other_user: UserProfile,
    pub last_message: Option<LastMessage>,
    pub unread_count: usize,
    pub updated_at: u64,
}

/// Read side of the message store.
pub struct Conversations {
    stores: Stores,
    timeout: Duration,
}

impl Conversations {
    #[must_use]
    pub fn new(stores: Stores, timeout: Duration) -> Self {
        Self { stores, timeout }
    }

    /// Messages of a match as seen by `viewer`.
    ///
    /// The returned messages addressed to the viewer are marked read
    /// afterwards; the records still show their previous read state. A
    /// message stored while the history is being read stays unread.
    ///
    /// # Errors
    ///
    /// [`ChatError::NotFound`] if the match does not exist or `viewer` is not
    /// part of it; [`ChatError::Transient`] on store failure.
    pub async fn history(&self, match_id: &str, viewer: &str) -> Result<MatchHistory, ChatError> {
        let record = bounded(self.timeout, self.stores.matches.find_match(match_id))
            .await?
            .filter(|m| m.is_participant(viewer))
            .ok_or_else(|| ChatError::NotFound(format!("match {match_id}")))?;

        let stored = bounded(self.timeout, self.stores.messages.messages_for_match(match_id)).await?;

        let mut senders: HashMap<UserId, SenderInfo> = HashMap::new();
        let mut messages = Vec::with_capacity(stored.len());
        for message in &stored {
            let sender = match senders.get(&message.sender) {
                Some(info) => info.clone(),
                None => {
                    let info = bounded(self.timeout, self.stores.users.find_user(&message.sender))
                        .await?
                        .unwrap_or_else(|| UserProfile::unknown(&message.sender))
                        .sender_info();
                    senders.insert(message.sender.clone(), info.clone());
                    info
                }
            };
            messages.push(message.to_record(sender));
        }

        let shown: Vec<MessageId> = stored
            .iter()
            .filter(|m| m.recipient == viewer && !m.is_read)
            .map(|m| m.id.clone())
            .collect();
        let marked = if shown.is_empty() {
            0
        } else {
            bounded(
                self.timeout,
                self.stores.messages.mark_read(match_id, viewer, &shown),
            )
            .await?
        };
        debug!(channel = %match_id, viewer = %viewer, marked, "History loaded");

        Ok(MatchHistory { record, messages })
    }

    /// Conversation list of `user`, most recently updated first.
    ///
    /// Rejected matches are left out.
    ///
    /// # Errors
    ///
    /// [`ChatError::Forbidden`] if `caller` asks for someone else's list;
    /// [`ChatError::Transient`] on store failure.
    pub async fn conversations(
        &self,
        caller: &str,
        user: &str,
    ) -> Result<Vec<ConversationSummary>, ChatError> {
        if caller != user {
            return Err(ChatError::Forbidden(
                "cannot read another user's conversations".into(),
            ));
        }

        let mut matches = bounded(self.timeout, self.stores.matches.matches_for_user(user, None)).await?;
        matches.retain(|m| m.status != MatchStatus::Rejected);
        matches.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let mut summaries = Vec::with_capacity(matches.len());
        for record in matches {
            let Some(other) = record.other_participant(user) else {
                continue;
            };
            let other_user = bounded(self.timeout, self.stores.users.find_user(other))
                .await?
                .unwrap_or_else(|| UserProfile::unknown(other));
            let last_message = bounded(self.timeout, self.stores.messages.last_message(&record.id))
                .await?
                .map(|m| LastMessage {
                    content: m.content,
                    sender: m.sender,
                    created_at: m.created_at,
                });
            let unread_count =
                bounded(self.timeout, self.stores.messages.count_unread(&record.id, user)).await?;

            summaries.push(ConversationSummary {
                match_id: record.id,
                status: record.status,
                other_user,
                last_message,
                unread_count,
                updated_at: record.updated_at,
            });
        }
        Ok(summaries)
    }
}
