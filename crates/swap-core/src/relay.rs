//! Message relay.
//!
//! Persists a chat message and fans it out to the match channel. Nothing is
//! broadcast unless every store step succeeded.

use dashmap::DashMap;
use skillswap_protocol::events::validate_content;
use skillswap_protocol::{MessageRecord, ServerEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{bounded, ChatError};
use crate::model::{now_millis, MatchId, NewMessage};
use crate::router::Router;
use crate::store::Stores;

/// Relays chat messages between the participants of a match.
pub struct MessageRelay {
    router: Arc<Router>,
    stores: Stores,
    timeout: Duration,
    max_content_length: usize,
    /// Per-match locks ordering persistence and delivery.
    locks: DashMap<MatchId, Arc<Mutex<()>>>,
}

impl MessageRelay {
    /// Create a relay.
    #[must_use]
    pub fn new(
        router: Arc<Router>,
        stores: Stores,
        timeout: Duration,
        max_content_length: usize,
    ) -> Self {
        Self {
            router,
            stores,
            timeout,
            max_content_length,
            locks: DashMap::new(),
        }
    }

    /// Persist a message from `sender` in `match_id` and deliver it to the channel.
    ///
    /// The recipient is always the other participant of the match. Sends to
    /// one match are delivered in the order they were persisted.
    ///
    /// # Errors
    ///
    /// - [`ChatError::Validation`] for blank or oversized content.
    /// - [`ChatError::NotFound`] if the match or the sender's profile is missing.
    /// - [`ChatError::Forbidden`] if `sender` is not a participant.
    /// - [`ChatError::Transient`] if a store call fails or times out.
    pub async fn send(
        &self,
        sender: &str,
        match_id: &str,
        content: &str,
    ) -> Result<MessageRecord, ChatError> {
        validate_content(content, self.max_content_length)?;

        let lock = self.lock_for(match_id);
        let result = {
            let _guard = lock.lock().await;
            self.persist_and_broadcast(sender, match_id, content).await
        };
        drop(lock);
        self.locks
            .remove_if(match_id, |_, l| Arc::strong_count(l) == 1);

        match &result {
            Ok(record) => {
                metrics::counter!("skillswap_messages_relayed_total").increment(1);
                debug!(channel = %match_id, id = %record.id, sender = %sender, "Message relayed");
            }
            Err(e) => {
                metrics::counter!("skillswap_message_errors_total", "kind" => e.kind())
                    .increment(1);
                info!(channel = %match_id, sender = %sender, error = %e, "Message rejected");
            }
        }
        result
    }

    async fn persist_and_broadcast(
        &self,
        sender: &str,
        match_id: &str,
        content: &str,
    ) -> Result<MessageRecord, ChatError> {
        let record = bounded(self.timeout, self.stores.matches.find_match(match_id))
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("match {match_id}")))?;

        let recipient = record
            .other_participant(sender)
            .ok_or_else(|| ChatError::Forbidden("not a participant of this match".into()))?
            .to_string();

        let profile = bounded(self.timeout, self.stores.users.find_user(sender))
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("user {sender}")))?;

        let message = bounded(
            self.timeout,
            self.stores.messages.insert_message(NewMessage {
                sender: sender.to_string(),
                recipient,
                match_id: match_id.to_string(),
                content: content.to_string(),
            }),
        )
        .await?;

        if let Err(e) = bounded(
            self.timeout,
            self.stores.matches.append_message(match_id, &message.id),
        )
        .await
        {
            self.discard(match_id, &message.id).await;
            return Err(e);
        }

        let wire = message.to_record(profile.sender_info());
        let delivered = self.router.broadcast(
            match_id,
            ServerEvent::ReceiveMessage {
                message: wire.clone(),
                timestamp: now_millis(),
            },
            None,
        );
        debug!(channel = %match_id, recipients = delivered, "Delivered message");

        Ok(wire)
    }

    /// Remove a persisted message whose id could not be linked to its match.
    async fn discard(&self, match_id: &str, message_id: &str) {
        match bounded(
            self.timeout,
            self.stores.messages.delete_message(match_id, message_id),
        )
        .await
        {
            Ok(_) => debug!(channel = %match_id, id = %message_id, "Discarded unlinked message"),
            Err(e) => warn!(
                channel = %match_id,
                id = %message_id,
                error = %e,
                "Failed to discard unlinked message"
            ),
        }
    }

    fn lock_for(&self, match_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(match_id.to_string())
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Outbound;
    use crate::model::{ChatMessage, Match, MatchStatus, MessageId, NewMatch, UserProfile};
    use crate::store::{MatchStore, MemoryStore, MessageStore, StoreError};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    /// Message store that fails or stalls on insert.
    struct BrokenMessages {
        inner: Arc<MemoryStore>,
        stall: bool,
    }

    #[async_trait]
    impl MessageStore for BrokenMessages {
        async fn insert_message(&self, _new: NewMessage) -> Result<ChatMessage, StoreError> {
            if self.stall {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Err(StoreError::Unavailable("disk full".into()))
        }

        async fn messages_for_match(&self, match_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
            self.inner.messages_for_match(match_id).await
        }

        async fn last_message(&self, match_id: &str) -> Result<Option<ChatMessage>, StoreError> {
            self.inner.last_message(match_id).await
        }

        async fn delete_message(&self, match_id: &str, message_id: &str) -> Result<bool, StoreError> {
            self.inner.delete_message(match_id, message_id).await
        }

        async fn mark_read(
            &self,
            match_id: &str,
            recipient: &str,
            message_ids: &[MessageId],
        ) -> Result<usize, StoreError> {
            self.inner.mark_read(match_id, recipient, message_ids).await
        }

        async fn count_unread(&self, match_id: &str, recipient: &str) -> Result<usize, StoreError> {
            self.inner.count_unread(match_id, recipient).await
        }
    }

    /// Match store that cannot link messages to matches.
    struct UnlinkableMatches {
        inner: Arc<MemoryStore>,
    }

    #[async_trait]
    impl MatchStore for UnlinkableMatches {
        async fn insert_match(&self, new: NewMatch) -> Result<Match, StoreError> {
            self.inner.insert_match(new).await
        }

        async fn find_match(&self, id: &str) -> Result<Option<Match>, StoreError> {
            self.inner.find_match(id).await
        }

        async fn matches_between(&self, user_a: &str, user_b: &str) -> Result<Vec<Match>, StoreError> {
            self.inner.matches_between(user_a, user_b).await
        }

        async fn matches_for_user(
            &self,
            user: &str,
            status: Option<MatchStatus>,
        ) -> Result<Vec<Match>, StoreError> {
            self.inner.matches_for_user(user, status).await
        }

        async fn update_status(&self, id: &str, status: MatchStatus) -> Result<Match, StoreError> {
            self.inner.update_status(id, status).await
        }

        async fn append_message(&self, _match_id: &str, _message_id: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    enum Breakage {
        None,
        FailingInsert,
        StalledInsert,
        FailingAppend,
    }

    struct Fixture {
        relay: MessageRelay,
        store: Arc<MemoryStore>,
        match_id: String,
        alice: mpsc::UnboundedReceiver<Outbound>,
        bob: mpsc::UnboundedReceiver<Outbound>,
    }

    async fn fixture_with(breakage: Breakage) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        for (id, name) in [("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol")] {
            store.insert_user(UserProfile {
                id: id.into(),
                name: name.into(),
                profile_picture: None,
            });
        }
        let created = store
            .insert_match(NewMatch {
                user1: "alice".into(),
                user2: "bob".into(),
                user1_skill: "guitar".into(),
                user2_skill: "spanish".into(),
                score: 90,
                initiated_by: "alice".into(),
            })
            .await
            .unwrap();
        store
            .update_status(&created.id, MatchStatus::Accepted)
            .await
            .unwrap();

        let mut stores = Stores::memory(store.clone());
        match breakage {
            Breakage::None => {}
            Breakage::FailingInsert | Breakage::StalledInsert => {
                stores.messages = Arc::new(BrokenMessages {
                    inner: store.clone(),
                    stall: matches!(breakage, Breakage::StalledInsert),
                });
            }
            Breakage::FailingAppend => {
                stores.matches = Arc::new(UnlinkableMatches {
                    inner: store.clone(),
                });
            }
        }

        let router = Arc::new(Router::new());
        let (tx_a, alice) = mpsc::unbounded_channel();
        let (tx_b, bob) = mpsc::unbounded_channel();
        router.register("conn-a", tx_a).unwrap();
        router.register("conn-b", tx_b).unwrap();
        router.join("conn-a", &created.id).unwrap();
        router.join("conn-b", &created.id).unwrap();

        Fixture {
            relay: MessageRelay::new(router, stores, Duration::from_secs(5), 1000),
            store,
            match_id: created.id,
            alice,
            bob,
        }
    }

    #[tokio::test]
    async fn test_send_persists_and_broadcasts() {
        let mut f = fixture_with(Breakage::None).await;
        let record = f.relay.send("alice", &f.match_id, "hola").await.unwrap();

        assert_eq!(record.recipient_id, "bob");
        assert_eq!(record.sender.name, "Alice");
        assert!(!record.is_read);

        for rx in [&mut f.alice, &mut f.bob] {
            match &*rx.try_recv().unwrap() {
                ServerEvent::ReceiveMessage { message, .. } => assert_eq!(message, &record),
                other => panic!("unexpected event {other:?}"),
            }
        }

        let stored = f.store.find_match(&f.match_id).await.unwrap().unwrap();
        assert_eq!(stored.messages, vec![record.id.clone()]);
        assert_eq!(f.store.count_unread(&f.match_id, "bob").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_outsider_is_forbidden() {
        let mut f = fixture_with(Breakage::None).await;
        let err = f.relay.send("carol", &f.match_id, "hi").await;
        assert!(matches!(err, Err(ChatError::Forbidden(_))));
        assert!(f.alice.try_recv().is_err());
        assert!(f.bob.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_match() {
        let f = fixture_with(Breakage::None).await;
        let err = f.relay.send("alice", "match_missing", "hi").await;
        assert!(matches!(err, Err(ChatError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_content_validation() {
        let f = fixture_with(Breakage::None).await;
        let blank = f.relay.send("alice", &f.match_id, "   ").await;
        assert!(matches!(blank, Err(ChatError::Validation(_))));

        let long = "x".repeat(1001);
        let oversized = f.relay.send("alice", &f.match_id, &long).await;
        assert!(matches!(oversized, Err(ChatError::Validation(_))));

        let exact = "é".repeat(1000);
        assert!(f.relay.send("alice", &f.match_id, &exact).await.is_ok());
    }

    #[tokio::test]
    async fn test_store_failure_broadcasts_nothing() {
        let mut f = fixture_with(Breakage::FailingInsert).await;
        let err = f.relay.send("alice", &f.match_id, "hi").await;
        assert!(matches!(err, Err(ChatError::Transient(_))));
        assert!(f.alice.try_recv().is_err());
        assert!(f.bob.try_recv().is_err());

        let stored = f.store.find_match(&f.match_id).await.unwrap().unwrap();
        assert!(stored.messages.is_empty());
    }

    #[tokio::test]
    async fn test_failed_link_leaves_no_message() {
        let mut f = fixture_with(Breakage::FailingAppend).await;
        let err = f.relay.send("alice", &f.match_id, "hi").await;
        assert!(matches!(err, Err(ChatError::Transient(_))));
        assert!(f.alice.try_recv().is_err());
        assert!(f.bob.try_recv().is_err());

        let stored = f.store.find_match(&f.match_id).await.unwrap().unwrap();
        assert!(stored.messages.is_empty());
        assert!(f.store.messages_for_match(&f.match_id).await.unwrap().is_empty());
        assert_eq!(f.store.count_unread(&f.match_id, "bob").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_timeout_is_transient() {
        let mut f = fixture_with(Breakage::StalledInsert).await;
        let err = f.relay.send("alice", &f.match_id, "hi").await;
        assert!(matches!(err, Err(ChatError::Transient(_))));
        assert!(f.bob.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_concurrent_sends_share_one_order() {
        let mut f = fixture_with(Breakage::None).await;
        let relay = Arc::new(f.relay);
        let mut tasks = Vec::new();
        for i in 0..20 {
            let relay = Arc::clone(&relay);
            let match_id = f.match_id.clone();
            let sender = if i % 2 == 0 { "alice" } else { "bob" };
            tasks.push(tokio::spawn(async move {
                relay.send(sender, &match_id, &format!("m{i}")).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let ids = |rx: &mut mpsc::UnboundedReceiver<Outbound>| {
            let mut ids = Vec::new();
            while let Ok(event) = rx.try_recv() {
                if let ServerEvent::ReceiveMessage { message, .. } = &*event {
                    ids.push(message.id.clone());
                }
            }
            ids
        };
        let seen_by_alice = ids(&mut f.alice);
        let seen_by_bob = ids(&mut f.bob);
        assert_eq!(seen_by_alice.len(), 20);
        assert_eq!(seen_by_alice, seen_by_bob);

        let stored = f.store.find_match(&f.match_id).await.unwrap().unwrap();
        assert_eq!(stored.messages, seen_by_alice);
        assert!(relay.locks.is_empty());
    }
}
