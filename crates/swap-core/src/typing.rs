//! Typing indicators.
//!
//! Entries are keyed by (match, user) and expire after a fixed TTL. A
//! background sweeper removes expired entries and tells the channel the user
//! stopped typing.

use crate::channel::ConnectionId;
use crate::model::{MatchId, UserId};
use crate::router::Router;
use dashmap::DashMap;
use skillswap_protocol::ServerEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace};

/// Default lifetime of an entry that is neither refreshed nor stopped.
pub const DEFAULT_TYPING_TTL: Duration = Duration::from_secs(30);

/// Default period of the expiry sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

type TypingKey = (MatchId, UserId);

/// One "is typing" signal.
#[derive(Debug, Clone)]
pub struct TypingEntry {
    /// Connection that started typing.
    pub connection_id: ConnectionId,
    /// Time of the last `typing_start`.
    pub since: Instant,
}

/// Tracker of who is typing in which match.
pub struct TypingTracker {
    router: Arc<Router>,
    entries: DashMap<TypingKey, TypingEntry>,
    ttl: Duration,
}

impl TypingTracker {
    /// Create a tracker with the given entry lifetime.
    #[must_use]
    pub fn new(router: Arc<Router>, ttl: Duration) -> Self {
        Self {
            router,
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Record that `user_id` is typing in `match_id` and tell the other members.
    pub fn start(&self, match_id: &str, user_id: &str, connection_id: &str) {
        self.entries.insert(
            (match_id.to_string(), user_id.to_string()),
            TypingEntry {
                connection_id: connection_id.to_string(),
                since: Instant::now(),
            },
        );
        trace!(channel = %match_id, user = %user_id, "Typing started");
        self.router.broadcast(
            match_id,
            ServerEvent::typing(user_id, true),
            Some(connection_id),
        );
    }

    /// Clear the entry of `user_id` in `match_id` and tell the other members.
    ///
    /// Stopping without a prior start still notifies the channel.
    pub fn stop(&self, match_id: &str, user_id: &str, connection_id: &str) {
        self.entries
            .remove(&(match_id.to_string(), user_id.to_string()));
        trace!(channel = %match_id, user = %user_id, "Typing stopped");
        self.router.broadcast(
            match_id,
            ServerEvent::typing(user_id, false),
            Some(connection_id),
        );
    }

    /// Check if a user is currently typing in a match.
    #[must_use]
    pub fn is_typing(&self, match_id: &str, user_id: &str) -> bool {
        self.entries
            .contains_key(&(match_id.to_string(), user_id.to_string()))
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nobody is typing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry older than the TTL.
    ///
    /// Each removed entry produces one `user_typing{is_typing: false}` to
    /// every member of its channel. Returns the number of entries removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let expired: Vec<TypingKey> = self
            .entries
            .iter()
            .filter(|e| now.duration_since(e.since) > ttl)
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            // Re-check under the entry lock: a refresh may have landed meanwhile.
            if let Some(((match_id, user_id), _)) = self
                .entries
                .remove_if(&key, |_, e| now.duration_since(e.since) > ttl)
            {
                self.router
                    .broadcast(&match_id, ServerEvent::typing(&user_id, false), None);
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, "Expired typing entries");
        }
        removed
    }

    /// Remove every entry of a user, telling each affected channel.
    ///
    /// Returns the matches the user was typing in.
    pub fn clear_user(&self, user_id: &str) -> Vec<MatchId> {
        let keys: Vec<TypingKey> = self
            .entries
            .iter()
            .filter(|e| e.key().1 == user_id)
            .map(|e| e.key().clone())
            .collect();

        let mut cleared = Vec::new();
        for key in keys {
            if let Some(((match_id, _), _)) = self.entries.remove(&key) {
                self.router
                    .broadcast(&match_id, ServerEvent::typing(user_id, false), None);
                cleared.push(match_id);
            }
        }
        cleared
    }

    /// Spawn the periodic expiry sweep.
    ///
    /// The task runs until [`SweeperHandle::shutdown`] is called or the
    /// handle is dropped.
    #[must_use]
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        let tracker = Arc::clone(self);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = tracker.sweep_expired();
                        if removed > 0 {
                            metrics::counter!("skillswap_typing_expired_total")
                                .increment(removed as u64);
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            info!("Typing sweeper stopped");
        });

        info!(interval_ms = interval.as_millis() as u64, "Typing sweeper started");
        SweeperHandle {
            stop: stop_tx,
            task: Some(task),
        }
    }
}

/// Handle to the background sweep task.
pub struct SweeperHandle {
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to finish.
    pub async fn shutdown(mut self) {
        let _ = self.stop.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
