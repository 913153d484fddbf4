//! Presence registry.
//!
//! Tracks which users currently hold a live connection. One entry per user;
//! a reconnect replaces the previous entry.

use crate::channel::ConnectionId;
use crate::model::{now_millis, UserId};
use crate::router::Router;
use dashmap::DashMap;
use serde::Serialize;
use skillswap_protocol::ServerEvent;
use std::sync::Arc;
use tracing::debug;

/// Presence state of a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceEntry {
    /// Connection currently bound to the user.
    pub connection_id: ConnectionId,
    /// Last activity timestamp in milliseconds.
    pub last_seen: u64,
}

/// Answer to a presence lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceStatus {
    pub user_id: UserId,
    pub is_online: bool,
    pub last_seen: Option<u64>,
}

/// Registry of online users.
pub struct PresenceRegistry {
    router: Arc<Router>,
    entries: DashMap<UserId, PresenceEntry>,
    bindings: DashMap<ConnectionId, UserId>,
    /// Last seen time of users that went offline.
    offline_since: DashMap<UserId, u64>,
}

impl PresenceRegistry {
    /// Create an empty registry publishing through `router`.
    #[must_use]
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            entries: DashMap::new(),
            bindings: DashMap::new(),
            offline_since: DashMap::new(),
        }
    }

    /// Bind `user_id` to `connection_id` and announce them online.
    ///
    /// Any previous entry for the user is replaced. The announcement goes to
    /// every registered connection except `connection_id`.
    pub fn mark_online(&self, user_id: &str, connection_id: &str) {
        let now = now_millis();

        if let Some(previous) = self.bindings.insert(connection_id.to_string(), user_id.to_string()) {
            if previous != user_id {
                // The connection switched identity; release the old user.
                self.entries
                    .remove_if(&previous, |_, e| e.connection_id == connection_id);
            }
        }

        let replaced = self.entries.insert(
            user_id.to_string(),
            PresenceEntry {
                connection_id: connection_id.to_string(),
                last_seen: now,
            },
        );
        if let Some(old) = replaced {
            if old.connection_id != connection_id {
                self.bindings.remove_if(&old.connection_id, |_, u| u == user_id);
                debug!(user = %user_id, old = %old.connection_id, "Presence replaced");
            }
        }
        self.offline_since.remove(user_id);

        debug!(user = %user_id, connection = %connection_id, "User online");

        self.router.broadcast_all(
            ServerEvent::UserStatusChange {
                user_id: user_id.to_string(),
                is_online: true,
                last_seen: now,
            },
            Some(connection_id),
        );
    }

    /// Release the user bound to `connection_id`.
    ///
    /// The user is only marked offline if their entry still belongs to this
    /// connection. Returns the user that went offline.
    pub fn mark_offline(&self, connection_id: &str) -> Option<UserId> {
        let (_, user_id) = self.bindings.remove(connection_id)?;
        let removed = self
            .entries
            .remove_if(&user_id, |_, e| e.connection_id == connection_id)?;

        let last_seen = now_millis().max(removed.1.last_seen);
        self.offline_since.insert(user_id.clone(), last_seen);

        debug!(user = %user_id, connection = %connection_id, "User offline");

        self.router.broadcast_all(
            ServerEvent::UserStatusChange {
                user_id: user_id.clone(),
                is_online: false,
                last_seen,
            },
            Some(connection_id),
        );
        Some(user_id)
    }

    /// Check if a user holds a live connection.
    #[must_use]
    pub fn is_online(&self, user_id: &str) -> bool {
        self.entries.contains_key(user_id)
    }

    /// Last time the user was seen, online or not.
    #[must_use]
    pub fn last_seen(&self, user_id: &str) -> Option<u64> {
        self.entries
            .get(user_id)
            .map(|e| e.last_seen)
            .or_else(|| self.offline_since.get(user_id).map(|t| *t))
    }

    /// Refresh the last seen time of the user bound to a connection.
    pub fn touch(&self, connection_id: &str) {
        if let Some(user) = self.bindings.get(connection_id) {
            if let Some(mut entry) = self.entries.get_mut(user.as_str()) {
                if entry.connection_id == connection_id {
                    entry.last_seen = now_millis();
                }
            }
        }
    }

    /// The user bound to a connection.
    #[must_use]
    pub fn user_for(&self, connection_id: &str) -> Option<UserId> {
        self.bindings.get(connection_id).map(|u| u.clone())
    }

    /// Presence of a user as reported to clients.
    #[must_use]
    pub fn status(&self, user_id: &str) -> PresenceStatus {
        PresenceStatus {
            user_id: user_id.to_string(),
            is_online: self.is_online(user_id),
            last_seen: self.last_seen(user_id),
        }
    }

    /// Number of online users.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.entries.len()
    }
}
