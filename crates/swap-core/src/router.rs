//! Channel router.
//!
//! The router owns the outbound sink of every live connection and the
//! membership of every match channel. Nothing else mutates either map.

use crate::channel::{validate_channel_name, Channel, ChannelId, ConnectionId, Outbound, Sink};
use dashmap::{DashMap, DashSet};
use skillswap_protocol::ServerEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, trace};

/// Counter mixed into generated connection IDs.
static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique connection ID.
#[must_use]
pub fn generate_connection_id() -> ConnectionId {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    let counter = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("conn_{timestamp:x}_{counter:x}")
}

/// Router errors.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Invalid channel name.
    #[error("Invalid channel name: {0}")]
    InvalidChannel(&'static str),

    /// Connection has no registered sink.
    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    /// Connection already registered.
    #[error("Connection already registered: {0}")]
    AlreadyRegistered(String),

    /// Maximum connections reached.
    #[error("Maximum connections reached")]
    MaxConnectionsReached,

    /// Maximum subscriptions reached.
    #[error("Maximum subscriptions reached")]
    MaxSubscriptionsReached,
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Maximum number of registered connections.
    pub max_connections: usize,
    /// Maximum channels a connection may join.
    pub max_subscriptions_per_connection: usize,
    /// Whether to delete channels once their last member leaves.
    pub auto_delete_empty_channels: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_connections: 100_000,
            max_subscriptions_per_connection: 100,
            auto_delete_empty_channels: true,
        }
    }
}

/// The central channel router.
pub struct Router {
    /// Outbound sink per live connection.
    connections: DashMap<ConnectionId, Sink>,
    /// Channels indexed by match id.
    channels: DashMap<ChannelId, Channel>,
    /// Connection subscriptions (connection_id -> set of channel names).
    subscriptions: DashMap<ConnectionId, DashSet<ChannelId>>,
    /// Configuration.
    config: RouterConfig,
}

impl Router {
    /// Create a new router with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    /// Create a new router with custom configuration.
    #[must_use]
    pub fn with_config(config: RouterConfig) -> Self {
        info!("Creating router with config: {:?}", config);
        Self {
            connections: DashMap::new(),
            channels: DashMap::new(),
            subscriptions: DashMap::new(),
            config,
        }
    }

    /// Get router statistics.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            channel_count: self.channels.len(),
            connection_count: self.connections.len(),
            total_subscriptions: self.subscriptions.iter().map(|s| s.len()).sum(),
        }
    }

    /// Register the outbound sink of a new connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the ID is taken or the connection limit is reached.
    pub fn register(&self, connection_id: &str, sink: Sink) -> Result<(), RouterError> {
        if self.connections.len() >= self.config.max_connections {
            return Err(RouterError::MaxConnectionsReached);
        }
        match self.connections.entry(connection_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(RouterError::AlreadyRegistered(connection_id.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(sink);
                debug!(connection = %connection_id, "Connection registered");
                Ok(())
            }
        }
    }

    /// Check if a connection is registered.
    #[must_use]
    pub fn is_registered(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Join a connection to a match channel.
    ///
    /// Joining twice has no further effect. Returns `true` if the connection
    /// was not a member before.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel name is invalid, the connection is not
    /// registered, or the subscription limit is reached.
    pub fn join(&self, connection_id: &str, channel_name: &str) -> Result<bool, RouterError> {
        validate_channel_name(channel_name).map_err(RouterError::InvalidChannel)?;

        let sink = self
            .connections
            .get(connection_id)
            .map(|s| s.clone())
            .ok_or_else(|| RouterError::UnknownConnection(connection_id.to_string()))?;

        let conn_subs = self
            .subscriptions
            .entry(connection_id.to_string())
            .or_default();

        if conn_subs.contains(channel_name) {
            return Ok(false);
        }

        if conn_subs.len() >= self.config.max_subscriptions_per_connection {
            return Err(RouterError::MaxSubscriptionsReached);
        }

        let mut entry = self
            .channels
            .entry(channel_name.to_string())
            .or_insert_with(|| {
                debug!(channel = %channel_name, "Creating new channel");
                Channel::new(channel_name)
            });

        entry.subscribe(connection_id, sink);
        conn_subs.insert(channel_name.to_string());

        debug!(
            channel = %channel_name,
            connection = %connection_id,
            subscribers = entry.subscriber_count(),
            "Joined"
        );

        Ok(true)
    }

    /// Remove a connection from a match channel.
    ///
    /// Leaving a channel the connection is not in has no effect. Returns `true`
    /// if the connection was a member.
    pub fn leave(&self, connection_id: &str, channel_name: &str) -> bool {
        let was_member = self
            .subscriptions
            .get(connection_id)
            .map(|subs| subs.remove(channel_name).is_some())
            .unwrap_or(false);

        if was_member {
            self.detach(connection_id, channel_name);
            debug!(channel = %channel_name, connection = %connection_id, "Left");
        }

        was_member
    }

    /// Remove a connection from every channel and drop its sink.
    ///
    /// Returns the channels the connection was a member of.
    pub fn drop_connection(&self, connection_id: &str) -> Vec<ChannelId> {
        let mut left = Vec::new();
        if let Some((_, channels)) = self.subscriptions.remove(connection_id) {
            for channel_name in channels.iter() {
                self.detach(connection_id, channel_name.as_str());
                left.push(channel_name.clone());
            }
        }
        self.connections.remove(connection_id);

        debug!(connection = %connection_id, channels = left.len(), "Connection dropped");
        left
    }

    fn detach(&self, connection_id: &str, channel_name: &str) {
        if let Some(mut entry) = self.channels.get_mut(channel_name) {
            entry.unsubscribe(connection_id);

            if self.config.auto_delete_empty_channels && entry.is_empty() {
                drop(entry); // Release the lock
                self.channels.remove_if(channel_name, |_, c| c.is_empty());
                debug!(channel = %channel_name, "Deleted empty channel");
            }
        }
    }

    /// Deliver an event to every member of a channel, optionally skipping one connection.
    ///
    /// The channel entry is held exclusively while delivering, so every member
    /// sees concurrent broadcasts to the same channel in the same order.
    ///
    /// Returns the number of connections that received the event.
    pub fn broadcast(&self, channel_name: &str, event: ServerEvent, except: Option<&str>) -> usize {
        let event: Outbound = Arc::new(event);
        match self.channels.get_mut(channel_name) {
            Some(entry) => {
                let count = entry.publish(&event, except);
                trace!(channel = %channel_name, recipients = count, "Broadcast");
                count
            }
            None => {
                trace!(channel = %channel_name, "Broadcast to channel with no members");
                0
            }
        }
    }

    /// Deliver an event to every registered connection, optionally skipping one.
    pub fn broadcast_all(&self, event: ServerEvent, except: Option<&str>) -> usize {
        let event: Outbound = Arc::new(event);
        let mut delivered = 0;
        for entry in self.connections.iter() {
            if except == Some(entry.key().as_str()) {
                continue;
            }
            if entry.value().send(Arc::clone(&event)).is_ok() {
                delivered += 1;
            }
        }
        trace!(recipients = delivered, "Broadcast to all connections");
        delivered
    }

    /// Deliver an event to a single connection.
    ///
    /// Returns `false` if the connection is gone.
    pub fn send_to(&self, connection_id: &str, event: ServerEvent) -> bool {
        self.connections
            .get(connection_id)
            .map(|sink| sink.send(Arc::new(event)).is_ok())
            .unwrap_or(false)
    }

    /// Check if a channel exists.
    #[must_use]
    pub fn channel_exists(&self, channel_name: &str) -> bool {
        self.channels.contains_key(channel_name)
    }

    /// Check if a connection is a member of a channel.
    #[must_use]
    pub fn is_member(&self, connection_id: &str, channel_name: &str) -> bool {
        self.channels
            .get(channel_name)
            .map(|c| c.is_subscribed(connection_id))
            .unwrap_or(false)
    }

    /// Get the subscriber count for a channel.
    #[must_use]
    pub fn subscriber_count(&self, channel_name: &str) -> usize {
        self.channels
            .get(channel_name)
            .map(|e| e.subscriber_count())
            .unwrap_or(0)
    }

    /// Get the channels a connection is subscribed to.
    #[must_use]
    pub fn connection_channels(&self, connection_id: &str) -> Vec<ChannelId> {
        self.subscriptions
            .get(connection_id)
            .map(|s| s.iter().map(|c| c.clone()).collect())
            .unwrap_or_default()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Router statistics.
#[derive(Debug, Clone)]
pub struct RouterStats {
    /// Number of active channels.
    pub channel_count: usize,
    /// Number of registered connections.
    pub connection_count: usize,
    /// Total number of channel memberships.
    pub total_subscriptions: usize,
}
