//! Channel abstraction.
//!
//! A channel is the set of live connections currently joined to one match.
//! Each member is stored with its outbound sink so a publish can address
//! every member directly.

use skillswap_protocol::ServerEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Maximum channel name length.
pub const MAX_CHANNEL_NAME_LENGTH: usize = 256;

/// A channel identifier (the match id).
pub type ChannelId = String;

/// A connection identifier.
pub type ConnectionId = String;

/// A server event shared between every recipient of a publish.
pub type Outbound = Arc<ServerEvent>;

/// Outbound queue of one connection.
pub type Sink = mpsc::UnboundedSender<Outbound>;

/// Validate a channel name.
///
/// # Errors
///
/// Returns an error message if the channel name is invalid.
pub fn validate_channel_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Channel name cannot be empty");
    }
    if name.len() > MAX_CHANNEL_NAME_LENGTH {
        return Err("Channel name too long");
    }
    if !name.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("Channel name contains invalid characters");
    }
    Ok(())
}

/// A match channel.
#[derive(Debug)]
pub struct Channel {
    /// Channel name.
    name: ChannelId,
    /// Members and their sinks.
    subscribers: HashMap<ConnectionId, Sink>,
}

impl Channel {
    /// Create a new channel.
    #[must_use]
    pub fn new(name: impl Into<ChannelId>) -> Self {
        Self {
            name: name.into(),
            subscribers: HashMap::new(),
        }
    }

    /// Get the channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Check if a connection is subscribed.
    #[must_use]
    pub fn is_subscribed(&self, connection_id: &str) -> bool {
        self.subscribers.contains_key(connection_id)
    }

    /// Subscribe a connection to this channel.
    ///
    /// Returns `true` if the connection was not subscribed before.
    pub fn subscribe(&mut self, connection_id: impl Into<ConnectionId>, sink: Sink) -> bool {
        let conn_id = connection_id.into();
        let is_new = self.subscribers.insert(conn_id.clone(), sink).is_none();
        if is_new {
            debug!(channel = %self.name, connection = %conn_id, "Connection subscribed");
        }
        is_new
    }

    /// Unsubscribe a connection from this channel.
    ///
    /// Returns `true` if the connection was subscribed.
    pub fn unsubscribe(&mut self, connection_id: &str) -> bool {
        let removed = self.subscribers.remove(connection_id).is_some();
        if removed {
            debug!(channel = %self.name, connection = %connection_id, "Connection unsubscribed");
        }
        removed
    }

    /// Deliver an event to every member except `except`.
    ///
    /// Returns the number of members whose queue accepted the event.
    pub fn publish(&self, event: &Outbound, except: Option<&str>) -> usize {
        trace!(channel = %self.name, "Publishing event");
        let mut delivered = 0;
        for (id, sink) in &self.subscribers {
            if except == Some(id.as_str()) {
                continue;
            }
            if sink.send(Arc::clone(event)).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Check if the channel is empty (no subscribers).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_creation() {
        let channel = Channel::new("match_1");
        assert_eq!(channel.name(), "match_1");
        assert_eq!(channel.subscriber_count(), 0);
        assert!(channel.is_empty());
    }

    #[test]
    fn test_channel_subscribe_unsubscribe() {
        let mut channel = Channel::new("test");
        let (tx, _rx) = mpsc::unbounded_channel();

        assert!(channel.subscribe("conn-1", tx.clone()));
        assert!(!channel.subscribe("conn-1", tx.clone()));
        assert_eq!(channel.subscriber_count(), 1);
        assert!(channel.is_subscribed("conn-1"));

        assert!(channel.subscribe("conn-2", tx));
        assert_eq!(channel.subscriber_count(), 2);

        assert!(channel.unsubscribe("conn-1"));
        assert_eq!(channel.subscriber_count(), 1);
        assert!(!channel.is_subscribed("conn-1"));

        // Unsubscribing non-existent connection
        assert!(!channel.unsubscribe("conn-1"));
    }

    #[test]
    fn test_channel_name_validation() {
        assert!(validate_channel_name("match_18c2f").is_ok());
        assert!(validate_channel_name("").is_err());
        assert!(validate_channel_name("bad\u{7}name").is_err());

        let long_name = "a".repeat(MAX_CHANNEL_NAME_LENGTH + 1);
        assert!(validate_channel_name(&long_name).is_err());
    }

    #[tokio::test]
    async fn test_channel_publish_skips_excluded() {
        let mut channel = Channel::new("test");
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        channel.subscribe("conn-1", tx1);
        channel.subscribe("conn-2", tx2);

        let event = Arc::new(ServerEvent::typing("alice", true));
        assert_eq!(channel.publish(&event, Some("conn-1")), 1);

        assert!(rx1.try_recv().is_err());
        let received = rx2.recv().await.unwrap();
        assert_eq!(*received, ServerEvent::typing("alice", true));
    }

    #[test]
    fn test_channel_publish_ignores_closed_sinks() {
        let mut channel = Channel::new("test");
        let (tx, rx) = mpsc::unbounded_channel();
        channel.subscribe("conn-1", tx);
        drop(rx);

        let event = Arc::new(ServerEvent::typing("alice", false));
        assert_eq!(channel.publish(&event, None), 0);
    }
}
