//! Event types for the skillswap realtime protocol.
//!
//! Every frame on the wire is one tagged event. Client events are decoded and
//! validated at the connection boundary before any engine component sees them.

use serde::{Deserialize, Serialize};

use crate::codec::ProtocolError;

/// Current protocol version, advertised in the `connected` event.
pub const PROTOCOL_VERSION: u8 = 1;

/// Default maximum chat message length, in characters.
pub const MAX_CONTENT_LENGTH: usize = 1000;

/// Maximum length of any identifier carried in an event.
pub const MAX_ID_LENGTH: usize = 256;

/// Error codes carried by [`ServerEvent::Error`].
pub mod codes {
    /// The frame could not be decoded or failed validation.
    pub const INVALID_EVENT: u16 = 1001;
    /// The connection has not announced a user with `user_online`.
    pub const NOT_IDENTIFIED: u16 = 1002;
    /// Referenced match, skill or user does not exist or is not visible.
    pub const NOT_FOUND: u16 = 1004;
    /// Actor is not allowed to perform the action.
    pub const FORBIDDEN: u16 = 1005;
    /// Duplicate or invalid state transition.
    pub const CONFLICT: u16 = 1006;
    /// Malformed content.
    pub const VALIDATION: u16 = 1007;
    /// Store timed out or is unreachable.
    pub const TRANSIENT: u16 = 1008;
    /// Channel membership could not be changed.
    pub const SUBSCRIPTION: u16 = 1009;
}

/// Client event kinds, used for logging and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    UserOnline,
    JoinMatch,
    LeaveMatch,
    SendMessage,
    TypingStart,
    TypingStop,
    Ping,
}

impl EventKind {
    /// Wire name of the event.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::UserOnline => "user_online",
            EventKind::JoinMatch => "join_match",
            EventKind::LeaveMatch => "leave_match",
            EventKind::SendMessage => "send_message",
            EventKind::TypingStart => "typing_start",
            EventKind::TypingStop => "typing_stop",
            EventKind::Ping => "ping",
        }
    }
}

/// An event sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Bind a user to this connection and mark them online.
    #[serde(rename = "user_online")]
    UserOnline { user_id: String },

    /// Join the channel of a match.
    #[serde(rename = "join_match")]
    JoinMatch { match_id: String },

    /// Leave the channel of a match.
    #[serde(rename = "leave_match")]
    LeaveMatch { match_id: String },

    /// Send a chat message within a match.
    #[serde(rename = "send_message")]
    SendMessage {
        sender_id: String,
        /// Accepted for compatibility; the recipient is always derived from the match.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recipient_id: Option<String>,
        match_id: String,
        content: String,
    },

    /// The user started typing in a match.
    #[serde(rename = "typing_start")]
    TypingStart { match_id: String },

    /// The user stopped typing in a match.
    #[serde(rename = "typing_stop")]
    TypingStop { match_id: String },

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl ClientEvent {
    /// Get the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::UserOnline { .. } => EventKind::UserOnline,
            ClientEvent::JoinMatch { .. } => EventKind::JoinMatch,
            ClientEvent::LeaveMatch { .. } => EventKind::LeaveMatch,
            ClientEvent::SendMessage { .. } => EventKind::SendMessage,
            ClientEvent::TypingStart { .. } => EventKind::TypingStart,
            ClientEvent::TypingStop { .. } => EventKind::TypingStop,
            ClientEvent::Ping { .. } => EventKind::Ping,
        }
    }

    /// Validate identifiers and message content.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Invalid`] describing the first offending field.
    pub fn validate(&self, max_content_length: usize) -> Result<(), ProtocolError> {
        match self {
            ClientEvent::UserOnline { user_id } => validate_id("user_id", user_id),
            ClientEvent::JoinMatch { match_id }
            | ClientEvent::LeaveMatch { match_id }
            | ClientEvent::TypingStart { match_id }
            | ClientEvent::TypingStop { match_id } => validate_id("match_id", match_id),
            ClientEvent::SendMessage {
                sender_id,
                recipient_id,
                match_id,
                content,
            } => {
                validate_id("sender_id", sender_id)?;
                validate_id("match_id", match_id)?;
                if let Some(recipient) = recipient_id {
                    validate_id("recipient_id", recipient)?;
                }
                validate_content(content, max_content_length)
            }
            ClientEvent::Ping { .. } => Ok(()),
        }
    }
}

/// Validate an identifier field.
///
/// # Errors
///
/// Returns an error if the identifier is empty, too long, or not printable ASCII.
pub fn validate_id(field: &str, value: &str) -> Result<(), ProtocolError> {
    if value.is_empty() {
        return Err(ProtocolError::Invalid(format!("{field} cannot be empty")));
    }
    if value.len() > MAX_ID_LENGTH {
        return Err(ProtocolError::Invalid(format!("{field} too long")));
    }
    if !value.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err(ProtocolError::Invalid(format!(
            "{field} contains invalid characters"
        )));
    }
    Ok(())
}

/// Validate chat message content.
///
/// # Errors
///
/// Returns an error if the content is blank or longer than `max_length` characters.
pub fn validate_content(content: &str, max_length: usize) -> Result<(), ProtocolError> {
    if content.trim().is_empty() {
        return Err(ProtocolError::Invalid("content cannot be empty".into()));
    }
    let length = content.chars().count();
    if length > max_length {
        return Err(ProtocolError::Invalid(format!(
            "content is {length} characters, maximum is {max_length}"
        )));
    }
    Ok(())
}

/// Display fields of a message sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
}

/// A chat message as delivered to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub match_id: String,
    pub sender: SenderInfo,
    pub recipient_id: String,
    pub content: String,
    pub is_read: bool,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at: u64,
}

/// An event sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Connection established.
    #[serde(rename = "connected")]
    Connected {
        connection_id: String,
        version: u8,
        /// Recommended heartbeat interval in milliseconds.
        heartbeat: u32,
    },

    /// A user came online or went offline.
    #[serde(rename = "user_status_change")]
    UserStatusChange {
        user_id: String,
        is_online: bool,
        last_seen: u64,
    },

    /// A message was relayed on a match channel.
    #[serde(rename = "receive_message")]
    ReceiveMessage {
        message: MessageRecord,
        /// Delivery time in milliseconds since the Unix epoch.
        timestamp: u64,
    },

    /// A `send_message` from this connection failed.
    #[serde(rename = "message_error")]
    MessageError { error: String },

    /// A participant started or stopped typing.
    #[serde(rename = "user_typing")]
    UserTyping { user_id: String, is_typing: bool },

    /// Any other request from this connection failed.
    #[serde(rename = "error")]
    Error { code: u16, message: String },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl ServerEvent {
    /// Create a new Error event.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code,
            message: message.into(),
        }
    }

    /// Create a new Connected event.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>, heartbeat: u32) -> Self {
        ServerEvent::Connected {
            connection_id: connection_id.into(),
            version: PROTOCOL_VERSION,
            heartbeat,
        }
    }

    /// Create a typing indicator event.
    #[must_use]
    pub fn typing(user_id: impl Into<String>, is_typing: bool) -> Self {
        ServerEvent::UserTyping {
            user_id: user_id.into(),
            is_typing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_wire_names() {
        let json = r#"{"type":"typing_start","match_id":"m1"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.kind(), EventKind::TypingStart);
        assert_eq!(event.kind().as_str(), "typing_start");
    }

    #[test]
    fn test_send_message_recipient_optional() {
        let json = r#"{"type":"send_message","sender_id":"u1","match_id":"m1","content":"hi"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::SendMessage { recipient_id, .. } => assert!(recipient_id.is_none()),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_rejected() {
        let json = r#"{"type":"delete_message","match_id":"m1"}"#;
        assert!(serde_json::from_str::<ClientEvent>(json).is_err());
    }

    #[test]
    fn test_validate_content() {
        assert!(validate_content("hello", MAX_CONTENT_LENGTH).is_ok());
        assert!(validate_content("   ", MAX_CONTENT_LENGTH).is_err());

        let exact = "é".repeat(MAX_CONTENT_LENGTH);
        assert!(validate_content(&exact, MAX_CONTENT_LENGTH).is_ok());
        let over = "a".repeat(MAX_CONTENT_LENGTH + 1);
        assert!(validate_content(&over, MAX_CONTENT_LENGTH).is_err());
    }

    #[test]
    fn test_validate_ids() {
        let event = ClientEvent::JoinMatch {
            match_id: String::new(),
        };
        assert!(event.validate(MAX_CONTENT_LENGTH).is_err());

        let event = ClientEvent::SendMessage {
            sender_id: "u1".into(),
            recipient_id: Some("bad\nid".into()),
            match_id: "m1".into(),
            content: "hi".into(),
        };
        assert!(event.validate(MAX_CONTENT_LENGTH).is_err());

        let event = ClientEvent::UserOnline {
            user_id: "u1".into(),
        };
        assert!(event.validate(MAX_CONTENT_LENGTH).is_ok());
    }

    #[test]
    fn test_server_event_tag() {
        let json = serde_json::to_value(ServerEvent::typing("u1", true)).unwrap();
        assert_eq!(json["type"], "user_typing");
        assert_eq!(json["is_typing"], true);
    }
}
