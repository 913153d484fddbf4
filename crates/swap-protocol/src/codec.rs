//! Codecs for encoding and decoding skillswap events.
//!
//! Text frames carry JSON. Binary frames carry MessagePack with a
//! length-prefixed framing so several events can share one buffer.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Maximum frame size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Not enough data to decode frame.
    #[error("Incomplete frame: need {0} more bytes")]
    Incomplete(usize),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Event failed validation.
    #[error("Invalid event: {0}")]
    Invalid(String),
}

/// Frame encoding used by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// JSON in text frames.
    #[default]
    Text,
    /// Length-prefixed MessagePack in binary frames.
    Binary,
}

/// An encoded event, ready for the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoded {
    Text(String),
    Binary(Bytes),
}

impl Encoded {
    /// Size of the encoded frame in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Encoded::Text(text) => text.len(),
            Encoded::Binary(data) => data.len(),
        }
    }
}

/// Encode an event using the given encoding.
///
/// # Errors
///
/// Returns an error if serialization fails or the frame is too large.
pub fn encode_as<T: Serialize>(event: &T, encoding: Encoding) -> Result<Encoded, ProtocolError> {
    match encoding {
        Encoding::Text => encode_json(event).map(Encoded::Text),
        Encoding::Binary => encode(event).map(Encoded::Binary),
    }
}

/// Encode an event as JSON text.
///
/// # Errors
///
/// Returns an error if serialization fails or the text is too large.
pub fn encode_json<T: Serialize>(event: &T) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(event)?;
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }
    Ok(text)
}

/// Decode an event from JSON text.
///
/// # Errors
///
/// Returns an error if the text is too large or not a known event.
pub fn decode_json<T: DeserializeOwned>(text: &str) -> Result<T, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }
    Ok(serde_json::from_str(text)?)
}

/// Encode an event to length-prefixed MessagePack.
///
/// The encoded format is:
/// - 4 bytes: Big-endian length prefix
/// - N bytes: MessagePack-encoded event
///
/// # Errors
///
/// Returns an error if the event is too large or encoding fails.
pub fn encode<T: Serialize>(event: &T) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    encode_into(event, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode an event into an existing buffer.
///
/// # Errors
///
/// Returns an error if the event is too large or encoding fails.
pub fn encode_into<T: Serialize>(event: &T, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    let payload = rmp_serde::to_vec_named(event)?;

    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    buf.reserve(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);

    Ok(())
}

/// Decode a single event from length-prefixed MessagePack.
///
/// # Errors
///
/// Returns an error if the data is incomplete, too large, or invalid.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.len() < LENGTH_PREFIX_SIZE {
        return Err(ProtocolError::Incomplete(LENGTH_PREFIX_SIZE - data.len()));
    }

    let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(length));
    }

    let total_size = LENGTH_PREFIX_SIZE + length;
    if data.len() < total_size {
        return Err(ProtocolError::Incomplete(total_size - data.len()));
    }

    Ok(rmp_serde::from_slice(&data[LENGTH_PREFIX_SIZE..total_size])?)
}

/// Try to decode an event from a buffer, advancing it if successful.
///
/// Returns `Ok(Some(event))` if a complete frame was decoded,
/// `Ok(None)` if more data is needed, or `Err` on protocol error.
///
/// # Errors
///
/// Returns an error if the frame is too large or invalid.
pub fn decode_from<T: DeserializeOwned>(buf: &mut BytesMut) -> Result<Option<T>, ProtocolError> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(length));
    }

    let total_size = LENGTH_PREFIX_SIZE + length;
    if buf.len() < total_size {
        return Ok(None);
    }

    buf.advance(LENGTH_PREFIX_SIZE);
    let payload = buf.split_to(length);
    Ok(Some(rmp_serde::from_slice(&payload)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ClientEvent, MessageRecord, SenderInfo, ServerEvent};

    fn sample_message() -> ServerEvent {
        ServerEvent::ReceiveMessage {
            message: MessageRecord {
                id: "msg_1".into(),
                match_id: "match_1".into(),
                sender: SenderInfo {
                    id: "alice".into(),
                    name: "Alice".into(),
                    profile_picture: None,
                },
                recipient_id: "bob".into(),
                content: "Hello!".into(),
                is_read: false,
                created_at: 1_700_000_000_000,
            },
            timestamp: 1_700_000_000_005,
        }
    }

    #[test]
    fn test_binary_message_event() {
        let event = sample_message();
        let encoded = encode(&event).unwrap();
        let decoded: ServerEvent = decode(&encoded).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn test_json_client_event() {
        let text = r#"{"type":"join_match","match_id":"match_1"}"#;
        let event: ClientEvent = decode_json(text).unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinMatch {
                match_id: "match_1".into()
            }
        );
    }

    #[test]
    fn test_binary_size_includes_prefix() {
        let event = sample_message();
        let text = encode_as(&event, Encoding::Text).unwrap();
        let binary = encode_as(&event, Encoding::Binary).unwrap();

        assert_eq!(text.size(), encode_json(&event).unwrap().len());
        match &binary {
            Encoded::Binary(data) => assert_eq!(binary.size(), data.len()),
            other => panic!("Expected binary frame, got {:?}", other),
        }
        assert!(binary.size() > LENGTH_PREFIX_SIZE);
    }

    #[test]
    fn test_decode_incomplete() {
        let event = ClientEvent::TypingStop {
            match_id: "m".into(),
        };
        let encoded = encode(&event).unwrap();

        match decode::<ClientEvent>(&encoded[..5]) {
            Err(ProtocolError::Incomplete(_)) => {}
            other => panic!("Expected Incomplete error, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_too_large() {
        let event = ServerEvent::MessageError {
            error: "x".repeat(MAX_FRAME_SIZE + 1),
        };

        match encode(&event) {
            Err(ProtocolError::FrameTooLarge(_)) => {}
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
        assert!(matches!(
            encode_as(&event, Encoding::Text),
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn test_streaming_decode() {
        let first = ClientEvent::TypingStart {
            match_id: "m1".into(),
        };
        let second = ClientEvent::Ping {
            timestamp: Some(7),
        };

        let mut buf = BytesMut::new();
        encode_into(&first, &mut buf).unwrap();
        encode_into(&second, &mut buf).unwrap();
        let partial = buf.split_off(buf.len() - 2);

        let decoded: ClientEvent = decode_from(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, first);
        assert!(decode_from::<ClientEvent>(&mut buf).unwrap().is_none());

        buf.unsplit(partial);
        let decoded: ClientEvent = decode_from(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, second);
        assert!(buf.is_empty());
    }
}
