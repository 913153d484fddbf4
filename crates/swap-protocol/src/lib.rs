//! # skillswap-protocol
//!
//! Wire protocol definitions for the skillswap realtime engine.
//!
//! This crate defines the events exchanged between chat clients and the
//! server, together with the codecs used to put them on the wire.
//!
//! ## Client events
//!
//! - `user_online` - Announce the user behind a connection
//! - `join_match` / `leave_match` - Channel membership
//! - `send_message` - Chat within a match
//! - `typing_start` / `typing_stop` - Typing indicators
//!
//! ## Example
//!
//! ```rust
//! use skillswap_protocol::{codec, ClientEvent};
//!
//! let event = ClientEvent::JoinMatch { match_id: "match_1".into() };
//!
//! let text = codec::encode_json(&event).unwrap();
//! let decoded: ClientEvent = codec::decode_json(&text).unwrap();
//! assert_eq!(event, decoded);
//! ```

pub mod codec;
pub mod events;

pub use codec::{decode, encode, Encoded, Encoding, ProtocolError};
pub use events::{
    codes, ClientEvent, EventKind, MessageRecord, SenderInfo, ServerEvent, MAX_CONTENT_LENGTH,
    PROTOCOL_VERSION,
};
