//! # skillswap-core
//!
//! The realtime conversation and matching engine behind skillswap.
//!
//! - **Score** - Deterministic compatibility score between two skills
//! - **Matching** - Match creation and lifecycle
//! - **Router** - Match channels and per-connection outbound sinks
//! - **Presence** - Which users hold a live connection
//! - **Typing** - Expiring "is typing" indicators
//! - **Relay** - Persist-then-broadcast chat messages
//! - **Dispatcher** - Client events in, component calls out
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Connection │────▶│ Dispatcher  │────▶│   Relay     │──▶ Stores
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲              │        │               │
//!        │              ▼        ▼               ▼
//!        │       ┌──────────┐ ┌────────┐  ┌─────────────┐
//!        └───────│ Presence │ │ Typing │─▶│   Router    │
//!                └──────────┘ └────────┘  └─────────────┘
//! ```
//!
//! Every outbound event reaches a connection through the sink it registered
//! with the [`Router`].

pub mod channel;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod matching;
pub mod model;
pub mod presence;
pub mod relay;
pub mod router;
pub mod score;
pub mod store;
pub mod typing;

pub use channel::{Channel, ChannelId, ConnectionId, Outbound, Sink};
pub use conversation::{ConversationSummary, Conversations, LastMessage, MatchHistory};
pub use dispatcher::Dispatcher;
pub use error::ChatError;
pub use matching::{check_transition, Candidate, MatchService};
pub use model::{Match, MatchStatus, Skill, SkillProfile, UserProfile};
pub use presence::{PresenceRegistry, PresenceStatus};
pub use relay::MessageRelay;
pub use router::{generate_connection_id, Router, RouterConfig, RouterError, RouterStats};
pub use score::score;
pub use store::{MemoryStore, Seed, StoreError, Stores};
pub use typing::{SweeperHandle, TypingTracker};
