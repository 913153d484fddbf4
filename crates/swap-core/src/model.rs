//! Domain records for matches, messages, skills and users.
//!
//! Matches and messages are owned by the external store; skills and users are
//! read-only views of records managed elsewhere.

use serde::{Deserialize, Serialize};
use skillswap_protocol::{MessageRecord, SenderInfo};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque user identifier.
pub type UserId = String;
/// Opaque skill identifier.
pub type SkillId = String;
/// Opaque match identifier. Doubles as the channel name of the match.
pub type MatchId = String;
/// Opaque message identifier.
pub type MessageId = String;

/// Atomic counter for ensuring unique IDs even within the same nanosecond.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Generate a unique identifier with the given prefix.
#[must_use]
pub fn generate_id(prefix: &str) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{timestamp:x}_{counter:x}")
}

/// Skill category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Technology,
    Arts,
    Music,
    Sports,
    Cooking,
    Languages,
    Business,
    Other,
}

/// Proficiency level of a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
}

impl Level {
    /// Rank used by the compatibility score: 1, 2 or 3.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Level::Beginner => 1,
            Level::Intermediate => 2,
            Level::Advanced => 3,
        }
    }
}

/// How a skill is exchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Online,
    #[serde(rename = "In-person")]
    InPerson,
    Both,
}

/// The part of a skill the compatibility score looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillProfile {
    pub category: Category,
    pub level: Level,
    pub mode: Mode,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A skill offered or wanted by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub id: SkillId,
    pub owner: UserId,
    pub name: String,
    #[serde(flatten)]
    pub profile: SkillProfile,
    /// `true` for an offered skill, `false` for a wanted one.
    #[serde(default = "default_true")]
    pub is_offered: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Display fields of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
}

impl UserProfile {
    /// Placeholder for a user the directory no longer knows.
    #[must_use]
    pub fn unknown(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            profile_picture: None,
        }
    }

    /// Display fields attached to relayed messages.
    #[must_use]
    pub fn sender_info(&self) -> SenderInfo {
        SenderInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            profile_picture: self.profile_picture.clone(),
        }
    }
}

/// Lifecycle status of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

impl MatchStatus {
    /// Wire name of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Pending => "pending",
            MatchStatus::Accepted => "accepted",
            MatchStatus::Rejected => "rejected",
            MatchStatus::Completed => "completed",
        }
    }

    /// Whether the match still blocks a duplicate request.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, MatchStatus::Pending | MatchStatus::Accepted)
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, MatchStatus::Rejected | MatchStatus::Completed)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MatchStatus::Pending),
            "accepted" => Ok(MatchStatus::Accepted),
            "rejected" => Ok(MatchStatus::Rejected),
            "completed" => Ok(MatchStatus::Completed),
            other => Err(format!("unknown match status '{other}'")),
        }
    }
}

/// A pairing of two users around two skills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub user1: UserId,
    pub user2: UserId,
    pub user1_skill: SkillId,
    pub user2_skill: SkillId,
    pub status: MatchStatus,
    /// Compatibility score, frozen at creation.
    pub score: u8,
    pub initiated_by: UserId,
    pub messages: Vec<MessageId>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Match {
    /// Check if a user is one of the two participants.
    #[must_use]
    pub fn is_participant(&self, user: &str) -> bool {
        self.user1 == user || self.user2 == user
    }

    /// The participant that is not `user`, if `user` is a participant.
    #[must_use]
    pub fn other_participant(&self, user: &str) -> Option<&str> {
        if self.user1 == user {
            Some(&self.user2)
        } else if self.user2 == user {
            Some(&self.user1)
        } else {
            None
        }
    }

    /// Whether this match covers the given participants and skills, in either orientation.
    #[must_use]
    pub fn covers(&self, user_a: &str, user_b: &str, skill_a: &str, skill_b: &str) -> bool {
        let forward = self.user1 == user_a
            && self.user2 == user_b
            && self.user1_skill == skill_a
            && self.user2_skill == skill_b;
        let reverse = self.user1 == user_b
            && self.user2 == user_a
            && self.user1_skill == skill_b
            && self.user2_skill == skill_a;
        forward || reverse
    }
}

/// Fields of a match about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMatch {
    pub user1: UserId,
    pub user2: UserId,
    pub user1_skill: SkillId,
    pub user2_skill: SkillId,
    pub score: u8,
    pub initiated_by: UserId,
}

/// A stored chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender: UserId,
    pub recipient: UserId,
    pub match_id: MatchId,
    pub content: String,
    pub is_read: bool,
    pub created_at: u64,
}

impl ChatMessage {
    /// Wire form of the message with the sender's display fields resolved.
    #[must_use]
    pub fn to_record(&self, sender: SenderInfo) -> MessageRecord {
        MessageRecord {
            id: self.id.clone(),
            match_id: self.match_id.clone(),
            sender,
            recipient_id: self.recipient.clone(),
            content: self.content.clone(),
            is_read: self.is_read,
            created_at: self.created_at,
        }
    }
}

/// Fields of a message about to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender: UserId,
    pub recipient: UserId,
    pub match_id: MatchId,
    pub content: String,
}
