//! Match lifecycle.
//!
//! ```text
//!            accept (non-initiator)          complete (either)
//!  pending ───────────────────────▶ accepted ──────────────────▶ completed
//!     │
//!     └──────────────────────────▶ rejected
//!            reject (non-initiator)
//! ```
//!
//! `rejected` and `completed` are terminal. The score is computed once, when
//! the match is created, and never again.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{bounded, ChatError};
use crate::model::{Match, MatchStatus, NewMatch, Skill, UserProfile};
use crate::score::score;
use crate::store::Stores;

/// Check whether `actor` may move `record` to `to`.
///
/// # Errors
///
/// - [`ChatError::NotFound`] if `actor` is not a participant.
/// - [`ChatError::Forbidden`] if the initiator tries to accept or reject.
/// - [`ChatError::Conflict`] for any transition not in the lifecycle.
pub fn check_transition(record: &Match, actor: &str, to: MatchStatus) -> Result<(), ChatError> {
    if !record.is_participant(actor) {
        return Err(ChatError::NotFound(format!("match {}", record.id)));
    }

    let answering = matches!(to, MatchStatus::Accepted | MatchStatus::Rejected);
    if answering && record.initiated_by == actor {
        return Err(ChatError::Forbidden(
            "cannot accept or reject your own match request".into(),
        ));
    }
    if record.status.is_terminal() {
        return Err(ChatError::Conflict(format!(
            "match is already {}",
            record.status
        )));
    }

    match to {
        MatchStatus::Accepted | MatchStatus::Rejected => {
            if record.status != MatchStatus::Pending {
                return Err(ChatError::Conflict(format!(
                    "cannot move a {} match to {to}",
                    record.status
                )));
            }
        }
        MatchStatus::Completed => {
            if record.status != MatchStatus::Accepted {
                return Err(ChatError::Conflict(format!(
                    "only accepted matches can be completed, this one is {}",
                    record.status
                )));
            }
        }
        MatchStatus::Pending => {
            return Err(ChatError::Conflict(format!(
                "cannot move a {} match back to pending",
                record.status
            )));
        }
    }

    Ok(())
}

/// A skill that could be matched with one of the caller's skills.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    #[serde(flatten)]
    pub skill: Skill,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_profile: Option<UserProfile>,
    pub match_score: u8,
}

/// Creates matches and drives their lifecycle against the match store.
pub struct MatchService {
    stores: Stores,
    timeout: Duration,
    /// Serialises the check-then-write sequences of create and status changes.
    write_lock: Mutex<()>,
}

impl MatchService {
    /// Create a new match service.
    #[must_use]
    pub fn new(stores: Stores, timeout: Duration) -> Self {
        Self {
            stores,
            timeout,
            write_lock: Mutex::new(()),
        }
    }

    /// Create a pending match initiated by `initiator`.
    ///
    /// # Errors
    ///
    /// - [`ChatError::Validation`] if both participants are the same user.
    /// - [`ChatError::NotFound`] if either skill is missing or owned by someone else.
    /// - [`ChatError::Conflict`] if an open match already covers this pairing.
    /// - [`ChatError::Transient`] on store failure.
    pub async fn create(
        &self,
        initiator: &str,
        partner: &str,
        initiator_skill: &str,
        partner_skill: &str,
    ) -> Result<Match, ChatError> {
        if initiator == partner {
            return Err(ChatError::Validation(
                "cannot create a match with yourself".into(),
            ));
        }

        let own_skill = self.owned_skill(initiator_skill, initiator).await?;
        let their_skill = self.owned_skill(partner_skill, partner).await?;

        let _guard = self.write_lock.lock().await;

        let existing =
            bounded(self.timeout, self.stores.matches.matches_between(initiator, partner)).await?;
        if existing.iter().any(|m| {
            m.status.is_open() && m.covers(initiator, partner, initiator_skill, partner_skill)
        }) {
            return Err(ChatError::Conflict("match already exists".into()));
        }

        let new = NewMatch {
            user1: initiator.to_string(),
            user2: partner.to_string(),
            user1_skill: own_skill.id,
            user2_skill: their_skill.id,
            score: score(&own_skill.profile, &their_skill.profile),
            initiated_by: initiator.to_string(),
        };
        let created = bounded(self.timeout, self.stores.matches.insert_match(new)).await?;

        info!(
            id = %created.id,
            initiator = %initiator,
            partner = %partner,
            score = created.score,
            "Match created"
        );
        Ok(created)
    }

    /// Move a match to `status` on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// See [`check_transition`]; also [`ChatError::NotFound`] for an unknown
    /// match and [`ChatError::Transient`] on store failure.
    pub async fn update_status(
        &self,
        match_id: &str,
        actor: &str,
        status: MatchStatus,
    ) -> Result<Match, ChatError> {
        let _guard = self.write_lock.lock().await;

        let record = self.participant_match(match_id, actor).await?;
        check_transition(&record, actor, status)?;

        let updated =
            bounded(self.timeout, self.stores.matches.update_status(match_id, status)).await?;
        info!(id = %match_id, actor = %actor, from = %record.status, to = %status, "Match status changed");
        Ok(updated)
    }

    /// Accept or reject a pending match.
    ///
    /// # Errors
    ///
    /// [`ChatError::Validation`] if `response` is not `accepted` or `rejected`,
    /// otherwise as [`MatchService::update_status`].
    pub async fn respond(
        &self,
        match_id: &str,
        actor: &str,
        response: &str,
    ) -> Result<Match, ChatError> {
        let status = match response {
            "accepted" => MatchStatus::Accepted,
            "rejected" => MatchStatus::Rejected,
            other => {
                return Err(ChatError::Validation(format!(
                    "response must be \"accepted\" or \"rejected\", got \"{other}\""
                )))
            }
        };
        self.update_status(match_id, actor, status).await
    }

    /// Matches in which `user` participates, newest first.
    ///
    /// # Errors
    ///
    /// [`ChatError::Transient`] on store failure.
    pub async fn list_for_user(
        &self,
        user: &str,
        status: Option<MatchStatus>,
    ) -> Result<Vec<Match>, ChatError> {
        bounded(self.timeout, self.stores.matches.matches_for_user(user, status)).await
    }

    /// Load a match that `user` participates in.
    ///
    /// # Errors
    ///
    /// [`ChatError::NotFound`] if the match does not exist or `user` is not part of it.
    pub async fn participant_match(&self, match_id: &str, user: &str) -> Result<Match, ChatError> {
        bounded(self.timeout, self.stores.matches.find_match(match_id))
            .await?
            .filter(|m| m.is_participant(user))
            .ok_or_else(|| ChatError::NotFound(format!("match {match_id}")))
    }

    /// Skills of other users that complement one of `user`'s skills, best first.
    ///
    /// An offered skill is paired with wanted skills and vice versa.
    ///
    /// # Errors
    ///
    /// [`ChatError::NotFound`] if the skill is not owned by `user`;
    /// [`ChatError::Transient`] on store failure.
    pub async fn find_candidates(
        &self,
        user: &str,
        skill_id: &str,
    ) -> Result<Vec<Candidate>, ChatError> {
        let own = self.owned_skill(skill_id, user).await?;
        let skills =
            bounded(self.timeout, self.stores.skills.find_skills(!own.is_offered, user)).await?;

        let mut candidates = Vec::with_capacity(skills.len());
        for skill in skills {
            let owner_profile =
                bounded(self.timeout, self.stores.users.find_user(&skill.owner)).await?;
            candidates.push(Candidate {
                match_score: score(&own.profile, &skill.profile),
                owner_profile,
                skill,
            });
        }
        candidates.sort_by(|a, b| b.match_score.cmp(&a.match_score));

        debug!(user = %user, skill = %skill_id, found = candidates.len(), "Candidates scored");
        Ok(candidates)
    }

    async fn owned_skill(&self, skill_id: &str, owner: &str) -> Result<Skill, ChatError> {
        bounded(self.timeout, self.stores.skills.find_skill(skill_id, owner))
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("skill {skill_id}")))
    }
}
