//! Connection event dispatcher.
//!
//! Turns decoded client events into calls on the presence registry, channel
//! router, typing tracker and message relay. Failures are reported to the
//! originating connection only.

use skillswap_protocol::{codes, ClientEvent, ServerEvent};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::channel::Sink;
use crate::error::ChatError;
use crate::matching::MatchService;
use crate::model::UserId;
use crate::presence::PresenceRegistry;
use crate::relay::MessageRelay;
use crate::router::{Router, RouterError};
use crate::typing::TypingTracker;

/// Routes client events to the engine components.
pub struct Dispatcher {
    router: Arc<Router>,
    presence: Arc<PresenceRegistry>,
    typing: Arc<TypingTracker>,
    relay: Arc<MessageRelay>,
    matches: Arc<MatchService>,
    max_content_length: usize,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        router: Arc<Router>,
        presence: Arc<PresenceRegistry>,
        typing: Arc<TypingTracker>,
        relay: Arc<MessageRelay>,
        matches: Arc<MatchService>,
        max_content_length: usize,
    ) -> Self {
        Self {
            router,
            presence,
            typing,
            relay,
            matches,
            max_content_length,
        }
    }

    /// Register a freshly accepted connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection limit is reached.
    pub fn connect(&self, connection_id: &str, sink: Sink) -> Result<(), RouterError> {
        self.router.register(connection_id, sink)?;
        info!(connection = %connection_id, "Connection opened");
        Ok(())
    }

    /// Handle one decoded event from `connection_id`.
    pub async fn handle(&self, connection_id: &str, event: ClientEvent) {
        if let Err(e) = event.validate(self.max_content_length) {
            debug!(connection = %connection_id, kind = event.kind().as_str(), error = %e, "Invalid event");
            match event {
                ClientEvent::SendMessage { .. } => self.message_error(connection_id, &e.to_string()),
                _ => self.reject(connection_id, codes::VALIDATION, e.to_string()),
            }
            return;
        }

        match event {
            ClientEvent::UserOnline { user_id } => {
                self.presence.mark_online(&user_id, connection_id);
            }

            ClientEvent::JoinMatch { match_id } => {
                let Some(user) = self.identified(connection_id) else {
                    return;
                };
                if let Err(e) = self.matches.participant_match(&match_id, &user).await {
                    self.reject(connection_id, e.code(), e.to_string());
                    return;
                }
                match self.router.join(connection_id, &match_id) {
                    Ok(_) => debug!(connection = %connection_id, channel = %match_id, user = %user, "Joined match"),
                    Err(e) => self.reject(connection_id, codes::SUBSCRIPTION, e.to_string()),
                }
            }

            ClientEvent::LeaveMatch { match_id } => {
                self.router.leave(connection_id, &match_id);
            }

            ClientEvent::SendMessage {
                sender_id,
                recipient_id,
                match_id,
                content,
            } => {
                let Some(user) = self.presence.user_for(connection_id) else {
                    self.message_error(connection_id, "connection is not identified");
                    return;
                };
                if sender_id != user {
                    let e = ChatError::Forbidden("sender does not match this connection".into());
                    self.message_error(connection_id, &e.to_string());
                    return;
                }
                match self.relay.send(&user, &match_id, &content).await {
                    Ok(record) => {
                        if let Some(claimed) = recipient_id {
                            if claimed != record.recipient_id {
                                warn!(
                                    connection = %connection_id,
                                    claimed = %claimed,
                                    actual = %record.recipient_id,
                                    "Ignored mismatched recipient"
                                );
                            }
                        }
                    }
                    Err(e) => self.message_error(connection_id, &e.to_string()),
                }
            }

            ClientEvent::TypingStart { match_id } => {
                if let Some(user) = self.typing_member(connection_id, &match_id) {
                    self.typing.start(&match_id, &user, connection_id);
                }
            }

            ClientEvent::TypingStop { match_id } => {
                if let Some(user) = self.typing_member(connection_id, &match_id) {
                    self.typing.stop(&match_id, &user, connection_id);
                }
            }

            ClientEvent::Ping { timestamp } => {
                self.presence.touch(connection_id);
                self.router.send_to(connection_id, ServerEvent::Pong { timestamp });
            }
        }
    }

    /// Tear down everything a closed connection left behind.
    ///
    /// Membership goes first so synthetic typing stops and the offline
    /// announcement never reach the closed connection.
    pub fn disconnect(&self, connection_id: &str) {
        let channels = self.router.drop_connection(connection_id);
        if let Some(user) = self.presence.user_for(connection_id) {
            self.typing.clear_user(&user);
        }
        let offline: Option<UserId> = self.presence.mark_offline(connection_id);
        info!(
            connection = %connection_id,
            channels = channels.len(),
            user = offline.as_deref().unwrap_or("-"),
            "Connection closed"
        );
    }

    /// Send an `error` event to one connection.
    pub fn reject(&self, connection_id: &str, code: u16, message: impl Into<String>) {
        self.router
            .send_to(connection_id, ServerEvent::error(code, message));
    }

    fn message_error(&self, connection_id: &str, error: &str) {
        self.router.send_to(
            connection_id,
            ServerEvent::MessageError {
                error: error.to_string(),
            },
        );
    }

    fn identified(&self, connection_id: &str) -> Option<UserId> {
        let user = self.presence.user_for(connection_id);
        if user.is_none() {
            self.reject(
                connection_id,
                codes::NOT_IDENTIFIED,
                "send user_online before this event",
            );
        }
        user
    }

    fn typing_member(&self, connection_id: &str, match_id: &str) -> Option<UserId> {
        let user = self.identified(connection_id)?;
        if !self.router.is_member(connection_id, match_id) {
            self.reject(connection_id, codes::FORBIDDEN, "join the match first");
            return None;
        }
        Some(user)
    }

    /// The router shared by every component.
    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    #[must_use]
    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    #[must_use]
    pub fn typing(&self) -> &Arc<TypingTracker> {
        &self.typing
    }

    #[must_use]
    pub fn relay(&self) -> &Arc<MessageRelay> {
        &self.relay
    }
}
