//! Request/response API for matches, messages and presence.
//!
//! Authentication happens upstream; the authenticated user arrives in the
//! `x-user-id` header.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use skillswap_core::model::UserId;
use skillswap_core::{
    Candidate, ChatError, ConversationSummary, Match, MatchHistory, MatchStatus, PresenceStatus,
};
use skillswap_protocol::MessageRecord;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::metrics;
use crate::state::AppState;

/// Header carrying the authenticated user id.
pub const USER_HEADER: &str = "x-user-id";

/// API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing x-user-id header")]
    Unauthenticated,

    #[error(transparent)]
    Chat(#[from] ChatError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            ApiError::Chat(e) => {
                let status = match e {
                    ChatError::NotFound(_) => StatusCode::NOT_FOUND,
                    ChatError::Forbidden(_) => StatusCode::FORBIDDEN,
                    ChatError::Conflict(_) => StatusCode::CONFLICT,
                    ChatError::Validation(_) => StatusCode::BAD_REQUEST,
                    ChatError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, e.kind())
            }
        };

        let body = Json(json!({
            "error": {
                "kind": kind,
                "message": self.to_string()
            }
        }));

        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct Caller(pub UserId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Caller(v.to_string()))
            .ok_or(ApiError::Unauthenticated)
    }
}

/// API routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/matches", get(list_matches).post(create_match))
        .route("/api/matches/find", get(find_candidates))
        .route("/api/matches/:id/status", patch(update_status))
        .route("/api/matches/:id/respond", patch(respond))
        .route("/api/messages/conversations/:user_id", get(conversations))
        .route("/api/messages/:match_id", get(history).post(send_message))
        .route("/api/users/:user_id/presence", get(presence))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMatch {
    pub partner_id: String,
    pub initiator_skill_id: String,
    pub partner_skill_id: String,
}

#[derive(Debug, Deserialize)]
pub struct FindQuery {
    pub skill_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct MatchResponse {
    pub response: String,
}

#[derive(Debug, Deserialize)]
pub struct NewMessageBody {
    pub content: String,
}

fn parse_status(raw: &str) -> Result<MatchStatus, ChatError> {
    raw.parse().map_err(ChatError::Validation)
}

/// GET /api/matches?status=
pub async fn list_matches(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Match>>> {
    let status = query.status.as_deref().map(parse_status).transpose()?;
    let matches = state.matches.list_for_user(&user, status).await?;
    Ok(Json(matches))
}

/// POST /api/matches
pub async fn create_match(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Json(body): Json<CreateMatch>,
) -> ApiResult<(StatusCode, Json<Match>)> {
    let created = state
        .matches
        .create(
            &user,
            &body.partner_id,
            &body.initiator_skill_id,
            &body.partner_skill_id,
        )
        .await?;
    metrics::record_match_created();
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/matches/find?skill_id=
pub async fn find_candidates(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Query(query): Query<FindQuery>,
) -> ApiResult<Json<Vec<Candidate>>> {
    Ok(Json(
        state.matches.find_candidates(&user, &query.skill_id).await?,
    ))
}

/// PATCH /api/matches/:id/status
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Path(id): Path<String>,
    Json(body): Json<StatusUpdate>,
) -> ApiResult<Json<Match>> {
    let status = parse_status(&body.status)?;
    Ok(Json(state.matches.update_status(&id, &user, status).await?))
}

/// PATCH /api/matches/:id/respond
pub async fn respond(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Path(id): Path<String>,
    Json(body): Json<MatchResponse>,
) -> ApiResult<Json<Match>> {
    Ok(Json(state.matches.respond(&id, &user, &body.response).await?))
}

/// GET /api/messages/conversations/:user_id
pub async fn conversations(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    Ok(Json(
        state.conversations.conversations(&caller, &user_id).await?,
    ))
}

/// GET /api/messages/:match_id
pub async fn history(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Path(match_id): Path<String>,
) -> ApiResult<Json<MatchHistory>> {
    Ok(Json(state.conversations.history(&match_id, &user).await?))
}

/// POST /api/messages/:match_id
///
/// Goes through the relay, so live participants receive the message too.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Path(match_id): Path<String>,
    Json(body): Json<NewMessageBody>,
) -> ApiResult<(StatusCode, Json<MessageRecord>)> {
    let record = state
        .dispatcher
        .relay()
        .send(&user, &match_id, &body.content)
        .await?;
    debug!(channel = %match_id, id = %record.id, "Message sent over HTTP");
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/users/:user_id/presence
pub async fn presence(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Json<PresenceStatus> {
    Json(state.dispatcher.presence().status(&user_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use skillswap_core::model::{Category, Level, Mode, Skill, SkillProfile, UserProfile};
    use skillswap_core::{MemoryStore, Stores};

    fn state() -> Arc<AppState> {
        let store = MemoryStore::new();
        for (id, name) in [("alice", "Alice"), ("bob", "Bob")] {
            store.insert_user(UserProfile {
                id: id.into(),
                name: name.into(),
                profile_picture: None,
            });
        }
        for (id, owner, is_offered) in [("guitar", "alice", true), ("spanish", "bob", true)] {
            store.insert_skill(Skill {
                id: id.into(),
                owner: owner.into(),
                name: id.into(),
                profile: SkillProfile {
                    category: Category::Music,
                    level: Level::Intermediate,
                    mode: Mode::Online,
                    tags: Vec::new(),
                },
                is_offered,
                is_active: true,
            });
        }
        Arc::new(AppState::new(Config::default(), Stores::memory(Arc::new(store))))
    }

    fn caller(id: &str) -> Caller {
        Caller(id.to_string())
    }

    async fn create(state: &Arc<AppState>) -> Match {
        let (status, Json(m)) = create_match(
            State(Arc::clone(state)),
            caller("alice"),
            Json(CreateMatch {
                partner_id: "bob".into(),
                initiator_skill_id: "guitar".into(),
                partner_skill_id: "spanish".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        m
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ChatError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ChatError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (ChatError::Conflict("x".into()), StatusCode::CONFLICT),
            (ChatError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ChatError::Transient("x".into()), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
        assert_eq!(
            ApiError::Unauthenticated.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_caller_from_header() {
        let request = axum::http::Request::builder()
            .header(USER_HEADER, " alice ")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let Caller(user) = Caller::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(user, "alice");

        let (mut parts, _) = axum::http::Request::new(()).into_parts();
        assert!(matches!(
            Caller::from_request_parts(&mut parts, &()).await,
            Err(ApiError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_match_flow_over_api() {
        let state = state();
        let m = create(&state).await;

        let own = respond(
            State(Arc::clone(&state)),
            caller("alice"),
            Path(m.id.clone()),
            Json(MatchResponse {
                response: "accepted".into(),
            }),
        )
        .await;
        assert!(matches!(own, Err(ApiError::Chat(ChatError::Forbidden(_)))));

        let Json(accepted) = respond(
            State(Arc::clone(&state)),
            caller("bob"),
            Path(m.id.clone()),
            Json(MatchResponse {
                response: "accepted".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(accepted.status, MatchStatus::Accepted);

        let Json(listed) = list_matches(
            State(Arc::clone(&state)),
            caller("alice"),
            Query(ListQuery {
                status: Some("accepted".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(listed.len(), 1);

        let bad = list_matches(
            State(Arc::clone(&state)),
            caller("alice"),
            Query(ListQuery {
                status: Some("archived".into()),
            }),
        )
        .await;
        assert!(matches!(bad, Err(ApiError::Chat(ChatError::Validation(_)))));
    }

    #[tokio::test]
    async fn test_message_history_over_api() {
        let state = state();
        let m = create(&state).await;

        let (status, Json(sent)) = send_message(
            State(Arc::clone(&state)),
            caller("alice"),
            Path(m.id.clone()),
            Json(NewMessageBody {
                content: "hola".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(sent.recipient_id, "bob");

        let Json(list) = conversations(
            State(Arc::clone(&state)),
            caller("bob"),
            Path("bob".into()),
        )
        .await
        .unwrap();
        assert_eq!(list[0].unread_count, 1);

        let Json(loaded) = history(State(Arc::clone(&state)), caller("bob"), Path(m.id.clone()))
            .await
            .unwrap();
        assert_eq!(loaded.messages.len(), 1);

        let Json(list) = conversations(
            State(Arc::clone(&state)),
            caller("bob"),
            Path("bob".into()),
        )
        .await
        .unwrap();
        assert_eq!(list[0].unread_count, 0);

        let denied = conversations(State(state), caller("alice"), Path("bob".into())).await;
        assert!(matches!(denied, Err(ApiError::Chat(ChatError::Forbidden(_)))));
    }

    #[tokio::test]
    async fn test_presence_lookup() {
        let state = state();
        let Json(status) = presence(State(state), Path("alice".into())).await;
        assert!(!status.is_online);
    }
}
