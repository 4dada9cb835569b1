//! Per-user training endpoints.
//!
//! Mutating endpoints go through the [`Dispatcher`](crate::dispatch::Dispatcher)
//! and answer `{kind, text}`; read endpoints return the underlying records.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use pt_domain::taxonomy::{Complexity, Openness};

use crate::actions::Action;
use crate::api::{reply_response, status_for};
use crate::dispatch::{error_reply, Failure, Reply, ReplyKind};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/users/:user_id/sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Start a session. With `profile_id` a saved patient is resumed; with any
/// generator parameter a custom patient is generated; otherwise a random one.
#[derive(Debug, Default, Deserialize)]
pub struct StartSessionBody {
    #[serde(default)]
    pub profile_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub openness: Option<Openness>,
    #[serde(default)]
    pub complexity: Option<Complexity>,
    /// Discard an active dialog without asking.
    #[serde(default)]
    pub confirm: bool,
}

impl StartSessionBody {
    fn into_action(self) -> Action {
        let action = if let Some(profile_id) = self.profile_id {
            Action::Resume { profile_id }
        } else if self.category.is_some() || self.openness.is_some() || self.complexity.is_some() {
            Action::Custom {
                category: self.category,
                openness: self.openness,
                complexity: self.complexity,
            }
        } else {
            Action::New
        };
        if self.confirm {
            Action::Confirm(Box::new(action))
        } else {
            action
        }
    }
}

/// An empty body starts a random patient.
pub async fn start_session(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: Bytes,
) -> Response {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        StartSessionBody::default()
    } else {
        match serde_json::from_slice::<StartSessionBody>(&body) {
            Ok(b) => b,
            Err(e) => {
                return reply_response(Reply::failure(
                    Failure::Invalid,
                    format!("Invalid session request: {e}"),
                ))
            }
        }
    };
    let reply = state.dispatcher.handle(&user_id, body.into_action()).await;
    reply_response(reply)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/users/:user_id/turns
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct TurnBody {
    #[serde(default)]
    pub text: String,
    /// Ask for the rest of a cut-off reply instead of saying something.
    #[serde(default, rename = "continue")]
    pub continue_reply: bool,
}

pub async fn submit_turn(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<TurnBody>,
) -> Response {
    let action = if body.continue_reply {
        Action::Continue
    } else {
        Action::Say(body.text)
    };
    let reply = state.dispatcher.handle(&user_id, action).await;
    patient_response(&state, reply)
}

/// Patient replies carry the typing delay the client should simulate.
fn patient_response(state: &AppState, reply: Reply) -> Response {
    if reply.kind != ReplyKind::Patient {
        return reply_response(reply);
    }
    let delay = state
        .config
        .dialog
        .typing_delay(reply.text.chars().count());
    Json(serde_json::json!({
        "kind": reply.kind,
        "text": reply.text,
        "typing_ms": delay.as_millis() as u64,
    }))
    .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Analysis / end
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn request_analysis(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Response {
    reply_response(state.dispatcher.handle(&user_id, Action::Analyze).await)
}

pub async fn end_session(State(state): State<AppState>, Path(user_id): Path<String>) -> Response {
    reply_response(state.dispatcher.handle(&user_id, Action::End).await)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Read views
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn profile(State(state): State<AppState>, Path(user_id): Path<String>) -> Response {
    match state.sessions.info(&user_id) {
        Ok(profile) => Json(profile).into_response(),
        Err(e) => reply_response(error_reply(&user_id, &e)),
    }
}

pub async fn stats(State(state): State<AppState>, Path(user_id): Path<String>) -> Response {
    let report = state.sessions.stats(&user_id);
    Json(serde_json::json!({
        "total_sessions": report.stats.total_sessions,
        "total_exchanges": report.stats.total_exchanges,
        "sessions_by_category": report.stats.sessions_by_category,
        "last_session_time": report.stats.last_session_time,
        "average_exchanges": report.average_exchanges,
        "level": report.level,
    }))
    .into_response()
}

pub async fn profiles(State(state): State<AppState>, Path(user_id): Path<String>) -> Response {
    match state.sessions.list_profiles(&user_id).await {
        Ok(list) => Json(list).into_response(),
        Err(e) => reply_response(error_reply(&user_id, &e)),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/users/:user_id/feedback
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct FeedbackBody {
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

pub async fn feedback(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<FeedbackBody>,
) -> Response {
    let name = body.display_name.as_deref().unwrap_or(&user_id);
    let reply = state
        .dispatcher
        .feedback(&user_id, body.rating, &body.comment, name)
        .await;
    reply_response(reply)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/users/:user_id/voice
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct VoiceQuery {
    #[serde(default = "default_filename")]
    pub filename: String,
}

fn default_filename() -> String {
    "voice.ogg".into()
}

/// Raw audio in the body; the file name tells the transcriber the format.
pub async fn voice(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<VoiceQuery>,
    body: Bytes,
) -> Response {
    let (transcript, reply) = state
        .dispatcher
        .voice(&user_id, body.to_vec(), &query.filename)
        .await;
    (
        status_for(reply.kind),
        Json(serde_json::json!({
            "kind": reply.kind,
            "text": reply.text,
            "transcript": transcript,
        })),
    )
        .into_response()
}
