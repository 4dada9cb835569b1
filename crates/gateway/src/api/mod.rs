pub mod cache;
pub mod users;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;

use crate::dispatch::{Failure, Reply, ReplyKind};
use crate::state::AppState;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(cache::health))
        .route("/v1/cache/stats", get(cache::stats))
        .route(
            "/v1/users/:user_id/sessions",
            post(users::start_session).delete(users::end_session),
        )
        .route("/v1/users/:user_id/turns", post(users::submit_turn))
        .route("/v1/users/:user_id/analysis", post(users::request_analysis))
        .route("/v1/users/:user_id/profile", get(users::profile))
        .route("/v1/users/:user_id/stats", get(users::stats))
        .route("/v1/users/:user_id/profiles", get(users::profiles))
        .route("/v1/users/:user_id/feedback", post(users::feedback))
        .route("/v1/users/:user_id/voice", post(users::voice))
}

/// HTTP status for a dispatcher reply.
pub fn status_for(kind: ReplyKind) -> StatusCode {
    match kind {
        ReplyKind::Patient | ReplyKind::Analysis | ReplyKind::Notice => StatusCode::OK,
        ReplyKind::ConfirmationRequired => StatusCode::CONFLICT,
        ReplyKind::Failure(f) => match f {
            Failure::Precondition => StatusCode::CONFLICT,
            Failure::NotFound => StatusCode::NOT_FOUND,
            Failure::Invalid => StatusCode::UNPROCESSABLE_ENTITY,
            Failure::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Failure::Retryable | Failure::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        },
    }
}

/// `{kind, text}` with the matching status code.
pub fn reply_response(reply: Reply) -> Response {
    (status_for(reply.kind), Json(reply)).into_response()
}
