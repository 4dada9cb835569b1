//! Process-level endpoints: health and prompt cache statistics.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /health
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "providers": state.llm.list_providers(),
        "users": state.sessions.store().len(),
        "voice": state.dispatcher.voice_enabled(),
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/cache/stats
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let s = state.ledger.snapshot();
    Json(serde_json::json!({
        "total_requests": s.total_requests,
        "cache_hits": s.cache_hits,
        "cache_misses": s.cache_misses,
        "tokens_written": s.tokens_written,
        "tokens_read": s.tokens_read,
        "estimated_savings": s.estimated_savings,
        "hit_rate": s.hit_rate(),
        "savings_ratio": state.ledger.savings_ratio(),
    }))
}
