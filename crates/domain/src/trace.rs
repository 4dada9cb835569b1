use serde::Serialize;

/// Structured trace events emitted across all psytrainer crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    LlmRequest {
        provider: String,
        model: String,
        role: String,
        duration_ms: u64,
        input_tokens: u32,
        output_tokens: u32,
        truncated: bool,
    },
    CacheUsage {
        cacheable: bool,
        cache_creation_tokens: u32,
        cache_read_tokens: u32,
    },
    SessionStarted {
        user_id: String,
        profile: String,
        replaced_active: bool,
    },
    TurnRecorded {
        user_id: String,
        exchange: usize,
        truncated: bool,
        opening: bool,
    },
    ContinuationMerged {
        user_id: String,
        exchange: usize,
        still_truncated: bool,
    },
    SessionEnded {
        user_id: String,
        exchanges: usize,
        total_sessions: u64,
    },
    SessionArchived {
        user_id: String,
        profile_id: String,
        exchanges: usize,
    },
    HistoryLoaded {
        user_id: String,
        profile_id: String,
        entries: usize,
        skipped: usize,
    },
    AnalysisProduced {
        user_id: String,
        exchanges: usize,
        history_entries: usize,
        from_completed: bool,
    },
    LegacyMigrated {
        migrated: usize,
        skipped: usize,
    },
    PersistFailed {
        key: String,
        error: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "pt_event");
    }
}
