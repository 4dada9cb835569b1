/// Outcomes of session operations that the caller turns into user-facing
/// text. None of these are fatal; state is unchanged when one is returned.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The operation needs a patient in dialog and there is none.
    #[error("no active session")]
    NoActiveSession,

    /// Neither the active dialog nor the last completed one has exchanges
    /// left to analyze.
    #[error("nothing to analyze")]
    NothingToAnalyze,

    /// An explicit continue request with no cut-off reply waiting.
    #[error("no reply is waiting to be continued")]
    NothingToContinue,

    /// Provider failure or an unparseable generation. Retryable.
    #[error("generation failed: {0}")]
    Generation(#[source] pt_domain::Error),

    /// Generator parameters or a stored profile that cannot be used.
    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),

    /// The per-user lock was torn down while waiting for it.
    #[error("session is busy")]
    Busy,

    /// A read from durable storage failed outright (writes never surface here).
    #[error("storage: {0}")]
    Storage(#[source] pt_domain::Error),
}

impl SessionError {
    /// Whether repeating the same action may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::Generation(_) | SessionError::Busy | SessionError::Storage(_)
        )
    }
}
