//! Training-session core for psytrainer.
//!
//! One [`Session`] per user identifier moves between idle and in-dialog.
//! Patient replies that hit the output ceiling are held as pending and
//! merged in place when the continuation arrives. Ended dialogs are archived
//! per profile so later analyses can see earlier sessions.

pub mod archive;
pub mod continuation;
pub mod error;
pub mod feedback;
pub mod generator;
pub mod lock;
pub mod manager;
pub mod model;
pub mod prompt;
pub mod store;

pub use archive::{Archive, ArchiveRef, ArchivedSession, MigrationReport};
pub use error::SessionError;
pub use feedback::{Feedback, FeedbackStore};
pub use generator::{ProfileGenerator, ProfileRequest};
pub use lock::UserLockMap;
pub use manager::{
    AnalysisReport, EndReport, SessionManager, StartOutcome, StatsReport, TurnReply,
};
pub use model::{
    CompletedSession, Exchange, ExperienceLevel, PendingContinuation, Session, SessionStats,
    SessionStatus,
};
pub use store::{JsonFileBackend, MemoryBackend, SessionBackend, SessionStore};
