//! Action dispatch.
//!
//! [`Dispatcher::handle`] runs one [`Action`] against the session core and
//! turns every outcome, including every [`SessionError`], into a [`Reply`]
//! the transport can show as-is. Nothing here returns an error to the
//! caller; failures become instructive text.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;

use pt_domain::profile::Profile;
use pt_domain::taxonomy;
use pt_providers::{CacheLedger, CacheStats, Transcriber, TranscriptionError};
use pt_sessions::{
    FeedbackStore, ProfileGenerator, SessionError, SessionManager, StartOutcome, StatsReport,
};

use crate::actions::Action;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reply
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What kind of text a reply carries. Transports use it for presentation
/// (typing delay for patient lines) and for status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Patient,
    Analysis,
    Notice,
    /// A start action is waiting for `/yes`.
    ConfirmationRequired,
    Failure(Failure),
}

/// Coarse failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Failure {
    /// Wrong state for the action (no session, nothing to analyze).
    Precondition,
    NotFound,
    Invalid,
    TooLarge,
    /// Worth retrying as-is.
    Retryable,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub kind: ReplyKind,
    pub text: String,
}

impl Reply {
    fn new(kind: ReplyKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self::new(ReplyKind::Notice, text)
    }

    pub fn failure(failure: Failure, text: impl Into<String>) -> Self {
        Self::new(ReplyKind::Failure(failure), text)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.kind, ReplyKind::Failure(_))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Dispatcher {
    manager: Arc<SessionManager>,
    generator: Arc<ProfileGenerator>,
    feedback: Arc<FeedbackStore>,
    transcriber: Option<Arc<dyn Transcriber>>,
    ledger: Arc<CacheLedger>,
    /// Start actions refused for lack of confirmation, by user.
    awaiting_confirmation: Mutex<HashMap<String, Action>>,
    numbered_point: Regex,
}

impl Dispatcher {
    pub fn new(
        manager: Arc<SessionManager>,
        generator: Arc<ProfileGenerator>,
        feedback: Arc<FeedbackStore>,
        transcriber: Option<Arc<dyn Transcriber>>,
        ledger: Arc<CacheLedger>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            manager,
            generator,
            feedback,
            transcriber,
            ledger,
            awaiting_confirmation: Mutex::new(HashMap::new()),
            numbered_point: Regex::new(r"\s+(\d{1,2}\.\s)")?,
        })
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    pub fn voice_enabled(&self) -> bool {
        self.transcriber.is_some()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.ledger.snapshot()
    }

    /// Run one action for `user_id`.
    pub async fn handle(&self, user_id: &str, action: Action) -> Reply {
        let (action, confirmed) = unwrap_confirm(action);
        if confirmed {
            self.awaiting_confirmation.lock().remove(user_id);
        }

        match action {
            Action::New | Action::Custom { .. } | Action::Resume { .. } => {
                self.start(user_id, action, confirmed).await
            }
            Action::Confirm(_) => Reply::notice("Nothing to confirm."),
            Action::Say(text) if text.trim().is_empty() => {
                Reply::notice("Type what you want to say to the patient.")
            }
            Action::Say(text) => match self.manager.submit_turn(user_id, &text).await {
                Ok(turn) => Reply::new(ReplyKind::Patient, turn.text),
                Err(e) => error_reply(user_id, &e),
            },
            Action::Continue => match self.manager.continue_reply(user_id).await {
                Ok(turn) => Reply::new(ReplyKind::Patient, turn.text),
                Err(e) => error_reply(user_id, &e),
            },
            Action::Analyze => match self.manager.request_analysis(user_id).await {
                Ok(report) => {
                    let mut text = if report.from_completed {
                        format!("Analysis of the ended session ({} exchanges):", report.exchanges)
                    } else {
                        format!("Session analysis ({} exchanges so far):", report.exchanges)
                    };
                    text.push_str("\n\n");
                    text.push_str(&self.format_analysis(&report.text));
                    Reply::new(ReplyKind::Analysis, text)
                }
                Err(e) => error_reply(user_id, &e),
            },
            Action::End => match self.manager.end_session(user_id).await {
                Ok(report) => {
                    let mut text = format!(
                        "Session with {} ended after {} exchanges.\nCompleted sessions: {}.",
                        report.profile.name, report.exchanges, report.stats.total_sessions
                    );
                    if report.exchanges > 0 && report.analysis.is_none() {
                        text.push_str("\nSend /analyze for feedback on this session.");
                    }
                    if let Some(id) = report.archived.as_ref().map(|a| &a.profile_id) {
                        let _ = write!(text, "\nResume this patient later with /resume {id}");
                    }
                    Reply::notice(text)
                }
                Err(e) => error_reply(user_id, &e),
            },
            Action::Info => match self.manager.info(user_id) {
                Ok(profile) => Reply::notice(profile_card(&profile)),
                Err(e) => error_reply(user_id, &e),
            },
            Action::Stats => Reply::notice(stats_text(&self.manager.stats(user_id))),
            Action::Patients => match self.manager.list_profiles(user_id).await {
                Ok(profiles) if profiles.is_empty() => Reply::notice(
                    "No saved patients yet. A patient is saved when a session with them ends.",
                ),
                Ok(profiles) => {
                    let mut text = String::from("Saved patients:");
                    for p in &profiles {
                        let _ = write!(
                            text,
                            "\n  {}  {}",
                            p.id.as_deref().unwrap_or("?"),
                            p.label()
                        );
                    }
                    text.push_str("\n\nStart a new session with one: /resume <id>");
                    Reply::notice(text)
                }
                Err(e) => error_reply(user_id, &e),
            },
            Action::Feedback { rating, comment } => {
                self.feedback(user_id, rating, &comment, user_id).await
            }
        }
    }

    /// Re-run the start action that last asked `user_id` for confirmation.
    pub async fn confirm(&self, user_id: &str) -> Reply {
        let waiting = self.awaiting_confirmation.lock().remove(user_id);
        match waiting {
            Some(action) => self.handle(user_id, Action::Confirm(Box::new(action))).await,
            None => Reply::notice("Nothing is waiting for confirmation."),
        }
    }

    async fn start(&self, user_id: &str, action: Action, confirm: bool) -> Reply {
        // Ask before spending a generation on a patient that may be discarded.
        if !confirm && self.manager.is_in_dialog(user_id) {
            return self.ask_confirmation(user_id, action);
        }

        let outcome = match &action {
            Action::Resume { profile_id } => self.manager.resume(user_id, profile_id, confirm).await,
            other => {
                let Some(request) = other.profile_request() else {
                    return Reply::failure(Failure::Invalid, "That action does not start a session.");
                };
                let profile = match self.generator.generate(request).await {
                    Ok(p) => p,
                    Err(e) => return error_reply(user_id, &e),
                };
                self.manager.start_session(user_id, profile, confirm).await
            }
        };

        match outcome {
            Ok(StartOutcome::Started {
                profile,
                replaced,
                opening_question,
            }) => {
                let mut text = String::new();
                if replaced {
                    text.push_str("The previous session was discarded.\n\n");
                }
                let _ = write!(
                    text,
                    "New patient:\n{}\n\nThe patient is waiting. You could open with:\n\"{}\"",
                    profile_card(&profile),
                    opening_question
                );
                Reply::notice(text)
            }
            Ok(StartOutcome::ConfirmationRequired { .. }) => self.ask_confirmation(user_id, action),
            Err(e) => error_reply(user_id, &e),
        }
    }

    fn ask_confirmation(&self, user_id: &str, action: Action) -> Reply {
        let active = self
            .manager
            .session(user_id)
            .active_profile
            .map(|p| p.label())
            .unwrap_or_default();
        self.awaiting_confirmation
            .lock()
            .insert(user_id.to_owned(), action);
        Reply::new(
            ReplyKind::ConfirmationRequired,
            format!(
                "You are in a session with {active}. Starting a new one discards it.\nSend /yes to continue, or /end to finish the current session first."
            ),
        )
    }

    /// Record a rating. File I/O runs off the async threads.
    pub async fn feedback(
        &self,
        user_id: &str,
        rating: u8,
        comment: &str,
        display_name: &str,
    ) -> Reply {
        let store = self.feedback.clone();
        let (uid, comment, name) = (user_id.to_owned(), comment.to_owned(), display_name.to_owned());
        let result = tokio::task::spawn_blocking(move || store.submit(&uid, rating, &comment, &name)).await;
        match result {
            Ok(Ok(_)) => Reply::notice("Thank you for the feedback!"),
            Ok(Err(e)) => error_reply(user_id, &e),
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "feedback task failed");
                Reply::failure(Failure::Retryable, "Could not save the feedback. Please try again.")
            }
        }
    }

    /// Transcribe a voice message and say it to the patient. Returns the
    /// transcript (when there is one) alongside the reply.
    pub async fn voice(&self, user_id: &str, audio: Vec<u8>, filename: &str) -> (Option<String>, Reply) {
        let Some(transcriber) = &self.transcriber else {
            return (
                None,
                Reply::failure(Failure::Unavailable, "Voice messages are not enabled. Please type instead."),
            );
        };
        match transcriber.transcribe(audio, filename).await {
            Ok(text) => {
                tracing::debug!(user_id = %user_id, chars = text.chars().count(), "voice message transcribed");
                let reply = self.handle(user_id, Action::Say(text.clone())).await;
                (Some(text), reply)
            }
            Err(e) => (None, transcription_reply(user_id, &e)),
        }
    }

    /// Put each numbered point of an analysis on its own paragraph.
    pub fn format_analysis(&self, text: &str) -> String {
        self.numbered_point
            .replace_all(text.trim(), "\n\n$1")
            .into_owned()
    }

    pub fn cache_report(&self) -> String {
        let s = self.cache_stats();
        format!(
            "Prompt cache:\n  requests: {}\n  hits: {}  misses: {}  hit rate: {:.1}%\n  tokens written: {}  tokens read: {}\n  estimated savings: {:.0} tokens",
            s.total_requests,
            s.cache_hits,
            s.cache_misses,
            s.hit_rate() * 100.0,
            s.tokens_written,
            s.tokens_read,
            s.estimated_savings
        )
    }
}

/// Strip any number of `Confirm` wrappers.
fn unwrap_confirm(action: Action) -> (Action, bool) {
    let mut action = action;
    let mut confirmed = false;
    loop {
        match action {
            Action::Confirm(inner) => {
                action = *inner;
                confirmed = true;
            }
            other => return (other, confirmed),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome text
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The user-facing text for a session error.
pub fn error_reply(user_id: &str, err: &SessionError) -> Reply {
    match err {
        SessionError::NoActiveSession => Reply::failure(
            Failure::Precondition,
            "There is no active session. Send /new to meet a patient.",
        ),
        SessionError::NothingToAnalyze => Reply::failure(
            Failure::Precondition,
            "There is nothing to analyze yet. Talk with the patient first.",
        ),
        SessionError::NothingToContinue => Reply::failure(
            Failure::Precondition,
            "The patient's last reply was complete. There is nothing to continue.",
        ),
        SessionError::Generation(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "generation failed");
            Reply::failure(
                Failure::Retryable,
                "The model did not answer this time. Please try again.",
            )
        }
        SessionError::InvalidProfile(msg) => {
            Reply::failure(Failure::Invalid, format!("Cannot create that patient: {msg}."))
        }
        SessionError::ProfileNotFound(id) => Reply::failure(
            Failure::NotFound,
            format!("No saved patient with id '{id}'. Send /patients to list them."),
        ),
        SessionError::InvalidRating(r) => Reply::failure(
            Failure::Invalid,
            format!("The rating must be between 1 and 5, not {r}."),
        ),
        SessionError::Busy => Reply::failure(
            Failure::Retryable,
            "Still working on your previous message. Please wait a moment.",
        ),
        SessionError::Storage(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "storage read failed");
            Reply::failure(
                Failure::Retryable,
                "Saved data could not be read. Please try again.",
            )
        }
    }
}

fn transcription_reply(user_id: &str, err: &TranscriptionError) -> Reply {
    match err {
        TranscriptionError::TooLarge { size, limit } => Reply::failure(
            Failure::TooLarge,
            format!(
                "The voice message is too large ({} KiB, the limit is {} KiB). Please send a shorter one.",
                size / 1024,
                limit / 1024
            ),
        ),
        TranscriptionError::Unavailable(detail) => {
            tracing::warn!(user_id = %user_id, error = %detail, "speech recognition unavailable");
            Reply::failure(
                Failure::Unavailable,
                "Speech recognition is unavailable right now. Please type your message.",
            )
        }
        TranscriptionError::NoSpeech => Reply::failure(
            Failure::Invalid,
            "No speech was recognized in the voice message. Please try again or type it.",
        ),
    }
}

/// The patient card shown on start and by `/info`.
pub fn profile_card(p: &Profile) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "{}, {}, {}, {}", p.name, p.age, p.gender, p.profession);
    let _ = writeln!(s, "Category: {}", p.meta.category_name);
    let _ = writeln!(s, "Diagnosis: {}", p.meta.diagnosis);
    let _ = writeln!(
        s,
        "Complexity: {} ({})",
        p.meta.complexity,
        p.meta.complexity.description()
    );
    let _ = writeln!(
        s,
        "Openness: {} ({})",
        p.meta.openness,
        p.meta.openness.description()
    );
    let _ = writeln!(s, "Presenting problem: {}", p.problem);
    if !p.symptoms.is_empty() {
        let _ = writeln!(s, "Symptoms: {}", p.symptoms.join(", "));
    }
    if !p.motivation.is_empty() {
        let _ = writeln!(s, "Why now: {}", p.motivation);
    }
    if let Some(id) = &p.id {
        let _ = writeln!(s, "Saved as: {id}");
    }
    s.trim_end().to_owned()
}

pub fn stats_text(report: &StatsReport) -> String {
    let st = &report.stats;
    let mut s = format!(
        "Level: {}\nCompleted sessions: {}\nTotal exchanges: {}\nAverage exchanges per session: {:.1}",
        report.level, st.total_sessions, st.total_exchanges, report.average_exchanges
    );
    if !st.sessions_by_category.is_empty() {
        s.push_str("\nBy category:");
        for (key, count) in &st.sessions_by_category {
            let name = taxonomy::category(key).map_or(key.as_str(), |c| c.name);
            let _ = write!(s, "\n  {name}: {count}");
        }
    }
    if let Some(at) = st.last_session_time {
        let _ = write!(s, "\nLast session: {}", at.format("%Y-%m-%d %H:%M UTC"));
    }
    s
}
