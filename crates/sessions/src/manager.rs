//! The session state machine.
//!
//! Each public operation takes the user's lock, works on a copy of the
//! session, and writes the copy back only after every fallible step has
//! succeeded. A provider error therefore leaves the stored session exactly
//! as it was.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use pt_domain::config::DialogConfig;
use pt_domain::error::Error;
use pt_domain::profile::Profile;
use pt_domain::trace::TraceEvent;
use pt_providers::{CacheAwareClient, Instructions};

use crate::archive::{Archive, ArchiveRef, ArchivedSession};
use crate::continuation::{
    apply_continuation, continuation_history, history_messages, present_truncated, record_reply,
    Applied,
};
use crate::error::SessionError;
use crate::lock::UserLockMap;
use crate::model::{
    profile_key, AnalysisRecord, CompletedSession, ExperienceLevel, Session, SessionStats,
    SessionStatus,
};
use crate::prompt::{analysis_request, patient_instructions, ANALYST_SYSTEM};
use crate::store::SessionStore;

type Outcome<T> = std::result::Result<T, SessionError>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Operation results
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started {
        profile: Box<Profile>,
        /// An active dialog was discarded to make room.
        replaced: bool,
        /// Suggested first question for the trainee.
        opening_question: String,
    },
    /// A dialog is active and the caller did not confirm discarding it.
    ConfirmationRequired { active: String },
}

/// A patient reply as the user should see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    /// Display text; a cut-off reply carries an ellipsis and the hint.
    pub text: String,
    /// The stored patient text for this exchange (merged, for continuations).
    pub patient: String,
    /// 1-based exchange number.
    pub exchange: usize,
    /// Still waiting for a continuation.
    pub truncated: bool,
    /// This turn resolved (part of) an earlier cut-off reply.
    pub continued: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub text: String,
    pub exchanges: usize,
    pub history_entries: usize,
    /// Produced for an already-ended dialog.
    pub from_completed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndReport {
    pub profile: Profile,
    pub exchanges: usize,
    pub analysis: Option<String>,
    pub archived: Option<ArchiveRef>,
    pub stats: SessionStats,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsReport {
    pub stats: SessionStats,
    pub level: ExperienceLevel,
    pub average_exchanges: f64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionManager {
    store: Arc<SessionStore>,
    archive: Archive,
    locks: UserLockMap,
    patient: CacheAwareClient,
    analyst: CacheAwareClient,
    dialog: DialogConfig,
}

impl SessionManager {
    pub fn new(
        store: Arc<SessionStore>,
        archive: Archive,
        patient: CacheAwareClient,
        analyst: CacheAwareClient,
        dialog: DialogConfig,
    ) -> Self {
        Self {
            store,
            archive,
            locks: UserLockMap::new(),
            patient,
            analyst,
            dialog,
        }
    }

    pub fn dialog_config(&self) -> &DialogConfig {
        &self.dialog
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Current state for a user (a copy).
    pub fn session(&self, user_id: &str) -> Session {
        self.store.get(user_id)
    }

    pub fn is_in_dialog(&self, user_id: &str) -> bool {
        self.store.get(user_id).is_in_dialog()
    }

    // ── startSession ───────────────────────────────────────────────

    /// Put `profile` in front of the trainee.
    ///
    /// Discarding an active dialog needs `confirm`; without it nothing
    /// changes and [`StartOutcome::ConfirmationRequired`] comes back.
    pub async fn start_session(
        &self,
        user_id: &str,
        profile: Profile,
        confirm: bool,
    ) -> Outcome<StartOutcome> {
        let _permit = self.locks.acquire(user_id).await?;
        let mut session = self.store.get(user_id);

        let replaced = session.is_in_dialog();
        if replaced && !confirm {
            let active = session
                .active_profile
                .as_ref()
                .map(Profile::label)
                .unwrap_or_default();
            return Ok(StartOutcome::ConfirmationRequired { active });
        }

        session.reset_dialog();
        session.status = SessionStatus::InDialog;
        session.active_profile = Some(profile.clone());
        session.last_analysis = None;

        TraceEvent::SessionStarted {
            user_id: user_id.to_owned(),
            profile: profile.label(),
            replaced_active: replaced,
        }
        .emit();
        self.store.put(session);

        Ok(StartOutcome::Started {
            profile: Box::new(profile),
            replaced,
            opening_question: self.dialog.opening_question.clone(),
        })
    }

    /// Start a new dialog with a fresh copy of a saved profile. The copy
    /// keeps its id, so its history keeps growing.
    pub async fn resume(
        &self,
        user_id: &str,
        profile_id: &str,
        confirm: bool,
    ) -> Outcome<StartOutcome> {
        let archive = self.archive.clone();
        let (uid, pid) = (user_id.to_owned(), profile_id.to_owned());
        let profile = blocking(move || archive.load_profile(&uid, &pid))
            .await
            .map_err(SessionError::Storage)?
            .ok_or_else(|| SessionError::ProfileNotFound(profile_id.to_owned()))?;
        self.start_session(user_id, profile, confirm).await
    }

    // ── submitTurn ─────────────────────────────────────────────────

    /// Send the trainee's message to the patient.
    ///
    /// While a cut-off reply is pending, the message is not recorded as a
    /// new question; it only asks the patient to finish the pending reply.
    pub async fn submit_turn(&self, user_id: &str, text: &str) -> Outcome<TurnReply> {
        let _permit = self.locks.acquire(user_id).await?;
        let session = self.store.get(user_id);
        if !session.is_in_dialog() {
            return Err(SessionError::NoActiveSession);
        }
        if session.pending.is_some() {
            return self.continue_locked(session).await;
        }
        self.fresh_turn_locked(session, text).await
    }

    /// Explicit request to hear the rest of a cut-off reply.
    pub async fn continue_reply(&self, user_id: &str) -> Outcome<TurnReply> {
        let _permit = self.locks.acquire(user_id).await?;
        let session = self.store.get(user_id);
        if !session.is_in_dialog() {
            return Err(SessionError::NoActiveSession);
        }
        if session.pending.is_none() {
            return Err(SessionError::NothingToContinue);
        }
        self.continue_locked(session).await
    }

    async fn fresh_turn_locked(&self, mut session: Session, text: &str) -> Outcome<TurnReply> {
        let Some(profile) = session.active_profile.as_ref() else {
            return Err(SessionError::NoActiveSession);
        };
        let instructions = patient_instructions(profile);

        // The opening turn goes out without any history.
        let opening = session.transcript.is_empty();
        let history = if opening {
            Vec::new()
        } else {
            history_messages(&session.transcript)
        };

        let completion = self
            .patient
            .complete(&instructions, &history, text, self.dialog.patient_max_tokens)
            .await
            .map_err(SessionError::Generation)?;

        let applied = record_reply(&mut session, text, &completion.text, completion.truncated);
        TraceEvent::TurnRecorded {
            user_id: session.user_id.clone(),
            exchange: applied.exchange,
            truncated: applied.pending,
            opening,
        }
        .emit();
        debug_assert!(session.check_invariants().is_ok());
        self.store.put(session);

        Ok(self.reply(applied, false))
    }

    async fn continue_locked(&self, mut session: Session) -> Outcome<TurnReply> {
        let Some(pending) = session.pending else {
            return Err(SessionError::NothingToContinue);
        };
        if pending.index >= session.transcript.len() {
            // A marker that points nowhere cannot be merged; drop it.
            tracing::warn!(user_id = %session.user_id, index = pending.index, "stale continuation marker cleared");
            session.pending = None;
            self.store.put(session);
            return Err(SessionError::NothingToContinue);
        }
        let Some(profile) = session.active_profile.as_ref() else {
            return Err(SessionError::NoActiveSession);
        };
        let instructions = patient_instructions(profile);
        let history = continuation_history(&session.transcript, pending);

        let completion = self
            .patient
            .complete(
                &instructions,
                &history,
                &self.dialog.continue_prompt,
                self.dialog.patient_max_tokens,
            )
            .await
            .map_err(SessionError::Generation)?;

        let applied = apply_continuation(&mut session, &completion.text, completion.truncated)
            .ok_or(SessionError::NothingToContinue)?;
        TraceEvent::ContinuationMerged {
            user_id: session.user_id.clone(),
            exchange: applied.exchange,
            still_truncated: applied.pending,
        }
        .emit();
        debug_assert!(session.check_invariants().is_ok());
        self.store.put(session);

        Ok(self.reply(applied, true))
    }

    fn reply(&self, applied: Applied, continued: bool) -> TurnReply {
        let text = if applied.pending {
            present_truncated(&applied.patient, &self.dialog.continuation_hint)
        } else {
            applied.patient.clone()
        };
        TurnReply {
            text,
            patient: applied.patient,
            exchange: applied.exchange,
            truncated: applied.pending,
            continued,
        }
    }

    // ── requestAnalysis ────────────────────────────────────────────

    /// Supervisor feedback on the active dialog, or, once per ended dialog,
    /// on the one that just ended.
    pub async fn request_analysis(&self, user_id: &str) -> Outcome<AnalysisReport> {
        let _permit = self.locks.acquire(user_id).await?;
        let mut session = self.store.get(user_id);

        let (profile, transcript, from_completed) = if session.is_in_dialog() {
            // A reply still waiting for its continuation is not analysed.
            let completed = session.completed_exchanges();
            if completed.is_empty() {
                return Err(SessionError::NothingToAnalyze);
            }
            let profile = session
                .active_profile
                .clone()
                .ok_or(SessionError::NoActiveSession)?;
            (profile, completed.to_vec(), false)
        } else {
            match &session.last_completed {
                None => return Err(SessionError::NoActiveSession),
                Some(c) if c.analyzed || c.transcript.is_empty() => {
                    return Err(SessionError::NothingToAnalyze)
                }
                Some(c) => (c.profile.clone(), c.transcript.clone(), true),
            }
        };

        let history: Vec<ArchivedSession> = match &profile.id {
            Some(pid) => self
                .history(user_id, pid)
                .await
                .into_iter()
                .filter(|h| h.transcript != transcript)
                .collect(),
            None => Vec::new(),
        };

        let request = analysis_request(
            &profile,
            &transcript,
            &history,
            self.dialog.history_sessions,
            self.dialog.history_excerpt_chars,
        );
        let completion = self
            .analyst
            .complete(
                &Instructions::from(ANALYST_SYSTEM),
                &[],
                &request,
                self.dialog.analysis_max_tokens,
            )
            .await
            .map_err(SessionError::Generation)?;

        let text = completion.text;
        session.last_analysis = Some(text.clone());
        session.record_analysis(AnalysisRecord {
            profile_key: profile_key(&profile),
            created_at: Utc::now(),
            exchanges: transcript.len(),
            text: text.clone(),
        });
        if from_completed {
            if let Some(c) = session.last_completed.as_mut() {
                c.analysis = Some(text.clone());
                c.analyzed = true;
            }
        }

        let history_entries = history.len().min(self.dialog.history_sessions);
        TraceEvent::AnalysisProduced {
            user_id: user_id.to_owned(),
            exchanges: transcript.len(),
            history_entries,
            from_completed,
        }
        .emit();
        self.store.put(session);

        Ok(AnalysisReport {
            text,
            exchanges: transcript.len(),
            history_entries,
            from_completed,
        })
    }

    /// Archived history for a profile. Read failures degrade to "no history".
    async fn history(&self, user_id: &str, profile_id: &str) -> Vec<ArchivedSession> {
        let archive = self.archive.clone();
        let (uid, pid) = (user_id.to_owned(), profile_id.to_owned());
        match blocking(move || archive.load_history(&uid, &pid)).await {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(user_id = %user_id, profile_id = %profile_id, error = %e, "history unavailable");
                Vec::new()
            }
        }
    }

    // ── endSession ─────────────────────────────────────────────────

    /// Close the dialog: count it, archive it, keep a snapshot for one
    /// post-hoc analysis, and go idle.
    pub async fn end_session(&self, user_id: &str) -> Outcome<EndReport> {
        let _permit = self.locks.acquire(user_id).await?;
        let mut session = self.store.get(user_id);
        let profile = session
            .active_profile
            .clone()
            .ok_or(SessionError::NoActiveSession)?;

        let now = Utc::now();
        let transcript = std::mem::take(&mut session.transcript);
        let exchanges = transcript.len();
        let analysis = session.last_analysis.clone();
        session
            .stats
            .record_session(&profile.meta.category, exchanges, now);

        let (profile, archived) = self
            .archive_dialog(user_id, profile, &transcript, analysis.clone())
            .await;

        session.last_completed = Some(CompletedSession {
            profile: profile.clone(),
            transcript,
            analysis: analysis.clone(),
            completed_at: now,
            analyzed: false,
        });
        session.reset_dialog();

        TraceEvent::SessionEnded {
            user_id: user_id.to_owned(),
            exchanges,
            total_sessions: session.stats.total_sessions,
        }
        .emit();
        let stats = session.stats.clone();
        self.store.put(session);

        Ok(EndReport {
            profile,
            exchanges,
            analysis,
            archived,
            stats,
        })
    }

    /// Archive off the async threads. A write failure is logged and the
    /// dialog still ends.
    async fn archive_dialog(
        &self,
        user_id: &str,
        profile: Profile,
        transcript: &[crate::model::Exchange],
        analysis: Option<String>,
    ) -> (Profile, Option<ArchiveRef>) {
        let archive = self.archive.clone();
        let uid = user_id.to_owned();
        let transcript = transcript.to_vec();
        let fallback = profile.clone();
        let result = blocking(move || {
            let mut profile = profile;
            let r = archive.archive(&uid, &mut profile, &transcript, analysis.as_deref())?;
            Ok((profile, r))
        })
        .await;

        match result {
            Ok((profile, r)) => (profile, r),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "archiving failed; session ends without a record");
                TraceEvent::PersistFailed {
                    key: format!("archive:{user_id}"),
                    error: e.to_string(),
                }
                .emit();
                (fallback, None)
            }
        }
    }

    // ── Read-only views ────────────────────────────────────────────

    /// The active profile card.
    pub fn info(&self, user_id: &str) -> Outcome<Profile> {
        self.store
            .get(user_id)
            .active_profile
            .ok_or(SessionError::NoActiveSession)
    }

    pub fn stats(&self, user_id: &str) -> StatsReport {
        let stats = self.store.get(user_id).stats;
        StatsReport {
            level: stats.level(),
            average_exchanges: stats.average_exchanges(),
            stats,
        }
    }

    /// Profiles this user has saved, oldest first.
    pub async fn list_profiles(&self, user_id: &str) -> Outcome<Vec<Profile>> {
        let archive = self.archive.clone();
        let uid = user_id.to_owned();
        blocking(move || archive.list_profiles(&uid))
            .await
            .map_err(SessionError::Storage)
    }

    /// Time of the user's last finished session, if any.
    pub fn last_session_time(&self, user_id: &str) -> Option<DateTime<Utc>> {
        self.store.get(user_id).stats.last_session_time
    }

    pub fn flush(&self) -> pt_domain::Result<()> {
        self.store.flush()
    }
}

/// Run blocking file I/O on the blocking pool.
async fn blocking<T, F>(f: F) -> pt_domain::Result<T>
where
    F: FnOnce() -> pt_domain::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))?
}
