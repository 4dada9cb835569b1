//! Per-user session record and the statistics it carries.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pt_domain::profile::Profile;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcript
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One therapist question and the patient's answer to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub therapist: String,
    pub patient: String,
}

impl Exchange {
    pub fn new(therapist: impl Into<String>, patient: impl Into<String>) -> Self {
        Self {
            therapist: therapist.into(),
            patient: patient.into(),
        }
    }
}

/// Marks a transcript entry whose patient text was cut off.
///
/// Holds the entry's index rather than a copy of the text, so the partial
/// reply always lives in exactly one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingContinuation {
    pub index: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    InDialog,
}

/// Snapshot taken when a dialog ends, kept for one post-hoc analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedSession {
    pub profile: Profile,
    pub transcript: Vec<Exchange>,
    #[serde(default)]
    pub analysis: Option<String>,
    pub completed_at: DateTime<Utc>,
    /// Set once the post-hoc analysis has been produced.
    #[serde(default)]
    pub analyzed: bool,
}

/// Analyses kept in a user's record; older ones live on in the archive.
pub const MAX_ANALYSIS_HISTORY: usize = 20;

/// One produced analysis, kept per profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Profile id, or the profile label for profiles not yet archived.
    pub profile_key: String,
    pub created_at: DateTime<Utc>,
    pub exchanges: usize,
    pub text: String,
}

/// Everything the process knows about one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub active_profile: Option<Profile>,
    #[serde(default)]
    pub transcript: Vec<Exchange>,
    #[serde(default)]
    pub pending: Option<PendingContinuation>,
    #[serde(default)]
    pub last_analysis: Option<String>,
    #[serde(default)]
    pub last_completed: Option<CompletedSession>,
    #[serde(default)]
    pub analysis_history: Vec<AnalysisRecord>,
    #[serde(default)]
    pub stats: SessionStats,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn is_in_dialog(&self) -> bool {
        self.status == SessionStatus::InDialog && self.active_profile.is_some()
    }

    /// Transcript entries whose patient reply is complete. A pending
    /// entry is always the last one.
    pub fn completed_exchanges(&self) -> &[Exchange] {
        let end = match self.pending {
            Some(p) => p.index.min(self.transcript.len()),
            None => self.transcript.len(),
        };
        &self.transcript[..end]
    }

    /// Keep an analysis, dropping the oldest beyond [`MAX_ANALYSIS_HISTORY`].
    pub fn record_analysis(&mut self, record: AnalysisRecord) {
        self.analysis_history.push(record);
        let excess = self.analysis_history.len().saturating_sub(MAX_ANALYSIS_HISTORY);
        self.analysis_history.drain(..excess);
    }

    /// Drop everything tied to the current dialog and go idle.
    pub(crate) fn reset_dialog(&mut self) {
        self.status = SessionStatus::Idle;
        self.active_profile = None;
        self.transcript.clear();
        self.pending = None;
    }

    /// Structural invariants; used by tests and debug assertions.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.status == SessionStatus::Idle {
            if self.pending.is_some() {
                return Err("pending continuation while idle".into());
            }
            if !self.transcript.is_empty() {
                return Err("transcript present while idle".into());
            }
        }
        if self.status == SessionStatus::InDialog && self.active_profile.is_none() {
            return Err("in dialog without a profile".into());
        }
        if let Some(p) = self.pending {
            if p.index + 1 != self.transcript.len() {
                return Err(format!(
                    "pending index {} does not point at the last of {} entries",
                    p.index,
                    self.transcript.len()
                ));
            }
        }
        Ok(())
    }
}

/// Key used to group analyses and history for a profile.
pub fn profile_key(profile: &Profile) -> String {
    profile.id.clone().unwrap_or_else(|| profile.label())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Statistics
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_sessions: u64,
    pub total_exchanges: u64,
    #[serde(default)]
    pub sessions_by_category: BTreeMap<String, u64>,
    #[serde(default)]
    pub last_session_time: Option<DateTime<Utc>>,
}

impl SessionStats {
    pub fn record_session(&mut self, category: &str, exchanges: usize, at: DateTime<Utc>) {
        self.total_sessions += 1;
        self.total_exchanges += exchanges as u64;
        *self
            .sessions_by_category
            .entry(category.to_owned())
            .or_insert(0) += 1;
        self.last_session_time = Some(at);
    }

    pub fn average_exchanges(&self) -> f64 {
        if self.total_sessions == 0 {
            0.0
        } else {
            self.total_exchanges as f64 / self.total_sessions as f64
        }
    }

    pub fn level(&self) -> ExperienceLevel {
        ExperienceLevel::for_sessions(self.total_sessions)
    }
}

/// Trainee rank by number of completed sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceLevel {
    Novice,
    Trainee,
    Practitioner,
    Specialist,
    Expert,
    Master,
}

impl ExperienceLevel {
    pub fn for_sessions(total: u64) -> Self {
        match total {
            0..=4 => ExperienceLevel::Novice,
            5..=14 => ExperienceLevel::Trainee,
            15..=29 => ExperienceLevel::Practitioner,
            30..=49 => ExperienceLevel::Specialist,
            50..=99 => ExperienceLevel::Expert,
            _ => ExperienceLevel::Master,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExperienceLevel::Novice => "Novice",
            ExperienceLevel::Trainee => "Trainee",
            ExperienceLevel::Practitioner => "Practitioner",
            ExperienceLevel::Specialist => "Specialist",
            ExperienceLevel::Expert => "Expert",
            ExperienceLevel::Master => "Master",
        }
    }
}

impl fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
