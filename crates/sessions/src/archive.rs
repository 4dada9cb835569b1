//! Session archival and the per-profile history index.
//!
//! Layout under the state path:
//!
//! ```text
//! users/<user>/profiles/<profile_id>.json              profile snapshot, written once
//! users/<user>/sessions/<profile_id>/<timestamp>.json  one file per ended dialog
//! patients/*.json                                      legacy owner-less profiles
//! ```
//!
//! Archived sessions are never rewritten. A malformed file on read is skipped
//! with a warning so one bad record cannot hide the rest of the history.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pt_domain::error::{Error, Result};
use pt_domain::profile::Profile;
use pt_domain::trace::TraceEvent;

use crate::model::Exchange;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedSession {
    pub user_id: String,
    pub profile: Profile,
    pub transcript: Vec<Exchange>,
    #[serde(default)]
    pub analysis: Option<String>,
    pub archived_at: DateTime<Utc>,
}

impl ArchivedSession {
    /// Usable as analyst context: has both a dialog and an analysis.
    pub fn is_informative(&self) -> bool {
        !self.transcript.is_empty()
            && self
                .analysis
                .as_deref()
                .is_some_and(|a| !a.trim().is_empty())
    }
}

/// Where an archived session landed.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveRef {
    pub user_id: String,
    pub profile_id: String,
    pub archived_at: DateTime<Utc>,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: usize,
    pub skipped: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Archive
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// File-backed profile and session archive. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Archive {
    root: PathBuf,
}

impl Archive {
    pub fn new(state_path: &Path) -> Self {
        Self {
            root: state_path.to_path_buf(),
        }
    }

    fn user_dir(&self, user_id: &str) -> PathBuf {
        self.root.join("users").join(safe_component(user_id))
    }

    fn profile_path(&self, user_id: &str, profile_id: &str) -> PathBuf {
        self.user_dir(user_id)
            .join("profiles")
            .join(format!("{}.json", safe_component(profile_id)))
    }

    fn sessions_dir(&self, user_id: &str, profile_id: &str) -> PathBuf {
        self.user_dir(user_id)
            .join("sessions")
            .join(safe_component(profile_id))
    }

    // ── Write path ─────────────────────────────────────────────────

    /// Record an ended dialog.
    ///
    /// Returns `Ok(None)` for an empty transcript. A profile archived for the
    /// first time gets an id and `saved_at`, both written back into
    /// `profile`; its snapshot is stored once and never replaced.
    pub fn archive(
        &self,
        user_id: &str,
        profile: &mut Profile,
        transcript: &[Exchange],
        analysis: Option<&str>,
    ) -> Result<Option<ArchiveRef>> {
        if transcript.is_empty() {
            return Ok(None);
        }

        let now = Utc::now();
        let profile_id = profile
            .id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();
        if profile.saved_at.is_none() {
            profile.saved_at = Some(now);
        }

        let profile_path = self.profile_path(user_id, &profile_id);
        if !profile_path.exists() {
            write_json_new(&profile_path, profile)?;
        }

        let record = ArchivedSession {
            user_id: user_id.to_owned(),
            profile: profile.clone(),
            transcript: transcript.to_vec(),
            analysis: analysis.map(str::to_owned),
            archived_at: now,
        };

        let dir = self.sessions_dir(user_id, &profile_id);
        let stamp = now.format("%Y%m%dT%H%M%S%.3fZ").to_string();
        let mut path = dir.join(format!("{stamp}.json"));
        let mut n = 1;
        while path.exists() {
            path = dir.join(format!("{stamp}-{n}.json"));
            n += 1;
        }
        write_json_new(&path, &record)?;

        TraceEvent::SessionArchived {
            user_id: user_id.to_owned(),
            profile_id: profile_id.clone(),
            exchanges: transcript.len(),
        }
        .emit();

        Ok(Some(ArchiveRef {
            user_id: user_id.to_owned(),
            profile_id,
            archived_at: now,
            path,
        }))
    }

    // ── Read path ──────────────────────────────────────────────────

    /// Prior sessions for a profile that carry both a transcript and an
    /// analysis, oldest first.
    pub fn load_history(&self, user_id: &str, profile_id: &str) -> Result<Vec<ArchivedSession>> {
        let dir = self.sessions_dir(user_id, profile_id);
        let (records, mut skipped) = read_json_dir::<ArchivedSession>(&dir)?;

        let mut entries: Vec<ArchivedSession> = Vec::with_capacity(records.len());
        for r in records {
            if r.is_informative() {
                entries.push(r);
            } else {
                skipped += 1;
            }
        }
        entries.sort_by_key(|e| e.archived_at);

        TraceEvent::HistoryLoaded {
            user_id: user_id.to_owned(),
            profile_id: profile_id.to_owned(),
            entries: entries.len(),
            skipped,
        }
        .emit();

        Ok(entries)
    }

    /// Saved profiles for a user, oldest first.
    pub fn list_profiles(&self, user_id: &str) -> Result<Vec<Profile>> {
        let (mut profiles, _) = read_json_dir::<Profile>(&self.user_dir(user_id).join("profiles"))?;
        profiles.sort_by_key(|p| p.saved_at);
        Ok(profiles)
    }

    pub fn load_profile(&self, user_id: &str, profile_id: &str) -> Result<Option<Profile>> {
        let path = self.profile_path(user_id, profile_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    // ── Legacy layout ──────────────────────────────────────────────

    /// Adopt owner-less profiles from `patients/*.json` into the per-user
    /// layout. The record's `owner_id` decides the owner when present,
    /// otherwise `default_owner`. Existing targets are left alone, so running
    /// this again is harmless.
    pub fn migrate_legacy(&self, default_owner: &str) -> Result<MigrationReport> {
        let legacy_dir = self.root.join("patients");
        let mut report = MigrationReport::default();
        if !legacy_dir.is_dir() {
            return Ok(report);
        }

        for entry in std::fs::read_dir(&legacy_dir).map_err(Error::Io)? {
            let path = entry.map_err(Error::Io)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.migrate_one(&path, default_owner) {
                Ok(true) => report.migrated += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "legacy profile not migrated");
                    report.skipped += 1;
                }
            }
        }

        TraceEvent::LegacyMigrated {
            migrated: report.migrated,
            skipped: report.skipped,
        }
        .emit();
        Ok(report)
    }

    fn migrate_one(&self, path: &Path, default_owner: &str) -> Result<bool> {
        let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;

        let owner = match value.get("owner_id") {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => default_owner.to_owned(),
        };

        let mut profile: Profile = serde_json::from_value(value)?;
        let profile_id = match &profile.id {
            Some(id) => id.clone(),
            None => path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_owned)
                .ok_or_else(|| Error::Storage(format!("bad legacy file name: {}", path.display())))?,
        };
        profile.id = Some(profile_id.clone());
        if profile.saved_at.is_none() {
            profile.saved_at = Some(Utc::now());
        }

        let target = self.profile_path(&owner, &profile_id);
        if target.exists() {
            tracing::debug!(target = %target.display(), "legacy profile already migrated");
            return Ok(false);
        }
        write_json_new(&target, &profile)?;
        std::fs::remove_file(path).map_err(Error::Io)?;
        tracing::info!(owner = %owner, profile_id = %profile_id, "migrated legacy profile");
        Ok(true)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// File helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Turn an arbitrary id into a single path component. Characters outside
/// `[A-Za-z0-9_-]` become `~xx` hex escapes, so distinct ids never collide.
pub(crate) fn safe_component(id: &str) -> String {
    if id.is_empty() {
        return "~".into();
    }
    let mut out = String::with_capacity(id.len());
    for b in id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            out.push_str(&format!("~{b:02x}"));
        }
    }
    out
}

/// Write JSON to a path that must not exist yet.
fn write_json_new<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(Error::Io)?;
    }
    let json = serde_json::to_vec_pretty(value)?;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(Error::Io)?;
    file.write_all(&json).map_err(Error::Io)?;
    Ok(())
}

/// Parse every `*.json` in `dir`. Returns the parsed records and how many
/// files were skipped. A missing directory is empty.
fn read_json_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<(Vec<T>, usize)> {
    if !dir.is_dir() {
        return Ok((Vec::new(), 0));
    }
    let mut out = Vec::new();
    let mut skipped = 0;
    for entry in std::fs::read_dir(dir).map_err(Error::Io)? {
        let path = entry.map_err(Error::Io)?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let parsed = std::fs::read_to_string(&path)
            .map_err(Error::Io)
            .and_then(|raw| serde_json::from_str::<T>(&raw).map_err(Error::Json));
        match parsed {
            Ok(v) => out.push(v),
            Err(e) => {
                skipped += 1;
                tracing::warn!(path = %path.display(), error = %e, "skipping malformed archive record");
            }
        }
    }
    Ok((out, skipped))
}
