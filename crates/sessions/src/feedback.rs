//! Trainee feedback about the tool itself.
//!
//! Append-only JSONL, one file per user under `users/<user>/feedback.jsonl`.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pt_domain::error::{Error, Result};

use crate::archive::safe_component;
use crate::error::SessionError;

const MAX_DISPLAY_NAME: usize = 100;
const MAX_COMMENT: usize = 4000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub user_id: String,
    pub rating: u8,
    pub comment: String,
    pub display_name: String,
    pub submitted_at: DateTime<Utc>,
}

pub struct FeedbackStore {
    root: PathBuf,
}

impl FeedbackStore {
    pub fn new(state_path: &Path) -> Self {
        Self {
            root: state_path.join("users"),
        }
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        self.root.join(safe_component(user_id)).join("feedback.jsonl")
    }

    /// Validate and append one entry.
    pub fn submit(
        &self,
        user_id: &str,
        rating: u8,
        comment: &str,
        display_name: &str,
    ) -> std::result::Result<Feedback, SessionError> {
        if !(1..=5).contains(&rating) {
            return Err(SessionError::InvalidRating(rating));
        }
        let entry = Feedback {
            user_id: user_id.to_owned(),
            rating,
            comment: truncate_chars(comment.trim(), MAX_COMMENT),
            display_name: truncate_chars(display_name.trim(), MAX_DISPLAY_NAME),
            submitted_at: Utc::now(),
        };
        self.append(&entry).map_err(SessionError::Storage)?;
        tracing::info!(user_id = %user_id, rating, "feedback recorded");
        Ok(entry)
    }

    fn append(&self, entry: &Feedback) -> Result<()> {
        let path = self.path_for(&entry.user_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(Error::Io)?;
        file.write_all(line.as_bytes()).map_err(Error::Io)?;
        Ok(())
    }

    /// All entries for a user, oldest first. Unparseable lines are skipped.
    pub fn list(&self, user_id: &str) -> Result<Vec<Feedback>> {
        let path = self.path_for(user_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
        Ok(raw
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| match serde_json::from_str(l) {
                Ok(f) => Some(f),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed feedback line");
                    None
                }
            })
            .collect())
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
