use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for sessions, profiles, archives and feedback.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
    /// User that adopts legacy profile records carrying no owner.
    #[serde(default = "d_legacy_owner")]
    pub legacy_owner: String,
    /// Run the legacy-layout migration at startup.
    #[serde(default = "d_true")]
    pub migrate_legacy: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
            legacy_owner: d_legacy_owner(),
            migrate_legacy: true,
        }
    }
}

fn d_state_path() -> PathBuf {
    PathBuf::from("./data")
}
fn d_legacy_owner() -> String {
    "legacy".into()
}
fn d_true() -> bool {
    true
}
