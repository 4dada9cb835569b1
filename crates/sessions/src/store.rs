//! User session store.
//!
//! An in-memory map keyed by user id is the source of truth while the
//! process runs. Every write goes through to a [`SessionBackend`]; a failed
//! write is logged and the in-memory state stays authoritative.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use pt_domain::error::{Error, Result};
use pt_domain::trace::TraceEvent;

use crate::archive::safe_component;
use crate::model::Session;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Backend trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Durable mirror of the session map.
pub trait SessionBackend: Send + Sync {
    /// Load every stored session. Called once at startup.
    fn load_all(&self) -> Result<HashMap<String, Session>>;

    /// Rewrite one user's record.
    fn save(&self, session: &Session) -> Result<()>;

    /// Make sure everything written so far is durable.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

// ── JSON files ─────────────────────────────────────────────────────

/// One pretty-printed JSON file per user under `state_path/sessions/`.
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("sessions");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;
        Ok(Self { dir })
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", safe_component(user_id)))
    }
}

impl SessionBackend for JsonFileBackend {
    fn load_all(&self) -> Result<HashMap<String, Session>> {
        let mut sessions = HashMap::new();
        for entry in std::fs::read_dir(&self.dir).map_err(Error::Io)? {
            let path = entry.map_err(Error::Io)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = std::fs::read_to_string(&path)
                .map_err(Error::Io)
                .and_then(|raw| serde_json::from_str::<Session>(&raw).map_err(Error::Json));
            match parsed {
                Ok(session) => {
                    sessions.insert(session.user_id.clone(), session);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable session record");
                }
            }
        }
        Ok(sessions)
    }

    fn save(&self, session: &Session) -> Result<()> {
        let path = self.path_for(&session.user_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(session)?;
        std::fs::write(&tmp, json).map_err(Error::Io)?;
        std::fs::rename(&tmp, &path).map_err(Error::Io)?;
        Ok(())
    }
}

// ── In memory ──────────────────────────────────────────────────────

/// Keeps "persisted" records in a map. Writes can be made to fail on demand.
#[derive(Default)]
pub struct MemoryBackend {
    saved: Mutex<HashMap<String, Session>>,
    writes: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from pre-existing records.
    pub fn with_sessions(sessions: impl IntoIterator<Item = Session>) -> Self {
        let backend = Self::default();
        {
            let mut saved = backend.saved.lock();
            for s in sessions {
                saved.insert(s.user_id.clone(), s);
            }
        }
        backend
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Last successfully written record for `user_id`.
    pub fn saved(&self, user_id: &str) -> Option<Session> {
        self.saved.lock().get(user_id).cloned()
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl SessionBackend for MemoryBackend {
    fn load_all(&self) -> Result<HashMap<String, Session>> {
        Ok(self.saved.lock().clone())
    }

    fn save(&self, session: &Session) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Storage("injected write failure".into()));
        }
        self.saved
            .lock()
            .insert(session.user_id.clone(), session.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    backend: Arc<dyn SessionBackend>,
}

impl SessionStore {
    /// Bulk-load every record from `backend`.
    pub fn new(backend: Arc<dyn SessionBackend>) -> Result<Self> {
        let sessions = backend.load_all()?;
        tracing::info!(sessions = sessions.len(), "session store loaded");
        Ok(Self {
            sessions: RwLock::new(sessions),
            backend,
        })
    }

    /// Store backed by JSON files under `state_path`.
    pub fn open(state_path: &Path) -> Result<Self> {
        Self::new(Arc::new(JsonFileBackend::new(state_path)?))
    }

    /// The user's session, or a fresh idle one for an unseen user.
    pub fn get(&self, user_id: &str) -> Session {
        self.sessions
            .read()
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| Session::new(user_id))
    }

    /// Replace the user's session and write it through.
    pub fn put(&self, session: Session) {
        if let Err(e) = self.backend.save(&session) {
            tracing::warn!(user_id = %session.user_id, error = %e, "session write failed; keeping in-memory state");
            TraceEvent::PersistFailed {
                key: session.user_id.clone(),
                error: e.to_string(),
            }
            .emit();
        }
        self.sessions
            .write()
            .insert(session.user_id.clone(), session);
    }

    /// Every known user id (sorted).
    pub fn users(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Rewrite every record, then ask the backend to flush.
    pub fn flush(&self) -> Result<()> {
        let sessions: Vec<Session> = self.sessions.read().values().cloned().collect();
        let mut failures = 0usize;
        for s in &sessions {
            if let Err(e) = self.backend.save(s) {
                failures += 1;
                tracing::warn!(user_id = %s.user_id, error = %e, "flush: session write failed");
            }
        }
        self.backend.flush()?;
        if failures > 0 {
            return Err(Error::Storage(format!(
                "{failures} of {} sessions could not be written",
                sessions.len()
            )));
        }
        tracing::info!(sessions = sessions.len(), "session store flushed");
        Ok(())
    }
}
