use std::sync::Arc;

use pt_domain::config::Config;
use pt_providers::{CacheLedger, ProviderRegistry};
use pt_sessions::SessionManager;

use crate::dispatch::Dispatcher;

/// Shared application state passed to all API handlers and the REPL.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub llm: Arc<ProviderRegistry>,
    /// Process-wide prompt cache accounting, shared by every role.
    pub ledger: Arc<CacheLedger>,
    pub sessions: Arc<SessionManager>,
    pub dispatcher: Arc<Dispatcher>,
}
