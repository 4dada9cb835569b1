//! AppState construction shared by `serve` and `chat`.

use std::sync::Arc;

use anyhow::Context;

use pt_domain::config::{Config, ConfigSeverity, ROLE_ANALYST, ROLE_GENERATOR, ROLE_PATIENT};
use pt_providers::{
    CacheAwareClient, CacheLedger, ProviderRegistry, RoleBinding, Transcriber, WhisperTranscriber,
};
use pt_sessions::{Archive, FeedbackStore, ProfileGenerator, SessionManager, SessionStore};

use crate::dispatch::Dispatcher;
use crate::state::AppState;

/// Validate config, build providers from it and wire every subsystem.
///
/// A missing patient provider is fatal: nothing works without it.
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let error_count = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if error_count > 0 {
        anyhow::bail!("config validation failed with {error_count} error(s)");
    }

    // ── LLM providers ────────────────────────────────────────────────
    let llm = ProviderRegistry::from_config(&config.llm);
    tracing::info!(providers = ?llm.list_providers(), "LLM provider registry ready");

    // ── Speech-to-text (optional) ────────────────────────────────────
    let transcriber: Option<Arc<dyn Transcriber>> = if config.speech.enabled {
        match WhisperTranscriber::from_config(&config.speech) {
            Ok(t) => {
                tracing::info!(model = %config.speech.model, "speech-to-text ready");
                Some(Arc::new(t))
            }
            Err(e) => {
                tracing::warn!(error = %e, "speech-to-text disabled: could not initialize");
                None
            }
        }
    } else {
        None
    };

    assemble(config, llm, transcriber).await
}

/// Wire the state around an already-built provider registry.
pub async fn assemble(
    config: Arc<Config>,
    llm: ProviderRegistry,
    transcriber: Option<Arc<dyn Transcriber>>,
) -> anyhow::Result<AppState> {
    // ── Roles ────────────────────────────────────────────────────────
    let patient = llm
        .require_role(ROLE_PATIENT)
        .context("the patient role needs a working LLM provider")?;
    let analyst = fallback_role(&llm, ROLE_ANALYST, &patient);
    let generator = fallback_role(&llm, ROLE_GENERATOR, &patient);

    let ledger = Arc::new(CacheLedger::new(config.cache.savings_ratio));
    let client = |role: &str, binding: RoleBinding| {
        CacheAwareClient::new(role, binding, config.cache.clone(), ledger.clone())
    };

    // ── Storage ──────────────────────────────────────────────────────
    let state_path = config.storage.state_path.clone();
    std::fs::create_dir_all(&state_path)
        .with_context(|| format!("creating state directory {}", state_path.display()))?;

    let archive = Archive::new(&state_path);
    if config.storage.migrate_legacy {
        let owner = config.storage.legacy_owner.clone();
        let migrating = archive.clone();
        match tokio::task::spawn_blocking(move || migrating.migrate_legacy(&owner)).await {
            Ok(Ok(report)) if report.migrated > 0 || report.skipped > 0 => {
                tracing::info!(
                    migrated = report.migrated,
                    skipped = report.skipped,
                    "legacy profiles migrated"
                );
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "legacy profile migration failed"),
            Err(e) => tracing::warn!(error = %e, "legacy profile migration task failed"),
        }
    }

    let store = {
        let path = state_path.clone();
        tokio::task::spawn_blocking(move || SessionStore::open(&path))
            .await
            .context("session store load task")?
            .context("loading session store")?
    };
    tracing::info!(users = store.len(), path = %state_path.display(), "session store ready");

    // ── Session core ─────────────────────────────────────────────────
    let sessions = Arc::new(SessionManager::new(
        Arc::new(store),
        archive,
        client(ROLE_PATIENT, patient),
        client(ROLE_ANALYST, analyst),
        config.dialog.clone(),
    ));
    let generator = Arc::new(ProfileGenerator::new(
        client(ROLE_GENERATOR, generator),
        config.dialog.generator_max_tokens,
    ));
    let feedback = Arc::new(FeedbackStore::new(&state_path));

    let dispatcher = Arc::new(
        Dispatcher::new(sessions.clone(), generator, feedback, transcriber, ledger.clone())
            .context("building dispatcher")?,
    );

    Ok(AppState {
        config,
        llm: Arc::new(llm),
        ledger,
        sessions,
        dispatcher,
    })
}

/// Bind `role`, or reuse the patient binding when it has no provider.
fn fallback_role(llm: &ProviderRegistry, role: &str, patient: &RoleBinding) -> RoleBinding {
    match llm.for_role(role) {
        Some(binding) => binding,
        None => {
            tracing::info!(role, "no provider bound; using the patient provider");
            patient.clone()
        }
    }
}

/// Log the cache totals, then persist every session.
pub fn shutdown(state: &AppState) {
    let stats = state.ledger.snapshot();
    tracing::info!(
        total_requests = stats.total_requests,
        cache_hits = stats.cache_hits,
        cache_misses = stats.cache_misses,
        tokens_written = stats.tokens_written,
        tokens_read = stats.tokens_read,
        estimated_savings = stats.estimated_savings,
        hit_rate = stats.hit_rate(),
        "prompt cache summary"
    );
    if let Err(e) = state.sessions.flush() {
        tracing::warn!(error = %e, "session store flush on shutdown failed");
    }
}
