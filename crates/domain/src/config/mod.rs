mod cache;
mod dialog;
mod llm;
mod observability;
mod server;
mod speech;
mod storage;

pub use cache::*;
pub use dialog::*;
pub use llm::*;
pub use observability::*;
pub use server::*;
pub use speech::*;
pub use storage::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub dialog: DialogConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl ConfigError {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }
        if self.server.cors.allowed_origins.len() == 1
            && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError::warning(
                "server.cors.allowed_origins",
                "wildcard \"*\" allows all origins (not recommended for production)",
            ));
        }

        // ── LLM providers and roles ──────────────────────────────────
        if self.llm.providers.is_empty() {
            errors.push(ConfigError::warning(
                "llm.providers",
                "no LLM providers configured",
            ));
        }
        for (i, provider) in self.llm.providers.iter().enumerate() {
            if provider.id.is_empty() {
                errors.push(ConfigError::error(
                    format!("llm.providers[{i}].id"),
                    "provider id must not be empty",
                ));
            }
            if provider.base_url.is_empty() {
                errors.push(ConfigError::error(
                    format!("llm.providers[{i}].base_url"),
                    "provider base_url must not be empty",
                ));
            }
        }
        let mut role_names: Vec<&String> = self.llm.roles.keys().collect();
        role_names.sort();
        for name in role_names {
            let (provider_id, _) = self.llm.roles[name].provider_and_model();
            if !self.llm.providers.iter().any(|p| p.id == provider_id) {
                errors.push(ConfigError::error(
                    format!("llm.roles.{name}"),
                    format!("references unknown provider '{provider_id}'"),
                ));
            }
        }

        // ── Dialog and cache ─────────────────────────────────────────
        if self.dialog.patient_max_tokens == 0 {
            errors.push(ConfigError::error(
                "dialog.patient_max_tokens",
                "must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.cache.savings_ratio) {
            errors.push(ConfigError::error(
                "cache.savings_ratio",
                "must be between 0.0 and 1.0",
            ));
        }

        if self.storage.legacy_owner.trim().is_empty() {
            errors.push(ConfigError::error(
                "storage.legacy_owner",
                "must not be empty",
            ));
        }

        if self.speech.enabled && self.speech.max_bytes == 0 {
            errors.push(ConfigError::warning(
                "speech.max_bytes",
                "0 rejects every voice message",
            ));
        }

        errors
    }
}
