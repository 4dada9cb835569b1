use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider system
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Role that voices the simulated patient.
pub const ROLE_PATIENT: &str = "patient";
/// Role that writes session feedback for the trainee.
pub const ROLE_ANALYST: &str = "analyst";
/// Role that invents new patient profiles.
pub const ROLE_GENERATOR: &str = "generator";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_60000u")]
    pub default_timeout_ms: u64,
    /// Role name → `"provider_id/model_name"`.
    #[serde(default)]
    pub roles: HashMap<String, RoleConfig>,
    /// Registered LLM providers (data-driven: adding a provider = adding config).
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 60_000,
            roles: HashMap::new(),
            providers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Format: "provider_id/model_name"
    pub model: String,
    /// Optional sampling temperature for this role.
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl RoleConfig {
    /// Split the `"provider_id/model_name"` spec. A spec without a slash
    /// names only the provider.
    pub fn provider_and_model(&self) -> (&str, Option<&str>) {
        match self.model.split_once('/') {
            Some((provider, model)) if !model.is_empty() => (provider, Some(model)),
            Some((provider, _)) => (provider, None),
            None => (self.model.as_str(), None),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenaiCompat,
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Header name (e.g. "Authorization", "x-api-key").
    #[serde(default)]
    pub header: Option<String>,
    /// Header value prefix (e.g. "Bearer ").
    #[serde(default)]
    pub prefix: Option<String>,
    /// Env var containing the key.
    #[serde(default)]
    pub env: Option<String>,
    /// Direct key (for config-only setups; prefer env or keychain).
    #[serde(default)]
    pub key: Option<String>,
    /// Keychain service name (e.g., "psytrainer").
    #[serde(default)]
    pub service: Option<String>,
    /// Keychain account name (e.g., "anthropic-api-key").
    #[serde(default)]
    pub account: Option<String>,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_60000u() -> u64 {
    60_000
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_spec_splits_provider_and_model() {
        let role = RoleConfig {
            model: "anthropic/claude-3-haiku-20240307".into(),
            temperature: None,
        };
        assert_eq!(
            role.provider_and_model(),
            ("anthropic", Some("claude-3-haiku-20240307"))
        );

        let bare = RoleConfig { model: "anthropic".into(), temperature: None };
        assert_eq!(bare.provider_and_model(), ("anthropic", None));
    }

    #[test]
    fn providers_parse_from_toml() {
        let toml_str = r#"
            [[providers]]
            id = "anthropic"
            kind = "anthropic"
            base_url = "https://api.anthropic.com"
            auth = { env = "ANTHROPIC_API_KEY" }

            [roles.patient]
            model = "anthropic/claude-3-haiku-20240307"
        "#;
        let cfg: LlmConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.providers.len(), 1);
        assert_eq!(cfg.providers[0].kind, ProviderKind::Anthropic);
        assert_eq!(cfg.providers[0].auth.env.as_deref(), Some("ANTHROPIC_API_KEY"));
        assert!(cfg.roles.contains_key(ROLE_PATIENT));
        assert_eq!(cfg.default_timeout_ms, 60_000);
    }
}
