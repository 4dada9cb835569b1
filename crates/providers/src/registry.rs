//! Provider registry.
//!
//! Constructs and holds all configured LLM provider instances. At startup the
//! registry reads the [`LlmConfig`], resolves authentication, instantiates the
//! adapter for each provider, and binds the configured roles (patient,
//! analyst, generator) to a provider + model.

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;
use pt_domain::config::{LlmConfig, ProviderKind};
use pt_domain::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Role binding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider resolved for one role, with the model and sampling settings
/// the role asks for.
#[derive(Clone)]
pub struct RoleBinding {
    pub provider: Arc<dyn LlmProvider>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

impl std::fmt::Debug for RoleBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleBinding")
            .field("provider", &self.provider.provider_id())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Holds all instantiated LLM providers and role assignments.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    roles: HashMap<String, (String, Option<String>, Option<f32>)>,
    init_errors: Vec<(String, String)>,
}

impl ProviderRegistry {
    /// Build the registry from the application's [`LlmConfig`].
    ///
    /// Providers that fail to initialize (usually a missing credential) are
    /// logged and recorded in [`init_errors`](Self::init_errors); whether
    /// that is fatal is the caller's decision.
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        let mut init_errors = Vec::new();

        for pc in &config.providers {
            let result: Result<Arc<dyn LlmProvider>> = match pc.kind {
                ProviderKind::OpenaiCompat => {
                    OpenAiCompatProvider::from_config(pc, config.default_timeout_ms)
                        .map(|p| Arc::new(p) as Arc<dyn LlmProvider>)
                }
                ProviderKind::Anthropic => {
                    AnthropicProvider::from_config(pc, config.default_timeout_ms)
                        .map(|p| Arc::new(p) as Arc<dyn LlmProvider>)
                }
            };

            match result {
                Ok(provider) => {
                    tracing::info!(
                        provider_id = %pc.id,
                        kind = ?pc.kind,
                        "registered LLM provider"
                    );
                    providers.insert(pc.id.clone(), provider);
                }
                Err(e) => {
                    tracing::warn!(
                        provider_id = %pc.id,
                        kind = ?pc.kind,
                        error = %e,
                        "failed to initialize LLM provider, skipping"
                    );
                    init_errors.push((pc.id.clone(), e.to_string()));
                }
            }
        }

        let roles = config
            .roles
            .iter()
            .map(|(name, rc)| {
                let (provider_id, model) = rc.provider_and_model();
                (
                    name.clone(),
                    (provider_id.to_owned(), model.map(str::to_owned), rc.temperature),
                )
            })
            .collect();

        Self {
            providers,
            roles,
            init_errors,
        }
    }

    /// Build a registry around already-constructed providers (tests, embedding).
    pub fn from_parts(
        providers: Vec<Arc<dyn LlmProvider>>,
        roles: &[(&str, &str)],
    ) -> Self {
        let providers: HashMap<String, Arc<dyn LlmProvider>> = providers
            .into_iter()
            .map(|p| (p.provider_id().to_owned(), p))
            .collect();
        let roles = roles
            .iter()
            .map(|(role, provider)| ((*role).to_owned(), ((*provider).to_owned(), None, None)))
            .collect();
        Self {
            providers,
            roles,
            init_errors: Vec::new(),
        }
    }

    /// Look up a provider by its config id.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Resolve the provider bound to `role`.
    ///
    /// A role with no explicit binding falls back to the only registered
    /// provider when there is exactly one.
    pub fn for_role(&self, role: &str) -> Option<RoleBinding> {
        match self.roles.get(role) {
            Some((provider_id, model, temperature)) => {
                self.get(provider_id).map(|provider| RoleBinding {
                    provider,
                    model: model.clone(),
                    temperature: *temperature,
                })
            }
            None if self.providers.len() == 1 => {
                self.providers.values().next().map(|p| RoleBinding {
                    provider: p.clone(),
                    model: None,
                    temperature: None,
                })
            }
            None => None,
        }
    }

    /// Like [`for_role`](Self::for_role) but with an error naming the role.
    pub fn require_role(&self, role: &str) -> Result<RoleBinding> {
        self.for_role(role).ok_or_else(|| {
            let detail = self
                .init_errors
                .iter()
                .map(|(id, e)| format!("{id}: {e}"))
                .collect::<Vec<_>>()
                .join("; ");
            if detail.is_empty() {
                Error::Config(format!("no LLM provider available for role '{role}'"))
            } else {
                Error::Config(format!(
                    "no LLM provider available for role '{role}' ({detail})"
                ))
            }
        })
    }

    /// Providers that were configured but could not be built.
    pub fn init_errors(&self) -> &[(String, String)] {
        &self.init_errors
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// List all registered provider IDs (sorted).
    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }
}
