//! Cache-aware completion client.
//!
//! Wraps a role-bound [`LlmProvider`] so callers deal in instructions,
//! history and a new turn instead of raw requests. Long instruction prefixes
//! are tagged for the provider's prompt cache, and every reply's cache
//! counters are folded into a process-wide [`CacheLedger`].

use crate::registry::RoleBinding;
use crate::traits::{CompletionRequest, LlmProvider, SystemBlock, SystemPrompt};
use parking_lot::Mutex;
use pt_domain::config::CacheConfig;
use pt_domain::error::Result;
use pt_domain::message::Message;
use pt_domain::trace::TraceEvent;
use pt_domain::usage::Usage;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Instructions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The stable "how to behave" payload sent ahead of the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum Instructions {
    Text(String),
    /// Ordered blocks; everything up to and including the last block is
    /// assumed stable across calls for the same profile.
    Blocks(Vec<String>),
}

impl Instructions {
    /// Translate into a wire-level system prompt, applying the cache rule.
    ///
    /// Text is tagged only when strictly longer than `min_cacheable_chars`.
    /// Blocks always get the marker on their last block.
    pub fn to_system_prompt(&self, config: &CacheConfig) -> SystemPrompt {
        match self {
            Instructions::Text(t) if t.is_empty() => SystemPrompt::None,
            Instructions::Text(t) => {
                if config.enabled && t.chars().count() > config.min_cacheable_chars {
                    SystemPrompt::Blocks(vec![SystemBlock {
                        text: t.clone(),
                        cache: true,
                    }])
                } else {
                    SystemPrompt::Text(t.clone())
                }
            }
            Instructions::Blocks(blocks) if blocks.is_empty() => SystemPrompt::None,
            Instructions::Blocks(blocks) => {
                let last = blocks.len() - 1;
                SystemPrompt::Blocks(
                    blocks
                        .iter()
                        .enumerate()
                        .map(|(i, text)| SystemBlock {
                            text: text.clone(),
                            cache: config.enabled && i == last,
                        })
                        .collect(),
                )
            }
        }
    }
}

impl From<String> for Instructions {
    fn from(text: String) -> Self {
        Instructions::Text(text)
    }
}

impl From<&str> for Instructions {
    fn from(text: &str) -> Self {
        Instructions::Text(text.to_owned())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cache ledger
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Running cache totals across every client in the process.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub tokens_written: u64,
    pub tokens_read: u64,
    /// Estimated tokens saved; `tokens_read * savings_ratio`.
    pub estimated_savings: f64,
}

impl CacheStats {
    /// Hits over completed requests, `0.0` before the first request.
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_requests as f64
        }
    }
}

/// Shared, advisory cache accounting. Never gates correctness.
#[derive(Debug)]
pub struct CacheLedger {
    savings_ratio: f64,
    stats: Mutex<CacheStats>,
}

impl CacheLedger {
    pub fn new(savings_ratio: f64) -> Self {
        Self {
            savings_ratio,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Fold one completed call's usage into the totals.
    pub fn record(&self, usage: &Usage) {
        let mut stats = self.stats.lock();
        stats.total_requests += 1;
        if usage.cache_creation_input_tokens > 0 {
            stats.cache_misses += 1;
            stats.tokens_written += u64::from(usage.cache_creation_input_tokens);
        }
        if usage.cache_read_input_tokens > 0 {
            stats.cache_hits += 1;
            stats.tokens_read += u64::from(usage.cache_read_input_tokens);
            stats.estimated_savings +=
                f64::from(usage.cache_read_input_tokens) * self.savings_ratio;
        }
    }

    pub fn snapshot(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    pub fn reset(&self) {
        *self.stats.lock() = CacheStats::default();
    }

    pub fn savings_ratio(&self) -> f64 {
        self.savings_ratio
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outcome of one completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// The reply hit the output ceiling and may stop mid-sentence.
    pub truncated: bool,
    /// Always present; zeroed fields when the provider reported nothing.
    pub usage: Usage,
}

/// A provider bound to one role (patient, analyst, generator) plus the
/// cache policy and the shared ledger.
#[derive(Clone)]
pub struct CacheAwareClient {
    role: String,
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
    temperature: Option<f32>,
    config: CacheConfig,
    ledger: Arc<CacheLedger>,
}

impl CacheAwareClient {
    pub fn new(
        role: impl Into<String>,
        binding: RoleBinding,
        config: CacheConfig,
        ledger: Arc<CacheLedger>,
    ) -> Self {
        Self {
            role: role.into(),
            provider: binding.provider,
            model: binding.model,
            temperature: binding.temperature,
            config,
            ledger,
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn ledger(&self) -> &Arc<CacheLedger> {
        &self.ledger
    }

    /// Send `history` followed by `new_turn` under `instructions`.
    ///
    /// Provider errors come back unchanged and are not retried.
    pub async fn complete(
        &self,
        instructions: &Instructions,
        history: &[Message],
        new_turn: &str,
        max_tokens: u32,
    ) -> Result<Completion> {
        let system = instructions.to_system_prompt(&self.config);
        let cacheable = system.is_cache_tagged();

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.extend_from_slice(history);
        messages.push(Message::user(new_turn));

        let req = CompletionRequest {
            system,
            messages,
            max_tokens,
            temperature: self.temperature,
            model: self.model.clone(),
        };

        let started = Instant::now();
        let resp = self.provider.complete(req).await?;
        let truncated = resp.stop_reason.is_truncated();

        TraceEvent::LlmRequest {
            provider: self.provider.provider_id().to_owned(),
            model: resp.model.clone(),
            role: self.role.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
            truncated,
        }
        .emit();

        self.ledger.record(&resp.usage);
        if cacheable
            || resp.usage.cache_creation_input_tokens > 0
            || resp.usage.cache_read_input_tokens > 0
        {
            TraceEvent::CacheUsage {
                cacheable,
                cache_creation_tokens: resp.usage.cache_creation_input_tokens,
                cache_read_tokens: resp.usage.cache_read_input_tokens,
            }
            .emit();
        }
        tracing::debug!(
            role = %self.role,
            tokens = resp.usage.total(),
            cache_hit_rate = self.ledger.snapshot().hit_rate(),
            "completion finished"
        );

        Ok(Completion {
            text: resp.content,
            truncated,
            usage: resp.usage,
        })
    }
}

impl std::fmt::Debug for CacheAwareClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheAwareClient")
            .field("role", &self.role)
            .field("provider", &self.provider.provider_id())
            .field("model", &self.model)
            .finish()
    }
}
