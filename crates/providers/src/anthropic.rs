//! Anthropic-native adapter.
//!
//! Implements the Anthropic Messages API, where system instructions go in a
//! separate top-level `system` field. Structured system blocks carry
//! `cache_control` markers so a stable instruction prefix can be served from
//! the prompt cache, and the cache counters in `usage` are surfaced.

use crate::traits::{
    CompletionRequest, CompletionResponse, LlmProvider, StopReason, SystemPrompt,
};
use crate::util::{from_reqwest, resolve_api_key};
use pt_domain::config::ProviderConfig;
use pt_domain::error::{Error, Result};
use pt_domain::usage::Usage;
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Constants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An LLM provider adapter for the Anthropic Messages API.
pub struct AnthropicProvider {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new provider from the deserialized provider config.
    pub fn from_config(cfg: &ProviderConfig, timeout_ms: u64) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.auth)?;
        let default_model = cfg
            .default_model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.into());

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model,
            client,
        })
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
    }

    fn build_messages_body(&self, req: &CompletionRequest) -> Value {
        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let messages: Vec<Value> = req
            .messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": req.max_tokens,
            "messages": messages,
        });

        if let Some(system) = system_to_anthropic(&req.system) {
            body["system"] = system;
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn system_to_anthropic(system: &SystemPrompt) -> Option<Value> {
    match system {
        SystemPrompt::None => None,
        SystemPrompt::Text(t) if t.is_empty() => None,
        SystemPrompt::Text(t) => Some(Value::String(t.clone())),
        SystemPrompt::Blocks(blocks) => {
            let arr: Vec<Value> = blocks
                .iter()
                .map(|b| {
                    let mut block = serde_json::json!({
                        "type": "text",
                        "text": b.text,
                    });
                    if b.cache {
                        block["cache_control"] = serde_json::json!({ "type": "ephemeral" });
                    }
                    block
                })
                .collect();
            Some(Value::Array(arr))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_anthropic_response(body: &Value) -> Result<CompletionResponse> {
    let content = body
        .get("content")
        .and_then(|v| v.as_array())
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let stop_reason = match body.get("stop_reason").and_then(|v| v.as_str()) {
        Some("end_turn") => StopReason::EndTurn,
        Some("max_tokens") => StopReason::MaxTokens,
        Some("stop_sequence") => StopReason::StopSequence,
        Some(other) => StopReason::Other(other.to_string()),
        None => StopReason::Other("unknown".into()),
    };

    let usage = body.get("usage").map(parse_anthropic_usage).unwrap_or_default();

    Ok(CompletionResponse {
        content,
        usage,
        model,
        stop_reason,
    })
}

fn parse_anthropic_usage(v: &Value) -> Usage {
    let field = |name: &str| v.get(name).and_then(|n| n.as_u64()).unwrap_or(0) as u32;
    Usage {
        input_tokens: field("input_tokens"),
        output_tokens: field("output_tokens"),
        cache_creation_input_tokens: field("cache_creation_input_tokens"),
        cache_read_input_tokens: field("cache_read_input_tokens"),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_messages_body(&req);

        tracing::debug!(
            provider = %self.id,
            url = %url,
            cache_tagged = req.system.is_cache_tagged(),
            "anthropic messages request"
        );

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), resp_text),
            });
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        parse_anthropic_response(&resp_json)
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::SystemBlock;
    use pt_domain::config::{AuthConfig, ProviderKind};
    use pt_domain::message::Message;

    fn provider() -> AnthropicProvider {
        let cfg = ProviderConfig {
            id: "anthropic".into(),
            kind: ProviderKind::Anthropic,
            base_url: "https://api.anthropic.com/".into(),
            auth: AuthConfig {
                key: Some("sk-test".into()),
                ..Default::default()
            },
            default_model: None,
        };
        AnthropicProvider::from_config(&cfg, 5_000).unwrap()
    }

    #[test]
    fn cached_block_carries_ephemeral_marker() {
        let req = CompletionRequest {
            system: SystemPrompt::Blocks(vec![
                SystemBlock { text: "rules".into(), cache: false },
                SystemBlock { text: "profile".into(), cache: true },
            ]),
            messages: vec![Message::user("hi")],
            max_tokens: 200,
            ..Default::default()
        };
        let body = provider().build_messages_body(&req);
        let system = body["system"].as_array().unwrap();
        assert!(system[0].get("cache_control").is_none());
        assert_eq!(system[1]["cache_control"]["type"], "ephemeral");
        assert_eq!(body["max_tokens"], 200);
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn plain_text_system_is_a_string() {
        let req = CompletionRequest {
            system: SystemPrompt::Text("short".into()),
            messages: vec![Message::user("hi")],
            max_tokens: 10,
            ..Default::default()
        };
        let body = provider().build_messages_body(&req);
        assert_eq!(body["system"], "short");
    }

    #[test]
    fn max_tokens_stop_reason_means_truncated() {
        let body = serde_json::json!({
            "model": "claude-3-5-haiku-20241022",
            "content": [{"type": "text", "text": "It started three months ago when"}],
            "stop_reason": "max_tokens",
            "usage": {
                "input_tokens": 40,
                "output_tokens": 200,
                "cache_creation_input_tokens": 0,
                "cache_read_input_tokens": 1200
            }
        });
        let resp = parse_anthropic_response(&body).unwrap();
        assert!(resp.stop_reason.is_truncated());
        assert_eq!(resp.usage.cache_read_input_tokens, 1200);
        assert_eq!(resp.content, "It started three months ago when");
    }

    #[test]
    fn missing_cache_counters_parse_as_zero() {
        let body = serde_json::json!({
            "content": [{"type": "text", "text": "ok"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 5, "output_tokens": 1}
        });
        let resp = parse_anthropic_response(&body).unwrap();
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
        assert_eq!(resp.usage.cache_creation_input_tokens, 0);
        assert_eq!(resp.usage.cache_read_input_tokens, 0);
    }
}
