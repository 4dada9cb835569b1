use pt_domain::error::Result;
use pt_domain::message::Message;
use pt_domain::usage::Usage;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// System instructions as sent on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SystemPrompt {
    #[default]
    None,
    /// A plain string with no cache tagging.
    Text(String),
    /// Structured blocks; a block with `cache = true` marks the end of a
    /// cacheable prefix.
    Blocks(Vec<SystemBlock>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemBlock {
    pub text: String,
    pub cache: bool,
}

impl SystemPrompt {
    /// Whether any block carries a cache marker.
    pub fn is_cache_tagged(&self) -> bool {
        matches!(self, SystemPrompt::Blocks(blocks) if blocks.iter().any(|b| b.cache))
    }

    /// All instruction text joined, for providers without structured system
    /// prompts.
    pub fn joined_text(&self) -> Option<String> {
        match self {
            SystemPrompt::None => None,
            SystemPrompt::Text(t) => Some(t.clone()),
            SystemPrompt::Blocks(blocks) => Some(
                blocks
                    .iter()
                    .map(|b| b.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            ),
        }
    }
}

/// A provider-agnostic completion request.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub system: SystemPrompt,
    /// Alternating user/assistant messages, ending with a user message.
    pub messages: Vec<Message>,
    /// Hard cap on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature. `None` lets the provider choose.
    pub temperature: Option<f32>,
    /// Model identifier override. When `None`, the provider uses its default.
    pub model: Option<String>,
}

/// Why the provider stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    /// The output hit `max_tokens`; the text may stop mid-sentence.
    MaxTokens,
    StopSequence,
    Other(String),
}

impl StopReason {
    pub fn is_truncated(&self) -> bool {
        matches!(self, StopReason::MaxTokens)
    }
}

/// A provider-agnostic completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    /// Always present; fields the provider did not report are zero.
    pub usage: Usage,
    /// The model that actually produced the response.
    pub model: String,
    pub stop_reason: StopReason,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait that every LLM adapter must implement.
///
/// Implementations translate between our internal types and the wire format
/// of each provider's HTTP API.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a completion request and wait for the full response.
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}
