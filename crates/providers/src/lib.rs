pub mod anthropic;
pub mod cache;
pub mod openai_compat;
pub mod registry;
pub mod speech;
pub mod traits;
pub(crate) mod util;

#[cfg(any(test, feature = "test-util"))]
pub mod scripted;

// Re-exports for convenience.
pub use cache::{CacheAwareClient, CacheLedger, CacheStats, Completion, Instructions};
pub use registry::{ProviderRegistry, RoleBinding};
pub use speech::{Transcriber, TranscriptionError, WhisperTranscriber};
pub use traits::{CompletionRequest, CompletionResponse, LlmProvider, StopReason};
pub use util::resolve_api_key;
