//! Uniform clients for the AI chat platforms a diagnosis probes.
//!
//! Every platform is wrapped behind the [`AiAdapter`] trait so the engine
//! never sees provider-specific wire formats. Errors are classified into a
//! small taxonomy ([`AdapterError`]) so the retry policy can decide
//! retryability without string matching.

mod error;
mod mock;
mod providers;
mod registry;
mod retry;

pub use error::AdapterError;
pub use mock::{MockAdapter, MockBehavior};
pub use providers::{GlmAdapter, OpenAiAdapter};
pub use registry::AdapterRegistry;
pub use retry::{retry_send, RetryPolicy};

use async_trait::async_trait;

/// A single AI platform answer, normalized across providers.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub latency_ms: u64,
    pub tokens_used: Option<u32>,
    /// Provider-specific payload, kept for checkpoint inspection.
    pub raw: serde_json::Value,
}

/// Uniform request/response wrapper around one AI platform's HTTP API.
#[async_trait]
pub trait AiAdapter: std::fmt::Debug + Send + Sync {
    /// Stable provider name, e.g. `openai` or `glm`.
    fn provider(&self) -> &str;

    /// Send one prompt to the platform and return the normalized answer.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] classified per the taxonomy; the caller's
    /// retry policy decides which classes are transient.
    async fn send(&self, prompt: &str, model: &str) -> Result<ChatResponse, AdapterError>;
}
