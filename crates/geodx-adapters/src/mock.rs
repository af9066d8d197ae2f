//! Scripted adapter for engine tests and dry runs.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::error::AdapterError;
use crate::{AiAdapter, ChatResponse};

/// What the mock does on each call.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Always answer with this content.
    Succeed(String),
    /// Always fail with a retryable rate-limit error.
    FailRateLimited,
    /// Always fail with a non-retryable auth error.
    FailAuth,
    /// Fail `failures` times with rate limits, then answer with `content`.
    FailThenSucceed { failures: u32, content: String },
    /// Rate-limit prompts containing `needle`; answer everything else with
    /// `content`. Lets tests fail a chosen slice of a task matrix.
    FailWhenPromptContains { needle: String, content: String },
    /// Never return — used to exercise timeouts.
    Hang,
}

/// In-process [`AiAdapter`] with scripted behavior and call counting.
#[derive(Debug)]
pub struct MockAdapter {
    provider: String,
    behavior: MockBehavior,
    calls: AtomicU32,
}

impl MockAdapter {
    #[must_use]
    pub fn new(provider: &str, behavior: MockBehavior) -> Self {
        Self {
            provider: provider.to_owned(),
            behavior,
            calls: AtomicU32::new(0),
        }
    }

    /// Shorthand for a mock that always answers `content`.
    #[must_use]
    pub fn succeeding(provider: &str, content: &str) -> Self {
        Self::new(provider, MockBehavior::Succeed(content.to_owned()))
    }

    /// Number of `send` calls observed so far.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiAdapter for MockAdapter {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn send(&self, prompt: &str, _model: &str) -> Result<ChatResponse, AdapterError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.behavior {
            MockBehavior::Succeed(content) => Ok(response(content)),
            MockBehavior::FailRateLimited => Err(AdapterError::RateLimited {
                provider: self.provider.clone(),
                retry_after_secs: None,
            }),
            MockBehavior::FailAuth => Err(AdapterError::Auth {
                provider: self.provider.clone(),
            }),
            MockBehavior::FailThenSucceed { failures, content } => {
                if call <= *failures {
                    Err(AdapterError::RateLimited {
                        provider: self.provider.clone(),
                        retry_after_secs: None,
                    })
                } else {
                    Ok(response(content))
                }
            }
            MockBehavior::FailWhenPromptContains { needle, content } => {
                if prompt.contains(needle.as_str()) {
                    Err(AdapterError::RateLimited {
                        provider: self.provider.clone(),
                        retry_after_secs: None,
                    })
                } else {
                    Ok(response(content))
                }
            }
            MockBehavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!("pending future never resolves")
            }
        }
    }
}

fn response(content: &str) -> ChatResponse {
    ChatResponse {
        content: content.to_owned(),
        latency_ms: 1,
        tokens_used: Some(16),
        raw: serde_json::json!({ "mock": true }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn succeeding_mock_counts_calls() {
        let mock = MockAdapter::succeeding("openai", "hello");
        let first = mock.send("p", "gpt-4o-mini").await.expect("send");
        assert_eq!(first.content, "hello");
        let _ = mock.send("p", "gpt-4o-mini").await;
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn fail_then_succeed_recovers_after_scripted_failures() {
        let mock = MockAdapter::new(
            "openai",
            MockBehavior::FailThenSucceed {
                failures: 2,
                content: "recovered".to_owned(),
            },
        );
        assert!(mock.send("p", "m").await.is_err());
        assert!(mock.send("p", "m").await.is_err());
        let ok = mock.send("p", "m").await.expect("third call succeeds");
        assert_eq!(ok.content, "recovered");
    }
}
