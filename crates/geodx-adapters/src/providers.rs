//! HTTP clients for the supported AI chat platforms.
//!
//! Both platforms speak an OpenAI-compatible chat-completions format, so the
//! wire types and the request path are shared; each adapter contributes its
//! provider name, base URL, and credentials.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;
use crate::{AiAdapter, ChatResponse};

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionReply {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: Option<u32>,
}

/// Shared request path for OpenAI-compatible chat-completions endpoints.
#[derive(Debug)]
struct ChatHttpClient {
    provider: &'static str,
    client: Client,
    api_key: String,
    base_url: Url,
}

impl ChatHttpClient {
    fn new(
        provider: &'static str,
        api_key: &str,
        base_url: &str,
        timeout_secs: u64,
    ) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("geodx/0.1 (brand-diagnostics)")
            .build()?;

        // Normalise: ensure the base URL ends with exactly one slash so that
        // join() appends the endpoint path instead of replacing the last
        // path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| AdapterError::MalformedReply {
            provider: provider.to_owned(),
            reason: format!("invalid base URL '{base_url}': {e}"),
        })?;

        Ok(Self {
            provider,
            client,
            api_key: api_key.to_owned(),
            base_url,
        })
    }

    async fn send(&self, prompt: &str, model: &str) -> Result<ChatResponse, AdapterError> {
        let url = self
            .base_url
            .join("chat/completions")
            .map_err(|e| AdapterError::MalformedReply {
                provider: self.provider.to_owned(),
                reason: format!("cannot build endpoint URL: {e}"),
            })?;

        let body = ChatCompletionRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let started = Instant::now();
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(AdapterError::RateLimited {
                provider: self.provider.to_owned(),
                retry_after_secs,
            });
        }
        if !status.is_success() {
            return Err(AdapterError::from_status(
                self.provider,
                model,
                status.as_u16(),
            ));
        }

        let text = response.text().await?;
        #[allow(clippy::cast_possible_truncation)]
        let latency_ms = started.elapsed().as_millis() as u64;

        let raw: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| AdapterError::Deserialize {
                context: format!("{} chat completion", self.provider),
                source: e,
            })?;

        let reply: ChatCompletionReply =
            serde_json::from_value(raw.clone()).map_err(|e| AdapterError::Deserialize {
                context: format!("{} chat completion envelope", self.provider),
                source: e,
            })?;

        let content = reply
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| AdapterError::MalformedReply {
                provider: self.provider.to_owned(),
                reason: "reply contains no choices with content".to_owned(),
            })?;

        if content.trim().is_empty() {
            // Some platforms signal a content filter by returning an empty
            // message body with a 200.
            return Err(AdapterError::ContentFiltered {
                provider: self.provider.to_owned(),
            });
        }

        Ok(ChatResponse {
            content,
            latency_ms,
            tokens_used: reply.usage.and_then(|u| u.total_tokens),
            raw,
        })
    }
}

/// Adapter for OpenAI-hosted chat models.
#[derive(Debug)]
pub struct OpenAiAdapter {
    inner: ChatHttpClient,
}

impl OpenAiAdapter {
    /// # Errors
    ///
    /// Returns [`AdapterError`] if the HTTP client cannot be built or the
    /// base URL is invalid.
    pub fn new(api_key: &str, base_url: &str, timeout_secs: u64) -> Result<Self, AdapterError> {
        Ok(Self {
            inner: ChatHttpClient::new("openai", api_key, base_url, timeout_secs)?,
        })
    }
}

#[async_trait]
impl AiAdapter for OpenAiAdapter {
    fn provider(&self) -> &str {
        "openai"
    }

    async fn send(&self, prompt: &str, model: &str) -> Result<ChatResponse, AdapterError> {
        self.inner.send(prompt, model).await
    }
}

/// Adapter for Zhipu GLM chat models (OpenAI-compatible endpoint).
#[derive(Debug)]
pub struct GlmAdapter {
    inner: ChatHttpClient,
}

impl GlmAdapter {
    /// # Errors
    ///
    /// Returns [`AdapterError`] if the HTTP client cannot be built or the
    /// base URL is invalid.
    pub fn new(api_key: &str, base_url: &str, timeout_secs: u64) -> Result<Self, AdapterError> {
        Ok(Self {
            inner: ChatHttpClient::new("glm", api_key, base_url, timeout_secs)?,
        })
    }
}

#[async_trait]
impl AiAdapter for GlmAdapter {
    fn provider(&self) -> &str {
        "glm"
    }

    async fn send(&self, prompt: &str, model: &str) -> Result<ChatResponse, AdapterError> {
        self.inner.send(prompt, model).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reply_json(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 30, "total_tokens": 42}
        })
    }

    #[tokio::test]
    async fn send_parses_successful_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply_json("Acme is great")))
            .mount(&server)
            .await;

        let adapter = OpenAiAdapter::new("test-key", &server.uri(), 5).expect("adapter");
        let response = adapter.send("tell me about Acme", "gpt-4o-mini").await;

        let response = response.expect("send should succeed");
        assert_eq!(response.content, "Acme is great");
        assert_eq!(response.tokens_used, Some(42));
        assert!(response.raw.get("choices").is_some());
    }

    #[tokio::test]
    async fn send_maps_401_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let adapter = OpenAiAdapter::new("bad-key", &server.uri(), 5).expect("adapter");
        let err = adapter.send("hi", "gpt-4o-mini").await.unwrap_err();
        assert!(matches!(err, AdapterError::Auth { .. }));
    }

    #[tokio::test]
    async fn send_maps_429_with_retry_after_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let adapter = GlmAdapter::new("k", &server.uri(), 5).expect("adapter");
        let err = adapter.send("hi", "glm-4-flash").await.unwrap_err();
        match err {
            AdapterError::RateLimited {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, Some(7)),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_flags_empty_content_as_filtered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply_json("  ")))
            .mount(&server)
            .await;

        let adapter = OpenAiAdapter::new("k", &server.uri(), 5).expect("adapter");
        let err = adapter.send("hi", "gpt-4o-mini").await.unwrap_err();
        assert!(matches!(err, AdapterError::ContentFiltered { .. }));
    }

    #[tokio::test]
    async fn send_flags_missing_choices_as_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": []
            })))
            .mount(&server)
            .await;

        let adapter = OpenAiAdapter::new("k", &server.uri(), 5).expect("adapter");
        let err = adapter.send("hi", "gpt-4o-mini").await.unwrap_err();
        assert!(matches!(err, AdapterError::MalformedReply { .. }));
    }

    #[tokio::test]
    async fn send_flags_invalid_json_as_deserialize() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let adapter = OpenAiAdapter::new("k", &server.uri(), 5).expect("adapter");
        let err = adapter.send("hi", "gpt-4o-mini").await.unwrap_err();
        assert!(matches!(err, AdapterError::Deserialize { .. }));
    }
}
