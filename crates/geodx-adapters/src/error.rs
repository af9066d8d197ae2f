use thiserror::Error;

/// Error taxonomy for adapter calls.
///
/// The retry policy keys off the variant, never off message text.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("authentication failed for {provider}")]
    Auth { provider: String },

    #[error("rate limited by {provider} (retry after {retry_after_secs:?}s)")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    #[error("quota exhausted for {provider}")]
    QuotaExceeded { provider: String },

    #[error("model not found: {model}")]
    ModelNotFound { model: String },

    #[error("content filtered by {provider}")]
    ContentFiltered { provider: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed reply from {provider}: {reason}")]
    MalformedReply { provider: String, reason: String },

    #[error("unexpected HTTP status {status} from {provider}")]
    UnexpectedStatus { provider: String, status: u16 },

    #[error("adapter call timed out after {secs}s")]
    Timeout { secs: u64 },
}

impl AdapterError {
    /// Map an HTTP status to the taxonomy. Callers handle 2xx before this.
    #[must_use]
    pub(crate) fn from_status(provider: &str, model: &str, status: u16) -> Self {
        match status {
            401 | 403 => AdapterError::Auth {
                provider: provider.to_owned(),
            },
            402 => AdapterError::QuotaExceeded {
                provider: provider.to_owned(),
            },
            404 => AdapterError::ModelNotFound {
                model: model.to_owned(),
            },
            429 => AdapterError::RateLimited {
                provider: provider.to_owned(),
                retry_after_secs: None,
            },
            _ => AdapterError::UnexpectedStatus {
                provider: provider.to_owned(),
                status,
            },
        }
    }
}
