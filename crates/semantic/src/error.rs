use std::time::Duration;
use thiserror::Error;

/// A single failed call to an external model provider.
///
/// Shared by every provider in the workspace (embeddings and adjudication)
/// so retry classification lives in one place.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("rate limited by provider")]
    RateLimited,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("provider returned a {actual}-dimensional vector, model declares {expected}")]
    Dimension { expected: usize, actual: usize },
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
}

impl ProviderError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Timeout(_)
            | ProviderError::RateLimited
            | ProviderError::Transport(_)
            | ProviderError::Malformed(_) => true,
            ProviderError::Http { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            ProviderError::Dimension { .. } | ProviderError::MissingCredentials(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// Failure of [`Embedder::embed`](crate::Embedder::embed).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmbedError {
    /// Retries exhausted, or the provider refused the request outright.
    #[error("embedding unavailable after {attempts} attempt(s): {last_error}")]
    Unavailable {
        attempts: u32,
        last_error: ProviderError,
    },
    /// The provider's vectors do not match the declared model dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbedError {
    pub fn is_configuration(&self) -> bool {
        match self {
            EmbedError::DimensionMismatch { .. } => true,
            // A rejected key will not start working on a later retry.
            EmbedError::Unavailable { last_error, .. } => matches!(
                last_error,
                ProviderError::MissingCredentials(_)
                    | ProviderError::Http {
                        status: 401 | 403,
                        ..
                    }
            ),
        }
    }
}

/// Failure of an [`EmbeddingStore`](crate::EmbeddingStore) operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("embedding store backend error: {0}")]
    Backend(String),
    #[error("embedding record codec error: {0}")]
    Codec(String),
}

impl StoreError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(ProviderError::RateLimited.is_retryable());
        assert!(ProviderError::Malformed("no data".into()).is_retryable());
        assert!(ProviderError::Http { status: 503, body: String::new() }.is_retryable());
        assert!(ProviderError::Http { status: 429, body: String::new() }.is_retryable());
        assert!(!ProviderError::Http { status: 401, body: String::new() }.is_retryable());
        assert!(!ProviderError::Dimension { expected: 3, actual: 2 }.is_retryable());
        assert!(!ProviderError::MissingCredentials("EMBEDDING_API_KEY".into()).is_retryable());
    }

    #[test]
    fn embed_error_display_includes_cause() {
        let err = EmbedError::Unavailable {
            attempts: 4,
            last_error: ProviderError::RateLimited,
        };
        let text = err.to_string();
        assert!(text.contains("4 attempt"));
        assert!(text.contains("rate limited"));
        assert!(!err.is_configuration());
        assert!(EmbedError::DimensionMismatch { expected: 768, actual: 384 }.is_configuration());
    }

    #[test]
    fn rejected_credentials_are_configuration() {
        for status in [401, 403] {
            let err = EmbedError::Unavailable {
                attempts: 1,
                last_error: ProviderError::Http { status, body: "invalid api key".into() },
            };
            assert!(err.is_configuration(), "status {status}");
        }
        let server_error = EmbedError::Unavailable {
            attempts: 3,
            last_error: ProviderError::Http { status: 500, body: String::new() },
        };
        assert!(!server_error.is_configuration());
    }
}
