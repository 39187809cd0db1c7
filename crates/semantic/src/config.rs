use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::api::{ApiEmbeddingConfig, ApiEmbeddingProvider};
use crate::error::{ProviderError, StoreError};
use crate::provider::EmbeddingProvider;
use crate::resilience::RetryPolicy;
use crate::store::{EmbeddingStore, InMemoryEmbeddingStore};
use crate::stub::StubEmbeddingProvider;

/// Which embedding model to call.
///
/// ```yaml
/// provider:
///   type: api
///   kind: gemini
///   endpoint: "https://generativelanguage.googleapis.com/v1beta"
///   model: text-embedding-004
///   dimension: 768
///   api_key: "${GEMINI_API_KEY}"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// Offline deterministic vectors.
    Stub { dimension: usize },
    Api(ApiEmbeddingConfig),
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Stub { dimension: 256 }
    }
}

impl ProviderConfig {
    pub fn dimension(&self) -> usize {
        match self {
            ProviderConfig::Stub { dimension } => *dimension,
            ProviderConfig::Api(api) => api.dimension,
        }
    }

    pub fn build(&self) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
        Ok(match self {
            ProviderConfig::Stub { dimension } => Arc::new(StubEmbeddingProvider::new(*dimension)),
            ProviderConfig::Api(api) => Arc::new(ApiEmbeddingProvider::new(api.clone())?),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    #[default]
    Memory,
    Redb { path: PathBuf },
}

impl StoreConfig {
    pub fn build(&self) -> Result<Arc<dyn EmbeddingStore>, StoreError> {
        match self {
            StoreConfig::Memory => Ok(Arc::new(InMemoryEmbeddingStore::new())),
            #[cfg(feature = "store-redb")]
            StoreConfig::Redb { path } => {
                Ok(Arc::new(crate::store::RedbEmbeddingStore::open(path)?))
            }
            #[cfg(not(feature = "store-redb"))]
            StoreConfig::Redb { .. } => Err(StoreError::Backend(
                "redb store requested but the `store-redb` feature is disabled".into(),
            )),
        }
    }
}

/// Everything needed to assemble an [`Embedder`](crate::Embedder).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: ProviderConfig,
    pub store: StoreConfig,
    pub retry: RetryPolicy,
    /// Drop cached vectors from other models when the embedder starts.
    pub purge_stale_on_start: bool,
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.provider.dimension() == 0 {
            return Err("embedding dimension must be > 0".into());
        }
        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts must be >= 1".into());
        }
        if let ProviderConfig::Api(api) = &self.provider {
            if api.endpoint.trim().is_empty() {
                return Err("embedding endpoint must not be empty".into());
            }
            if api.model.trim().is_empty() {
                return Err("embedding model must not be empty".into());
            }
            if api.rate_limit.requests_per_second <= 0.0 {
                return Err("rate_limit.requests_per_second must be > 0".into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiProviderKind;

    #[test]
    fn default_is_offline_stub() {
        let cfg = EmbeddingConfig::default();
        assert_eq!(cfg.provider, ProviderConfig::Stub { dimension: 256 });
        assert_eq!(cfg.store, StoreConfig::Memory);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.provider.build().unwrap().dimension(), 256);
    }

    #[test]
    fn deserializes_api_provider() {
        let json = serde_json::json!({
            "provider": {
                "type": "api",
                "kind": "gemini",
                "endpoint": "https://generativelanguage.googleapis.com/v1beta",
                "model": "text-embedding-004",
                "dimension": 768,
                "api_key": "k",
                "timeout": 5000
            },
            "store": { "backend": "redb", "path": "/tmp/emb.redb" },
            "retry": { "max_attempts": 5, "base_delay": 100 }
        });
        let cfg: EmbeddingConfig = serde_json::from_value(json).unwrap();
        match &cfg.provider {
            ProviderConfig::Api(api) => {
                assert_eq!(api.kind, ApiProviderKind::Gemini);
                assert_eq!(api.timeout.as_millis(), 5000);
                assert!(api.normalize);
            }
            other => panic!("unexpected provider {other:?}"),
        }
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.base_delay.as_millis(), 100);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_dimension() {
        let cfg = EmbeddingConfig {
            provider: ProviderConfig::Stub { dimension: 0 },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
