use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::error::ProviderError;
use crate::normalize::{is_finite_vector, l2_normalize_in_place};
use crate::provider::EmbeddingProvider;
use crate::resilience::{RateLimitConfig, TokenBucket};

/// Wire format spoken by the remote embedding endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiProviderKind {
    /// `POST {endpoint}` with `{"input", "model"}`, bearer auth.
    OpenAi,
    /// `POST .../models/{model}:embedContent`, `x-goog-api-key` auth.
    Gemini,
    /// Hugging Face inference: `{"inputs"}`, bearer auth.
    #[serde(alias = "hf")]
    HuggingFace,
    /// `{"text"}` in, `{"embedding"}` or `{"embeddings"}` out.
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEmbeddingConfig {
    pub kind: ApiProviderKind,
    pub endpoint: String,
    pub model: String,
    pub dimension: usize,
    /// Secret; never serialized back out.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Gemini `taskType`, e.g. `RETRIEVAL_DOCUMENT`.
    #[serde(default)]
    pub task_type: Option<String>,
    #[serde(default = "default_true")]
    pub normalize: bool,
    #[serde(default = "default_timeout", with = "crate::serde_millis")]
    pub timeout: Duration,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl ApiEmbeddingConfig {
    /// Gemini `text-embedding-004` (768 dimensions).
    pub fn gemini(api_key: impl Into<String>) -> Self {
        Self {
            kind: ApiProviderKind::Gemini,
            endpoint: "https://generativelanguage.googleapis.com/v1beta".into(),
            model: "text-embedding-004".into(),
            dimension: 768,
            api_key: Some(api_key.into()),
            task_type: Some("RETRIEVAL_DOCUMENT".into()),
            normalize: true,
            timeout: default_timeout(),
            rate_limit: RateLimitConfig::default(),
        }
    }

    pub fn openai(api_key: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            kind: ApiProviderKind::OpenAi,
            endpoint: "https://api.openai.com/v1/embeddings".into(),
            model: model.into(),
            dimension,
            api_key: Some(api_key.into()),
            task_type: None,
            normalize: true,
            timeout: default_timeout(),
            rate_limit: RateLimitConfig::default(),
        }
    }

    fn request_url(&self) -> String {
        match self.kind {
            ApiProviderKind::Gemini => {
                let base = self.endpoint.trim_end_matches('/');
                if base.ends_with(":embedContent") {
                    base.to_string()
                } else {
                    format!("{base}/models/{}:embedContent", self.model)
                }
            }
            _ => self.endpoint.clone(),
        }
    }

    fn payload(&self, text: &str) -> Value {
        match self.kind {
            ApiProviderKind::OpenAi => json!({ "input": text, "model": self.model }),
            ApiProviderKind::Gemini => {
                let mut body = json!({
                    "model": format!("models/{}", self.model),
                    "content": { "parts": [{ "text": text }] },
                });
                if let Some(task_type) = &self.task_type {
                    body["taskType"] = json!(task_type);
                }
                body
            }
            ApiProviderKind::HuggingFace => json!({ "inputs": text }),
            ApiProviderKind::Custom => json!({ "text": text }),
        }
    }
}

/// HTTP embedding provider. Owns its client and rate limiter.
pub struct ApiEmbeddingProvider {
    cfg: ApiEmbeddingConfig,
    model_id: String,
    client: reqwest::Client,
    limiter: TokenBucket,
}

impl std::fmt::Debug for ApiEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiEmbeddingProvider")
            .field("kind", &self.cfg.kind)
            .field("model_id", &self.model_id)
            .field("dimension", &self.cfg.dimension)
            .finish()
    }
}

impl ApiEmbeddingProvider {
    pub fn new(cfg: ApiEmbeddingConfig) -> Result<Self, ProviderError> {
        if cfg.api_key.is_none() && cfg.kind != ApiProviderKind::Custom {
            return Err(ProviderError::MissingCredentials(format!(
                "{:?} embedding provider requires an api_key",
                cfg.kind
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(16)
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {e}")))?;

        let kind = match cfg.kind {
            ApiProviderKind::OpenAi => "openai",
            ApiProviderKind::Gemini => "gemini",
            ApiProviderKind::HuggingFace => "hf",
            ApiProviderKind::Custom => "custom",
        };
        let model_id = format!("{kind}:{}", cfg.model);
        let limiter = TokenBucket::new(cfg.rate_limit);

        Ok(Self {
            cfg,
            model_id,
            client,
            limiter,
        })
    }

    pub fn config(&self) -> &ApiEmbeddingConfig {
        &self.cfg
    }

    async fn send(&self, payload: Value) -> Result<Value, ProviderError> {
        let mut request = self
            .client
            .post(self.cfg.request_url())
            .header("Content-Type", "application/json");

        if let Some(key) = self.cfg.api_key.as_deref() {
            request = match self.cfg.kind {
                ApiProviderKind::Gemini => request.header("x-goog-api-key", key),
                _ => request.bearer_auth(key),
            };
        }

        let response = request.json(&payload).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.cfg.timeout)
            } else {
                ProviderError::from(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited);
            }
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: truncate_body(body),
            });
        }

        response.json::<Value>().await.map_err(ProviderError::from)
    }
}

#[async_trait]
impl EmbeddingProvider for ApiEmbeddingProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.cfg.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.limiter.acquire().await?;

        debug!(model = %self.model_id, bytes = text.len(), "requesting embedding");
        let response = self.send(self.cfg.payload(text)).await?;

        let mut vectors = parse_embeddings_from_value(response)?;
        if vectors.len() != 1 {
            return Err(ProviderError::Malformed(format!(
                "expected one embedding, got {}",
                vectors.len()
            )));
        }
        let mut vector = vectors.remove(0);

        if vector.len() != self.cfg.dimension {
            return Err(ProviderError::Dimension {
                expected: self.cfg.dimension,
                actual: vector.len(),
            });
        }
        if !is_finite_vector(&vector) {
            return Err(ProviderError::Malformed("non-finite embedding value".into()));
        }
        if self.cfg.normalize {
            l2_normalize_in_place(&mut vector);
        }
        Ok(vector)
    }
}

fn truncate_body(mut body: String) -> String {
    const MAX: usize = 512;
    if body.len() > MAX {
        let mut cut = MAX;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

/// Accepts the response shapes of all supported providers:
/// `{"embedding": {"values": [..]}}` (Gemini), `{"data": [{"embedding": [..]}]}`
/// (OpenAI), `{"embedding": [..]}` / `{"embeddings": [[..]]}` (custom) and a
/// bare array or array of arrays (Hugging Face).
pub(crate) fn parse_embeddings_from_value(value: Value) -> Result<Vec<Vec<f32>>, ProviderError> {
    match value {
        Value::Object(mut map) => {
            if let Some(embeddings) = map.remove("embeddings") {
                return parse_embedding_collection(embeddings);
            }

            if let Some(embedding) = map.remove("embedding") {
                return match embedding {
                    Value::Object(mut inner) => match inner.remove("values") {
                        Some(values) => parse_embedding_vector(values).map(|v| vec![v]),
                        None => Err(ProviderError::Malformed(
                            "missing `values` in embedding object".into(),
                        )),
                    },
                    other => parse_embedding_collection(other),
                };
            }

            if let Some(Value::Array(items)) = map.remove("data") {
                return items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(mut obj) => obj
                            .remove("embedding")
                            .ok_or_else(|| {
                                ProviderError::Malformed(
                                    "missing `embedding` field in data item".into(),
                                )
                            })
                            .and_then(parse_embedding_vector),
                        _ => Err(ProviderError::Malformed(
                            "unexpected entry inside `data` array".into(),
                        )),
                    })
                    .collect();
            }

            Err(ProviderError::Malformed(
                "unsupported embedding response shape".into(),
            ))
        }
        other => parse_embedding_collection(other),
    }
}

fn parse_embedding_collection(value: Value) -> Result<Vec<Vec<f32>>, ProviderError> {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                Ok(Vec::new())
            } else if items.iter().all(|item| matches!(item, Value::Array(_))) {
                items.into_iter().map(parse_embedding_vector).collect()
            } else {
                parse_embedding_vector(Value::Array(items)).map(|vec| vec![vec])
            }
        }
        other => parse_embedding_vector(other).map(|vec| vec![vec]),
    }
}

fn parse_embedding_vector(value: Value) -> Result<Vec<f32>, ProviderError> {
    match value {
        Value::Array(values) => values
            .into_iter()
            .map(|entry| match entry {
                Value::Number(num) => num
                    .as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| ProviderError::Malformed("non-finite embedding value".into())),
                other => Err(ProviderError::Malformed(format!(
                    "embedding entries must be numbers, got {other}"
                ))),
            })
            .collect(),
        other => Err(ProviderError::Malformed(format!(
            "embedding vector must be an array, got {other}"
        ))),
    }
}
