use async_trait::async_trait;
use semantic::{ProviderError, RateLimitConfig, TokenBucket};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::prompt::{JudgeRequest, SYSTEM_INSTRUCTION};
use crate::provider::JudgeProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgeApiKind {
    /// `POST {endpoint}` chat completions (`choices[0].message.content`).
    OpenAi,
    /// `POST {endpoint}/models/{model}:generateContent`.
    Gemini,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiJudgeConfig {
    pub kind: JudgeApiKind,
    pub endpoint: String,
    /// Tried in order; a model the endpoint rejects falls through to the next.
    pub models: Vec<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_timeout", with = "semantic::serde_millis")]
    pub timeout: Duration,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

fn default_max_output_tokens() -> u32 {
    512
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

impl ApiJudgeConfig {
    pub fn gemini(api_key: impl Into<String>) -> Self {
        Self {
            kind: JudgeApiKind::Gemini,
            endpoint: "https://generativelanguage.googleapis.com/v1beta".into(),
            models: vec![
                "gemini-2.5-pro".into(),
                "gemini-2.5-flash".into(),
                "gemini-2.0-flash".into(),
            ],
            api_key: Some(api_key.into()),
            temperature: 0.0,
            max_output_tokens: default_max_output_tokens(),
            timeout: default_timeout(),
            rate_limit: RateLimitConfig::default(),
        }
    }

    fn request_url(&self, model: &str) -> String {
        match self.kind {
            JudgeApiKind::OpenAi => self.endpoint.clone(),
            JudgeApiKind::Gemini => format!(
                "{}/models/{model}:generateContent",
                self.endpoint.trim_end_matches('/')
            ),
        }
    }

    fn payload(&self, model: &str, prompt: &str) -> Value {
        match self.kind {
            JudgeApiKind::OpenAi => json!({
                "model": model,
                "messages": [
                    { "role": "system", "content": SYSTEM_INSTRUCTION },
                    { "role": "user", "content": prompt },
                ],
                "temperature": self.temperature,
                "max_tokens": self.max_output_tokens,
                "response_format": { "type": "json_object" },
            }),
            JudgeApiKind::Gemini => json!({
                "systemInstruction": { "parts": [{ "text": SYSTEM_INSTRUCTION }] },
                "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
                "generationConfig": {
                    "temperature": self.temperature,
                    "maxOutputTokens": self.max_output_tokens,
                    "responseMimeType": "application/json",
                },
            }),
        }
    }
}

/// Hosted-model judge with model fallback.
pub struct ApiJudgeProvider {
    cfg: ApiJudgeConfig,
    name: String,
    client: reqwest::Client,
    limiter: TokenBucket,
}

impl ApiJudgeProvider {
    pub fn new(cfg: ApiJudgeConfig) -> Result<Self, ProviderError> {
        if cfg.api_key.is_none() {
            return Err(ProviderError::MissingCredentials(
                "judge provider requires an api_key".into(),
            ));
        }
        if cfg.models.is_empty() {
            return Err(ProviderError::MissingCredentials(
                "judge provider has no models configured".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {e}")))?;
        let name = format!("{:?}:{}", cfg.kind, cfg.models.join("|")).to_lowercase();
        let limiter = TokenBucket::new(cfg.rate_limit);
        Ok(Self {
            cfg,
            name,
            client,
            limiter,
        })
    }

    async fn call_model(&self, model: &str, prompt: &str) -> Result<String, ProviderError> {
        // Checked in `new`.
        let key = self.cfg.api_key.as_deref().unwrap_or_default();
        let request = self
            .client
            .post(self.cfg.request_url(model))
            .json(&self.cfg.payload(model, prompt));
        let request = match self.cfg.kind {
            JudgeApiKind::Gemini => request.header("x-goog-api-key", key),
            JudgeApiKind::OpenAi => request.bearer_auth(key),
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.cfg.timeout)
            } else {
                ProviderError::from(e)
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }

        let value = response.json::<Value>().await.map_err(ProviderError::from)?;
        extract_text(self.cfg.kind, &value)
    }
}

/// Pull the model's answer text out of a completion response.
fn extract_text(kind: JudgeApiKind, value: &Value) -> Result<String, ProviderError> {
    let text = match kind {
        JudgeApiKind::OpenAi => value
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string),
        JudgeApiKind::Gemini => value
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            }),
    };
    match text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ProviderError::Malformed(
            "completion response carried no text".into(),
        )),
    }
}

#[async_trait]
impl JudgeProvider for ApiJudgeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn judge(&self, request: &JudgeRequest) -> Result<String, ProviderError> {
        self.limiter.acquire().await?;

        let mut last_error = None;
        for model in &self.cfg.models {
            debug!(model = %model, candidate = %request.candidate_ticket_id, "requesting verdict");
            match self.call_model(model, &request.prompt).await {
                Ok(text) => return Ok(text),
                // Transient failures go back to the caller's retry loop.
                Err(err) if err.is_retryable() => return Err(err),
                Err(err) => {
                    warn!(model = %model, error = %err, "judge model rejected request, trying next");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            ProviderError::MissingCredentials("judge provider has no models configured".into())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_defaults_follow_fallback_order() {
        let cfg = ApiJudgeConfig::gemini("k");
        assert_eq!(cfg.models[0], "gemini-2.5-pro");
        assert_eq!(cfg.models.len(), 3);
        assert_eq!(
            cfg.request_url("gemini-2.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn payloads_request_json_output() {
        let cfg = ApiJudgeConfig::gemini("k");
        let body = cfg.payload("gemini-2.5-pro", "PROMPT");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "PROMPT");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");

        let cfg = ApiJudgeConfig {
            kind: JudgeApiKind::OpenAi,
            endpoint: "https://api.openai.com/v1/chat/completions".into(),
            ..cfg
        };
        let body = cfg.payload("gpt-4o-mini", "PROMPT");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][1]["content"], "PROMPT");
    }

    #[test]
    fn extracts_completion_text() {
        let gemini = json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"is_duplicate\":" }, { "text": " true}" }] } }]
        });
        assert_eq!(
            extract_text(JudgeApiKind::Gemini, &gemini).unwrap(),
            "{\"is_duplicate\": true}"
        );

        let openai = json!({ "choices": [{ "message": { "content": "{}" } }] });
        assert_eq!(extract_text(JudgeApiKind::OpenAi, &openai).unwrap(), "{}");

        let blocked = json!({ "candidates": [] });
        assert!(matches!(
            extract_text(JudgeApiKind::Gemini, &blocked),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn requires_credentials_and_models() {
        let mut cfg = ApiJudgeConfig::gemini("k");
        cfg.api_key = None;
        assert!(ApiJudgeProvider::new(cfg).is_err());

        let mut cfg = ApiJudgeConfig::gemini("k");
        cfg.models.clear();
        assert!(ApiJudgeProvider::new(cfg).is_err());

        let provider = ApiJudgeProvider::new(ApiJudgeConfig::gemini("k")).unwrap();
        assert!(provider.name().starts_with("gemini:"));
    }
}
