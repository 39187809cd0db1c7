//! YAML configuration for the `ticketdup` pipeline.
//!
//! Every section is optional and falls back to offline defaults (stub
//! embeddings, in-memory stores, word-overlap judge). Secrets are never
//! written into the file: use `${VAR}` and keep the value in the
//! environment or a `.env` file.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//!
//! source:
//!   root: "./export"
//!   key_prefix: "GM"
//!   attachments: "sidecar"
//!
//! normalizer:
//!   max_bytes: 30000
//!
//! embedding:
//!   provider:
//!     type: "api"
//!     kind: "gemini"
//!     endpoint: "https://generativelanguage.googleapis.com/v1beta"
//!     model: "text-embedding-004"
//!     dimension: 768
//!     api_key: "${GEMINI_API_KEY}"
//!   store:
//!     backend: "redb"
//!     path: "./data/embeddings.redb"
//!
//! index:
//!   backend: "redb"
//!   path: "./data/index.redb"
//!
//! adjudication:
//!   max_candidates: 10
//!   global_concurrency: 8
//!   call_timeout: 60000
//!
//! pipeline:
//!   top_k: 10
//!   adjudication_concurrency: 4
//!
//! logging:
//!   level: "info"
//!   json: false
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use adjudicate::{AdjudicationConfig, JudgeConfig};
use canonical::NormalizerConfig;
use index::{BackendConfig, CompressionCodec, CompressionConfig, IndexConfig};
use matcher::ProcessOptions;
use semantic::{ApiProviderKind, EmbeddingConfig, ProviderConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),

    #[error("missing required field: {0}")]
    MissingField(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration format version
    pub version: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub source: SourceYamlConfig,

    #[serde(default)]
    pub normalizer: NormalizerConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub index: IndexYamlConfig,

    #[serde(default)]
    pub adjudication: AdjudicationConfig,

    #[serde(default)]
    pub pipeline: PipelineYamlConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            source: SourceYamlConfig::default(),
            normalizer: NormalizerConfig::default(),
            embedding: EmbeddingConfig::default(),
            index: IndexYamlConfig::default(),
            adjudication: AdjudicationConfig::default(),
            pipeline: PipelineYamlConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string, expanding `${VAR}` references
    /// from the process environment first.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let expanded = expand_env(yaml, |name| std::env::var(name).ok())?;
        let config: AppConfig = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.normalizer
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("normalizer: {e}")))?;
        self.embedding
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("embedding: {e}")))?;
        self.adjudication
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("adjudication: {e}")))?;
        self.source.validate()?;
        self.index.validate()?;
        self.pipeline.validate()?;
        self.check_credentials()?;
        Ok(())
    }

    fn check_credentials(&self) -> Result<(), ConfigLoadError> {
        if let ProviderConfig::Api(api) = &self.embedding.provider {
            if api.kind != ApiProviderKind::Custom && is_blank(api.api_key.as_deref()) {
                return Err(ConfigLoadError::MissingField(
                    "embedding.provider.api_key".to_string(),
                ));
            }
        }
        if let JudgeConfig::Api(api) = &self.adjudication.judge {
            if is_blank(api.api_key.as_deref()) {
                return Err(ConfigLoadError::MissingField(
                    "adjudication.judge.api_key".to_string(),
                ));
            }
            if api.models.is_empty() {
                return Err(ConfigLoadError::Validation(
                    "adjudication.judge.models must list at least one model".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Index settings with the dimension taken from the embedding model.
    pub fn index_config(&self) -> IndexConfig {
        self.index.to_index_config(self.embedding.provider.dimension())
    }

    /// Request defaults for `process_ticket`.
    pub fn process_options(&self) -> ProcessOptions {
        ProcessOptions {
            top_k: self.pipeline.top_k,
            adjudication_concurrency: self.pipeline.adjudication_concurrency,
            force_reembed: false,
            filter: None,
            deadline: self.pipeline.deadline,
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Replace `${NAME}` and `${NAME:-default}` with values from `lookup`.
///
/// A reference without a default whose variable is unset is an error, so a
/// forgotten secret fails at load time instead of at the first API call.
pub fn expand_env<F>(input: &str, lookup: F) -> Result<String, ConfigLoadError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(ConfigLoadError::Validation(
                "unterminated `${` in configuration".to_string(),
            ));
        };
        let reference = &after[..end];
        let (name, default) = match reference.split_once(":-") {
            Some((name, default)) => (name.trim(), Some(default)),
            None => (reference.trim(), None),
        };
        if name.is_empty() {
            return Err(ConfigLoadError::Validation(
                "empty `${}` reference in configuration".to_string(),
            ));
        }
        match (lookup(name), default) {
            (Some(value), _) => out.push_str(&value),
            (None, Some(default)) => out.push_str(default),
            (None, None) => {
                return Err(ConfigLoadError::MissingField(format!(
                    "environment variable {name}"
                )))
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Where tickets come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceYamlConfig {
    /// Root of the tracker export.
    #[serde(default = "default_source_root")]
    pub root: PathBuf,

    /// Project prefix added to bare ticket numbers.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// `"sidecar"` reads `<attachment>.txt` files, `"none"` skips attachments.
    #[serde(default = "default_attachments")]
    pub attachments: String,
}

impl SourceYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid_attachments = ["sidecar", "none"];
        if !valid_attachments.contains(&self.attachments.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "source.attachments must be one of: {valid_attachments:?}"
            )));
        }
        if self.key_prefix.trim().is_empty() {
            return Err(ConfigLoadError::MissingField("source.key_prefix".to_string()));
        }
        Ok(())
    }
}

impl Default for SourceYamlConfig {
    fn default() -> Self {
        Self {
            root: default_source_root(),
            key_prefix: default_key_prefix(),
            attachments: default_attachments(),
        }
    }
}

/// Index YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexYamlConfig {
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default)]
    pub path: Option<String>,

    #[serde(default = "default_compression")]
    pub compression: String,

    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

impl IndexYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid_backends = ["in_memory", "redb"];
        if !valid_backends.contains(&self.backend.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "index.backend must be one of: {valid_backends:?}"
            )));
        }

        if self.backend == "redb" && self.path.is_none() {
            return Err(ConfigLoadError::MissingField("index.path".to_string()));
        }

        let valid_compression = ["zstd", "none"];
        if !valid_compression.contains(&self.compression.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "index.compression must be one of: {valid_compression:?}"
            )));
        }
        if !(1..=22).contains(&self.compression_level) {
            return Err(ConfigLoadError::Validation(
                "index.compression_level must be in 1..=22".to_string(),
            ));
        }

        Ok(())
    }

    pub fn to_index_config(&self, dimension: usize) -> IndexConfig {
        let backend = match (self.backend.as_str(), &self.path) {
            ("redb", Some(path)) => BackendConfig::redb(path.clone()),
            _ => BackendConfig::in_memory(),
        };
        let codec = match self.compression.as_str() {
            "none" => CompressionCodec::None,
            _ => CompressionCodec::Zstd,
        };
        IndexConfig::new(dimension)
            .with_backend(backend)
            .with_compression(CompressionConfig::new(codec, self.compression_level))
    }
}

impl Default for IndexYamlConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
            compression: default_compression(),
            compression_level: default_compression_level(),
        }
    }
}

/// Request defaults and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineYamlConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_adjudication_concurrency")]
    pub adjudication_concurrency: usize,

    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,

    /// Tickets indexed at once by the bulk `index` command.
    #[serde(default = "default_index_concurrency")]
    pub index_concurrency: usize,

    #[serde(default, with = "semantic::serde_millis::option")]
    pub deadline: Option<Duration>,
}

impl PipelineYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.max_top_k == 0 {
            return Err(ConfigLoadError::Validation(
                "pipeline.max_top_k must be >= 1".to_string(),
            ));
        }
        if self.top_k == 0 || self.top_k > self.max_top_k {
            return Err(ConfigLoadError::Validation(format!(
                "pipeline.top_k must be in 1..={}",
                self.max_top_k
            )));
        }
        if self.adjudication_concurrency == 0 || self.index_concurrency == 0 {
            return Err(ConfigLoadError::Validation(
                "pipeline concurrency limits must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineYamlConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            adjudication_concurrency: default_adjudication_concurrency(),
            max_top_k: default_max_top_k(),
            index_concurrency: default_index_concurrency(),
            deadline: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_source_root() -> PathBuf {
    PathBuf::from("./tickets")
}

fn default_key_prefix() -> String {
    "GM".to_string()
}

fn default_attachments() -> String {
    "sidecar".to_string()
}

fn default_backend() -> String {
    "in_memory".to_string()
}

fn default_compression() -> String {
    "zstd".to_string()
}

fn default_compression_level() -> i32 {
    3
}

fn default_top_k() -> usize {
    10
}

fn default_adjudication_concurrency() -> usize {
    4
}

fn default_max_top_k() -> usize {
    50
}

fn default_index_concurrency() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}
