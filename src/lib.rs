//! Workspace umbrella crate for `ticketdup`.
//!
//! Loads an [`AppConfig`], builds every collaborator it describes and wires
//! them into a [`matcher::DuplicateDetector`]. The `ticketdup` binary is a
//! thin CLI over [`build_detector`].

pub mod config;

use std::sync::Arc;

use adjudicate::Adjudicator;
use index::{IndexError, VectorIndex};
use ingest::{AttachmentExtractor, JsonDirTicketSource, NoopExtractor, SidecarTextExtractor};
use matcher::{DetectorConfig, DuplicateDetector, PipelineError};
use semantic::{Embedder, ProviderError, StoreError};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub use crate::config::{AppConfig, ConfigLoadError, LoggingConfig};

/// Failure to assemble a detector from configuration.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("embedding store: {0}")]
    Store(#[from] StoreError),
    #[error("provider: {0}")]
    Provider(#[from] ProviderError),
    #[error("index: {0}")]
    Index(#[from] IndexError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Install the global `tracing` subscriber on stderr.
///
/// `RUST_LOG` wins over `logging.level`. Calling this twice is a no-op.
pub fn init_tracing(cfg: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if cfg.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Build every collaborator described by `cfg` and wire the detector.
pub fn build_detector(cfg: &AppConfig) -> Result<DuplicateDetector, BuildError> {
    let provider = cfg.embedding.provider.build()?;
    let store = cfg.embedding.store.build()?;
    let embedder = Embedder::new(provider, store, cfg.embedding.retry.clone());
    if cfg.embedding.purge_stale_on_start {
        let purged = embedder.purge_other_models()?;
        info!(purged, model_id = embedder.model_id(), "purged embeddings from other models");
    }

    let index = VectorIndex::open(cfg.index_config())?;

    let judge = cfg.adjudication.judge.build()?;
    let adjudicator = Adjudicator::new(judge, cfg.adjudication.clone());

    let extractor: Arc<dyn AttachmentExtractor> = match cfg.source.attachments.as_str() {
        "none" => Arc::new(NoopExtractor),
        _ => Arc::new(SidecarTextExtractor::new()),
    };

    let detector = DuplicateDetector::new(
        Arc::new(JsonDirTicketSource::new(cfg.source.root.clone())),
        extractor,
        Arc::new(embedder),
        Arc::new(index),
        Arc::new(adjudicator),
        DetectorConfig {
            normalizer: cfg.normalizer.clone(),
            max_top_k: cfg.pipeline.max_top_k,
        },
    )?;
    Ok(detector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_offline_detector() {
        let detector = build_detector(&AppConfig::default()).unwrap();
        let stats = detector.stats();
        assert_eq!(stats.dimension, 256);
        assert_eq!(stats.indexed_tickets, 0);
        assert_eq!(stats.judge, "overlap");
    }

    #[test]
    fn reopened_index_with_other_dimension_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.redb");
        let yaml = |dim: usize| {
            format!(
                "version: \"1.0\"\nembedding:\n  provider:\n    type: stub\n    dimension: {dim}\nindex:\n  backend: redb\n  path: \"{}\"\n",
                path.display()
            )
        };

        let first = AppConfig::from_yaml(&yaml(32)).unwrap();
        drop(build_detector(&first).unwrap());

        let second = AppConfig::from_yaml(&yaml(64)).unwrap();
        let err = build_detector(&second).err().unwrap();
        assert!(matches!(
            err,
            BuildError::Index(IndexError::DimensionMismatch { .. })
        ));
    }
}
