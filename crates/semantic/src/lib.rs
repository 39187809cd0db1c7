//! Ticket embeddings
//!
//! Turns consolidated ticket text into dense vectors and keeps them around.
//! Vectors are cached by content fingerprint, so re-processing an unchanged
//! ticket never touches the provider again.
//!
//! Providers:
//!
//! - **API** - Gemini `embedContent`, OpenAI-compatible `/embeddings`,
//!   Hugging Face inference, or a custom `{"text"}` endpoint.
//! - **Stub** - Hashed bag-of-words vectors. Offline and deterministic, good
//!   for tests and local runs.
//!
//! [`Embedder`] wraps a provider with the cache, bounded retry with
//! exponential backoff, and single-flight so concurrent requests for the
//! same fingerprint share one provider call. A failed computation never
//! writes a cache entry.
//!
//! ## Quick example
//!
//! ```no_run
//! use semantic::{Embedder, InMemoryEmbeddingStore, RetryPolicy, StubEmbeddingProvider};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let embedder = Embedder::new(
//!         Arc::new(StubEmbeddingProvider::new(256)),
//!         Arc::new(InMemoryEmbeddingStore::new()),
//!         RetryPolicy::default(),
//!     );
//!     let outcome = embedder.embed("3f2a...", "Title: Crash on save", false).await.unwrap();
//!     assert_eq!(outcome.record.vector.len(), 256);
//! }
//! ```

pub mod config;
pub mod error;
pub mod resilience;
pub mod types;
pub mod serde_millis;

mod api;
mod embedder;
mod flight;
mod normalize;
mod provider;
mod store;
mod stub;

pub use api::{ApiEmbeddingConfig, ApiEmbeddingProvider, ApiProviderKind};
pub use config::{EmbeddingConfig, ProviderConfig, StoreConfig};
pub use embedder::Embedder;
pub use error::{EmbedError, ProviderError, StoreError};
pub use flight::SingleFlight;
pub use normalize::{is_finite_vector, l2_normalize_in_place};
pub use provider::EmbeddingProvider;
pub use resilience::{
    retry_async, RateLimitConfig, RateLimitStats, RetryOutcome, RetryPolicy, Retryable,
    TokenBucket,
};
#[cfg(feature = "store-redb")]
pub use store::RedbEmbeddingStore;
pub use store::{EmbeddingStore, InMemoryEmbeddingStore};
pub use stub::{StubEmbeddingProvider, STUB_MODEL_ID};
pub use types::{EmbedOutcome, EmbedderStats, EmbeddingRecord};
