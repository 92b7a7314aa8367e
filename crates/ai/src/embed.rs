use std::num::NonZeroUsize;
use std::sync::Mutex;

use anyhow::anyhow;
use async_openai::{Client, config::OpenAIConfig, types::embeddings::CreateEmbeddingRequestArgs};
use async_trait::async_trait;
use lru::LruCache;
use mnema_shared::{APP_ENV, AppError};
use sha2::{Digest, Sha256};

/// Fixed embedding dimensionality across the whole system.
pub const EMBEDDING_DIM: usize = 1024;

/// How many embeddings to keep cached. Entries are keyed by a content
/// hash, so re-embedding the same text is free within the window.
const EMBED_CACHE_CAPACITY: usize = 2048;

/// Produces a fixed-dimensional vector for any text.
#[async_trait]
pub trait Embedder: Send + Sync {
  async fn embed(&self, input: &str) -> Result<Vec<f32>, AppError>;
}

/// OpenAI-compatible embedding client with a write-through LRU cache
/// keyed by the SHA-256 of the input text.
pub struct OpenAiEmbedder {
  cache: Mutex<LruCache<[u8; 32], Vec<f32>>>,
}

impl OpenAiEmbedder {
  #[must_use]
  pub fn new() -> Self {
    Self {
      cache: Mutex::new(LruCache::new(
        NonZeroUsize::new(EMBED_CACHE_CAPACITY).expect("cache capacity is non-zero"),
      )),
    }
  }

  fn content_hash(input: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hasher.finalize().into()
  }
}

impl Default for OpenAiEmbedder {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
  async fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
    let key = Self::content_hash(input);

    if let Some(hit) = self.cache.lock().expect("embed cache poisoned").get(&key) {
      tracing::trace!(len = input.len(), "embedding cache hit");
      return Ok(hit.clone());
    }

    let config = OpenAIConfig::new()
      .with_api_key(&APP_ENV.openai_api_key)
      .with_api_base(&APP_ENV.openai_base_url);

    let client = Client::with_config(config);

    let request = CreateEmbeddingRequestArgs::default()
      .model(&APP_ENV.openai_embedding_model)
      .input(input)
      .dimensions(EMBEDDING_DIM as u32)
      .build()?;

    let embedding = client
      .embeddings()
      .create(request)
      .await
      .map(|r| r.data.into_iter())?
      .map(|e| e.embedding)
      .next_back()
      .ok_or_else(|| anyhow!("empty embedding"))?;

    if embedding.len() != EMBEDDING_DIM {
      return Err(anyhow!(
        "embedding dimension mismatch: expected {EMBEDDING_DIM}, got {}",
        embedding.len()
      )
      .into());
    }

    self
      .cache
      .lock()
      .expect("embed cache poisoned")
      .put(key, embedding.clone());

    Ok(embedding)
  }
}
