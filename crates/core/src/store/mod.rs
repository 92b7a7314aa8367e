//! Storage ports. The memory core talks to its backends exclusively
//! through these traits; concrete Postgres adapters live alongside,
//! and tests plug in deterministic in-memory fakes.

mod pg_dynamics;
mod pg_graph;
mod pg_vector;

pub use pg_dynamics::PgDynamicsStore;
pub use pg_graph::PgGraphStore;
pub use pg_vector::PgVectorStore;

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mnema_shared::AppError;
use serde_json::Value;
use uuid::Uuid;

use crate::dynamics::{AccessEvent, SupersessionRecord};
use crate::fsrs::FsrsState;
use crate::memory::{MemoryType, payload_keys};

/// Reserved-key payload attached to every stored memory.
pub type Payload = serde_json::Map<String, Value>;

/// Transient backend failures get exactly one retry at this layer;
/// anything past that is the caller's degradation policy.
pub(crate) async fn retry_once<T, Fut>(mut attempt: impl FnMut() -> Fut) -> Result<T, AppError>
where
  Fut: Future<Output = Result<T, AppError>>,
{
  match attempt().await {
    Ok(value) => Ok(value),
    Err(first) => {
      tracing::debug!(error = %first, "store call failed, retrying once");
      attempt().await
    }
  }
}

/// String-equality filter over reserved payload keys. `user_ids`
/// carries every identity linked to the current speaker; a row matches
/// when its `user_id` equals any of them.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
  pub user_ids: Vec<String>,
  pub memory_type: Option<MemoryType>,
  pub is_key: Option<bool>,
}

impl MemoryFilter {
  #[must_use]
  pub fn for_user(user_id: &str) -> Self {
    Self {
      user_ids: vec![user_id.to_owned()],
      ..Self::default()
    }
  }

  #[must_use]
  pub fn for_users(user_ids: &[String]) -> Self {
    Self {
      user_ids: user_ids.to_vec(),
      ..Self::default()
    }
  }

  #[must_use]
  pub fn with_memory_type(mut self, memory_type: MemoryType) -> Self {
    self.memory_type = Some(memory_type);
    self
  }

  #[must_use]
  pub fn with_is_key(mut self, is_key: bool) -> Self {
    self.is_key = Some(is_key);
    self
  }

  /// Reference semantics for payload matching, shared by every
  /// backend: string equality on the reserved keys.
  #[must_use]
  pub fn matches(&self, payload: &Payload) -> bool {
    let user_id = payload
      .get(payload_keys::USER_ID)
      .and_then(Value::as_str)
      .unwrap_or_default();
    if !self.user_ids.iter().any(|id| id == user_id) {
      return false;
    }

    if let Some(memory_type) = self.memory_type {
      let stored = payload
        .get(payload_keys::MEMORY_TYPE)
        .and_then(Value::as_str)
        .unwrap_or_default();
      if stored != memory_type.to_string() {
        return false;
      }
    }

    if let Some(is_key) = self.is_key {
      let stored = payload
        .get(payload_keys::IS_KEY)
        .and_then(Value::as_bool)
        .unwrap_or(false);
      if stored != is_key {
        return false;
      }
    }

    true
  }
}

/// One row of the vector store, payload included.
#[derive(Debug, Clone)]
pub struct StoredMemory {
  pub id: Uuid,
  pub payload: Payload,
  pub created_at: DateTime<Utc>,
}

impl StoredMemory {
  /// The memory text, from the reserved `data` key.
  #[must_use]
  pub fn content(&self) -> &str {
    self
      .payload
      .get(payload_keys::DATA)
      .and_then(Value::as_str)
      .unwrap_or_default()
  }

  #[must_use]
  pub fn user_id(&self) -> &str {
    self
      .payload
      .get(payload_keys::USER_ID)
      .and_then(Value::as_str)
      .unwrap_or_default()
  }

  #[must_use]
  pub fn is_key(&self) -> bool {
    self
      .payload
      .get(payload_keys::IS_KEY)
      .and_then(Value::as_bool)
      .unwrap_or(false)
  }
}

/// A search result with its similarity score (1 − cosine distance).
#[derive(Debug, Clone)]
pub struct SearchHit {
  pub memory: StoredMemory,
  pub score: f64,
}

/// Embedding store with payload-filtered cosine search.
#[async_trait]
pub trait VectorStore: Send + Sync {
  async fn search(
    &self,
    embedding: &[f32],
    filter: &MemoryFilter,
    limit: u64,
  ) -> Result<Vec<SearchHit>, AppError>;

  /// Insert or replace by id (idempotent).
  async fn insert(&self, id: Uuid, embedding: &[f32], payload: Payload) -> Result<(), AppError>;

  async fn delete(&self, id: Uuid) -> Result<(), AppError>;

  async fn get(&self, id: Uuid) -> Result<Option<StoredMemory>, AppError>;

  /// Filtered scan, newest first.
  async fn get_all(&self, filter: &MemoryFilter, limit: u64)
  -> Result<Vec<StoredMemory>, AppError>;
}

/// Typed entity nodes and directed labeled edges, user-scoped.
/// Relations are rendered as `"A → LABEL → B"` strings.
#[async_trait]
pub trait GraphStore: Send + Sync {
  /// Create any supporting schema/indexes. Idempotent.
  async fn ensure_schema(&self) -> Result<(), AppError>;

  /// Extract entities and relationships from free text and store them.
  async fn add_entity_data(&self, text: &str, user_id: &str) -> Result<(), AppError>;

  /// Case-insensitive name-substring match plus one-hop neighborhood
  /// expansion.
  async fn search_entities(
    &self,
    query: &str,
    user_ids: &[String],
    limit: u64,
  ) -> Result<Vec<String>, AppError>;

  async fn get_all_relationships(
    &self,
    user_ids: &[String],
    limit: u64,
  ) -> Result<Vec<String>, AppError>;
}

/// Persistence for spaced-repetition state and its append-only audit
/// trail.
#[async_trait]
pub trait DynamicsStore: Send + Sync {
  async fn get(&self, memory_id: Uuid, user_ids: &[String])
  -> Result<Option<FsrsState>, AppError>;

  async fn batch_get(
    &self,
    memory_ids: &[Uuid],
    user_ids: &[String],
  ) -> Result<HashMap<Uuid, FsrsState>, AppError>;

  /// Insert or replace the state row for `memory_id` (idempotent).
  async fn upsert(&self, memory_id: Uuid, user_id: &str, state: &FsrsState)
  -> Result<(), AppError>;

  /// Append to the access log. Rows are never mutated.
  async fn append_access(&self, event: &AccessEvent) -> Result<(), AppError>;

  /// Append a supersession record. Rows are never mutated.
  async fn record_supersession(&self, record: &SupersessionRecord) -> Result<(), AppError>;
}
