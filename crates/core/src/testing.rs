//! Deterministic in-memory fakes shared by the crate's test modules.
//! No network, no database, no clock tricks beyond explicit aging.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mnema_ai::{ChatMessage, ChatModel, Embedder, cosine_similarity};
use mnema_shared::AppError;
use serde_json::Value;
use uuid::Uuid;

use crate::dynamics::{AccessEvent, SupersessionRecord};
use crate::fsrs::FsrsState;
use crate::memory::payload_keys;
use crate::store::{
  DynamicsStore, GraphStore, MemoryFilter, Payload, SearchHit, StoredMemory, VectorStore,
};

pub(crate) const TEST_DIM: usize = 64;

/// A pair of unit vectors on the first two axes with the given cosine
/// similarity, for presetting mid-range search scores.
pub(crate) fn unit_pair(similarity: f32) -> (Vec<f32>, Vec<f32>) {
  let mut a = vec![0.0; TEST_DIM];
  a[0] = 1.0;
  let mut b = vec![0.0; TEST_DIM];
  b[0] = similarity;
  b[1] = (1.0 - similarity * similarity).sqrt();
  (a, b)
}

/// Assigns every distinct text its own axis (so identical text embeds
/// identically and distinct texts are orthogonal), with axes 0 and 1
/// reserved for `preset` / `unit_pair` vectors.
pub(crate) struct FakeEmbedder {
  inner: Mutex<EmbedderInner>,
}

struct EmbedderInner {
  assigned: HashMap<String, Vec<f32>>,
  next_axis: usize,
}

impl FakeEmbedder {
  pub(crate) fn new() -> Self {
    Self {
      inner: Mutex::new(EmbedderInner {
        assigned: HashMap::new(),
        next_axis: 2,
      }),
    }
  }

  pub(crate) fn preset(&self, text: &str, mut vector: Vec<f32>) {
    vector.resize(TEST_DIM, 0.0);
    self
      .inner
      .lock()
      .expect("embedder lock poisoned")
      .assigned
      .insert(text.to_owned(), vector);
  }
}

#[async_trait]
impl Embedder for FakeEmbedder {
  async fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
    let mut inner = self.inner.lock().expect("embedder lock poisoned");
    if let Some(vector) = inner.assigned.get(input) {
      return Ok(vector.clone());
    }
    let axis = inner.next_axis % TEST_DIM;
    inner.next_axis += 1;
    let mut vector = vec![0.0; TEST_DIM];
    vector[axis] = 1.0;
    inner.assigned.insert(input.to_owned(), vector.clone());
    Ok(vector)
  }
}

/// Replays a fixed list of completions, then errors.
pub(crate) struct ScriptedChat {
  replies: Mutex<VecDeque<String>>,
}

impl ScriptedChat {
  pub(crate) fn new(replies: Vec<String>) -> Self {
    Self {
      replies: Mutex::new(replies.into()),
    }
  }
}

#[async_trait]
impl ChatModel for ScriptedChat {
  async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, AppError> {
    self
      .replies
      .lock()
      .expect("script lock poisoned")
      .pop_front()
      .ok_or_else(|| anyhow!("chat script exhausted").into())
  }
}

struct StoredRow {
  embedding: Vec<f32>,
  payload: Payload,
  created_at: DateTime<Utc>,
}

impl StoredRow {
  fn to_memory(&self, id: Uuid) -> StoredMemory {
    StoredMemory {
      id,
      payload: self.payload.clone(),
      created_at: self.created_at,
    }
  }
}

pub(crate) struct FakeVectorStore {
  rows: Mutex<HashMap<Uuid, StoredRow>>,
}

impl FakeVectorStore {
  pub(crate) fn new() -> Self {
    Self {
      rows: Mutex::new(HashMap::new()),
    }
  }

  pub(crate) fn len(&self) -> usize {
    self.rows.lock().expect("store lock poisoned").len()
  }

  pub(crate) fn contains(&self, id: Uuid) -> bool {
    self.rows.lock().expect("store lock poisoned").contains_key(&id)
  }

  /// Shift the newest row's creation time into the past.
  pub(crate) fn age_newest(&self, by: Duration) {
    let mut rows = self.rows.lock().expect("store lock poisoned");
    if let Some(row) = rows.values_mut().max_by_key(|row| row.created_at) {
      row.created_at -= by;
    }
  }
}

#[async_trait]
impl VectorStore for FakeVectorStore {
  async fn search(
    &self,
    embedding: &[f32],
    filter: &MemoryFilter,
    limit: u64,
  ) -> Result<Vec<SearchHit>, AppError> {
    let rows = self.rows.lock().expect("store lock poisoned");
    let mut hits: Vec<SearchHit> = rows
      .iter()
      .filter(|(_, row)| filter.matches(&row.payload))
      .map(|(id, row)| SearchHit {
        score: f64::from(cosine_similarity(embedding, &row.embedding)),
        memory: row.to_memory(*id),
      })
      .collect();
    hits.sort_by(|a, b| {
      b.score
        .partial_cmp(&a.score)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
    });
    hits.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    Ok(hits)
  }

  async fn insert(&self, id: Uuid, embedding: &[f32], payload: Payload) -> Result<(), AppError> {
    let created_at = payload
      .get(payload_keys::CREATED_AT)
      .and_then(Value::as_str)
      .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
      .map(|parsed| parsed.with_timezone(&Utc))
      .unwrap_or_else(Utc::now);

    self.rows.lock().expect("store lock poisoned").insert(
      id,
      StoredRow {
        embedding: embedding.to_vec(),
        payload,
        created_at,
      },
    );
    Ok(())
  }

  async fn delete(&self, id: Uuid) -> Result<(), AppError> {
    self.rows.lock().expect("store lock poisoned").remove(&id);
    Ok(())
  }

  async fn get(&self, id: Uuid) -> Result<Option<StoredMemory>, AppError> {
    Ok(
      self
        .rows
        .lock()
        .expect("store lock poisoned")
        .get(&id)
        .map(|row| row.to_memory(id)),
    )
  }

  async fn get_all(
    &self,
    filter: &MemoryFilter,
    limit: u64,
  ) -> Result<Vec<StoredMemory>, AppError> {
    let rows = self.rows.lock().expect("store lock poisoned");
    let mut memories: Vec<StoredMemory> = rows
      .iter()
      .filter(|(_, row)| filter.matches(&row.payload))
      .map(|(id, row)| row.to_memory(*id))
      .collect();
    memories.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    memories.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    Ok(memories)
  }
}

pub(crate) struct FailingVectorStore;

#[async_trait]
impl VectorStore for FailingVectorStore {
  async fn search(
    &self,
    _embedding: &[f32],
    _filter: &MemoryFilter,
    _limit: u64,
  ) -> Result<Vec<SearchHit>, AppError> {
    Err(anyhow!("vector store unavailable").into())
  }

  async fn insert(&self, _id: Uuid, _embedding: &[f32], _payload: Payload) -> Result<(), AppError> {
    Err(anyhow!("vector store unavailable").into())
  }

  async fn delete(&self, _id: Uuid) -> Result<(), AppError> {
    Err(anyhow!("vector store unavailable").into())
  }

  async fn get(&self, _id: Uuid) -> Result<Option<StoredMemory>, AppError> {
    Err(anyhow!("vector store unavailable").into())
  }

  async fn get_all(
    &self,
    _filter: &MemoryFilter,
    _limit: u64,
  ) -> Result<Vec<StoredMemory>, AppError> {
    Err(anyhow!("vector store unavailable").into())
  }
}

pub(crate) struct FakeGraphStore {
  relations: Mutex<Vec<(String, String)>>,
  ingested: Mutex<Vec<String>>,
}

impl FakeGraphStore {
  pub(crate) fn new() -> Self {
    Self {
      relations: Mutex::new(Vec::new()),
      ingested: Mutex::new(Vec::new()),
    }
  }

  pub(crate) fn seed_relation(&self, user_id: &str, relation: &str) {
    self
      .relations
      .lock()
      .expect("graph lock poisoned")
      .push((user_id.to_owned(), relation.to_owned()));
  }

  pub(crate) fn ingested_texts(&self) -> Vec<String> {
    self.ingested.lock().expect("graph lock poisoned").clone()
  }
}

#[async_trait]
impl GraphStore for FakeGraphStore {
  async fn ensure_schema(&self) -> Result<(), AppError> {
    Ok(())
  }

  async fn add_entity_data(&self, text: &str, _user_id: &str) -> Result<(), AppError> {
    self
      .ingested
      .lock()
      .expect("graph lock poisoned")
      .push(text.to_owned());
    Ok(())
  }

  async fn search_entities(
    &self,
    _query: &str,
    user_ids: &[String],
    limit: u64,
  ) -> Result<Vec<String>, AppError> {
    self.get_all_relationships(user_ids, limit).await
  }

  async fn get_all_relationships(
    &self,
    user_ids: &[String],
    limit: u64,
  ) -> Result<Vec<String>, AppError> {
    let relations = self.relations.lock().expect("graph lock poisoned");
    Ok(
      relations
        .iter()
        .filter(|(user, _)| user_ids.contains(user))
        .map(|(_, relation)| relation.clone())
        .take(usize::try_from(limit).unwrap_or(usize::MAX))
        .collect(),
    )
  }
}

pub(crate) struct FailingGraphStore;

#[async_trait]
impl GraphStore for FailingGraphStore {
  async fn ensure_schema(&self) -> Result<(), AppError> {
    Err(anyhow!("graph store unavailable").into())
  }

  async fn add_entity_data(&self, _text: &str, _user_id: &str) -> Result<(), AppError> {
    Err(anyhow!("graph store unavailable").into())
  }

  async fn search_entities(
    &self,
    _query: &str,
    _user_ids: &[String],
    _limit: u64,
  ) -> Result<Vec<String>, AppError> {
    Err(anyhow!("graph store unavailable").into())
  }

  async fn get_all_relationships(
    &self,
    _user_ids: &[String],
    _limit: u64,
  ) -> Result<Vec<String>, AppError> {
    Err(anyhow!("graph store unavailable").into())
  }
}

pub(crate) struct FakeDynamicsStore {
  states: Mutex<HashMap<Uuid, (String, FsrsState)>>,
  events: Mutex<Vec<AccessEvent>>,
  supersessions: Mutex<Vec<SupersessionRecord>>,
}

impl FakeDynamicsStore {
  pub(crate) fn new() -> Self {
    Self {
      states: Mutex::new(HashMap::new()),
      events: Mutex::new(Vec::new()),
      supersessions: Mutex::new(Vec::new()),
    }
  }

  pub(crate) fn access_count(&self, memory_id: Uuid) -> i64 {
    self
      .states
      .lock()
      .expect("dynamics lock poisoned")
      .get(&memory_id)
      .map_or(0, |(_, state)| state.access_count)
  }

  pub(crate) fn events(&self) -> Vec<AccessEvent> {
    self.events.lock().expect("dynamics lock poisoned").clone()
  }

  pub(crate) fn supersessions(&self) -> Vec<SupersessionRecord> {
    self
      .supersessions
      .lock()
      .expect("dynamics lock poisoned")
      .clone()
  }
}

#[async_trait]
impl DynamicsStore for FakeDynamicsStore {
  async fn get(
    &self,
    memory_id: Uuid,
    user_ids: &[String],
  ) -> Result<Option<FsrsState>, AppError> {
    Ok(
      self
        .states
        .lock()
        .expect("dynamics lock poisoned")
        .get(&memory_id)
        .filter(|(user, _)| user_ids.contains(user))
        .map(|(_, state)| state.clone()),
    )
  }

  async fn batch_get(
    &self,
    memory_ids: &[Uuid],
    user_ids: &[String],
  ) -> Result<HashMap<Uuid, FsrsState>, AppError> {
    let states = self.states.lock().expect("dynamics lock poisoned");
    Ok(
      memory_ids
        .iter()
        .filter_map(|id| {
          states
            .get(id)
            .filter(|(user, _)| user_ids.contains(user))
            .map(|(_, state)| (*id, state.clone()))
        })
        .collect(),
    )
  }

  async fn upsert(
    &self,
    memory_id: Uuid,
    user_id: &str,
    state: &FsrsState,
  ) -> Result<(), AppError> {
    self
      .states
      .lock()
      .expect("dynamics lock poisoned")
      .insert(memory_id, (user_id.to_owned(), state.clone()));
    Ok(())
  }

  async fn append_access(&self, event: &AccessEvent) -> Result<(), AppError> {
    self
      .events
      .lock()
      .expect("dynamics lock poisoned")
      .push(event.clone());
    Ok(())
  }

  async fn record_supersession(&self, record: &SupersessionRecord) -> Result<(), AppError> {
    self
      .supersessions
      .lock()
      .expect("dynamics lock poisoned")
      .push(record.clone());
    Ok(())
  }
}

pub(crate) struct FailingDynamicsStore;

#[async_trait]
impl DynamicsStore for FailingDynamicsStore {
  async fn get(
    &self,
    _memory_id: Uuid,
    _user_ids: &[String],
  ) -> Result<Option<FsrsState>, AppError> {
    Err(anyhow!("dynamics store unavailable").into())
  }

  async fn batch_get(
    &self,
    _memory_ids: &[Uuid],
    _user_ids: &[String],
  ) -> Result<HashMap<Uuid, FsrsState>, AppError> {
    Err(anyhow!("dynamics store unavailable").into())
  }

  async fn upsert(
    &self,
    _memory_id: Uuid,
    _user_id: &str,
    _state: &FsrsState,
  ) -> Result<(), AppError> {
    Err(anyhow!("dynamics store unavailable").into())
  }

  async fn append_access(&self, _event: &AccessEvent) -> Result<(), AppError> {
    Err(anyhow!("dynamics store unavailable").into())
  }

  async fn record_supersession(&self, _record: &SupersessionRecord) -> Result<(), AppError> {
    Err(anyhow!("dynamics store unavailable").into())
  }
}
