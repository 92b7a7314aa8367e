//! Orchestration of the memory subsystem: context assembly for a
//! query, the post-reply add pipeline, session finalization, and
//! promotion of used memories.
//!
//! Failure policy: every external call is wrapped; a failing backend
//! degrades its own sub-result and nothing else. `fetch_context` and
//! `add` never raise.

use std::sync::Arc;

use chrono::Utc;
use chrono_humanize::HumanTime;
use mnema_ai::{ChatModel, Embedder};
use mnema_shared::AppError;
use uuid::Uuid;

use crate::contradiction::ContradictionDetector;
use crate::dynamics::MemoryDynamics;
use crate::extract::{FactExtractor, TopicExtractor};
use crate::fsrs::{Grade, SignalType};
use crate::ingest::SmartIngest;
use crate::memory::{MemoryContext, MemoryRecord, MemoryType};
use crate::recurrence::TopicRecurrence;
use crate::scorer::{CompositeScorer, RankCandidate};
use crate::store::{DynamicsStore, GraphStore, MemoryFilter, SearchHit, VectorStore};
use crate::emotional::EmotionalContext;

const KEY_SCAN_LIMIT: u64 = 20;
const VECTOR_SEARCH_LIMIT: u64 = 20;
const GRAPH_LIMIT: u64 = 10;
const EMOTIONAL_LIMIT: u64 = 3;
const TOPIC_LIMIT: usize = 3;

/// How many ranked memories survive, and how many of those lead the
/// "relevant" section; the rest merge into the key section.
const RANKED_LIMIT: usize = 10;
const RELEVANT_LIMIT: usize = 5;

/// The capability bundle the service is built from. Backends are
/// passed in, never constructed here.
pub struct MemoryProviders {
  pub embedder: Arc<dyn Embedder>,
  pub chat: Arc<dyn ChatModel>,
  pub vector_store: Arc<dyn VectorStore>,
  pub graph_store: Arc<dyn GraphStore>,
  pub dynamics_store: Arc<dyn DynamicsStore>,
}

pub struct MemoryService {
  embedder: Arc<dyn Embedder>,
  vector_store: Arc<dyn VectorStore>,
  graph_store: Arc<dyn GraphStore>,
  dynamics: Arc<MemoryDynamics>,
  ingest: SmartIngest,
  emotional: EmotionalContext,
  recurrence: TopicRecurrence,
  facts: FactExtractor,
  topics: TopicExtractor,
  scorer: CompositeScorer,
}

impl MemoryService {
  /// `use_llm_contradiction` gates the semantic contradiction layer;
  /// the cheap lexical layers always run.
  #[must_use]
  pub fn new(providers: MemoryProviders, use_llm_contradiction: bool) -> Self {
    let MemoryProviders {
      embedder,
      chat,
      vector_store,
      graph_store,
      dynamics_store,
    } = providers;

    let dynamics = Arc::new(MemoryDynamics::new(dynamics_store));
    let detector = Arc::new(ContradictionDetector::with_llm(chat.clone()));

    Self {
      ingest: SmartIngest::new(
        embedder.clone(),
        vector_store.clone(),
        dynamics.clone(),
        detector,
        use_llm_contradiction,
      ),
      emotional: EmotionalContext::new(embedder.clone(), vector_store.clone()),
      recurrence: TopicRecurrence::new(embedder.clone(), vector_store.clone()),
      facts: FactExtractor::new(chat.clone()),
      topics: TopicExtractor::new(chat),
      scorer: CompositeScorer::default(),
      embedder,
      vector_store,
      graph_store,
      dynamics,
    }
  }

  /// Assemble the context for one query across all linked identities.
  /// Subqueries run concurrently and degrade independently; the result
  /// is always a (possibly empty) context.
  pub async fn fetch_context(&self, query: &str, user_ids: &[String]) -> MemoryContext {
    let now = Utc::now();
    let primary = user_ids.first().map(String::as_str).unwrap_or_default();

    let (key_memories, semantic_hits, graph_relations, emotional_context, recurring_topics) = tokio::join!(
      self.key_memories(user_ids),
      self.semantic_hits(query, user_ids),
      self.graph_relations(query, user_ids),
      self.emotional.retrieve(user_ids, EMOTIONAL_LIMIT),
      self.recurring_topics(primary),
    );

    // Enrich vector hits with spaced-repetition state and rank.
    let ids: Vec<Uuid> = semantic_hits.iter().map(|hit| hit.memory.id).collect();
    let states = self.dynamics.batch_get(&ids, user_ids).await;

    let candidates: Vec<RankCandidate> = semantic_hits
      .into_iter()
      .filter_map(|hit| {
        let state = states.get(&hit.memory.id)?.clone();
        Some(RankCandidate {
          id: hit.memory.id,
          content: hit.memory.content().to_owned(),
          created_at: hit.memory.created_at,
          vector_score: hit.score,
          state,
        })
      })
      .collect();

    let mut ranked = self.scorer.rank(candidates, now);
    ranked.truncate(RANKED_LIMIT);

    let mut key_memories = key_memories;
    let mut relevant_memories = Vec::new();
    for scored in ranked {
      if relevant_memories.len() < RELEVANT_LIMIT {
        relevant_memories.push(scored.record);
      } else if !key_memories.iter().any(|key| key.id == scored.record.id) {
        // Overflow beyond the relevant window folds into the key
        // section rather than being dropped.
        key_memories.push(scored.record);
      }
    }

    MemoryContext {
      key_memories,
      relevant_memories,
      graph_relations,
      emotional_context,
      recurring_topics,
    }
  }

  async fn key_memories(&self, user_ids: &[String]) -> Vec<MemoryRecord> {
    let filter = MemoryFilter::for_users(user_ids).with_is_key(true);
    match self.vector_store.get_all(&filter, KEY_SCAN_LIMIT).await {
      Ok(memories) => memories
        .into_iter()
        .map(|memory| MemoryRecord {
          id: memory.id,
          content: memory.content().to_owned(),
          created_at: memory.created_at,
          is_key: true,
        })
        .collect(),
      Err(err) => {
        tracing::warn!(error = %err, "key memory scan failed");
        Vec::new()
      }
    }
  }

  async fn semantic_hits(&self, query: &str, user_ids: &[String]) -> Vec<SearchHit> {
    let embedding = match self.embedder.embed(query).await {
      Ok(embedding) => embedding,
      Err(err) => {
        tracing::warn!(error = %err, "query embedding failed");
        return Vec::new();
      }
    };

    let filter = MemoryFilter::for_users(user_ids).with_memory_type(MemoryType::Fact);
    match self
      .vector_store
      .search(&embedding, &filter, VECTOR_SEARCH_LIMIT)
      .await
    {
      Ok(hits) => hits,
      Err(err) => {
        tracing::warn!(error = %err, "semantic search failed");
        Vec::new()
      }
    }
  }

  async fn graph_relations(&self, query: &str, user_ids: &[String]) -> Vec<String> {
    match self
      .graph_store
      .search_entities(query, user_ids, GRAPH_LIMIT)
      .await
    {
      Ok(relations) => relations,
      Err(err) => {
        tracing::warn!(error = %err, "graph entity search failed");
        Vec::new()
      }
    }
  }

  async fn recurring_topics(&self, user_id: &str) -> Vec<String> {
    if user_id.is_empty() {
      return Vec::new();
    }
    self.recurrence.recurring(user_id, TOPIC_LIMIT).await
  }

  /// Render the context as prompt-ready markdown sections, one per
  /// non-empty field, in fixed order.
  #[must_use]
  pub fn build_prompt_sections(context: &MemoryContext) -> Vec<String> {
    let now = Utc::now();
    let mut sections = Vec::new();

    let memory_bullets = |memories: &[MemoryRecord]| {
      memories
        .iter()
        .map(|memory| {
          let recency = HumanTime::from(now.signed_duration_since(memory.created_at));
          format!("- {} ({recency})", memory.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
    };
    let plain_bullets = |lines: &[String]| {
      lines
        .iter()
        .map(|line| format!("- {line}"))
        .collect::<Vec<_>>()
        .join("\n")
    };

    if !context.key_memories.is_empty() {
      sections.push(format!(
        "## Key memories\n{}",
        memory_bullets(&context.key_memories)
      ));
    }
    if !context.relevant_memories.is_empty() {
      sections.push(format!(
        "## Relevant memories\n{}",
        memory_bullets(&context.relevant_memories)
      ));
    }
    if !context.graph_relations.is_empty() {
      sections.push(format!(
        "## Known relationships\n{}",
        plain_bullets(&context.graph_relations)
      ));
    }
    if !context.emotional_context.is_empty() {
      sections.push(format!(
        "## Emotional context\n{}",
        plain_bullets(&context.emotional_context)
      ));
    }
    if !context.recurring_topics.is_empty() {
      sections.push(format!(
        "## Recurring topics\n{}",
        plain_bullets(&context.recurring_topics)
      ));
    }

    sections
  }

  /// Post-reply pipeline: extract facts and ingest them one at a time
  /// (sequencing prevents near-duplicates in the same batch from
  /// superseding each other), then topics, sentiment, and graph
  /// enrichment. Never raises.
  pub async fn add(&self, user_msg: &str, assistant_msg: &str, user_id: &str, channel_id: &str) {
    let facts = self.facts.extract(user_msg, assistant_msg).await;
    tracing::debug!(user_id, count = facts.len(), "extracted facts");

    for fact in &facts {
      match self.ingest.ingest(fact, user_id).await {
        Ok(result) => {
          tracing::debug!(user_id, fact = %fact, reason = result.reason(), "fact ingested");
        }
        Err(err) => {
          tracing::warn!(user_id, fact = %fact, error = %err, "fact ingestion failed");
        }
      }
    }

    let conversation = format!("user: {user_msg}\nassistant: {assistant_msg}");
    for mention in self.topics.extract(&conversation).await {
      if let Err(err) = self.recurrence.store_mention(&mention, user_id, None).await {
        tracing::warn!(user_id, topic = %mention.topic, error = %err, "topic mention store failed");
      }
    }

    self.emotional.track_message(user_id, channel_id, user_msg);

    if let Err(err) = self.graph_store.add_entity_data(user_msg, user_id).await {
      tracing::debug!(user_id, error = %err, "graph enrichment failed");
    }
  }

  /// Close the (user, channel) session and persist its emotional arc.
  pub async fn finalize_session(
    &self,
    user_id: &str,
    channel_id: &str,
    topic: Option<&str>,
  ) -> Result<(), AppError> {
    self.emotional.finalize_session(user_id, channel_id, topic).await
  }

  /// Grade every memory referenced in a produced reply as a successful
  /// recall.
  pub async fn promote_used(&self, memory_ids: &[Uuid], user_ids: &[String]) {
    for memory_id in memory_ids {
      self
        .dynamics
        .promote(*memory_id, user_ids, Grade::Good, SignalType::UsedInResponse)
        .await;
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use chrono::Utc;
  use serde_json::json;

  use super::*;
  use crate::memory::payload_keys;
  use crate::store::Payload;
  use crate::testing::{
    FailingGraphStore, FailingVectorStore, FakeDynamicsStore, FakeEmbedder, FakeGraphStore,
    FakeVectorStore, ScriptedChat,
  };

  struct Fixture {
    service: MemoryService,
    vector_store: Arc<FakeVectorStore>,
    graph_store: Arc<FakeGraphStore>,
    dynamics_store: Arc<FakeDynamicsStore>,
    embedder: Arc<FakeEmbedder>,
  }

  fn fixture(chat_script: Vec<String>) -> Fixture {
    let embedder = Arc::new(FakeEmbedder::new());
    let vector_store = Arc::new(FakeVectorStore::new());
    let graph_store = Arc::new(FakeGraphStore::new());
    let dynamics_store = Arc::new(FakeDynamicsStore::new());

    let service = MemoryService::new(
      MemoryProviders {
        embedder: embedder.clone(),
        chat: Arc::new(ScriptedChat::new(chat_script)),
        vector_store: vector_store.clone(),
        graph_store: graph_store.clone(),
        dynamics_store: dynamics_store.clone(),
      },
      false,
    );

    Fixture {
      service,
      vector_store,
      graph_store,
      dynamics_store,
      embedder,
    }
  }

  async fn seed_fact(
    f: &Fixture,
    content: &str,
    user_id: &str,
    is_key: bool,
    age_minutes: i64,
  ) -> uuid::Uuid {
    let id = uuid::Uuid::now_v7();
    let embedding = f.embedder.embed(content).await.unwrap();
    let created_at = Utc::now() - chrono::Duration::minutes(age_minutes);
    let mut payload = Payload::new();
    payload.insert(payload_keys::DATA.to_owned(), json!(content));
    payload.insert(payload_keys::USER_ID.to_owned(), json!(user_id));
    payload.insert(payload_keys::MEMORY_TYPE.to_owned(), json!("fact"));
    payload.insert(payload_keys::CREATED_AT.to_owned(), json!(created_at.to_rfc3339()));
    if is_key {
      payload.insert(payload_keys::IS_KEY.to_owned(), json!(true));
    }
    f.vector_store.insert(id, &embedding, payload).await.unwrap();
    id
  }

  fn users() -> Vec<String> {
    vec!["ada".to_owned()]
  }

  #[tokio::test]
  async fn context_assembles_all_sections_in_order() {
    let f = fixture(Vec::new());

    // Preset first so the query shares an embedding axis with exactly
    // one fact; everything embedded later is orthogonal to both.
    let (query_vec, fact_vec) = crate::testing::unit_pair(0.8);
    f.embedder.preset("what do you know about me?", query_vec);
    f.embedder.preset("User works on a Rust memory service", fact_vec);

    seed_fact(&f, "User is allergic to peanuts", "ada", true, 60).await;
    seed_fact(&f, "User's pronouns are they/them", "ada", true, 55).await;
    for (i, content) in [
      "User works on a Rust memory service",
      "User prefers tea over coffee",
      "User lives in Lyon",
      "User has a cat called Miso",
      "User runs on Sunday mornings",
    ]
    .iter()
    .enumerate()
    {
      seed_fact(&f, content, "ada", false, 50 - (i as i64) * 5).await;
    }
    f.graph_store.seed_relation("ada", "User → WORKS_ON → Rust service");

    let context = f
      .service
      .fetch_context("what do you know about me?", &users())
      .await;

    assert_eq!(context.key_memories.len(), 2);
    assert!(context.relevant_memories.len() <= 5);
    assert!(!context.relevant_memories.is_empty());
    assert_eq!(context.graph_relations.len(), 1);

    let sections = MemoryService::build_prompt_sections(&context);
    let headers: Vec<&str> = sections
      .iter()
      .map(|section| section.lines().next().unwrap())
      .collect();
    assert_eq!(
      headers,
      vec!["## Key memories", "## Relevant memories", "## Known relationships"]
    );
  }

  #[test]
  fn empty_sections_are_omitted() {
    let context = MemoryContext {
      recurring_topics: vec!["rust: mentioned 2 times (emotional weight: light)".to_owned()],
      ..MemoryContext::default()
    };
    let sections = MemoryService::build_prompt_sections(&context);
    assert_eq!(sections.len(), 1);
    assert!(sections[0].starts_with("## Recurring topics\n- rust"));
  }

  #[tokio::test]
  async fn failing_backends_degrade_to_an_empty_context() {
    let embedder = Arc::new(FakeEmbedder::new());
    let service = MemoryService::new(
      MemoryProviders {
        embedder,
        chat: Arc::new(ScriptedChat::new(Vec::new())),
        vector_store: Arc::new(FailingVectorStore),
        graph_store: Arc::new(FailingGraphStore),
        dynamics_store: Arc::new(FakeDynamicsStore::new()),
      },
      false,
    );

    let context = service.fetch_context("anything", &users()).await;
    assert!(context.is_empty());
  }

  #[tokio::test]
  async fn add_runs_the_full_pipeline() {
    let f = fixture(vec![
      r#"{"facts": ["User adopted a cat named Miso"]}"#.to_owned(),
      r#"{"topics": [{"topic": "Miso", "topic_type": "entity", "context_snippet": "adopted a cat", "emotional_weight": "light"}]}"#
        .to_owned(),
    ]);

    f.service
      .add(
        "I adopted a cat named Miso, I love her so much!",
        "That's wonderful, congratulations!",
        "ada",
        "dm",
      )
      .await;

    // One fact plus one topic mention in the vector store.
    assert_eq!(f.vector_store.len(), 2);
    // The user message was tracked: two more entries complete an arc.
    f.service.emotional.track_message("ada", "dm", "still so happy about her");
    f.service.emotional.track_message("ada", "dm", "what a great day");
    assert!(f.service.emotional.compute_arc("ada", "dm").is_some());
    // Graph enrichment saw the raw user message.
    assert_eq!(f.graph_store.ingested_texts().len(), 1);
  }

  #[tokio::test]
  async fn add_survives_an_exhausted_llm() {
    let f = fixture(Vec::new());
    f.service.add("hello there", "hi!", "ada", "dm").await;
    assert_eq!(f.vector_store.len(), 0);
  }

  #[tokio::test]
  async fn promote_used_grades_memories_as_good() {
    let f = fixture(Vec::new());
    let id = seed_fact(&f, "User prefers tea over coffee", "ada", false, 5).await;

    f.service.promote_used(&[id], &users()).await;

    assert_eq!(f.dynamics_store.access_count(id), 1);
    let events = f.dynamics_store.events();
    assert_eq!(events[0].grade, crate::fsrs::Grade::Good);
    assert_eq!(events[0].signal_type, crate::fsrs::SignalType::UsedInResponse);
  }

  #[tokio::test]
  async fn finalize_session_persists_the_arc() {
    let f = fixture(Vec::new());
    for message in [
      "I love this project, it is amazing",
      "today was great, really happy",
      "feeling good and excited about tomorrow",
    ] {
      f.service.emotional.track_message("ada", "dm", message);
    }

    f.service.finalize_session("ada", "dm", None).await.unwrap();
    assert_eq!(f.vector_store.len(), 1);

    let context = f.service.fetch_context("how have I been?", &users()).await;
    assert_eq!(context.emotional_context.len(), 1);
  }
}
