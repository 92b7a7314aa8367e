//! Ingestion state machine for extracted facts: near-duplicates are
//! skipped, close paraphrases reinforce the existing memory,
//! contradicted memories are superseded, and everything else becomes a
//! new memory.

use std::sync::Arc;

use chrono::Utc;
use mnema_ai::Embedder;
use mnema_shared::AppError;
use serde_json::json;
use uuid::Uuid;

use crate::contradiction::{ContradictionDetector, ContradictionVerdict, jaccard};
use crate::dynamics::{MemoryDynamics, SupersessionRecord};
use crate::fsrs::{FsrsState, Grade, SignalType};
use crate::memory::{MemoryCategory, MemoryType, SupersessionReason, payload_keys};
use crate::store::{MemoryFilter, Payload, SearchHit, VectorStore};

/// Above this vector score a hit is a duplicate outright.
const DUPLICATE_SCORE: f64 = 0.95;
/// Above this lexical similarity a hit is a duplicate outright.
const DUPLICATE_JACCARD: f64 = 0.90;
/// Above this score the best hit is close enough to reinforce, and any
/// contradiction verdict supersedes it unconditionally.
const RELATED_SCORE: f64 = 0.75;
/// Between this and `RELATED_SCORE` a contradiction supersedes only
/// when its confidence clears `CANDIDATE_CONFIDENCE`. The asymmetry
/// against the upper band is intentional and load-bearing.
const CANDIDATE_SCORE: f64 = 0.60;
const CANDIDATE_CONFIDENCE: f64 = 0.70;

const SEARCH_LIMIT: u64 = 5;

/// Outcome of one ingest call, with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestResult {
  Created { id: Uuid, reason: String },
  Skipped { reason: String },
  Reinforced { id: Uuid, reason: String },
  Superseded { new_id: Uuid, old_id: Uuid, reason: String },
}

impl IngestResult {
  #[must_use]
  pub fn reason(&self) -> &str {
    match self {
      Self::Created { reason, .. }
      | Self::Skipped { reason }
      | Self::Reinforced { reason, .. }
      | Self::Superseded { reason, .. } => reason,
    }
  }
}

pub struct SmartIngest {
  embedder: Arc<dyn Embedder>,
  vector_store: Arc<dyn VectorStore>,
  dynamics: Arc<MemoryDynamics>,
  detector: Arc<ContradictionDetector>,
  use_llm: bool,
}

impl SmartIngest {
  #[must_use]
  pub fn new(
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    dynamics: Arc<MemoryDynamics>,
    detector: Arc<ContradictionDetector>,
    use_llm: bool,
  ) -> Self {
    Self {
      embedder,
      vector_store,
      dynamics,
      detector,
      use_llm,
    }
  }

  /// Ingest one fact for `user_id`.
  ///
  /// Errors only on embedding failure; an unreachable vector store
  /// degrades the search to "no similar memories" so the fact is still
  /// captured.
  pub async fn ingest(&self, fact: &str, user_id: &str) -> Result<IngestResult, AppError> {
    let embedding = self.embedder.embed(fact).await?;

    let filter = MemoryFilter::for_user(user_id).with_memory_type(MemoryType::Fact);
    let hits = match self
      .vector_store
      .search(&embedding, &filter, SEARCH_LIMIT)
      .await
    {
      Ok(hits) => hits,
      Err(err) => {
        tracing::warn!(user_id, error = %err, "similarity search failed, ingesting as new");
        Vec::new()
      }
    };

    let Some(best) = hits.first() else {
      return self
        .create(fact, &embedding, user_id, "no similar memories")
        .await;
    };

    let text_similarity = jaccard(fact, best.memory.content());
    if best.score > DUPLICATE_SCORE || text_similarity > DUPLICATE_JACCARD {
      return Ok(IngestResult::Skipped {
        reason: format!(
          "near-duplicate of {} (vector {:.2}, jaccard {:.2})",
          best.memory.id, best.score, text_similarity
        ),
      });
    }

    if best.score > RELATED_SCORE {
      let verdict = self
        .detector
        .detect(fact, best.memory.content(), self.use_llm)
        .await;
      if verdict.contradicts {
        return self.supersede(fact, &embedding, user_id, best, &verdict).await;
      }

      self
        .dynamics
        .promote(
          best.memory.id,
          &[user_id.to_owned()],
          Grade::Good,
          SignalType::ImplicitReference,
        )
        .await;
      return Ok(IngestResult::Reinforced {
        id: best.memory.id,
        reason: format!("restates {} (vector {:.2})", best.memory.id, best.score),
      });
    }

    if best.score > CANDIDATE_SCORE {
      let verdict = self
        .detector
        .detect(fact, best.memory.content(), self.use_llm)
        .await;
      if verdict.contradicts && verdict.confidence > CANDIDATE_CONFIDENCE {
        return self.supersede(fact, &embedding, user_id, best, &verdict).await;
      }
      return self
        .create(fact, &embedding, user_id, "related but distinct")
        .await;
    }

    self.create(fact, &embedding, user_id, "no close match").await
  }

  async fn create(
    &self,
    fact: &str,
    embedding: &[f32],
    user_id: &str,
    why: &str,
  ) -> Result<IngestResult, AppError> {
    let id = Uuid::now_v7();
    let now = Utc::now();
    let category = classify_category(fact);

    let mut payload = Payload::new();
    payload.insert(payload_keys::DATA.to_owned(), json!(fact));
    payload.insert(payload_keys::USER_ID.to_owned(), json!(user_id));
    payload.insert(
      payload_keys::MEMORY_TYPE.to_owned(),
      json!(MemoryType::Fact.to_string()),
    );
    payload.insert(payload_keys::CREATED_AT.to_owned(), json!(now.to_rfc3339()));
    if let Some(category) = category {
      payload.insert(payload_keys::CATEGORY.to_owned(), json!(category.to_string()));
    }

    self.vector_store.insert(id, embedding, payload).await?;

    let mut state = FsrsState::new(now);
    state.category = category;
    self.dynamics.initialize(id, user_id, &state).await;

    Ok(IngestResult::Created {
      id,
      reason: why.to_owned(),
    })
  }

  /// Create the replacement, demote the old memory, and append the
  /// supersession record. The old memory is never deleted.
  async fn supersede(
    &self,
    fact: &str,
    embedding: &[f32],
    user_id: &str,
    old: &SearchHit,
    verdict: &ContradictionVerdict,
  ) -> Result<IngestResult, AppError> {
    let created = self
      .create(fact, embedding, user_id, "supersedes a contradicted memory")
      .await?;
    let IngestResult::Created { id: new_id, .. } = created else {
      unreachable!("create always returns Created");
    };

    self.dynamics.demote(old.memory.id, &[user_id.to_owned()]).await;

    self
      .dynamics
      .record_supersession(SupersessionRecord {
        old_memory_id: old.memory.id,
        new_memory_id: new_id,
        user_id: user_id.to_owned(),
        reason: SupersessionReason::Contradiction,
        confidence: verdict.confidence,
        details: Some(verdict.explanation.clone()),
      })
      .await;

    tracing::info!(
      old_memory_id = %old.memory.id,
      new_memory_id = %new_id,
      kind = %verdict.kind,
      confidence = verdict.confidence,
      "superseded contradicted memory"
    );

    Ok(IngestResult::Superseded {
      new_id,
      old_id: old.memory.id,
      reason: verdict.explanation.clone(),
    })
  }
}

/// Closed keyword sets for the category classifier. The category with
/// the most hits wins; ties resolve to the earlier set.
const CATEGORY_KEYWORDS: &[(MemoryCategory, &[&str])] = &[
  (
    MemoryCategory::Preferences,
    &["like", "likes", "love", "loves", "favorite", "prefer", "prefers", "enjoy", "enjoys", "hate", "hates", "dislike"],
  ),
  (
    MemoryCategory::Personal,
    &["name", "family", "wife", "husband", "partner", "kids", "children", "born", "live", "lives", "home", "age", "sister", "brother", "mother", "father"],
  ),
  (
    MemoryCategory::Professional,
    &["work", "works", "job", "career", "company", "office", "boss", "colleague", "project", "team", "manager", "client"],
  ),
  (
    MemoryCategory::Goals,
    &["want", "wants", "goal", "goals", "plan", "plans", "planning", "hope", "hopes", "dream", "dreams", "aspire", "aim"],
  ),
  (
    MemoryCategory::Emotional,
    &["feel", "feels", "felt", "happy", "sad", "anxious", "excited", "stressed", "worried", "afraid", "proud", "lonely"],
  ),
  (
    MemoryCategory::Temporal,
    &["today", "tomorrow", "yesterday", "week", "month", "year", "schedule", "appointment", "deadline", "soon", "monday", "weekend"],
  ),
];

/// Classify a fact into the closed category set by keyword count.
#[must_use]
pub fn classify_category(fact: &str) -> Option<MemoryCategory> {
  let tokens: std::collections::HashSet<String> = fact
    .to_lowercase()
    .split(|c: char| !c.is_alphanumeric())
    .filter(|token| !token.is_empty())
    .map(ToOwned::to_owned)
    .collect();

  let mut best: Option<(MemoryCategory, usize)> = None;
  for (category, keywords) in CATEGORY_KEYWORDS {
    let count = keywords.iter().filter(|k| tokens.contains(**k)).count();
    if count > 0 && best.is_none_or(|(_, best_count)| count > best_count) {
      best = Some((*category, count));
    }
  }
  best.map(|(category, _)| category)
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::testing::{FakeDynamicsStore, FakeEmbedder, FakeVectorStore, unit_pair};

  struct Fixture {
    ingest: SmartIngest,
    embedder: Arc<FakeEmbedder>,
    vector_store: Arc<FakeVectorStore>,
    dynamics_store: Arc<FakeDynamicsStore>,
  }

  fn fixture() -> Fixture {
    let embedder = Arc::new(FakeEmbedder::new());
    let vector_store = Arc::new(FakeVectorStore::new());
    let dynamics_store = Arc::new(FakeDynamicsStore::new());
    let dynamics = Arc::new(MemoryDynamics::new(dynamics_store.clone()));
    let ingest = SmartIngest::new(
      embedder.clone(),
      vector_store.clone(),
      dynamics,
      Arc::new(ContradictionDetector::new()),
      false,
    );
    Fixture {
      ingest,
      embedder,
      vector_store,
      dynamics_store,
    }
  }

  #[tokio::test]
  async fn empty_store_always_creates() {
    let f = fixture();
    let result = f.ingest.ingest("I love strawberries", "ada").await.unwrap();
    assert!(matches!(result, IngestResult::Created { .. }));
    assert_eq!(f.vector_store.len(), 1);
  }

  #[tokio::test]
  async fn reingesting_the_same_fact_skips() {
    let f = fixture();
    let first = f.ingest.ingest("I love strawberries", "ada").await.unwrap();
    let IngestResult::Created { id, .. } = first else {
      panic!("expected Created, got {first:?}");
    };

    let second = f.ingest.ingest("I love strawberries", "ada").await.unwrap();
    assert!(matches!(second, IngestResult::Skipped { .. }));
    assert_eq!(f.vector_store.len(), 1);
    // A skip never touches the spaced-repetition state.
    assert_eq!(f.dynamics_store.access_count(id), 0);
  }

  #[tokio::test]
  async fn contradicting_fact_supersedes_without_deleting() {
    let f = fixture();
    let old = "I love strawberries";
    let new = "I don't like strawberries anymore";
    let (old_vec, new_vec) = unit_pair(0.85);
    f.embedder.preset(old, old_vec);
    f.embedder.preset(new, new_vec);

    let first = f.ingest.ingest(old, "ada").await.unwrap();
    let IngestResult::Created { id: old_id, .. } = first else {
      panic!("expected Created, got {first:?}");
    };

    let second = f.ingest.ingest(new, "ada").await.unwrap();
    let IngestResult::Superseded { new_id, old_id: superseded, .. } = second else {
      panic!("expected Superseded, got {second:?}");
    };
    assert_eq!(superseded, old_id);

    // Both memories survive; supersession demotes, never deletes.
    assert_eq!(f.vector_store.len(), 2);
    assert!(f.vector_store.contains(old_id));
    assert!(f.vector_store.contains(new_id));

    let supersessions = f.dynamics_store.supersessions();
    assert_eq!(supersessions.len(), 1);
    assert_eq!(supersessions[0].old_memory_id, old_id);
    assert_eq!(supersessions[0].new_memory_id, new_id);
    assert_eq!(supersessions[0].reason, SupersessionReason::Contradiction);
    assert!((supersessions[0].confidence - 0.80).abs() < 1e-12);

    // The old memory took an "again" review from the demotion.
    let events = f.dynamics_store.events();
    assert!(
      events
        .iter()
        .any(|e| e.memory_id == old_id && e.grade == Grade::Again)
    );
  }

  #[tokio::test]
  async fn close_paraphrase_reinforces_the_original() {
    let f = fixture();
    let original = "My favorite color is blue.";
    let paraphrase = "Blue is my favorite color";
    let (original_vec, paraphrase_vec) = unit_pair(0.85);
    f.embedder.preset(original, original_vec);
    f.embedder.preset(paraphrase, paraphrase_vec);

    let first = f.ingest.ingest(original, "ada").await.unwrap();
    let IngestResult::Created { id, .. } = first else {
      panic!("expected Created, got {first:?}");
    };

    let second = f.ingest.ingest(paraphrase, "ada").await.unwrap();
    let IngestResult::Reinforced { id: reinforced, .. } = second else {
      panic!("expected Reinforced, got {second:?}");
    };
    assert_eq!(reinforced, id);
    assert_eq!(f.vector_store.len(), 1);
    assert_eq!(f.dynamics_store.access_count(id), 1);
  }

  /// In the 0.60–0.75 band a low-confidence contradiction must create,
  /// while the same verdict above 0.75 supersedes unconditionally.
  #[tokio::test]
  async fn threshold_asymmetry_is_preserved() {
    let old = "the dentist appointment is on 03/15/2026";
    let new = "the dentist appointment is on 04/20/2026";

    // Temporal verdicts carry confidence 0.60, below the 0.70 cutoff.
    let low = fixture();
    let (old_vec, new_vec) = unit_pair(0.65);
    low.embedder.preset(old, old_vec);
    low.embedder.preset(new, new_vec);
    low.ingest.ingest(old, "ada").await.unwrap();
    let result = low.ingest.ingest(new, "ada").await.unwrap();
    assert!(matches!(result, IngestResult::Created { .. }), "{result:?}");
    assert_eq!(low.vector_store.len(), 2);
    assert!(low.dynamics_store.supersessions().is_empty());

    let high = fixture();
    let (old_vec, new_vec) = unit_pair(0.85);
    high.embedder.preset(old, old_vec);
    high.embedder.preset(new, new_vec);
    high.ingest.ingest(old, "ada").await.unwrap();
    let result = high.ingest.ingest(new, "ada").await.unwrap();
    assert!(matches!(result, IngestResult::Superseded { .. }), "{result:?}");
  }

  #[tokio::test]
  async fn unrelated_fact_creates_a_second_memory() {
    let f = fixture();
    f.ingest.ingest("I love strawberries", "ada").await.unwrap();
    let result = f.ingest.ingest("My desk faces the window", "ada").await.unwrap();
    assert!(matches!(result, IngestResult::Created { .. }));
    assert_eq!(f.vector_store.len(), 2);
  }

  #[tokio::test]
  async fn memories_are_scoped_per_user() {
    let f = fixture();
    f.ingest.ingest("I love strawberries", "ada").await.unwrap();
    let result = f.ingest.ingest("I love strawberries", "grace").await.unwrap();
    // Same text, different user: no hit, so a fresh memory.
    assert!(matches!(result, IngestResult::Created { .. }));
    assert_eq!(f.vector_store.len(), 2);
  }

  #[test]
  fn categories_come_from_keyword_counts() {
    assert_eq!(
      classify_category("I love sushi and enjoy ramen"),
      Some(MemoryCategory::Preferences)
    );
    assert_eq!(
      classify_category("My sister and her husband live in Lyon"),
      Some(MemoryCategory::Personal)
    );
    assert_eq!(
      classify_category("The quarterly deadline is next week"),
      Some(MemoryCategory::Temporal)
    );
    assert_eq!(classify_category("zxqv flurble"), None);
  }
}
