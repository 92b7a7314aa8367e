//! Topic recurrence: every extracted topic mention is persisted, and a
//! topic mentioned at least twice inside a 14-day window is surfaced
//! as recurring.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use mnema_ai::Embedder;
use mnema_shared::AppError;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::memory::{EmotionalWeight, MemoryType, TopicMention, payload_keys};
use crate::store::{MemoryFilter, Payload, VectorStore};

const RECURRENCE_WINDOW_DAYS: i64 = 14;
const MENTION_FETCH_LIMIT: u64 = 100;
const MIN_MENTIONS: usize = 2;

pub struct TopicRecurrence {
  embedder: Arc<dyn Embedder>,
  vector_store: Arc<dyn VectorStore>,
}

impl TopicRecurrence {
  #[must_use]
  pub fn new(embedder: Arc<dyn Embedder>, vector_store: Arc<dyn VectorStore>) -> Self {
    Self {
      embedder,
      vector_store,
    }
  }

  /// Persist one topic mention. The embedding may be supplied by the
  /// caller to avoid a duplicate embedding call.
  pub async fn store_mention(
    &self,
    mention: &TopicMention,
    user_id: &str,
    embedding: Option<Vec<f32>>,
  ) -> Result<(), AppError> {
    let formatted = format!(
      "Topic: {} ({}) - {}",
      mention.topic, mention.topic_type, mention.context_snippet
    );

    let embedding = match embedding {
      Some(embedding) => embedding,
      None => self.embedder.embed(&formatted).await?,
    };

    let now = Utc::now();
    let mut payload = Payload::new();
    payload.insert(payload_keys::DATA.to_owned(), json!(formatted));
    payload.insert(payload_keys::USER_ID.to_owned(), json!(user_id));
    payload.insert(
      payload_keys::MEMORY_TYPE.to_owned(),
      json!(MemoryType::TopicMention.to_string()),
    );
    payload.insert(payload_keys::TOPIC_NAME.to_owned(), json!(mention.topic));
    payload.insert(
      payload_keys::TOPIC_TYPE.to_owned(),
      json!(mention.topic_type.to_string()),
    );
    payload.insert(
      payload_keys::EMOTIONAL_WEIGHT.to_owned(),
      json!(mention.emotional_weight.to_string()),
    );
    payload.insert(payload_keys::CREATED_AT.to_owned(), json!(now.to_rfc3339()));

    self
      .vector_store
      .insert(Uuid::now_v7(), &embedding, payload)
      .await
  }

  /// Topics mentioned at least twice inside the window, most mentioned
  /// first, formatted for prompt assembly.
  pub async fn recurring(&self, user_id: &str, max_topics: usize) -> Vec<String> {
    let filter = MemoryFilter::for_user(user_id).with_memory_type(MemoryType::TopicMention);
    let mentions = match self.vector_store.get_all(&filter, MENTION_FETCH_LIMIT).await {
      Ok(mentions) => mentions,
      Err(err) => {
        tracing::warn!(user_id, error = %err, "topic mention fetch failed");
        return Vec::new();
      }
    };

    let cutoff = Utc::now() - Duration::days(RECURRENCE_WINDOW_DAYS);

    // name (case-folded) -> (display name, count, weight histogram)
    let mut groups: HashMap<String, (String, usize, HashMap<EmotionalWeight, usize>)> =
      HashMap::new();

    for mention in mentions {
      if mention.created_at < cutoff {
        continue;
      }
      let Some(name) = mention
        .payload
        .get(payload_keys::TOPIC_NAME)
        .and_then(Value::as_str)
      else {
        continue;
      };
      let weight = mention
        .payload
        .get(payload_keys::EMOTIONAL_WEIGHT)
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(EmotionalWeight::Moderate);

      let entry = groups
        .entry(name.to_lowercase())
        .or_insert_with(|| (name.to_owned(), 0, HashMap::new()));
      entry.1 += 1;
      *entry.2.entry(weight).or_insert(0) += 1;
    }

    let mut recurring: Vec<(String, usize, EmotionalWeight)> = groups
      .into_values()
      .filter(|(_, count, _)| *count >= MIN_MENTIONS)
      .map(|(name, count, weights)| {
        // Mode weight; ties break toward the heavier weight.
        let mode = weights
          .into_iter()
          .max_by_key(|(weight, count)| (*count, *weight))
          .map(|(weight, _)| weight)
          .unwrap_or(EmotionalWeight::Moderate);
        (name, count, mode)
      })
      .collect();

    recurring.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    recurring.truncate(max_topics);

    recurring
      .into_iter()
      .map(|(name, count, weight)| {
        format!("{name}: mentioned {count} times (emotional weight: {weight})")
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::memory::TopicType;
  use crate::testing::{FakeEmbedder, FakeVectorStore};

  fn recurrence() -> (TopicRecurrence, Arc<FakeVectorStore>) {
    let store = Arc::new(FakeVectorStore::new());
    (
      TopicRecurrence::new(Arc::new(FakeEmbedder::new()), store.clone()),
      store,
    )
  }

  fn mention(topic: &str, weight: EmotionalWeight) -> TopicMention {
    TopicMention {
      topic: topic.to_owned(),
      topic_type: TopicType::Theme,
      context_snippet: format!("talked about {topic}"),
      emotional_weight: weight,
    }
  }

  #[tokio::test]
  async fn repeated_topics_inside_the_window_recur() {
    let (recurrence, _) = recurrence();

    for weight in [
      EmotionalWeight::Heavy,
      EmotionalWeight::Heavy,
      EmotionalWeight::Light,
    ] {
      recurrence
        .store_mention(&mention("job search", weight), "ada", None)
        .await
        .unwrap();
    }
    recurrence
      .store_mention(&mention("gardening", EmotionalWeight::Light), "ada", None)
      .await
      .unwrap();

    let topics = recurrence.recurring("ada", 3).await;
    assert_eq!(
      topics,
      vec!["job search: mentioned 3 times (emotional weight: heavy)".to_owned()]
    );
  }

  #[tokio::test]
  async fn single_mentions_do_not_recur() {
    let (recurrence, _) = recurrence();
    recurrence
      .store_mention(&mention("sailing", EmotionalWeight::Light), "ada", None)
      .await
      .unwrap();
    assert!(recurrence.recurring("ada", 3).await.is_empty());
  }

  #[tokio::test]
  async fn old_mentions_fall_out_of_the_window() {
    let (recurrence, store) = recurrence();
    recurrence
      .store_mention(&mention("marathon", EmotionalWeight::Moderate), "ada", None)
      .await
      .unwrap();
    recurrence
      .store_mention(&mention("marathon", EmotionalWeight::Moderate), "ada", None)
      .await
      .unwrap();

    // Age one of the two mentions past the window.
    store.age_newest(Duration::days(20));

    assert!(recurrence.recurring("ada", 3).await.is_empty());
  }

  #[tokio::test]
  async fn recurrence_is_scoped_per_user_and_capped() {
    let (recurrence, _) = recurrence();
    for topic in ["a", "b", "c", "d"] {
      for _ in 0..2 {
        recurrence
          .store_mention(&mention(topic, EmotionalWeight::Light), "ada", None)
          .await
          .unwrap();
      }
    }
    recurrence
      .store_mention(&mention("a", EmotionalWeight::Light), "grace", None)
      .await
      .unwrap();

    let topics = recurrence.recurring("ada", 3).await;
    assert_eq!(topics.len(), 3);
    assert!(recurrence.recurring("grace", 3).await.is_empty());
  }

  #[tokio::test]
  async fn case_folded_names_group_together() {
    let (recurrence, _) = recurrence();
    recurrence
      .store_mention(&mention("Rust", EmotionalWeight::Light), "ada", None)
      .await
      .unwrap();
    recurrence
      .store_mention(&mention("rust", EmotionalWeight::Light), "ada", None)
      .await
      .unwrap();

    let topics = recurrence.recurring("ada", 3).await;
    assert_eq!(topics.len(), 1);
    assert!(topics[0].contains("mentioned 2 times"));
  }
}
