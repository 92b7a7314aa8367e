use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Reserved payload keys. These are part of the wire format: every
/// backend (and every other process reading the store) matches on them
/// by exact string, so they must never be renamed.
pub mod payload_keys {
  pub const DATA: &str = "data";
  pub const USER_ID: &str = "user_id";
  pub const MEMORY_TYPE: &str = "memory_type";
  pub const CATEGORY: &str = "category";
  pub const CREATED_AT: &str = "created_at";
  pub const IS_KEY: &str = "is_key";
  pub const TOPIC_NAME: &str = "topic_name";
  pub const TOPIC_TYPE: &str = "topic_type";
  pub const EMOTIONAL_WEIGHT: &str = "emotional_weight";
  pub const SENTIMENT_END: &str = "sentiment_end";
  pub const CHANNEL_ID: &str = "channel_id";
}

/// What kind of record a payload describes.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
  Fact,
  EmotionalContext,
  TopicMention,
}

/// Closed category set assigned at ingest time by keyword count.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
  Preferences,
  Personal,
  Professional,
  Goals,
  Emotional,
  Temporal,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TopicType {
  Entity,
  Theme,
}

/// Weight ordering matters: ties in the recurrence mode break toward
/// the heavier weight.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EmotionalWeight {
  Light,
  Moderate,
  Heavy,
}

/// Why one memory replaced another.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SupersessionReason {
  Contradiction,
  Update,
  Correction,
}

/// One topic surfaced from a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMention {
  pub topic: String,
  pub topic_type: TopicType,
  pub context_snippet: String,
  pub emotional_weight: EmotionalWeight,
}

/// A memory as surfaced to callers of the service.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MemoryRecord {
  pub id: Uuid,
  pub content: String,
  pub created_at: DateTime<Utc>,
  pub is_key: bool,
}

/// The assembled context for one query, section by section.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct MemoryContext {
  pub key_memories: Vec<MemoryRecord>,
  pub relevant_memories: Vec<MemoryRecord>,
  pub graph_relations: Vec<String>,
  pub emotional_context: Vec<String>,
  pub recurring_topics: Vec<String>,
}

impl MemoryContext {
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.key_memories.is_empty()
      && self.relevant_memories.is_empty()
      && self.graph_relations.is_empty()
      && self.emotional_context.is_empty()
      && self.recurring_topics.is_empty()
  }
}
