//! LLM-assisted extraction of facts, topics, and graph entities from
//! conversation text. Every extractor demands strict JSON, tolerates
//! code-fenced or prefixed replies, and degrades to an empty result on
//! any parse or transport failure.

use std::sync::{Arc, LazyLock};

use mnema_ai::{ChatMessage, ChatModel};
use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::memory::{EmotionalWeight, TopicMention, TopicType};

/// Pull the JSON body out of an LLM reply: prefer a fenced block, then
/// the widest brace/bracket span, then the raw reply.
pub(crate) fn extract_json_block(raw: &str) -> &str {
  let trimmed = raw.trim();

  if let Some(open) = trimmed.find("```") {
    let after = &trimmed[open + 3..];
    let after = after.strip_prefix("json").unwrap_or(after);
    if let Some(close) = after.find("```") {
      return after[..close].trim();
    }
  }

  let start = trimmed.find(['{', '[']);
  let end = trimmed.rfind(['}', ']']);
  match (start, end) {
    (Some(start), Some(end)) if end >= start => trimmed[start..=end].trim(),
    _ => trimmed,
  }
}

fn schema_json<T: JsonSchema>() -> String {
  serde_json::to_string_pretty(&schemars::schema_for!(T)).unwrap_or_else(|_| "{}".to_owned())
}

async fn complete_and_parse<T>(
  llm: &Arc<dyn ChatModel>,
  messages: &[ChatMessage],
  what: &str,
) -> Option<T>
where
  T: for<'de> Deserialize<'de>,
{
  let raw = match llm.complete(messages).await {
    Ok(raw) => raw,
    Err(err) => {
      tracing::debug!(error = %err, "{what} extraction call failed");
      return None;
    }
  };

  match serde_json::from_str(extract_json_block(&raw)) {
    Ok(parsed) => Some(parsed),
    Err(err) => {
      tracing::debug!(error = %err, "{what} extraction returned unparseable JSON");
      None
    }
  }
}

// ──────────────────────────────────────────────────
// Fact extraction
// ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
struct FactExtractionOutput {
  facts: Vec<String>,
}

const FACT_SYSTEM_PROMPT: &str = "\
You extract long-term personal facts about the user from one dialogue \
exchange.

Rules:
1. Each fact is one discrete, declarative sentence about the user \
   (preferences, personal info, relationships, habits, plans).
2. Only lasting facts. Transient states (\"I'm hungry right now\") are \
   NOT facts.
3. Do not invent anything that is not stated or strongly implied.
4. If there is nothing worth remembering, return an empty array.

Return ONLY JSON matching this schema, no prose:";

/// Extracts discrete personal facts from a user/assistant exchange.
pub struct FactExtractor {
  llm: Arc<dyn ChatModel>,
}

impl FactExtractor {
  #[must_use]
  pub fn new(llm: Arc<dyn ChatModel>) -> Self {
    Self { llm }
  }

  pub async fn extract(&self, user_msg: &str, assistant_msg: &str) -> Vec<String> {
    let messages = [
      ChatMessage::system(format!(
        "{FACT_SYSTEM_PROMPT}\n{}",
        schema_json::<FactExtractionOutput>()
      )),
      ChatMessage::user(format!("user: {user_msg}\nassistant: {assistant_msg}")),
    ];

    complete_and_parse::<FactExtractionOutput>(&self.llm, &messages, "fact")
      .await
      .map(|output| {
        output
          .facts
          .into_iter()
          .map(|fact| fact.trim().to_owned())
          .filter(|fact| !fact.is_empty())
          .collect()
      })
      .unwrap_or_default()
  }
}

// ──────────────────────────────────────────────────
// Topic extraction
// ──────────────────────────────────────────────────

/// At most this many topics per conversation.
const MAX_TOPICS: usize = 3;

#[derive(Debug, Deserialize, JsonSchema)]
struct TopicExtractionOutput {
  topics: Vec<TopicOutput>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TopicOutput {
  /// Short topic name
  topic: String,
  /// "entity" or "theme"
  topic_type: String,
  /// One short quote or paraphrase showing the mention
  context_snippet: String,
  /// "light", "moderate" or "heavy"
  emotional_weight: String,
}

const TOPIC_SYSTEM_PROMPT: &str = "\
You identify the personally meaningful topics of a conversation: named \
entities in the user's life (people, places, projects) and recurring \
themes (health, work stress, a hobby).

Rules:
1. At most 3 topics, most significant first.
2. topic_type is \"entity\" or \"theme\".
3. emotional_weight reflects how emotionally loaded the mention was: \
   \"light\", \"moderate\" or \"heavy\".
4. Return an empty array when the conversation is purely functional.

Return ONLY JSON matching this schema, no prose:";

/// Extracts up to three topic mentions, deduplicated by case-folded
/// name.
pub struct TopicExtractor {
  llm: Arc<dyn ChatModel>,
}

impl TopicExtractor {
  #[must_use]
  pub fn new(llm: Arc<dyn ChatModel>) -> Self {
    Self { llm }
  }

  pub async fn extract(&self, conversation_text: &str) -> Vec<TopicMention> {
    let messages = [
      ChatMessage::system(format!(
        "{TOPIC_SYSTEM_PROMPT}\n{}",
        schema_json::<TopicExtractionOutput>()
      )),
      ChatMessage::user(conversation_text.to_owned()),
    ];

    complete_and_parse::<TopicExtractionOutput>(&self.llm, &messages, "topic")
      .await
      .map(|output| collect_topics(output.topics))
      .unwrap_or_default()
  }
}

fn collect_topics(raw: Vec<TopicOutput>) -> Vec<TopicMention> {
  let mut seen = std::collections::HashSet::new();
  let mut mentions = Vec::new();

  for topic in raw {
    let name = topic.topic.trim().to_owned();
    if name.is_empty() || !seen.insert(name.to_lowercase()) {
      continue;
    }
    mentions.push(TopicMention {
      topic: name,
      topic_type: topic.topic_type.parse().unwrap_or(TopicType::Theme),
      context_snippet: topic.context_snippet.trim().to_owned(),
      emotional_weight: topic
        .emotional_weight
        .parse()
        .unwrap_or(EmotionalWeight::Moderate),
    });
    if mentions.len() == MAX_TOPICS {
      break;
    }
  }

  mentions
}

// ──────────────────────────────────────────────────
// Entity extraction
// ──────────────────────────────────────────────────

const ENTITY_TYPES: &[&str] = &["person", "place", "thing", "concept"];

#[derive(Debug, Deserialize, JsonSchema)]
struct EntityExtractionOutput {
  entities: Vec<EntityOutput>,
  relationships: Vec<RelationshipOutput>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct EntityOutput {
  name: String,
  /// "person", "place", "thing" or "concept"
  entity_type: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RelationshipOutput {
  source: String,
  /// Short verb phrase, e.g. "works at"
  label: String,
  target: String,
}

const ENTITY_SYSTEM_PROMPT: &str = "\
You extract entities and their relationships from text about a user's \
life, for a personal knowledge graph.

Rules:
1. entity_type is one of: person, place, thing, concept.
2. Relationships connect two extracted entity names with a short verb \
   phrase label.
3. Refer to the speaker as \"User\".
4. Return empty arrays when nothing graph-worthy is present.

Return ONLY JSON matching this schema, no prose:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntity {
  pub name: String,
  pub entity_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRelationship {
  pub source: String,
  pub label: String,
  pub target: String,
}

#[derive(Debug, Clone, Default)]
pub struct EntityExtraction {
  pub entities: Vec<ExtractedEntity>,
  pub relationships: Vec<ExtractedRelationship>,
}

static LABEL_SANITIZER: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"[^A-Z0-9]+").expect("label sanitizer compiles"));

/// Normalize a relationship label to `[A-Z0-9_]+`.
pub(crate) fn sanitize_label(label: &str) -> String {
  let sanitized = LABEL_SANITIZER
    .replace_all(&label.to_uppercase(), "_")
    .trim_matches('_')
    .to_owned();
  if sanitized.is_empty() {
    "RELATED_TO".to_owned()
  } else {
    sanitized
  }
}

/// Extracts graph entities and relationships; consumed only by the
/// graph store.
pub struct EntityExtractor {
  llm: Arc<dyn ChatModel>,
}

impl EntityExtractor {
  #[must_use]
  pub fn new(llm: Arc<dyn ChatModel>) -> Self {
    Self { llm }
  }

  pub async fn extract(&self, text: &str) -> EntityExtraction {
    let messages = [
      ChatMessage::system(format!(
        "{ENTITY_SYSTEM_PROMPT}\n{}",
        schema_json::<EntityExtractionOutput>()
      )),
      ChatMessage::user(text.to_owned()),
    ];

    complete_and_parse::<EntityExtractionOutput>(&self.llm, &messages, "entity")
      .await
      .map(|output| {
        let entities = output
          .entities
          .into_iter()
          .filter(|entity| !entity.name.trim().is_empty())
          .map(|entity| {
            let entity_type = entity.entity_type.to_lowercase();
            ExtractedEntity {
              name: entity.name.trim().to_owned(),
              entity_type: if ENTITY_TYPES.contains(&entity_type.as_str()) {
                entity_type
              } else {
                "thing".to_owned()
              },
            }
          })
          .collect();

        let relationships = output
          .relationships
          .into_iter()
          .filter(|rel| !rel.source.trim().is_empty() && !rel.target.trim().is_empty())
          .map(|rel| ExtractedRelationship {
            source: rel.source.trim().to_owned(),
            label: sanitize_label(&rel.label),
            target: rel.target.trim().to_owned(),
          })
          .collect();

        EntityExtraction {
          entities,
          relationships,
        }
      })
      .unwrap_or_default()
  }
}
