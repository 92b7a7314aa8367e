//! Five-layer contradiction detection between two assertions about the
//! same user, ordered cheapest first: negation, antonym, temporal,
//! numeric, and (optionally) an LLM semantic verdict. The first layer
//! that fires wins.
//!
//! Regex sets are compiled once at startup via `LazyLock`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use mnema_ai::{ChatMessage, ChatModel};
use regex::Regex;

/// Which layer produced the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ContradictionKind {
  Negation,
  Antonym,
  Temporal,
  Numeric,
  Semantic,
  None,
}

#[derive(Debug, Clone)]
pub struct ContradictionVerdict {
  pub contradicts: bool,
  pub kind: ContradictionKind,
  pub confidence: f64,
  pub explanation: String,
}

impl ContradictionVerdict {
  fn none(explanation: impl Into<String>) -> Self {
    Self {
      contradicts: false,
      kind: ContradictionKind::None,
      confidence: 0.0,
      explanation: explanation.into(),
    }
  }

  fn found(kind: ContradictionKind, confidence: f64, explanation: String) -> Self {
    Self {
      contradicts: true,
      kind,
      confidence,
      explanation,
    }
  }
}

const NEGATION_CONFIDENCE: f64 = 0.80;
const ANTONYM_CONFIDENCE: f64 = 0.70;
const TEMPORAL_CONFIDENCE: f64 = 0.60;
const NUMERIC_CONFIDENCE: f64 = 0.65;
const SEMANTIC_CONFIDENCE: f64 = 0.85;

struct NegationPattern {
  verb: &'static str,
  positive: Regex,
  negated: Regex,
}

static NEGATION_PATTERNS: LazyLock<Vec<NegationPattern>> = LazyLock::new(|| {
  let pattern = |verb, positive, negated| NegationPattern {
    verb,
    positive: Regex::new(positive).expect("negation pattern compiles"),
    negated: Regex::new(negated).expect("negation pattern compiles"),
  };
  vec![
    pattern(
      "like",
      r"\b(?:like|love|enjoy)s?\b",
      r"\b(?:don't|do not|doesn't|does not|never|no longer)\s+(?:really\s+)?(?:like|love|enjoy)\b|\bstopped\s+(?:liking|loving|enjoying)\b",
    ),
    pattern(
      "want",
      r"\bwants?\b",
      r"\b(?:don't|do not|doesn't|does not|no longer)\s+wants?\b",
    ),
    pattern(
      "have",
      r"\b(?:have|has)\b",
      r"\b(?:don't|do not|doesn't|does not|no longer)\s+(?:have|has)\b",
    ),
    pattern(
      "prefer",
      r"\bprefers?\b",
      r"\b(?:don't|do not|doesn't|does not|no longer)\s+prefers?\b",
    ),
    pattern(
      "work",
      r"\bworks?\b",
      r"\b(?:don't|do not|doesn't|does not|no longer)\s+works?\b",
    ),
    pattern("can", r"\bcan\b", r"\b(?:can't|cannot|can not)\b"),
    pattern("will", r"\bwill\b", r"\b(?:won't|will not)\b"),
    pattern("is", r"\b(?:is|am|are)\b", r"\b(?:is|am|are)\s+not\b|\b(?:isn't|aren't)\b"),
  ]
});

/// Closed antonym list. Order within a pair does not matter.
const ANTONYM_PAIRS: &[(&str, &str)] = &[
  ("available", "busy"),
  ("like", "hate"),
  ("love", "hate"),
  ("married", "divorced"),
  ("married", "single"),
  ("employed", "unemployed"),
  ("happy", "sad"),
  ("early", "late"),
  ("always", "never"),
  ("start", "stop"),
  ("hot", "cold"),
  ("open", "closed"),
  ("cheap", "expensive"),
  ("morning", "evening"),
  ("remote", "onsite"),
];

static DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
  vec![
    Regex::new(r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2}(?:\d{2})?\b").expect("date pattern compiles"),
    Regex::new(r"\b\d{4}[/-]\d{1,2}[/-]\d{1,2}\b").expect("date pattern compiles"),
  ]
});

static NUMBER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(\d+(?:\.\d+)?)\s*(years?|months?|weeks?|days?|hours?|dollars?|%)?")
    .expect("number pattern compiles")
});

/// Small fixed stopword set used when checking for shared context.
const STOPWORDS: &[&str] = &[
  "the", "and", "for", "that", "this", "with", "you", "your", "are", "was", "were", "from",
  "have", "has", "had", "but", "not", "all", "any", "can", "will", "just", "about", "into",
  "been", "being", "they", "them", "their", "there", "then", "than", "what", "when", "where",
  "which", "would", "could", "should", "very", "some", "such", "too", "also", "now", "really",
  "anymore",
];

fn context_tokens(text: &str) -> HashSet<String> {
  text
    .to_lowercase()
    .split(|c: char| !c.is_alphanumeric())
    .filter(|token| token.len() > 2 && !STOPWORDS.contains(token))
    .map(ToOwned::to_owned)
    .collect()
}

/// True when the two texts share at least one non-stopword token of
/// length > 2.
#[must_use]
pub fn has_common_context(a: &str, b: &str) -> bool {
  let tokens_a = context_tokens(a);
  let tokens_b = context_tokens(b);
  tokens_a.intersection(&tokens_b).next().is_some()
}

/// Jaccard similarity over lowercased whitespace tokens. Both empty →
/// 1.0; exactly one empty → 0.0.
#[must_use]
pub fn jaccard(a: &str, b: &str) -> f64 {
  let tokens_a: HashSet<String> = a.to_lowercase().split_whitespace().map(ToOwned::to_owned).collect();
  let tokens_b: HashSet<String> = b.to_lowercase().split_whitespace().map(ToOwned::to_owned).collect();

  if tokens_a.is_empty() && tokens_b.is_empty() {
    return 1.0;
  }
  if tokens_a.is_empty() || tokens_b.is_empty() {
    return 0.0;
  }

  let intersection = tokens_a.intersection(&tokens_b).count() as f64;
  let union = tokens_a.union(&tokens_b).count() as f64;
  intersection / union
}

const SEMANTIC_SYSTEM_PROMPT: &str = "\
You compare two statements about the same person and decide whether the \
new statement conflicts with the existing one.

Reply with exactly one word:
- CONTRADICT: the statements cannot both be true.
- UPDATES: the new statement replaces the old one (a change over time, \
a correction, or newer information).
- NO_CONTRADICTION: the statements are compatible.";

pub struct ContradictionDetector {
  llm: Option<Arc<dyn ChatModel>>,
}

impl ContradictionDetector {
  #[must_use]
  pub const fn new() -> Self {
    Self { llm: None }
  }

  #[must_use]
  pub fn with_llm(llm: Arc<dyn ChatModel>) -> Self {
    Self { llm: Some(llm) }
  }

  /// Run the layers in order against `new_content` and
  /// `existing_content`; the first positive layer short-circuits. The
  /// LLM layer runs only when `use_llm` is set and a model is wired,
  /// and any LLM failure downgrades to "no contradiction".
  pub async fn detect(
    &self,
    new_content: &str,
    existing_content: &str,
    use_llm: bool,
  ) -> ContradictionVerdict {
    if new_content.trim().to_lowercase() == existing_content.trim().to_lowercase() {
      return ContradictionVerdict::none("statements are identical");
    }

    let new_lower = new_content.to_lowercase();
    let existing_lower = existing_content.to_lowercase();

    if let Some(verdict) = Self::negation_layer(&new_lower, &existing_lower) {
      return verdict;
    }
    if let Some(verdict) = Self::antonym_layer(&new_lower, &existing_lower) {
      return verdict;
    }
    if let Some(verdict) = Self::temporal_layer(&new_lower, &existing_lower) {
      return verdict;
    }
    if let Some(verdict) = Self::numeric_layer(&new_lower, &existing_lower) {
      return verdict;
    }
    if use_llm {
      if let Some(verdict) = self.semantic_layer(new_content, existing_content).await {
        return verdict;
      }
    }

    ContradictionVerdict::none("no contradiction detected")
  }

  fn negation_layer(a: &str, b: &str) -> Option<ContradictionVerdict> {
    for pattern in NEGATION_PATTERNS.iter() {
      let neg_a = pattern.negated.is_match(a);
      let neg_b = pattern.negated.is_match(b);
      let pos_a = pattern.positive.is_match(a) && !neg_a;
      let pos_b = pattern.positive.is_match(b) && !neg_b;

      if ((pos_a && neg_b) || (pos_b && neg_a)) && has_common_context(a, b) {
        return Some(ContradictionVerdict::found(
          ContradictionKind::Negation,
          NEGATION_CONFIDENCE,
          format!("one side negates '{}' affirmed by the other", pattern.verb),
        ));
      }
    }
    None
  }

  fn antonym_layer(a: &str, b: &str) -> Option<ContradictionVerdict> {
    let tokens_a: HashSet<&str> = a
      .split(|c: char| !c.is_alphanumeric())
      .filter(|t| !t.is_empty())
      .collect();
    let tokens_b: HashSet<&str> = b
      .split(|c: char| !c.is_alphanumeric())
      .filter(|t| !t.is_empty())
      .collect();

    for &(first, second) in ANTONYM_PAIRS {
      let forward = tokens_a.contains(first)
        && tokens_b.contains(second)
        && !tokens_a.contains(second)
        && !tokens_b.contains(first);
      let backward = tokens_a.contains(second)
        && tokens_b.contains(first)
        && !tokens_a.contains(first)
        && !tokens_b.contains(second);

      if (forward || backward) && has_common_context(a, b) {
        return Some(ContradictionVerdict::found(
          ContradictionKind::Antonym,
          ANTONYM_CONFIDENCE,
          format!("opposite terms '{first}' and '{second}' on either side"),
        ));
      }
    }
    None
  }

  fn extract_dates(text: &str) -> HashSet<String> {
    DATE_PATTERNS
      .iter()
      .flat_map(|pattern| pattern.find_iter(text).map(|m| m.as_str().to_owned()))
      .collect()
  }

  fn temporal_layer(a: &str, b: &str) -> Option<ContradictionVerdict> {
    let dates_a = Self::extract_dates(a);
    let dates_b = Self::extract_dates(b);

    if dates_a.is_empty() || dates_b.is_empty() {
      return None;
    }
    if dates_a.intersection(&dates_b).next().is_some() {
      return None;
    }
    if !has_common_context(a, b) {
      return None;
    }

    Some(ContradictionVerdict::found(
      ContradictionKind::Temporal,
      TEMPORAL_CONFIDENCE,
      "the statements reference non-overlapping dates".to_owned(),
    ))
  }

  fn extract_quantities(text: &str) -> HashMap<String, HashSet<String>> {
    let mut quantities: HashMap<String, HashSet<String>> = HashMap::new();
    for capture in NUMBER_PATTERN.captures_iter(text) {
      let value = capture[1].to_owned();
      let unit = capture
        .get(2)
        .map(|m| m.as_str().trim_end_matches('s').to_owned())
        .unwrap_or_default();
      quantities.entry(unit).or_default().insert(value);
    }
    quantities
  }

  fn numeric_layer(a: &str, b: &str) -> Option<ContradictionVerdict> {
    let quantities_a = Self::extract_quantities(a);
    let quantities_b = Self::extract_quantities(b);

    for (unit, values_a) in &quantities_a {
      let Some(values_b) = quantities_b.get(unit) else {
        continue;
      };
      if values_a.intersection(values_b).next().is_some() {
        continue;
      }
      if !has_common_context(a, b) {
        continue;
      }
      let label = if unit.is_empty() { "quantity" } else { unit };
      return Some(ContradictionVerdict::found(
        ContradictionKind::Numeric,
        NUMERIC_CONFIDENCE,
        format!("different {label} values for the same subject"),
      ));
    }
    None
  }

  async fn semantic_layer(
    &self,
    new_content: &str,
    existing_content: &str,
  ) -> Option<ContradictionVerdict> {
    let llm = self.llm.as_ref()?;

    let messages = [
      ChatMessage::system(SEMANTIC_SYSTEM_PROMPT),
      ChatMessage::user(format!(
        "Existing: {existing_content}\nNew: {new_content}"
      )),
    ];

    let reply = match llm.complete(&messages).await {
      Ok(reply) => reply.trim().to_uppercase(),
      Err(err) => {
        tracing::debug!(error = %err, "semantic contradiction check failed, assuming none");
        return None;
      }
    };

    // NO_CONTRADICTION contains CONTRADICT, so check it first.
    if reply.contains("NO_CONTRADICTION") {
      None
    } else if reply.contains("CONTRADICT") {
      Some(ContradictionVerdict::found(
        ContradictionKind::Semantic,
        SEMANTIC_CONFIDENCE,
        "the statements cannot both hold".to_owned(),
      ))
    } else if reply.contains("UPDATES") {
      Some(ContradictionVerdict::found(
        ContradictionKind::Semantic,
        SEMANTIC_CONFIDENCE,
        "the newer statement updates the older one".to_owned(),
      ))
    } else {
      None
    }
  }
}

impl Default for ContradictionDetector {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::testing::ScriptedChat;

  fn detector() -> ContradictionDetector {
    ContradictionDetector::new()
  }

  #[tokio::test]
  async fn identical_statements_never_contradict() {
    let verdict = detector().detect("I love hiking", "  i LOVE hiking ", true).await;
    assert!(!verdict.contradicts);
    assert_eq!(verdict.kind, ContradictionKind::None);
    assert_eq!(verdict.confidence, 0.0);
  }

  #[tokio::test]
  async fn negated_preference_fires_the_negation_layer() {
    let verdict = detector()
      .detect(
        "I don't like strawberries anymore",
        "I love strawberries",
        false,
      )
      .await;
    assert!(verdict.contradicts);
    assert_eq!(verdict.kind, ContradictionKind::Negation);
    assert!((verdict.confidence - 0.80).abs() < 1e-12);
  }

  #[tokio::test]
  async fn negation_needs_common_context() {
    let verdict = detector()
      .detect("I don't like opera", "I love strawberries", false)
      .await;
    assert!(!verdict.contradicts);
  }

  #[tokio::test]
  async fn antonym_pair_fires_with_shared_subject() {
    let verdict = detector()
      .detect("I am divorced from Sam", "I am married to Sam", false)
      .await;
    assert!(verdict.contradicts);
    assert_eq!(verdict.kind, ContradictionKind::Antonym);
    assert!((verdict.confidence - 0.70).abs() < 1e-12);
  }

  #[tokio::test]
  async fn disjoint_dates_fire_the_temporal_layer() {
    let verdict = detector()
      .detect(
        "the dentist appointment is on 04/20/2026",
        "the dentist appointment is on 03/15/2026",
        false,
      )
      .await;
    assert!(verdict.contradicts);
    assert_eq!(verdict.kind, ContradictionKind::Temporal);
    assert!((verdict.confidence - 0.60).abs() < 1e-12);
  }

  #[tokio::test]
  async fn same_dates_do_not_contradict() {
    let verdict = detector()
      .detect(
        "the dentist appointment is on 03/15/2026",
        "my appointment with the dentist falls on 03/15/2026",
        false,
      )
      .await;
    assert!(!verdict.contradicts);
  }

  #[tokio::test]
  async fn different_quantities_fire_the_numeric_layer() {
    let verdict = detector()
      .detect(
        "my mortgage runs another 10 years",
        "my mortgage runs another 25 years",
        false,
      )
      .await;
    assert!(verdict.contradicts);
    assert_eq!(verdict.kind, ContradictionKind::Numeric);
    assert!((verdict.confidence - 0.65).abs() < 1e-12);
  }

  #[tokio::test]
  async fn llm_layer_parses_single_word_verdicts() {
    let chat = Arc::new(ScriptedChat::new(vec!["CONTRADICT".to_owned()]));
    let detector = ContradictionDetector::with_llm(chat);
    let verdict = detector
      .detect(
        "my sister runs the bakery downtown",
        "my brother runs the bakery downtown",
        true,
      )
      .await;
    assert!(verdict.contradicts);
    assert_eq!(verdict.kind, ContradictionKind::Semantic);
    assert!((verdict.confidence - 0.85).abs() < 1e-12);
  }

  #[tokio::test]
  async fn llm_no_contradiction_is_not_misread_as_contradict() {
    let chat = Arc::new(ScriptedChat::new(vec!["NO_CONTRADICTION".to_owned()]));
    let detector = ContradictionDetector::with_llm(chat);
    let verdict = detector
      .detect(
        "my sister bakes sourdough on weekends",
        "my sister runs the bakery downtown",
        true,
      )
      .await;
    assert!(!verdict.contradicts);
  }

  #[tokio::test]
  async fn llm_failure_downgrades_to_no_contradiction() {
    let chat = Arc::new(ScriptedChat::new(Vec::new()));
    let detector = ContradictionDetector::with_llm(chat);
    let verdict = detector
      .detect(
        "my sister runs the bakery downtown",
        "my brother runs the bakery downtown",
        true,
      )
      .await;
    assert!(!verdict.contradicts);
  }

  #[test]
  fn jaccard_properties_hold() {
    assert_eq!(jaccard("", ""), 1.0);
    assert_eq!(jaccard("a b", ""), 0.0);
    assert_eq!(jaccard("", "a b"), 0.0);
    assert_eq!(jaccard("Red green blue", "red GREEN blue"), 1.0);
    let forward = jaccard("red green", "green blue");
    let backward = jaccard("green blue", "red green");
    assert!((forward - backward).abs() < 1e-12);
    assert!((forward - 1.0 / 3.0).abs() < 1e-12);
  }

  #[test]
  fn common_context_ignores_stopwords_and_short_tokens() {
    assert!(has_common_context(
      "I love strawberries",
      "strawberries are great"
    ));
    assert!(!has_common_context("the and for", "with you are"));
    assert!(!has_common_context("it is so", "he is up"));
  }
}
