//! Per-(user, channel) sentiment tracking. Messages are scored with a
//! valence lexicon, windows of scores are reduced to an emotional arc,
//! and finalized arcs are persisted to the vector store as
//! `emotional_context` memories.
//!
//! The session map is a bounded in-memory resource: 256 entries per
//! key, idle keys evicted after 24 hours.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

use chrono::{DateTime, Duration, Utc};
use mnema_ai::Embedder;
use mnema_shared::AppError;
use serde_json::json;
use uuid::Uuid;

use crate::memory::{MemoryType, payload_keys};
use crate::store::{MemoryFilter, Payload, VectorStore};

const MAX_SESSION_ENTRIES: usize = 256;
const SESSION_IDLE_TTL_HOURS: i64 = 24;

/// Arc classification needs at least this many entries.
const MIN_ARC_ENTRIES: usize = 3;

/// One scored message. In-memory only, never persisted directly.
#[derive(Debug, Clone, Copy)]
pub struct SentimentEntry {
  pub score: f64,
  pub timestamp: DateTime<Utc>,
}

/// Valence lexicon, VADER-style magnitudes in [-4, 4].
static LEXICON: LazyLock<HashMap<&'static str, f64>> = LazyLock::new(|| {
  let entries: &[(&str, f64)] = &[
    // positive
    ("love", 3.0),
    ("loved", 3.0),
    ("amazing", 3.0),
    ("fantastic", 3.0),
    ("wonderful", 3.0),
    ("excellent", 3.0),
    ("awesome", 3.0),
    ("perfect", 3.0),
    ("great", 2.5),
    ("happy", 2.5),
    ("excited", 2.5),
    ("proud", 2.5),
    ("success", 2.5),
    ("best", 2.5),
    ("delighted", 2.5),
    ("good", 2.0),
    ("nice", 2.0),
    ("glad", 2.0),
    ("fun", 2.0),
    ("enjoy", 2.0),
    ("enjoyed", 2.0),
    ("relieved", 2.0),
    ("solved", 2.0),
    ("win", 2.0),
    ("thanks", 1.5),
    ("thank", 1.5),
    ("better", 1.5),
    ("hope", 1.5),
    ("calm", 1.5),
    ("works", 1.5),
    ("fixed", 1.5),
    // negative
    ("hate", -3.0),
    ("terrible", -3.0),
    ("awful", -3.0),
    ("horrible", -3.0),
    ("miserable", -3.0),
    ("depressed", -3.0),
    ("worst", -3.0),
    ("devastated", -3.5),
    ("sad", -2.5),
    ("angry", -2.5),
    ("frustrated", -2.5),
    ("stressed", -2.5),
    ("failed", -2.5),
    ("exhausted", -2.5),
    ("scared", -2.5),
    ("lonely", -2.5),
    ("crying", -2.5),
    ("anxious", -2.0),
    ("worried", -2.0),
    ("upset", -2.0),
    ("annoyed", -2.0),
    ("afraid", -2.0),
    ("bad", -2.0),
    ("fail", -2.0),
    ("hurt", -2.0),
    ("sick", -1.5),
    ("tired", -1.5),
    ("broken", -1.5),
    ("stuck", -1.5),
    ("wrong", -1.5),
    ("lost", -1.5),
    ("problem", -1.0),
  ];
  entries.iter().copied().collect()
});

/// Lexicon compound sentiment in [-1, 1]: average the valence of the
/// hits, then squash with `raw / sqrt(raw² + 15)`.
#[must_use]
pub fn analyze_sentiment(text: &str) -> f64 {
  let mut total = 0.0;
  let mut hits = 0u32;

  for token in text.to_lowercase().split_whitespace() {
    let token = token.trim_end_matches(['.', ',', '!', '?', ';', ':']);
    if let Some(valence) = LEXICON.get(token) {
      total += valence;
      hits += 1;
    }
  }

  if hits == 0 {
    return 0.0;
  }
  let raw = total / f64::from(hits);
  raw / (raw * raw + 15.0).sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ArcTrend {
  Volatile,
  Improving,
  Declining,
  Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ArcEnergy {
  Positive,
  Negative,
  Neutral,
}

/// The emotional trajectory of one session window.
#[derive(Debug, Clone, Copy)]
pub struct EmotionalArc {
  pub trend: ArcTrend,
  pub energy: ArcEnergy,
  pub start_avg: f64,
  pub end_avg: f64,
  pub variance: f64,
}

impl EmotionalArc {
  /// One-sentence summary, the form persisted and later surfaced in
  /// prompt sections.
  #[must_use]
  pub fn summary(&self) -> String {
    format!(
      "The emotional arc was {} with {} energy (started at {:+.2}, ended at {:+.2}).",
      self.trend, self.energy, self.start_avg, self.end_avg
    )
  }
}

struct SessionWindow {
  entries: Vec<SentimentEntry>,
  last_active: DateTime<Utc>,
}

fn arc_from_entries(entries: &[SentimentEntry]) -> Option<EmotionalArc> {
  if entries.len() < MIN_ARC_ENTRIES {
    return None;
  }

  let scores: Vec<f64> = entries.iter().map(|entry| entry.score).collect();
  let mean = |values: &[f64]| values.iter().sum::<f64>() / values.len() as f64;

  let start_avg = mean(&scores[..MIN_ARC_ENTRIES]);
  let end_avg = mean(&scores[scores.len() - MIN_ARC_ENTRIES..]);
  let overall = mean(&scores);
  let variance =
    scores.iter().map(|score| (score - overall).powi(2)).sum::<f64>() / scores.len() as f64;

  let trend = if variance > 0.3 {
    ArcTrend::Volatile
  } else if end_avg - start_avg > 0.2 {
    ArcTrend::Improving
  } else if start_avg - end_avg > 0.2 {
    ArcTrend::Declining
  } else {
    ArcTrend::Stable
  };

  let energy = if end_avg > 0.2 {
    ArcEnergy::Positive
  } else if end_avg < -0.2 {
    ArcEnergy::Negative
  } else {
    ArcEnergy::Neutral
  };

  Some(EmotionalArc {
    trend,
    energy,
    start_avg,
    end_avg,
    variance,
  })
}

/// Tracks sentiment per (user, channel) session and persists session
/// summaries.
pub struct EmotionalContext {
  embedder: Arc<dyn Embedder>,
  vector_store: Arc<dyn VectorStore>,
  sessions: Mutex<HashMap<(String, String), SessionWindow>>,
}

impl EmotionalContext {
  #[must_use]
  pub fn new(embedder: Arc<dyn Embedder>, vector_store: Arc<dyn VectorStore>) -> Self {
    Self {
      embedder,
      vector_store,
      sessions: Mutex::new(HashMap::new()),
    }
  }

  /// Score one message and append it to the session window. Purely
  /// in-memory; never suspends.
  pub fn track_message(&self, user_id: &str, channel_id: &str, message: &str) {
    let score = analyze_sentiment(message);
    self.push_entry(user_id, channel_id, score, Utc::now());
  }

  fn push_entry(&self, user_id: &str, channel_id: &str, score: f64, timestamp: DateTime<Utc>) {
    let mut sessions = self.sessions.lock().expect("session map poisoned");

    let idle_cutoff = timestamp - Duration::hours(SESSION_IDLE_TTL_HOURS);
    sessions.retain(|_, window| window.last_active > idle_cutoff);

    let window = sessions
      .entry((user_id.to_owned(), channel_id.to_owned()))
      .or_insert_with(|| SessionWindow {
        entries: Vec::new(),
        last_active: timestamp,
      });

    if window.entries.len() == MAX_SESSION_ENTRIES {
      window.entries.remove(0);
    }
    window.entries.push(SentimentEntry { score, timestamp });
    window.last_active = timestamp;
  }

  /// The arc for the current window, or `None` until three entries
  /// exist.
  pub fn compute_arc(&self, user_id: &str, channel_id: &str) -> Option<EmotionalArc> {
    let sessions = self.sessions.lock().expect("session map poisoned");
    let window = sessions.get(&(user_id.to_owned(), channel_id.to_owned()))?;
    arc_from_entries(&window.entries)
  }

  /// Close the session: persist the arc summary as an
  /// `emotional_context` memory and clear the window. A window too
  /// short for an arc is cleared without persisting anything.
  pub async fn finalize_session(
    &self,
    user_id: &str,
    channel_id: &str,
    topic: Option<&str>,
  ) -> Result<(), AppError> {
    let arc = {
      let mut sessions = self.sessions.lock().expect("session map poisoned");
      sessions
        .remove(&(user_id.to_owned(), channel_id.to_owned()))
        .and_then(|window| arc_from_entries(&window.entries))
    };

    let Some(arc) = arc else {
      return Ok(());
    };

    let summary = match topic {
      Some(topic) => format!("Conversation about {topic}: {}", arc.summary()),
      None => arc.summary(),
    };

    let embedding = self.embedder.embed(&summary).await?;

    let now = Utc::now();
    let mut payload = Payload::new();
    payload.insert(payload_keys::DATA.to_owned(), json!(summary));
    payload.insert(payload_keys::USER_ID.to_owned(), json!(user_id));
    payload.insert(payload_keys::CHANNEL_ID.to_owned(), json!(channel_id));
    payload.insert(
      payload_keys::MEMORY_TYPE.to_owned(),
      json!(MemoryType::EmotionalContext.to_string()),
    );
    payload.insert(payload_keys::SENTIMENT_END.to_owned(), json!(arc.end_avg));
    payload.insert(payload_keys::CREATED_AT.to_owned(), json!(now.to_rfc3339()));

    self
      .vector_store
      .insert(Uuid::now_v7(), &embedding, payload)
      .await
  }

  /// Recent persisted emotional summaries for the given identities.
  pub async fn retrieve(&self, user_ids: &[String], limit: u64) -> Vec<String> {
    let filter = MemoryFilter::for_users(user_ids).with_memory_type(MemoryType::EmotionalContext);

    match self.vector_store.get_all(&filter, limit).await {
      Ok(memories) => memories
        .iter()
        .map(|memory| memory.content().to_owned())
        .filter(|content| !content.is_empty())
        .collect(),
      Err(err) => {
        tracing::warn!(error = %err, "emotional context fetch failed");
        Vec::new()
      }
    }
  }
}
