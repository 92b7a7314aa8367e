//! Composite ranking: half the vector similarity, half the FSRS memory
//! score, with a small bonus for key memories.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::fsrs::{Fsrs, FsrsState};
use crate::memory::MemoryRecord;

/// Key memories float up by this much, with the total capped at 1.
const KEY_BONUS: f64 = 0.1;

/// A vector hit joined with its spaced-repetition state, ready to be
/// scored.
#[derive(Debug, Clone)]
pub struct RankCandidate {
  pub id: Uuid,
  pub content: String,
  pub created_at: DateTime<Utc>,
  pub vector_score: f64,
  pub state: FsrsState,
}

#[derive(Debug, Clone)]
pub struct ScoredMemory {
  pub record: MemoryRecord,
  pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CompositeScorer {
  fsrs: Fsrs,
}

impl CompositeScorer {
  #[must_use]
  pub const fn new(fsrs: Fsrs) -> Self {
    Self { fsrs }
  }

  /// `0.5·vector + 0.5·memory_score(R, storage, importance)`, plus the
  /// key bonus.
  #[must_use]
  pub fn score(&self, vector_score: f64, state: &FsrsState, now: DateTime<Utc>) -> f64 {
    let elapsed_days = ((now - state.last_accessed_at).num_seconds() as f64 / 86_400.0).max(0.0);
    let retrievability = self.fsrs.retrievability(elapsed_days, state.stability);
    let memory_score =
      Fsrs::memory_score(retrievability, state.storage_strength, state.importance_weight);

    let blended = 0.5 * vector_score + 0.5 * memory_score;
    if state.is_key {
      (blended + KEY_BONUS).min(1.0)
    } else {
      blended
    }
  }

  /// Score and order candidates: descending score, then descending
  /// creation time, then id. The ordering is total, so ranking is
  /// stable across runs.
  #[must_use]
  pub fn rank(&self, candidates: Vec<RankCandidate>, now: DateTime<Utc>) -> Vec<ScoredMemory> {
    let mut scored: Vec<ScoredMemory> = candidates
      .into_iter()
      .map(|candidate| ScoredMemory {
        score: self.score(candidate.vector_score, &candidate.state, now),
        record: MemoryRecord {
          id: candidate.id,
          content: candidate.content,
          created_at: candidate.created_at,
          is_key: candidate.state.is_key,
        },
      })
      .collect();

    scored.sort_by(|a, b| {
      b.score
        .partial_cmp(&a.score)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| b.record.created_at.cmp(&a.record.created_at))
        .then_with(|| a.record.id.cmp(&b.record.id))
    });
    scored
  }
}
