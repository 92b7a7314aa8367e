//! FSRS-6 spaced repetition, 21-weight variant, extended with Bjork's
//! dual-strength model (long-term storage strength plus a decaying
//! short-term retrieval strength).
//!
//! Pure computation, no I/O. Persistence lives in
//! [`crate::dynamics::MemoryDynamics`].
//!
//! Core formulas:
//! - Retrievability: `R = (1 + f · t / S)^(-w20)` with
//!   `f = 0.9^(-1/w20) - 1`, so `R = 0.9` exactly at `t = S`.
//! - Stability grows multiplicatively on success and collapses to a
//!   fraction of its former value on failure.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::MemoryCategory;

/// Default 21-element weight vector. Treated as configuration: any
/// change resets the semantics of every persisted `FsrsState`.
pub const DEFAULT_WEIGHTS: [f64; 21] = [
  0.212, 1.2931, 2.3065, 8.2956, 6.4133, 0.8334, 3.0194, 0.001, 1.8722, 0.1666, 0.796, 1.4835,
  0.0614, 0.2629, 1.6483, 0.6014, 1.8729, 0.5425, 0.0912, 0.0658, 0.1542,
];

/// Stability never drops below this, in days.
const MIN_STABILITY: f64 = 0.1;

const MIN_DIFFICULTY: f64 = 1.0;
const MAX_DIFFICULTY: f64 = 10.0;

/// Review grade, ordinal 1–4.
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
pub enum Grade {
  Again = 1,
  Hard = 2,
  Good = 3,
  Easy = 4,
}

impl Grade {
  #[must_use]
  pub const fn ordinal(self) -> u8 {
    self as u8
  }

  #[must_use]
  pub const fn from_ordinal(ordinal: i16) -> Option<Self> {
    match ordinal {
      1 => Some(Self::Again),
      2 => Some(Self::Hard),
      3 => Some(Self::Good),
      4 => Some(Self::Easy),
      _ => None,
    }
  }
}

/// Where a review event came from. Each signal implies a grade via
/// [`Fsrs::infer_grade`].
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
  UsedInResponse,
  MentionedByUser,
  UserCorrection,
  TaskCompleted,
  ExplicitRecall,
  ContradictionDetected,
  ImplicitReference,
  PartialRecall,
}

/// Per-memory spaced-repetition state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsrsState {
  /// Days at which retrievability ≈ 0.9. Always ≥ 0.1.
  pub stability: f64,
  /// Always clamped to [1, 10].
  pub difficulty: f64,
  /// Short-term strength in [0, 1]; decays between reviews.
  pub retrieval_strength: f64,
  /// Long-term strength in [0, 1]; only grows.
  pub storage_strength: f64,
  pub last_accessed_at: DateTime<Utc>,
  /// Number of completed reviews. Only increases.
  pub access_count: i64,
  pub is_key: bool,
  pub importance_weight: f64,
  pub category: Option<MemoryCategory>,
  pub tags: BTreeSet<String>,
}

impl FsrsState {
  /// Defaults for a memory that has never been reviewed.
  #[must_use]
  pub fn new(now: DateTime<Utc>) -> Self {
    Self {
      stability: 1.0,
      difficulty: 5.0,
      retrieval_strength: 1.0,
      storage_strength: 0.5,
      last_accessed_at: now,
      access_count: 0,
      is_key: false,
      importance_weight: 1.0,
      category: None,
      tags: BTreeSet::new(),
    }
  }
}

/// Result of one graded review.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
  pub state: FsrsState,
  /// Retrievability computed against the pre-review state.
  pub retrievability_before: f64,
  /// The new stability, read as the next review interval in days.
  pub interval_days: f64,
}

/// The 21-weight parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FsrsWeights(pub [f64; 21]);

impl Default for FsrsWeights {
  fn default() -> Self {
    Self(DEFAULT_WEIGHTS)
  }
}

/// The scheduler itself. Construct once and share; all methods are
/// pure.
#[derive(Debug, Clone, Default)]
pub struct Fsrs {
  w: FsrsWeights,
}

impl Fsrs {
  #[must_use]
  pub const fn new(weights: FsrsWeights) -> Self {
    Self { w: weights }
  }

  /// Power-law probability of successful recall after `elapsed_days`.
  #[must_use]
  pub fn retrievability(&self, elapsed_days: f64, stability: f64) -> f64 {
    if elapsed_days <= 0.0 {
      return 1.0;
    }
    if stability <= 0.0 {
      return 0.0;
    }
    let w = &self.w.0;
    let factor = 0.9_f64.powf(-1.0 / w[20]) - 1.0;
    (1.0 + factor * elapsed_days / stability).powf(-w[20])
  }

  fn initial_stability(&self, grade: Grade) -> f64 {
    self.w.0[grade.ordinal() as usize - 1].max(MIN_STABILITY)
  }

  fn initial_difficulty(&self, grade: Grade) -> f64 {
    let w = &self.w.0;
    let g = f64::from(grade.ordinal());
    (w[4] - (w[5] * (g - 1.0)).exp() + 1.0).clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
  }

  /// Shift difficulty by the grade, then mean-revert toward the
  /// initial-difficulty anchor `w4`.
  fn update_difficulty(&self, difficulty: f64, grade: Grade) -> f64 {
    let w = &self.w.0;
    let g = f64::from(grade.ordinal());
    let shifted = difficulty + w[11] * (g - 3.0);
    let reverted = w[13] * w[4] + (1.0 - w[13]) * shifted;
    reverted.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
  }

  /// Multiplicative stability growth on a successful review. The
  /// growth term vanishes as retrievability approaches 1, so reviewing
  /// too early gains nothing.
  fn update_stability_success(
    &self,
    stability: f64,
    difficulty: f64,
    retrievability: f64,
    grade: Grade,
  ) -> f64 {
    let w = &self.w.0;
    let bonus = match grade {
      Grade::Hard => w[9],
      Grade::Easy => w[10],
      _ => 1.0,
    };
    let growth = w[6].exp()
      * (11.0 - difficulty)
      * stability.powf(-w[7])
      * ((w[8] * (1.0 - retrievability)).exp() - 1.0)
      * bonus;
    (stability * (1.0 + growth)).max(MIN_STABILITY)
  }

  /// Post-lapse stability. Never exceeds the previous stability.
  fn update_stability_failure(&self, stability: f64, difficulty: f64, retrievability: f64) -> f64 {
    let w = &self.w.0;
    let lapsed = w[14]
      * difficulty.powf(-w[15])
      * ((stability + 1.0).powf(w[16]) - 1.0)
      * (w[17] * (1.0 - retrievability)).exp();
    lapsed.min(stability).max(MIN_STABILITY)
  }

  /// Bjork dual-strength update. Retrieval strength decays with the
  /// elapsed interval (slower when storage strength is high), then the
  /// grade applies an additive retrieval boost and a storage gain that
  /// grows with how far retrieval had decayed.
  #[must_use]
  pub fn update_dual_strength(
    retrieval_strength: f64,
    storage_strength: f64,
    grade: Grade,
    elapsed_days: f64,
  ) -> (f64, f64) {
    let decayed =
      retrieval_strength * (-0.1 * elapsed_days.max(0.0) / (1.0 + storage_strength)).exp();

    if grade == Grade::Again {
      return (0.3, (storage_strength + 0.05).clamp(0.0, 1.0));
    }

    let bonus = (1.0 - decayed).max(0.0);
    let (retrieval_boost, storage_gain) = match grade {
      Grade::Hard => (0.5, 0.1 + 0.1 * bonus),
      Grade::Good => (0.7, 0.15 + 0.15 * bonus),
      Grade::Easy => (0.9, 0.1 + 0.05 * bonus),
      Grade::Again => unreachable!(),
    };

    (
      (decayed + retrieval_boost).clamp(0.0, 1.0),
      (storage_strength + storage_gain).clamp(0.0, 1.0),
    )
  }

  /// Apply one graded review at `now`.
  ///
  /// Retrievability is computed against the pre-review state. The first
  /// review initializes stability and difficulty from the grade;
  /// subsequent reviews update both.
  #[must_use]
  pub fn review(&self, state: &FsrsState, grade: Grade, now: DateTime<Utc>) -> ReviewOutcome {
    let elapsed_days =
      ((now - state.last_accessed_at).num_seconds() as f64 / 86_400.0).max(0.0);
    let retrievability_before = self.retrievability(elapsed_days, state.stability);

    let (stability, difficulty) = if state.access_count == 0 {
      (self.initial_stability(grade), self.initial_difficulty(grade))
    } else {
      let stability = match grade {
        Grade::Again => {
          self.update_stability_failure(state.stability, state.difficulty, retrievability_before)
        }
        _ => self.update_stability_success(
          state.stability,
          state.difficulty,
          retrievability_before,
          grade,
        ),
      };
      (stability, self.update_difficulty(state.difficulty, grade))
    };

    let (retrieval_strength, storage_strength) = Self::update_dual_strength(
      state.retrieval_strength,
      state.storage_strength,
      grade,
      elapsed_days,
    );

    let state = FsrsState {
      stability,
      difficulty,
      retrieval_strength,
      storage_strength,
      last_accessed_at: now,
      access_count: state.access_count + 1,
      ..state.clone()
    };

    ReviewOutcome {
      interval_days: stability,
      retrievability_before,
      state,
    }
  }

  /// Map an access signal to the grade it implies.
  #[must_use]
  pub fn infer_grade(signal: SignalType) -> Grade {
    match signal {
      SignalType::MentionedByUser | SignalType::TaskCompleted => Grade::Easy,
      SignalType::UserCorrection | SignalType::ContradictionDetected => Grade::Again,
      SignalType::PartialRecall => Grade::Hard,
      SignalType::UsedInResponse | SignalType::ExplicitRecall | SignalType::ImplicitReference => {
        Grade::Good
      }
    }
  }

  /// Ranking quantity: `(0.7·R + 0.3·storage) · importance`.
  #[must_use]
  pub fn memory_score(retrievability: f64, storage_strength: f64, importance_weight: f64) -> f64 {
    (0.7 * retrievability + 0.3 * storage_strength) * importance_weight
  }
}
