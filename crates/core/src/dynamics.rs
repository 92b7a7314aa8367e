//! Bridges the pure [`Fsrs`] scheduler to persistence: state rows,
//! the append-only access log, and supersession records.
//!
//! Failure policy: reads degrade to defaults (state is recomputable
//! from future reviews); writes are best-effort and logged. Scoring
//! must keep working with a cold or unavailable dynamics store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::fsrs::{Fsrs, FsrsState, FsrsWeights, Grade, SignalType};
use crate::memory::SupersessionReason;
use crate::store::DynamicsStore;

/// One graded review event, as appended to the access log.
#[derive(Debug, Clone)]
pub struct AccessEvent {
  pub memory_id: Uuid,
  pub user_id: String,
  pub grade: Grade,
  pub signal_type: SignalType,
  pub retrievability_at_access: f64,
  pub accessed_at: DateTime<Utc>,
}

/// One supersession, linking a demoted memory to its replacement.
#[derive(Debug, Clone)]
pub struct SupersessionRecord {
  pub old_memory_id: Uuid,
  pub new_memory_id: Uuid,
  pub user_id: String,
  pub reason: SupersessionReason,
  pub confidence: f64,
  pub details: Option<String>,
}

pub struct MemoryDynamics {
  fsrs: Fsrs,
  store: Arc<dyn DynamicsStore>,
}

impl MemoryDynamics {
  #[must_use]
  pub fn new(store: Arc<dyn DynamicsStore>) -> Self {
    Self {
      fsrs: Fsrs::default(),
      store,
    }
  }

  #[must_use]
  pub fn with_weights(store: Arc<dyn DynamicsStore>, weights: FsrsWeights) -> Self {
    Self {
      fsrs: Fsrs::new(weights),
      store,
    }
  }

  #[must_use]
  pub const fn fsrs(&self) -> &Fsrs {
    &self.fsrs
  }

  /// Persisted state for any of the linked identities, or transient
  /// defaults (persisted on first write).
  pub async fn get_or_create(&self, memory_id: Uuid, user_ids: &[String]) -> FsrsState {
    match self.store.get(memory_id, user_ids).await {
      Ok(Some(state)) => state,
      Ok(None) => FsrsState::new(Utc::now()),
      Err(err) => {
        tracing::warn!(memory_id = %memory_id, error = %err, "dynamics read failed, using defaults");
        FsrsState::new(Utc::now())
      }
    }
  }

  /// Write the initial state for a freshly created memory.
  pub async fn initialize(&self, memory_id: Uuid, user_id: &str, state: &FsrsState) {
    if let Err(err) = self.store.upsert(memory_id, user_id, state).await {
      tracing::warn!(memory_id = %memory_id, error = %err, "dynamics init write failed");
    }
  }

  /// Apply one graded review: read state, compute retrievability at
  /// access, update via FSRS, write back under the primary identity,
  /// and append an access-log event.
  pub async fn promote(
    &self,
    memory_id: Uuid,
    user_ids: &[String],
    grade: Grade,
    signal_type: SignalType,
  ) -> FsrsState {
    let now = Utc::now();
    let state = self.get_or_create(memory_id, user_ids).await;
    let outcome = self.fsrs.review(&state, grade, now);

    let Some(primary) = user_ids.first() else {
      tracing::warn!(memory_id = %memory_id, "promote called with no identities, state not persisted");
      return outcome.state;
    };

    if let Err(err) = self.store.upsert(memory_id, primary, &outcome.state).await {
      tracing::warn!(memory_id = %memory_id, error = %err, "dynamics write failed");
    }

    let event = AccessEvent {
      memory_id,
      user_id: primary.clone(),
      grade,
      signal_type,
      retrievability_at_access: outcome.retrievability_before,
      accessed_at: now,
    };
    if let Err(err) = self.store.append_access(&event).await {
      tracing::warn!(memory_id = %memory_id, error = %err, "access log append failed");
    }

    outcome.state
  }

  /// Demotion is a failed review attributed to a detected
  /// contradiction.
  pub async fn demote(&self, memory_id: Uuid, user_ids: &[String]) -> FsrsState {
    self
      .promote(
        memory_id,
        user_ids,
        Grade::Again,
        SignalType::ContradictionDetected,
      )
      .await
  }

  /// States for many memories at once. Missing or unreadable rows come
  /// back as defaults so every requested id is present in the map.
  pub async fn batch_get(
    &self,
    memory_ids: &[Uuid],
    user_ids: &[String],
  ) -> HashMap<Uuid, FsrsState> {
    let mut states = match self.store.batch_get(memory_ids, user_ids).await {
      Ok(states) => states,
      Err(err) => {
        tracing::warn!(error = %err, "dynamics batch read failed, using defaults");
        HashMap::new()
      }
    };

    let now = Utc::now();
    for id in memory_ids {
      states.entry(*id).or_insert_with(|| FsrsState::new(now));
    }
    states
  }

  pub async fn record_supersession(&self, record: SupersessionRecord) {
    if let Err(err) = self.store.record_supersession(&record).await {
      tracing::warn!(
        old_memory_id = %record.old_memory_id,
        new_memory_id = %record.new_memory_id,
        error = %err,
        "supersession write failed"
      );
    }
  }
}
