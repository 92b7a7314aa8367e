//! Postgres adapter for [`DynamicsStore`]: one state row per memory,
//! append-only access log and supersession tables.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use mnema_entities::{memory_access_log, memory_dynamics, memory_supersession};
use mnema_shared::AppError;
use sea_orm::{
  ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, sea_query::OnConflict,
};
use serde_json::json;
use uuid::Uuid;

use crate::dynamics::{AccessEvent, SupersessionRecord};
use crate::fsrs::FsrsState;
use crate::store::{DynamicsStore, retry_once};

pub struct PgDynamicsStore {
  db: DatabaseConnection,
}

impl PgDynamicsStore {
  #[must_use]
  pub const fn new(db: DatabaseConnection) -> Self {
    Self { db }
  }
}

fn state_from_model(model: memory_dynamics::Model) -> FsrsState {
  FsrsState {
    stability: model.stability,
    difficulty: model.difficulty,
    retrieval_strength: model.retrieval_strength,
    storage_strength: model.storage_strength,
    last_accessed_at: model.last_accessed_at.with_timezone(&Utc),
    access_count: model.access_count,
    is_key: model.is_key,
    importance_weight: model.importance_weight,
    category: model.category.as_deref().and_then(|raw| raw.parse().ok()),
    tags: serde_json::from_value(model.tags).unwrap_or_default(),
  }
}

#[async_trait]
impl DynamicsStore for PgDynamicsStore {
  async fn get(
    &self,
    memory_id: Uuid,
    user_ids: &[String],
  ) -> Result<Option<FsrsState>, AppError> {
    let model = retry_once(|| async move {
      Ok(
        memory_dynamics::Entity::find()
          .filter(memory_dynamics::Column::MemoryId.eq(memory_id))
          .filter(memory_dynamics::Column::UserId.is_in(user_ids.to_vec()))
          .one(&self.db)
          .await?,
      )
    })
    .await?;
    Ok(model.map(state_from_model))
  }

  async fn batch_get(
    &self,
    memory_ids: &[Uuid],
    user_ids: &[String],
  ) -> Result<HashMap<Uuid, FsrsState>, AppError> {
    if memory_ids.is_empty() {
      return Ok(HashMap::new());
    }

    let models = retry_once(|| async move {
      Ok(
        memory_dynamics::Entity::find()
          .filter(memory_dynamics::Column::MemoryId.is_in(memory_ids.to_vec()))
          .filter(memory_dynamics::Column::UserId.is_in(user_ids.to_vec()))
          .all(&self.db)
          .await?,
      )
    })
    .await?;

    Ok(
      models
        .into_iter()
        .map(|model| (model.memory_id, state_from_model(model)))
        .collect(),
    )
  }

  async fn upsert(
    &self,
    memory_id: Uuid,
    user_id: &str,
    state: &FsrsState,
  ) -> Result<(), AppError> {
    let now = Utc::now();
    let model = memory_dynamics::ActiveModel {
      memory_id: Set(memory_id),
      user_id: Set(user_id.to_owned()),
      stability: Set(state.stability),
      difficulty: Set(state.difficulty),
      retrieval_strength: Set(state.retrieval_strength),
      storage_strength: Set(state.storage_strength),
      is_key: Set(state.is_key),
      importance_weight: Set(state.importance_weight),
      category: Set(state.category.map(|category| category.to_string())),
      tags: Set(json!(state.tags)),
      last_accessed_at: Set(state.last_accessed_at.into()),
      access_count: Set(state.access_count),
      created_at: Set(now.into()),
      updated_at: Set(now.into()),
    };

    memory_dynamics::Entity::insert(model)
      .on_conflict(
        OnConflict::column(memory_dynamics::Column::MemoryId)
          .update_columns([
            memory_dynamics::Column::UserId,
            memory_dynamics::Column::Stability,
            memory_dynamics::Column::Difficulty,
            memory_dynamics::Column::RetrievalStrength,
            memory_dynamics::Column::StorageStrength,
            memory_dynamics::Column::IsKey,
            memory_dynamics::Column::ImportanceWeight,
            memory_dynamics::Column::Category,
            memory_dynamics::Column::Tags,
            memory_dynamics::Column::LastAccessedAt,
            memory_dynamics::Column::AccessCount,
            memory_dynamics::Column::UpdatedAt,
          ])
          .to_owned(),
      )
      .exec_without_returning(&self.db)
      .await?;

    Ok(())
  }

  async fn append_access(&self, event: &AccessEvent) -> Result<(), AppError> {
    let model = memory_access_log::ActiveModel {
      id: Set(Uuid::now_v7()),
      memory_id: Set(event.memory_id),
      user_id: Set(event.user_id.clone()),
      grade: Set(i16::from(event.grade.ordinal())),
      signal_type: Set(event.signal_type.to_string()),
      retrievability_at_access: Set(event.retrievability_at_access),
      context: Set(None),
      accessed_at: Set(event.accessed_at.into()),
    };

    memory_access_log::Entity::insert(model)
      .exec_without_returning(&self.db)
      .await?;
    Ok(())
  }

  async fn record_supersession(&self, record: &SupersessionRecord) -> Result<(), AppError> {
    let model = memory_supersession::ActiveModel {
      id: Set(Uuid::now_v7()),
      old_memory_id: Set(record.old_memory_id),
      new_memory_id: Set(record.new_memory_id),
      user_id: Set(record.user_id.clone()),
      reason: Set(record.reason.to_string()),
      confidence: Set(record.confidence),
      details: Set(record.details.clone()),
      created_at: Set(Utc::now().into()),
    };

    memory_supersession::Entity::insert(model)
      .exec_without_returning(&self.db)
      .await?;
    Ok(())
  }
}
