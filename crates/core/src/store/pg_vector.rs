//! Postgres/pgvector adapter for [`VectorStore`]: cosine search via
//! the `<=>` operator, reserved-key payloads in jsonb.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mnema_entities::memory_vector;
use mnema_shared::AppError;
use sea_orm::{
  DatabaseConnection, DbBackend, EntityTrait, FromQueryResult, Set, Statement,
  prelude::PgVector,
  sea_query::{ArrayType, OnConflict, Value},
};
use uuid::Uuid;

use crate::memory::payload_keys;
use crate::store::{MemoryFilter, Payload, SearchHit, StoredMemory, VectorStore, retry_once};

pub struct PgVectorStore {
  db: DatabaseConnection,
}

impl PgVectorStore {
  #[must_use]
  pub const fn new(db: DatabaseConnection) -> Self {
    Self { db }
  }
}

#[derive(Debug, FromQueryResult)]
struct ScoredRow {
  id: Uuid,
  payload: serde_json::Value,
  created_at: sea_orm::prelude::DateTimeWithTimeZone,
  score: f64,
}

#[derive(Debug, FromQueryResult)]
struct PlainRow {
  id: Uuid,
  payload: serde_json::Value,
  created_at: sea_orm::prelude::DateTimeWithTimeZone,
}

fn stored_memory(id: Uuid, payload: serde_json::Value, created_at: DateTime<Utc>) -> StoredMemory {
  StoredMemory {
    id,
    payload: payload.as_object().cloned().unwrap_or_default(),
    created_at,
  }
}

fn user_array(user_ids: &[String]) -> Value {
  Value::Array(
    ArrayType::String,
    Some(Box::new(user_ids.iter().cloned().map(Into::into).collect())),
  )
}

/// Append the filter's predicates to `conditions`/`params`, numbering
/// placeholders from `params.len() + 1`.
fn push_filter_predicates(filter: &MemoryFilter, conditions: &mut Vec<String>, params: &mut Vec<Value>) {
  params.push(user_array(&filter.user_ids));
  conditions.push(format!("payload->>'user_id' = ANY(${})", params.len()));

  if let Some(memory_type) = filter.memory_type {
    params.push(memory_type.to_string().into());
    conditions.push(format!("payload->>'memory_type' = ${}", params.len()));
  }

  if let Some(is_key) = filter.is_key {
    params.push(is_key.to_string().into());
    conditions.push(format!(
      "COALESCE(payload->>'is_key', 'false') = ${}",
      params.len()
    ));
  }
}

#[async_trait]
impl VectorStore for PgVectorStore {
  async fn search(
    &self,
    embedding: &[f32],
    filter: &MemoryFilter,
    limit: u64,
  ) -> Result<Vec<SearchHit>, AppError> {
    if filter.user_ids.is_empty() {
      return Ok(Vec::new());
    }

    let mut params: Vec<Value> = vec![PgVector::from(embedding.to_vec()).into()];
    let mut conditions = Vec::new();
    push_filter_predicates(filter, &mut conditions, &mut params);
    params.push(i64::try_from(limit).unwrap_or(i64::MAX).into());

    let sql = format!(
      "SELECT id, payload, created_at, 1 - (embedding <=> $1) AS score \
       FROM memory_vectors \
       WHERE {} \
       ORDER BY embedding <=> $1 \
       LIMIT ${}",
      conditions.join(" AND "),
      params.len()
    );

    let statement = Statement::from_sql_and_values(DbBackend::Postgres, &sql, params);
    let rows = retry_once(|| {
      let statement = statement.clone();
      async move { Ok(ScoredRow::find_by_statement(statement).all(&self.db).await?) }
    })
    .await?;

    Ok(
      rows
        .into_iter()
        .map(|row| SearchHit {
          score: row.score,
          memory: stored_memory(row.id, row.payload, row.created_at.with_timezone(&Utc)),
        })
        .collect(),
    )
  }

  async fn insert(&self, id: Uuid, embedding: &[f32], payload: Payload) -> Result<(), AppError> {
    let created_at = payload
      .get(payload_keys::CREATED_AT)
      .and_then(serde_json::Value::as_str)
      .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
      .map_or_else(Utc::now, |parsed| parsed.with_timezone(&Utc));

    let model = memory_vector::ActiveModel {
      id: Set(id),
      embedding: Set(PgVector::from(embedding.to_vec())),
      payload: Set(serde_json::Value::Object(payload)),
      created_at: Set(created_at.into()),
    };

    memory_vector::Entity::insert(model)
      .on_conflict(
        OnConflict::column(memory_vector::Column::Id)
          .update_columns([
            memory_vector::Column::Embedding,
            memory_vector::Column::Payload,
          ])
          .to_owned(),
      )
      .exec_without_returning(&self.db)
      .await?;

    Ok(())
  }

  async fn delete(&self, id: Uuid) -> Result<(), AppError> {
    memory_vector::Entity::delete_by_id(id).exec(&self.db).await?;
    Ok(())
  }

  async fn get(&self, id: Uuid) -> Result<Option<StoredMemory>, AppError> {
    let model = memory_vector::Entity::find_by_id(id).one(&self.db).await?;
    Ok(model.map(|model| {
      stored_memory(model.id, model.payload, model.created_at.with_timezone(&Utc))
    }))
  }

  async fn get_all(
    &self,
    filter: &MemoryFilter,
    limit: u64,
  ) -> Result<Vec<StoredMemory>, AppError> {
    if filter.user_ids.is_empty() {
      return Ok(Vec::new());
    }

    let mut params: Vec<Value> = Vec::new();
    let mut conditions = Vec::new();
    push_filter_predicates(filter, &mut conditions, &mut params);
    params.push(i64::try_from(limit).unwrap_or(i64::MAX).into());

    let sql = format!(
      "SELECT id, payload, created_at \
       FROM memory_vectors \
       WHERE {} \
       ORDER BY created_at DESC \
       LIMIT ${}",
      conditions.join(" AND "),
      params.len()
    );

    let statement = Statement::from_sql_and_values(DbBackend::Postgres, &sql, params);
    let rows = retry_once(|| {
      let statement = statement.clone();
      async move { Ok(PlainRow::find_by_statement(statement).all(&self.db).await?) }
    })
    .await?;

    Ok(
      rows
        .into_iter()
        .map(|row| stored_memory(row.id, row.payload, row.created_at.with_timezone(&Utc)))
        .collect(),
    )
  }
}
