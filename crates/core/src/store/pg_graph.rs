//! Postgres adapter for [`GraphStore`]. Entities and relationships are
//! plain rows; edges reference entity names so node dedup never breaks
//! them. Rendered relations read `"A → LABEL → B"`.

use std::sync::Arc;

use async_trait::async_trait;
use mnema_ai::ChatModel;
use mnema_shared::AppError;
use sea_orm::{
  ConnectionTrait, DatabaseConnection, DbBackend, FromQueryResult, Statement,
  sea_query::{ArrayType, Value},
};
use uuid::Uuid;

use crate::extract::EntityExtractor;
use crate::store::{GraphStore, retry_once};

pub struct PgGraphStore {
  db: DatabaseConnection,
  extractor: EntityExtractor,
}

impl PgGraphStore {
  #[must_use]
  pub fn new(db: DatabaseConnection, llm: Arc<dyn ChatModel>) -> Self {
    Self {
      db,
      extractor: EntityExtractor::new(llm),
    }
  }
}

fn string_array(values: &[String]) -> Value {
  Value::Array(
    ArrayType::String,
    Some(Box::new(values.iter().cloned().map(Into::into).collect())),
  )
}

#[derive(Debug, FromQueryResult)]
struct NameRow {
  name: String,
}

#[derive(Debug, FromQueryResult)]
struct EdgeRow {
  source_entity: String,
  label: String,
  target_entity: String,
}

fn render_edge(edge: &EdgeRow) -> String {
  format!(
    "{} → {} → {}",
    edge.source_entity, edge.label, edge.target_entity
  )
}

#[async_trait]
impl GraphStore for PgGraphStore {
  async fn ensure_schema(&self) -> Result<(), AppError> {
    for sql in [
      "CREATE UNIQUE INDEX IF NOT EXISTS idx_graph_entities_user_name ON graph_entities (user_id, lower(name));",
      "CREATE INDEX IF NOT EXISTS idx_graph_relationships_source ON graph_relationships (user_id, source_entity);",
      "CREATE INDEX IF NOT EXISTS idx_graph_relationships_target ON graph_relationships (user_id, target_entity);",
    ] {
      self
        .db
        .execute_raw(Statement::from_string(DbBackend::Postgres, sql))
        .await?;
    }
    Ok(())
  }

  async fn add_entity_data(&self, text: &str, user_id: &str) -> Result<(), AppError> {
    let extraction = self.extractor.extract(text).await;
    if extraction.entities.is_empty() && extraction.relationships.is_empty() {
      return Ok(());
    }

    for entity in &extraction.entities {
      self
        .db
        .execute_raw(Statement::from_sql_and_values(
          DbBackend::Postgres,
          "INSERT INTO graph_entities (id, name, entity_type, user_id) \
           VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
          [
            Uuid::now_v7().into(),
            entity.name.clone().into(),
            entity.entity_type.clone().into(),
            user_id.into(),
          ],
        ))
        .await?;
    }

    for relationship in &extraction.relationships {
      self
        .db
        .execute_raw(Statement::from_sql_and_values(
          DbBackend::Postgres,
          "INSERT INTO graph_relationships (id, source_entity, label, target_entity, user_id) \
           VALUES ($1, $2, $3, $4, $5) ON CONFLICT DO NOTHING",
          [
            Uuid::now_v7().into(),
            relationship.source.clone().into(),
            relationship.label.clone().into(),
            relationship.target.clone().into(),
            user_id.into(),
          ],
        ))
        .await?;
    }

    tracing::debug!(
      user_id,
      entities = extraction.entities.len(),
      relationships = extraction.relationships.len(),
      "graph enriched"
    );
    Ok(())
  }

  async fn search_entities(
    &self,
    query: &str,
    user_ids: &[String],
    limit: u64,
  ) -> Result<Vec<String>, AppError> {
    if user_ids.is_empty() || query.trim().is_empty() {
      return Ok(Vec::new());
    }

    // Substring match in either direction: a short query inside an
    // entity name, or an entity name inside a long query.
    let statement = Statement::from_sql_and_values(
      DbBackend::Postgres,
      "SELECT name FROM graph_entities \
       WHERE user_id = ANY($1) \
         AND (name ILIKE '%' || $2 || '%' OR $2 ILIKE '%' || name || '%') \
       LIMIT 20",
      [string_array(user_ids), query.into()],
    );
    let names = retry_once(|| {
      let statement = statement.clone();
      async move { Ok(NameRow::find_by_statement(statement).all(&self.db).await?) }
    })
    .await?;

    if names.is_empty() {
      return Ok(Vec::new());
    }

    let matched: Vec<String> = names.into_iter().map(|row| row.name).collect();
    let statement = Statement::from_sql_and_values(
      DbBackend::Postgres,
      "SELECT source_entity, label, target_entity FROM graph_relationships \
       WHERE user_id = ANY($1) \
         AND (source_entity = ANY($2) OR target_entity = ANY($2)) \
       ORDER BY created_at DESC \
       LIMIT $3",
      [
        string_array(user_ids),
        string_array(&matched),
        i64::try_from(limit).unwrap_or(i64::MAX).into(),
      ],
    );
    let edges = retry_once(|| {
      let statement = statement.clone();
      async move { Ok(EdgeRow::find_by_statement(statement).all(&self.db).await?) }
    })
    .await?;

    Ok(edges.iter().map(render_edge).collect())
  }

  async fn get_all_relationships(
    &self,
    user_ids: &[String],
    limit: u64,
  ) -> Result<Vec<String>, AppError> {
    if user_ids.is_empty() {
      return Ok(Vec::new());
    }

    let statement = Statement::from_sql_and_values(
      DbBackend::Postgres,
      "SELECT source_entity, label, target_entity FROM graph_relationships \
       WHERE user_id = ANY($1) \
       ORDER BY created_at DESC \
       LIMIT $2",
      [
        string_array(user_ids),
        i64::try_from(limit).unwrap_or(i64::MAX).into(),
      ],
    );
    let edges = retry_once(|| {
      let statement = statement.clone();
      async move { Ok(EdgeRow::find_by_statement(statement).all(&self.db).await?) }
    })
    .await?;

    Ok(edges.iter().map(render_edge).collect())
  }
}
