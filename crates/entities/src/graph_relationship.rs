use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A directed labeled edge between two entity names, scoped to one
/// user. Labels are sanitized to `[A-Z0-9_]+` before insert.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "graph_relationships")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  pub source_entity: String,
  pub label: String,
  pub target_entity: String,
  pub user_id: String,
  pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
