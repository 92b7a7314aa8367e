use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Spaced-repetition state for one memory. One row per memory id.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "memory_dynamics")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub memory_id: Uuid,
  pub user_id: String,
  pub stability: f64,
  pub difficulty: f64,
  pub retrieval_strength: f64,
  pub storage_strength: f64,
  pub is_key: bool,
  pub importance_weight: f64,
  pub category: Option<String>,
  pub tags: Json,
  pub last_accessed_at: DateTimeWithTimeZone,
  pub access_count: i64,
  pub created_at: DateTimeWithTimeZone,
  pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
