use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only reconciliation record linking a replaced memory to its
/// replacement. The old memory is demoted, never deleted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "memory_supersessions")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  pub old_memory_id: Uuid,
  pub new_memory_id: Uuid,
  pub user_id: String,
  pub reason: String,
  pub confidence: f64,
  pub details: Option<String>,
  pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
