use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only record of a graded review event. Never updated.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "memory_access_log")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  pub memory_id: Uuid,
  pub user_id: String,
  /// Grade ordinal: 1 = again, 2 = hard, 3 = good, 4 = easy.
  pub grade: i16,
  pub signal_type: String,
  pub retrievability_at_access: f64,
  pub context: Option<String>,
  pub accessed_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
