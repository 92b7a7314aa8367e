use sea_orm::entity::prelude::*;
use sea_orm::prelude::PgVector;

/// One stored memory: embedding plus the reserved-key payload.
/// The memory text itself lives in `payload.data`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "memory_vectors")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: Uuid,
  pub embedding: PgVector,
  pub payload: Json,
  pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
