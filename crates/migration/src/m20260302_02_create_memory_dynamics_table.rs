use sea_orm_migration::{
  prelude::*,
  schema::{
    big_integer, boolean, double, json_binary, text, text_null, timestamp_with_time_zone, uuid,
  },
  sea_orm::Statement,
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(MemoryDynamics::Table)
          .if_not_exists()
          .col(uuid(MemoryDynamics::MemoryId).primary_key())
          .col(text(MemoryDynamics::UserId).not_null())
          .col(double(MemoryDynamics::Stability).not_null().default(1.0))
          .col(double(MemoryDynamics::Difficulty).not_null().default(5.0))
          .col(
            double(MemoryDynamics::RetrievalStrength)
              .not_null()
              .default(1.0),
          )
          .col(
            double(MemoryDynamics::StorageStrength)
              .not_null()
              .default(0.5),
          )
          .col(boolean(MemoryDynamics::IsKey).not_null().default(false))
          .col(
            double(MemoryDynamics::ImportanceWeight)
              .not_null()
              .default(1.0),
          )
          .col(text_null(MemoryDynamics::Category))
          .col(json_binary(MemoryDynamics::Tags).not_null())
          .col(timestamp_with_time_zone(MemoryDynamics::LastAccessedAt).not_null())
          .col(big_integer(MemoryDynamics::AccessCount).not_null().default(0))
          .col(
            timestamp_with_time_zone(MemoryDynamics::CreatedAt)
              .not_null()
              .default(Expr::current_timestamp()),
          )
          .col(
            timestamp_with_time_zone(MemoryDynamics::UpdatedAt)
              .not_null()
              .default(Expr::current_timestamp()),
          )
          .to_owned(),
      )
      .await?;

    manager
      .get_connection()
      .execute_raw(Statement::from_string(
        manager.get_database_backend(),
        "CREATE INDEX idx_memory_dynamics_user_accessed ON memory_dynamics (user_id, last_accessed_at);",
      ))
      .await?;

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(MemoryDynamics::Table).to_owned())
      .await?;

    Ok(())
  }
}

#[derive(Iden)]
pub enum MemoryDynamics {
  Table,

  MemoryId,          // uuid, same id as the vector row
  UserId,            // owning identity (writes always use the primary id)
  Stability,         // days at which retrievability ~= 0.9
  Difficulty,        // [1, 10]
  RetrievalStrength, // short-term strength, decays between reviews
  StorageStrength,   // long-term strength, only grows
  IsKey,             // always-retrieved flag
  ImportanceWeight,  // multiplier on the memory score
  Category,          // optional closed-set category
  Tags,              // jsonb array of strings
  LastAccessedAt,    // last review timestamp
  AccessCount,       // monotonically increasing review counter
  CreatedAt,
  UpdatedAt,
}
