use sea_orm_migration::{
  prelude::*,
  schema::{double, small_integer, text, text_null, timestamp_with_time_zone, uuid},
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
          .table(MemoryAccessLog::Table)
          .if_not_exists()
          .col(uuid(MemoryAccessLog::Id).primary_key())
          .col(uuid(MemoryAccessLog::MemoryId).not_null())
          .col(text(MemoryAccessLog::UserId).not_null())
          .col(small_integer(MemoryAccessLog::Grade).not_null())
          .col(text(MemoryAccessLog::SignalType).not_null())
          .col(double(MemoryAccessLog::RetrievabilityAtAccess).not_null())
          .col(text_null(MemoryAccessLog::Context))
          .col(
            timestamp_with_time_zone(MemoryAccessLog::AccessedAt)
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
        "CREATE INDEX idx_memory_access_log_user_accessed ON memory_access_log (user_id, accessed_at);",
      ))
      .await?;

    manager
      .get_connection()
      .execute_raw(Statement::from_string(
        manager.get_database_backend(),
        "CREATE INDEX idx_memory_access_log_memory_id ON memory_access_log (memory_id);",
      ))
      .await?;

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(MemoryAccessLog::Table).to_owned())
      .await?;

    Ok(())
  }
}

#[derive(Iden)]
pub enum MemoryAccessLog {
  Table,

  Id,
  MemoryId,               // reviewed memory
  UserId,                 // identity the review was recorded under
  Grade,                  // 1 = again .. 4 = easy
  SignalType,             // e.g. used_in_response, contradiction_detected
  RetrievabilityAtAccess, // R computed before the state update
  Context,                // optional free text
  AccessedAt,
}
