use sea_orm_migration::{
  prelude::*,
  schema::{double, text, text_null, timestamp_with_time_zone, uuid},
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
          .table(MemorySupersessions::Table)
          .if_not_exists()
          .col(uuid(MemorySupersessions::Id).primary_key())
          .col(uuid(MemorySupersessions::OldMemoryId).not_null())
          .col(uuid(MemorySupersessions::NewMemoryId).not_null())
          .col(text(MemorySupersessions::UserId).not_null())
          .col(text(MemorySupersessions::Reason).not_null())
          .col(double(MemorySupersessions::Confidence).not_null())
          .col(text_null(MemorySupersessions::Details))
          .col(
            timestamp_with_time_zone(MemorySupersessions::CreatedAt)
              .not_null()
              .default(Expr::current_timestamp()),
          )
          .to_owned(),
      )
      .await?;

    for sql in [
      "CREATE INDEX idx_memory_supersessions_old ON memory_supersessions (old_memory_id);",
      "CREATE INDEX idx_memory_supersessions_new ON memory_supersessions (new_memory_id);",
      "CREATE INDEX idx_memory_supersessions_user ON memory_supersessions (user_id);",
    ] {
      manager
        .get_connection()
        .execute_raw(Statement::from_string(manager.get_database_backend(), sql))
        .await?;
    }

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(MemorySupersessions::Table).to_owned())
      .await?;

    Ok(())
  }
}

#[derive(Iden)]
pub enum MemorySupersessions {
  Table,

  Id,
  OldMemoryId, // demoted, never deleted
  NewMemoryId, // replacement memory
  UserId,
  Reason,     // contradiction | update | correction
  Confidence, // [0, 1] from the contradiction verdict
  Details,    // optional explanation text
  CreatedAt,
}
