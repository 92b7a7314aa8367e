use sea_orm_migration::{
  prelude::*,
  schema::{custom, json_binary, timestamp_with_time_zone, uuid},
  sea_orm::Statement,
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .get_connection()
      .execute_raw(Statement::from_string(
        manager.get_database_backend(),
        "CREATE EXTENSION IF NOT EXISTS vector;",
      ))
      .await?;

    manager
      .create_table(
        Table::create()
          .table(MemoryVectors::Table)
          .if_not_exists()
          .col(uuid(MemoryVectors::Id).primary_key())
          .col(custom(MemoryVectors::Embedding, "vector(1024)").not_null())
          .col(json_binary(MemoryVectors::Payload).not_null())
          .col(
            timestamp_with_time_zone(MemoryVectors::CreatedAt)
              .not_null()
              .default(Expr::current_timestamp()),
          )
          .to_owned(),
      )
      .await?;

    // HNSW index for cosine similarity search
    manager
      .get_connection()
      .execute_raw(Statement::from_string(
        manager.get_database_backend(),
        "CREATE INDEX idx_memory_vectors_embedding ON memory_vectors USING hnsw (embedding vector_cosine_ops);",
      ))
      .await?;

    // Expression index over the user scope every read is filtered by
    manager
      .get_connection()
      .execute_raw(Statement::from_string(
        manager.get_database_backend(),
        "CREATE INDEX idx_memory_vectors_user_id ON memory_vectors ((payload->>'user_id'));",
      ))
      .await?;

    // Reads partitioned by kind (fact / emotional_context / topic_mention)
    manager
      .get_connection()
      .execute_raw(Statement::from_string(
        manager.get_database_backend(),
        "CREATE INDEX idx_memory_vectors_memory_type ON memory_vectors ((payload->>'memory_type'));",
      ))
      .await?;

    Ok(())
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(MemoryVectors::Table).to_owned())
      .await?;

    Ok(())
  }
}

#[derive(Iden)]
pub enum MemoryVectors {
  Table,

  Id,        // uuid v7
  Embedding, // vector(1024)
  Payload,   // reserved-key jsonb: data, user_id, memory_type, category, created_at, ...
  CreatedAt, // creation timestamp
}
