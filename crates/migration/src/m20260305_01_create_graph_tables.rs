use sea_orm_migration::{
  prelude::*,
  schema::{text, timestamp_with_time_zone, uuid},
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
          .table(GraphEntities::Table)
          .if_not_exists()
          .col(uuid(GraphEntities::Id).primary_key())
          .col(text(GraphEntities::Name).not_null())
          .col(text(GraphEntities::EntityType).not_null())
          .col(text(GraphEntities::UserId).not_null())
          .col(
            timestamp_with_time_zone(GraphEntities::CreatedAt)
              .not_null()
              .default(Expr::current_timestamp()),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(GraphRelationships::Table)
          .if_not_exists()
          .col(uuid(GraphRelationships::Id).primary_key())
          .col(text(GraphRelationships::SourceEntity).not_null())
          .col(text(GraphRelationships::Label).not_null())
          .col(text(GraphRelationships::TargetEntity).not_null())
          .col(text(GraphRelationships::UserId).not_null())
          .col(
            timestamp_with_time_zone(GraphRelationships::CreatedAt)
              .not_null()
              .default(Expr::current_timestamp()),
          )
          .to_owned(),
      )
      .await?;

    for sql in [
      // One node per (user, case-folded name); inserts race benignly via ON CONFLICT
      "CREATE UNIQUE INDEX idx_graph_entities_user_name ON graph_entities (user_id, lower(name));",
      "CREATE UNIQUE INDEX idx_graph_relationships_quad ON graph_relationships (user_id, source_entity, label, target_entity);",
      "CREATE INDEX idx_graph_relationships_source ON graph_relationships (user_id, source_entity);",
      "CREATE INDEX idx_graph_relationships_target ON graph_relationships (user_id, target_entity);",
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
      .drop_table(Table::drop().table(GraphRelationships::Table).to_owned())
      .await?;
    manager
      .drop_table(Table::drop().table(GraphEntities::Table).to_owned())
      .await?;

    Ok(())
  }
}

#[derive(Iden)]
pub enum GraphEntities {
  Table,

  Id,
  Name,       // matched case-insensitively by substring search
  EntityType, // person | place | thing | concept
  UserId,
  CreatedAt,
}

#[derive(Iden)]
pub enum GraphRelationships {
  Table,

  Id,
  SourceEntity, // entity name, not id; edges survive node dedup
  Label,        // sanitized to [A-Z0-9_]+
  TargetEntity,
  UserId,
  CreatedAt,
}
