pub use sea_orm_migration::*;

mod m20260302_01_create_memory_vectors_table;
mod m20260302_02_create_memory_dynamics_table;
mod m20260302_03_create_memory_access_log_table;
mod m20260302_04_create_memory_supersessions_table;
mod m20260305_01_create_graph_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
  fn migrations() -> Vec<Box<dyn MigrationTrait>> {
    vec![
      Box::new(m20260302_01_create_memory_vectors_table::Migration),
      Box::new(m20260302_02_create_memory_dynamics_table::Migration),
      Box::new(m20260302_03_create_memory_access_log_table::Migration),
      Box::new(m20260302_04_create_memory_supersessions_table::Migration),
      Box::new(m20260305_01_create_graph_tables::Migration),
    ]
  }
}
