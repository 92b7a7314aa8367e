use std::sync::Arc;

use mnema_ai::{OpenAiChat, OpenAiEmbedder};
use mnema_core::store::{PgDynamicsStore, PgGraphStore, PgVectorStore};
use mnema_core::{MemoryProviders, MemoryService, store::GraphStore};
use mnema_migration::{Migrator, MigratorTrait};
use mnema_server::server;
use mnema_shared::{APP_ENV, AppError};
use sea_orm::Database;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), AppError> {
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .with(tracing_error::ErrorLayer::default())
    .init();

  let db = Database::connect(APP_ENV.database_url.as_str()).await?;

  // Apply all pending migrations
  // https://www.sea-ql.org/SeaORM/docs/migration/running-migration/#migrating-programmatically
  Migrator::up(&db, None).await?;

  let embedder = Arc::new(OpenAiEmbedder::new());
  let chat = Arc::new(OpenAiChat::new());
  let graph_store = Arc::new(PgGraphStore::new(db.clone(), chat.clone()));
  graph_store.ensure_schema().await?;

  let service = Arc::new(MemoryService::new(
    MemoryProviders {
      embedder,
      chat,
      vector_store: Arc::new(PgVectorStore::new(db.clone())),
      graph_store,
      dynamics_store: Arc::new(PgDynamicsStore::new(db)),
    },
    true,
  ));

  server(service).await
}
