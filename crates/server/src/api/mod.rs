use axum::{
  Json, Router,
  routing::{get, post},
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::utils::AppState;

mod add_message;
mod fetch_context;
mod finalize_session;
mod promote_used;

pub use add_message::AddMessage;
pub use fetch_context::FetchContext;
pub use finalize_session::FinalizeSession;
pub use promote_used::PromoteUsed;

#[derive(OpenApi)]
#[openapi(
  info(
    title = "Mnema API",
    version = "0.1.0",
    description = "Persistent memory service for conversational assistants"
  ),
  paths(
    fetch_context::fetch_context,
    fetch_context::fetch_context_raw,
    add_message::add_message,
    finalize_session::finalize_session,
    promote_used::promote_used
  ),
  components(schemas(
    AddMessage,
    FetchContext,
    FinalizeSession,
    PromoteUsed,
    mnema_core::MemoryContext,
    mnema_core::MemoryRecord,
  ))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
  Json(ApiDoc::openapi())
}

pub fn app() -> Router<AppState> {
  Router::new()
    .route("/api/v0/fetch_context", post(fetch_context::fetch_context))
    .route(
      "/api/v0/fetch_context/raw",
      post(fetch_context::fetch_context_raw),
    )
    .route("/api/v0/add_message", post(add_message::add_message))
    .route(
      "/api/v0/finalize_session",
      post(finalize_session::finalize_session),
    )
    .route("/api/v0/promote_used", post(promote_used::promote_used))
    .route("/openapi.json", get(openapi_json))
    .merge(Scalar::with_url("/openapi/", ApiDoc::openapi()))
}
