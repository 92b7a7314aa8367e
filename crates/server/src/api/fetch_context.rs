use axum::{Json, extract::State};
use mnema_core::{MemoryContext, MemoryService};
use mnema_shared::AppError;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::utils::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct FetchContext {
  /// The incoming user message or search query
  pub query: String,
  /// Every identity linked to the current speaker; the first is the
  /// primary identity
  pub user_ids: Vec<String>,
}

fn validate(payload: &FetchContext) -> Result<(), AppError> {
  if payload.query.trim().is_empty() {
    return Err(AppError::bad_request("query cannot be empty"));
  }
  if payload.user_ids.is_empty() {
    return Err(AppError::bad_request("at least one user id is required"));
  }
  Ok(())
}

// --- Raw JSON endpoint ---

/// Fetch memory context as raw JSON
#[utoipa::path(
  post,
  path = "/api/v0/fetch_context/raw",
  request_body = FetchContext,
  responses(
    (status = 200, description = "Assembled memory context", body = MemoryContext),
    (status = 400, description = "Empty query or missing user ids")
  )
)]
#[axum::debug_handler]
pub async fn fetch_context_raw(
  State(state): State<AppState>,
  Json(payload): Json<FetchContext>,
) -> Result<Json<MemoryContext>, AppError> {
  validate(&payload)?;

  let context = state
    .service
    .fetch_context(&payload.query, &payload.user_ids)
    .await;

  Ok(Json(context))
}

// --- Prompt sections (markdown) endpoint ---

/// Fetch memory context rendered as prompt-ready markdown sections
#[utoipa::path(
  post,
  path = "/api/v0/fetch_context",
  request_body = FetchContext,
  responses(
    (status = 200, description = "Markdown sections, empty when nothing is known", body = String),
    (status = 400, description = "Empty query or missing user ids")
  )
)]
#[axum::debug_handler]
pub async fn fetch_context(
  State(state): State<AppState>,
  Json(payload): Json<FetchContext>,
) -> Result<String, AppError> {
  validate(&payload)?;

  let context = state
    .service
    .fetch_context(&payload.query, &payload.user_ids)
    .await;

  Ok(MemoryService::build_prompt_sections(&context).join("\n\n"))
}
