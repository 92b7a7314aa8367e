use axum::{Json, extract::State, http::StatusCode};
use mnema_shared::AppError;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::utils::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct PromoteUsed {
  /// Memories that were referenced in a produced reply
  pub memory_ids: Vec<Uuid>,
  /// Every identity linked to the speaker; the first is the primary
  pub user_ids: Vec<String>,
}

/// Grade referenced memories as successfully recalled
#[utoipa::path(
  post,
  path = "/api/v0/promote_used",
  request_body = PromoteUsed,
  responses(
    (status = 200, description = "Memories promoted"),
    (status = 400, description = "Missing user ids")
  )
)]
#[axum::debug_handler]
pub async fn promote_used(
  State(state): State<AppState>,
  Json(payload): Json<PromoteUsed>,
) -> Result<StatusCode, AppError> {
  if payload.user_ids.is_empty() {
    return Err(AppError::bad_request("at least one user id is required"));
  }

  state
    .service
    .promote_used(&payload.memory_ids, &payload.user_ids)
    .await;

  Ok(StatusCode::OK)
}
