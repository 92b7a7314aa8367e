use axum::{Json, extract::State, http::StatusCode};
use mnema_shared::AppError;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::utils::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct FinalizeSession {
  pub user_id: String,
  pub channel_id: String,
  /// Optional topic to title the persisted session summary with
  #[serde(default)]
  pub topic: Option<String>,
}

/// Close a (user, channel) session and persist its emotional arc
#[utoipa::path(
  post,
  path = "/api/v0/finalize_session",
  request_body = FinalizeSession,
  responses(
    (status = 200, description = "Session finalized (or empty and simply cleared)"),
    (status = 400, description = "Empty user id")
  )
)]
#[axum::debug_handler]
pub async fn finalize_session(
  State(state): State<AppState>,
  Json(payload): Json<FinalizeSession>,
) -> Result<StatusCode, AppError> {
  if payload.user_id.trim().is_empty() {
    return Err(AppError::bad_request("user id cannot be empty"));
  }

  state
    .service
    .finalize_session(
      &payload.user_id,
      &payload.channel_id,
      payload.topic.as_deref(),
    )
    .await?;

  Ok(StatusCode::OK)
}
