use axum::{Json, extract::State, http::StatusCode};
use mnema_shared::AppError;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::utils::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddMessage {
  /// Primary identity of the speaker
  pub user_id: String,
  /// Channel the exchange happened in
  pub channel_id: String,
  /// What the user said
  pub user_message: String,
  /// What the assistant replied
  pub assistant_message: String,
}

/// Run the post-reply memory pipeline for one exchange
#[utoipa::path(
  post,
  path = "/api/v0/add_message",
  request_body = AddMessage,
  responses(
    (status = 200, description = "Exchange processed"),
    (status = 400, description = "Empty user message or user id")
  )
)]
#[axum::debug_handler]
#[tracing::instrument(skip(state, payload), fields(user_id = %payload.user_id))]
pub async fn add_message(
  State(state): State<AppState>,
  Json(payload): Json<AddMessage>,
) -> Result<StatusCode, AppError> {
  if payload.user_message.trim().is_empty() {
    return Err(AppError::bad_request("user message cannot be empty"));
  }
  if payload.user_id.trim().is_empty() {
    return Err(AppError::bad_request("user id cannot be empty"));
  }

  state
    .service
    .add(
      &payload.user_message,
      &payload.assistant_message,
      &payload.user_id,
      &payload.channel_id,
    )
    .await;

  Ok(StatusCode::OK)
}
