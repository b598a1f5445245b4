//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{extract::{Path, State}, http::StatusCode, Json, response::IntoResponse};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::domain::QuestionParams;
use crate::error::ApiError;
use crate::logic::{dispatch, run_task};
use crate::protocol::*;
use crate::session::Event;
use crate::state::{AppState, SessionHandle};

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, model: state.model.name().to_string(), sink: state.sink.name().to_string() })
}

/// `{ task, prompt?, code? }` -> `{ text }`, or 500 `{ error }`.
#[instrument(level = "info", skip(state, body), fields(task = ?body.task, prompt_len = body.prompt.as_deref().map_or(0, str::len)))]
pub async fn http_post_task(
  State(state): State<Arc<AppState>>,
  Json(body): Json<TaskRequest>,
) -> Result<Json<TaskOut>, ApiError> {
  match run_task(&state, &body).await {
    Ok(text) => {
      info!(target: "llm", task = ?body.task, text_len = text.len(), "HTTP task served");
      Ok(Json(TaskOut { text }))
    }
    Err(e) => {
      error!(target: "llm", task = ?body.task, error = %e, "HTTP task failed");
      Err(ApiError::Upstream)
    }
  }
}

async fn session(state: &AppState, id: &Uuid) -> Result<Arc<SessionHandle>, ApiError> {
  state.get_session(id).await.ok_or(ApiError::SessionNotFound)
}

#[instrument(level = "info", skip(state))]
pub async fn http_create_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let handle = state.create_session().await;
  (StatusCode::CREATED, Json(handle.view().await))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
  Ok(Json(session(&state, &id).await?.view().await))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  if state.remove_session(&id).await { Ok(StatusCode::NO_CONTENT) } else { Err(ApiError::SessionNotFound) }
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_generate(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  body: Option<Json<QuestionParams>>,
) -> Result<Json<SessionView>, ApiError> {
  let handle = session(&state, &id).await?;
  let params = body.map(|Json(p)| p).unwrap_or_default();
  Ok(Json(dispatch(&state, &handle, Event::Generate(params)).await?))
}

#[instrument(level = "info", skip(state, body), fields(code_len = body.code.len()))]
pub async fn http_put_code(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<CodeIn>,
) -> Result<Json<SessionView>, ApiError> {
  let handle = session(&state, &id).await?;
  Ok(Json(dispatch(&state, &handle, Event::EditCode(body.code)).await?))
}

#[instrument(level = "info", skip(state, body), fields(difficulty = ?body.difficulty))]
pub async fn http_put_difficulty(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<DifficultyIn>,
) -> Result<Json<SessionView>, ApiError> {
  let handle = session(&state, &id).await?;
  Ok(Json(dispatch(&state, &handle, Event::SetDifficulty(body.difficulty)).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_submit(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
  let handle = session(&state, &id).await?;
  let view = dispatch(&state, &handle, Event::Submit).await?;
  info!(target: "session", %id, "HTTP submission accepted");
  Ok(Json(view))
}

#[instrument(level = "info", skip(state))]
pub async fn http_toggle_panel(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
  let handle = session(&state, &id).await?;
  Ok(Json(dispatch(&state, &handle, Event::TogglePanel).await?))
}
