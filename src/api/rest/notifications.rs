use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::api::rest::Identity;
use crate::error::AppError;
use crate::models::notification::{NewNotification, Notification};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications", get(list_unread).post(emit))
        .route("/notifications/read-all", post(read_all))
        .route("/notifications/:id/read", post(mark_read))
}

async fn list_unread(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Vec<Notification>>, AppError> {
    Ok(Json(
        state.notifier.list_unread(identity.user_id, identity.role),
    ))
}

async fn emit(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(payload): Json<NewNotification>,
) -> Result<Json<Notification>, AppError> {
    identity.require_admin()?;
    Ok(Json(state.notifier.emit(payload)))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    state.notifier.mark_read(id, identity.user_id)?;
    Ok(Json(json!({ "message": "marked as read" })))
}

async fn read_all(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Value>, AppError> {
    let marked = state
        .notifier
        .mark_all_read(identity.user_id, identity.role)?;
    Ok(Json(json!({ "message": "marked as read", "count": marked })))
}
