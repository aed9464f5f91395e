use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::api::rest::Identity;
use crate::engine::accounts::NewUser;
use crate::error::AppError;
use crate::models::user::{Role, User};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", post(create_user).get(list_users))
        .route("/users/delivery-agents", get(list_delivery_agents))
        .route("/users/:id", get(get_user).delete(delete_user))
        .route("/users/:id/role", patch(make_role))
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewUser>,
) -> Result<Json<User>, AppError> {
    let user = state.accounts.create_user(payload)?;
    Ok(Json(user))
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Vec<User>>, AppError> {
    identity.require_admin()?;
    Ok(Json(state.accounts.list_users()))
}

async fn list_delivery_agents(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Vec<User>>, AppError> {
    identity.require_admin()?;
    Ok(Json(state.accounts.list_delivery_agents()))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    if identity.role != Role::Admin && identity.user_id != id {
        return Err(AppError::Forbidden(
            "you may only view your own profile".to_string(),
        ));
    }
    Ok(Json(state.accounts.get_user(id)?))
}

async fn delete_user(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    identity.require_admin()?;
    state.accounts.delete_user(id)?;
    Ok(Json(json!({ "message": "user deleted" })))
}

#[derive(Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

async fn make_role(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<RoleRequest>,
) -> Result<Json<User>, AppError> {
    identity.require_admin()?;
    let user = state.accounts.make_role(id, payload.role)?;
    Ok(Json(user))
}
