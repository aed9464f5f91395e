pub mod agents;
pub mod notifications;
pub mod parcels;
pub mod users;
pub mod ws;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::user::Role;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(parcels::router())
        .merge(users::router())
        .merge(agents::router())
        .merge(notifications::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Pre-validated caller identity resolved by the excluded auth layer and
/// forwarded as headers. The core only does authorization against data it
/// owns, never authentication.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role != Role::Admin {
            return Err(AppError::Forbidden("admin access required".to_string()));
        }
        Ok(())
    }
}

fn parse_role(raw: &str) -> Option<Role> {
    match raw {
        "admin" => Some(Role::Admin),
        "deliveryAgent" => Some(Role::DeliveryAgent),
        "customer" => Some(Role::Customer),
        _ => None,
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or_else(|| AppError::Validation("missing or invalid x-user-id".to_string()))?;

        let role = parts
            .headers
            .get("x-user-role")
            .and_then(|value| value.to_str().ok())
            .and_then(parse_role)
            .ok_or_else(|| AppError::Validation("missing or invalid x-user-role".to_string()))?;

        Ok(Identity { user_id, role })
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    users: usize,
    agents: usize,
    parcels: usize,
    notifications: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (users, agents, parcels, notifications) = state.store.counts();
    Json(HealthResponse {
        status: "ok",
        users,
        agents,
        parcels,
        notifications,
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
