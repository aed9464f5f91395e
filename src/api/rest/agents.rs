use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};
use serde::Deserialize;

use crate::api::rest::Identity;
use crate::engine::accounts::{AgentProfileUpdate, PopulatedAgent};
use crate::error::AppError;
use crate::models::agent::Agent;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/agents", get(list_agents))
        .route("/agents/me", get(get_my_profile).patch(update_my_profile))
        .route("/agents/me/location", post(update_my_location))
}

async fn list_agents(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Vec<PopulatedAgent>>, AppError> {
    identity.require_admin()?;
    Ok(Json(state.accounts.list_agents()))
}

async fn get_my_profile(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<PopulatedAgent>, AppError> {
    Ok(Json(state.accounts.get_agent(identity.user_id)?))
}

async fn update_my_profile(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(payload): Json<AgentProfileUpdate>,
) -> Result<Json<Agent>, AppError> {
    let agent = state
        .accounts
        .update_agent_profile(identity.user_id, payload)?;
    Ok(Json(agent))
}

#[derive(Deserialize)]
pub struct AgentLocationRequest {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

async fn update_my_location(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(payload): Json<AgentLocationRequest>,
) -> Result<Json<Agent>, AppError> {
    let (Some(lat), Some(lng)) = (payload.lat, payload.lng) else {
        return Err(AppError::Validation(
            "latitude and longitude required".to_string(),
        ));
    };

    let agent = state
        .accounts
        .update_agent_location(identity.user_id, lat, lng)?;
    Ok(Json(agent))
}
