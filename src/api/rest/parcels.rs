use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::api::rest::Identity;
use crate::engine::lifecycle::{BookingRequest, PopulatedParcel, StatusUpdate, TrackInfo};
use crate::error::AppError;
use crate::models::parcel::{CoordinateSample, Parcel, ParcelStatus};
use crate::models::user::Role;
use crate::state::AppState;
use crate::store::ParcelFilter;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/parcels", post(create_parcel).get(get_all_parcels))
        .route("/parcels/my", get(get_my_parcels))
        .route("/parcels/assigned", get(get_assigned_parcels))
        .route("/parcels/unassigned", get(get_unassigned_parcels))
        .route("/parcels/status/:status", get(get_parcels_by_status))
        .route("/parcels/assign-bulk", post(assign_bulk))
        .route("/parcels/:id", get(get_parcel).delete(delete_parcel))
        .route("/parcels/:id/status", patch(update_status))
        .route("/parcels/:id/assign", post(assign_agent))
        .route("/parcels/:id/track", get(track_parcel))
        .route("/parcels/:id/location", patch(update_location))
        .route("/parcels/:id/cancel", post(cancel_parcel))
}

async fn create_parcel(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(payload): Json<BookingRequest>,
) -> Result<Json<Parcel>, AppError> {
    let parcel = state.lifecycle.create(payload, identity.user_id)?;
    Ok(Json(parcel))
}

async fn get_all_parcels(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Vec<PopulatedParcel>>, AppError> {
    identity.require_admin()?;
    Ok(Json(state.lifecycle.list(ParcelFilter::All)))
}

async fn get_my_parcels(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Vec<PopulatedParcel>>, AppError> {
    Ok(Json(
        state.lifecycle.list(ParcelFilter::Owner(identity.user_id)),
    ))
}

async fn get_assigned_parcels(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Vec<PopulatedParcel>>, AppError> {
    Ok(Json(
        state
            .lifecycle
            .list(ParcelFilter::AssignedAgent(identity.user_id)),
    ))
}

async fn get_unassigned_parcels(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Vec<PopulatedParcel>>, AppError> {
    identity.require_admin()?;
    Ok(Json(state.lifecycle.list(ParcelFilter::Unassigned)))
}

async fn get_parcels_by_status(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(status): Path<ParcelStatus>,
) -> Result<Json<Vec<PopulatedParcel>>, AppError> {
    if identity.role == Role::Customer {
        return Err(AppError::Forbidden(
            "admin or delivery agent access required".to_string(),
        ));
    }
    Ok(Json(state.lifecycle.list(ParcelFilter::Status(status))))
}

async fn get_parcel(
    State(state): State<Arc<AppState>>,
    _identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<PopulatedParcel>, AppError> {
    Ok(Json(state.lifecycle.get(id)?))
}

async fn delete_parcel(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    identity.require_admin()?;
    state.lifecycle.delete(id)?;
    Ok(Json(json!({ "message": "parcel deleted" })))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusUpdate>,
) -> Result<Json<Parcel>, AppError> {
    let parcel = state.lifecycle.update_status(id, payload, identity.user_id)?;
    Ok(Json(parcel))
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub agent_id: Uuid,
}

async fn assign_agent(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<Parcel>, AppError> {
    identity.require_admin()?;
    let parcel = state.assignment.assign_single(id, payload.agent_id)?;
    Ok(Json(parcel))
}

#[derive(Deserialize)]
pub struct BulkAssignRequest {
    pub parcel_ids: Vec<Uuid>,
    pub agent_id: Uuid,
}

async fn assign_bulk(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(payload): Json<BulkAssignRequest>,
) -> Result<Json<Value>, AppError> {
    identity.require_admin()?;
    let outcome = state
        .assignment
        .assign_bulk(&payload.parcel_ids, payload.agent_id)?;
    Ok(Json(json!({ "modified_count": outcome.modified_count })))
}

async fn track_parcel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TrackInfo>, AppError> {
    Ok(Json(state.lifecycle.track(id)?))
}

#[derive(Deserialize)]
pub struct LocationRequest {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<LocationRequest>,
) -> Result<Json<Vec<CoordinateSample>>, AppError> {
    let (Some(lat), Some(lng)) = (payload.lat, payload.lng) else {
        return Err(AppError::Validation(
            "latitude and longitude required".to_string(),
        ));
    };

    let coordinates = state
        .lifecycle
        .update_location(id, lat, lng, identity.user_id)?;
    Ok(Json(coordinates))
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: String,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

async fn cancel_parcel(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<Parcel>, AppError> {
    // Admins may cancel any parcel; everyone else only their own.
    let requesting_user = if identity.role == Role::Admin {
        None
    } else {
        Some(identity.user_id)
    };

    let parcel = state.lifecycle.cancel(
        id,
        &payload.reason,
        requesting_user,
        payload.expected_version,
    )?;
    Ok(Json(parcel))
}
