use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VehicleType {
    #[serde(rename = "bike")]
    Bike,
    #[serde(rename = "car")]
    Car,
    #[serde(rename = "van")]
    Van,
    #[serde(rename = "cycle")]
    Cycle,
    #[serde(rename = "walk")]
    Walk,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AgentStatus {
    #[serde(rename = "available")]
    Available,
    #[serde(rename = "busy")]
    Busy,
    #[serde(rename = "offline")]
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLocation {
    pub lat: f64,
    pub lng: f64,
    pub updated_at: DateTime<Utc>,
}

/// Delivery-agent profile, 1:1 with a `User` whose role is `deliveryAgent`.
/// Created inside the role-promotion transaction, never auto-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub areas: Vec<String>,
    pub vehicle_type: VehicleType,
    pub agent_status: AgentStatus,
    /// Parcel ids currently assigned to this agent; set semantics.
    pub current_parcels: Vec<Uuid>,
    pub current_location: AgentLocation,
    pub rating: f64,
    pub experience_in_years: u32,
    pub joined_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            areas: Vec::new(),
            vehicle_type: VehicleType::Bike,
            agent_status: AgentStatus::Available,
            current_parcels: Vec::new(),
            current_location: AgentLocation {
                lat: 0.0,
                lng: 0.0,
                updated_at: now,
            },
            rating: 0.0,
            experience_in_years: 0,
            joined_at: now,
        }
    }
}
