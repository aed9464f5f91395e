use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "deliveryAgent")]
    DeliveryAgent,
    #[serde(rename = "customer")]
    Customer,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UserStatus {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "inactive")]
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub label: String,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    /// Opaque hash supplied by the excluded auth layer; never computed here.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub provider_id: Option<String>,
    /// Set semantics, maintained by the excluded login layer.
    pub ip_history: Vec<String>,
    /// Append-only.
    pub login_devices: Vec<String>,
    pub addresses: Vec<Address>,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

/// Populated reference projection used when listing parcels with their
/// owner/agent joined in.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}
