use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::Role;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationType {
    #[serde(rename = "new_parcel")]
    NewParcel,
    #[serde(rename = "parcel_status_updated")]
    ParcelStatusUpdated,
    #[serde(rename = "payment_received")]
    PaymentReceived,
    #[serde(rename = "user_registered")]
    UserRegistered,
    #[serde(rename = "support")]
    Support,
    #[serde(rename = "custom")]
    Custom,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::NewParcel => "new_parcel",
            NotificationType::ParcelStatusUpdated => "parcel_status_updated",
            NotificationType::PaymentReceived => "payment_received",
            NotificationType::UserRegistered => "user_registered",
            NotificationType::Support => "support",
            NotificationType::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub notification_type: NotificationType,
    /// Direct recipient; `None` means role- or all-targeted.
    pub user_id: Option<Uuid>,
    pub receiver_role: Option<Role>,
    pub send_to_all: bool,
    /// Legacy flag; `read_by` is the authoritative per-reader record.
    pub is_read: bool,
    pub read_by: Vec<Uuid>,
    /// Entity the notification points at (usually a parcel id).
    pub target_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Everything the caller supplies when emitting; id, read state and
/// timestamp are filled in by the emitter.
#[derive(Debug, Clone, Deserialize)]
pub struct NewNotification {
    pub title: String,
    pub description: String,
    pub notification_type: NotificationType,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub receiver_role: Option<Role>,
    #[serde(default)]
    pub send_to_all: bool,
    #[serde(default)]
    pub target_id: Option<Uuid>,
}
