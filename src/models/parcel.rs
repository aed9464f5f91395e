use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ParcelType {
    Envelope,
    Box,
    Fragile,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ParcelSize {
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ParcelStatus {
    Pending,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

impl ParcelStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ParcelStatus::Delivered | ParcelStatus::Cancelled)
    }

    /// Position in the forward delivery chain. `Cancelled` sits outside the
    /// chain and is only reachable through the cancel path.
    fn rank(self) -> Option<u8> {
        match self {
            ParcelStatus::Pending => Some(0),
            ParcelStatus::PickedUp => Some(1),
            ParcelStatus::InTransit => Some(2),
            ParcelStatus::Delivered => Some(3),
            ParcelStatus::Cancelled => None,
        }
    }

    /// Forward-only: a status may advance to any strictly later rank
    /// (skipping intermediate stops is allowed), never backwards, never out
    /// of a terminal state.
    pub fn can_advance_to(self, next: ParcelStatus) -> bool {
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }
}

/// One entry of the human-readable tracking history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingLog {
    pub custom_status: String,
    pub message: String,
    pub location: String,
    pub timestamp: DateTime<Utc>,
}

/// One raw GPS sample reported by the assigned agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinateSample {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parcel {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pickup_address: String,
    pub delivery_address: String,
    pub parcel_type: ParcelType,
    pub parcel_size: ParcelSize,
    pub is_cod: bool,
    pub amount: f64,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub status: ParcelStatus,
    pub cancel_reason: String,
    pub assigned_agent_id: Option<Uuid>,
    pub is_assigned: bool,
    pub tracking_logs: Vec<TrackingLog>,
    pub tracking_coordinates: Vec<CoordinateSample>,
    /// Optimistic concurrency counter, bumped on every store write.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::ParcelStatus::*;

    #[test]
    fn forward_moves_are_allowed_including_skips() {
        assert!(Pending.can_advance_to(PickedUp));
        assert!(Pending.can_advance_to(Delivered));
        assert!(PickedUp.can_advance_to(Delivered));
        assert!(InTransit.can_advance_to(Delivered));
    }

    #[test]
    fn backward_and_terminal_moves_are_rejected() {
        assert!(!InTransit.can_advance_to(PickedUp));
        assert!(!PickedUp.can_advance_to(PickedUp));
        assert!(!Delivered.can_advance_to(InTransit));
        assert!(!Cancelled.can_advance_to(PickedUp));
        assert!(!Pending.can_advance_to(Cancelled));
    }
}
