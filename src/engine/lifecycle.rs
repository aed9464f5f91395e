use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::broadcast::{BroadcastSink, Room};
use crate::error::AppError;
use crate::models::notification::{NewNotification, NotificationType};
use crate::models::parcel::{
    CoordinateSample, Parcel, ParcelSize, ParcelStatus, ParcelType, TrackingLog,
};
use crate::models::user::{Role, UserSummary};
use crate::notify::Notifier;
use crate::observability::metrics::Metrics;
use crate::store::{ParcelFilter, Store};

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub pickup_address: String,
    pub delivery_address: String,
    pub parcel_type: ParcelType,
    pub parcel_size: ParcelSize,
    #[serde(default)]
    pub is_cod: bool,
    #[serde(default)]
    pub amount: f64,
    pub receiver_name: String,
    pub receiver_phone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    pub status: ParcelStatus,
    #[serde(default)]
    pub custom_status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub location: String,
    /// Version the caller read, for optimistic concurrency.
    #[serde(default)]
    pub expected_version: Option<u64>,
}

/// Read-only tracking projection.
#[derive(Debug, Clone, Serialize)]
pub struct TrackInfo {
    pub status: ParcelStatus,
    pub tracking_coordinates: Vec<CoordinateSample>,
}

/// Parcel with its owner and assigned agent joined in.
#[derive(Debug, Clone, Serialize)]
pub struct PopulatedParcel {
    #[serde(flatten)]
    pub parcel: Parcel,
    pub user: Option<UserSummary>,
    pub assigned_agent: Option<UserSummary>,
}

/// Owns every transition of a parcel through its life: booking, status
/// advancement, cancellation, location accumulation and the read paths.
pub struct LifecycleEngine {
    store: Arc<Store>,
    notifier: Arc<Notifier>,
    sink: Arc<dyn BroadcastSink>,
    metrics: Metrics,
    require_version: bool,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<Store>,
        notifier: Arc<Notifier>,
        sink: Arc<dyn BroadcastSink>,
        metrics: Metrics,
        require_version: bool,
    ) -> Self {
        Self {
            store,
            notifier,
            sink,
            metrics,
            require_version,
        }
    }

    pub fn create(&self, booking: BookingRequest, customer_id: Uuid) -> Result<Parcel, AppError> {
        for (field, value) in [
            ("pickup_address", &booking.pickup_address),
            ("delivery_address", &booking.delivery_address),
            ("receiver_name", &booking.receiver_name),
            ("receiver_phone", &booking.receiver_phone),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!("{field} is required")));
            }
        }

        if booking.is_cod && booking.amount <= 0.0 {
            return Err(AppError::Validation(
                "amount must be greater than 0 for COD parcels".to_string(),
            ));
        }

        let now = Utc::now();
        let parcel = Parcel {
            id: Uuid::new_v4(),
            user_id: customer_id,
            pickup_address: booking.pickup_address.trim().to_string(),
            delivery_address: booking.delivery_address.trim().to_string(),
            parcel_type: booking.parcel_type,
            parcel_size: booking.parcel_size,
            is_cod: booking.is_cod,
            amount: if booking.is_cod { booking.amount } else { 0.0 },
            receiver_name: booking.receiver_name.trim().to_string(),
            receiver_phone: booking.receiver_phone,
            status: ParcelStatus::Pending,
            cancel_reason: String::new(),
            assigned_agent_id: None,
            is_assigned: false,
            tracking_logs: vec![TrackingLog {
                custom_status: "Order Processing".to_string(),
                message: "Order received".to_string(),
                location: String::new(),
                timestamp: now,
            }],
            tracking_coordinates: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_parcel(parcel.clone());
        self.metrics.parcels_created_total.inc();

        self.notifier.emit(NewNotification {
            title: "New Parcel Booking".to_string(),
            description: "A new parcel has been booked.".to_string(),
            notification_type: NotificationType::NewParcel,
            user_id: None,
            receiver_role: Some(Role::Admin),
            send_to_all: false,
            target_id: Some(parcel.id),
        });

        info!(parcel_id = %parcel.id, customer_id = %customer_id, "parcel booked");
        Ok(parcel)
    }

    /// Advances the parcel through the forward-only status chain. Only the
    /// assigned agent may call this; `Cancelled` is reachable solely through
    /// [`LifecycleEngine::cancel`].
    pub fn update_status(
        &self,
        parcel_id: Uuid,
        update: StatusUpdate,
        acting_agent_id: Uuid,
    ) -> Result<Parcel, AppError> {
        if !matches!(
            update.status,
            ParcelStatus::PickedUp | ParcelStatus::InTransit | ParcelStatus::Delivered
        ) {
            return Err(AppError::Validation("invalid status value".to_string()));
        }

        self.check_version_required(update.expected_version)?;

        let (parcel, prior_status) = self.store.update_parcel(parcel_id, |parcel| {
            check_expected_version(parcel, update.expected_version)?;

            if parcel.assigned_agent_id != Some(acting_agent_id) {
                return Err(AppError::Forbidden(
                    "you are not assigned to this parcel".to_string(),
                ));
            }

            if !parcel.status.can_advance_to(update.status) {
                return Err(AppError::Conflict(format!(
                    "cannot move parcel from {:?} to {:?}",
                    parcel.status, update.status
                )));
            }

            let prior = parcel.status;
            parcel.status = update.status;
            parcel.tracking_logs.push(TrackingLog {
                custom_status: update.custom_status.clone(),
                message: update.message.clone(),
                location: update.location.clone(),
                timestamp: Utc::now(),
            });

            Ok((parcel.clone(), prior))
        })?;

        self.metrics
            .status_updates_total
            .with_label_values(&[&format!("{:?}", parcel.status)])
            .inc();

        if prior_status != parcel.status {
            self.notifier.emit(NewNotification {
                title: "Parcel Status Updated".to_string(),
                description: format!("Your parcel is now {:?}.", parcel.status),
                notification_type: NotificationType::ParcelStatusUpdated,
                user_id: Some(parcel.user_id),
                receiver_role: None,
                send_to_all: false,
                target_id: Some(parcel.id),
            });
        }

        info!(parcel_id = %parcel.id, status = ?parcel.status, "parcel status updated");
        Ok(parcel)
    }

    /// Cancellation is rejected, not absorbed, on a second attempt.
    pub fn cancel(
        &self,
        parcel_id: Uuid,
        reason: &str,
        requesting_user_id: Option<Uuid>,
        expected_version: Option<u64>,
    ) -> Result<Parcel, AppError> {
        if reason.trim().is_empty() {
            return Err(AppError::Validation("cancel reason is required".to_string()));
        }

        self.check_version_required(expected_version)?;

        let parcel = self.store.update_parcel(parcel_id, |parcel| {
            check_expected_version(parcel, expected_version)?;

            if let Some(user_id) = requesting_user_id
                && parcel.user_id != user_id
            {
                return Err(AppError::Forbidden(
                    "only the booking customer may cancel this parcel".to_string(),
                ));
            }

            if parcel.status == ParcelStatus::Cancelled {
                return Err(AppError::Conflict("parcel is already cancelled".to_string()));
            }
            if parcel.status == ParcelStatus::Delivered {
                return Err(AppError::Conflict(
                    "a delivered parcel cannot be cancelled".to_string(),
                ));
            }

            parcel.status = ParcelStatus::Cancelled;
            parcel.cancel_reason = reason.trim().to_string();
            Ok(parcel.clone())
        })?;

        self.metrics
            .status_updates_total
            .with_label_values(&["Cancelled"])
            .inc();

        info!(parcel_id = %parcel.id, "parcel cancelled");
        Ok(parcel)
    }

    /// Appends one GPS sample; the sequence is never compacted. Returns the
    /// full updated sequence.
    pub fn update_location(
        &self,
        parcel_id: Uuid,
        lat: f64,
        lng: f64,
        acting_agent_id: Uuid,
    ) -> Result<Vec<CoordinateSample>, AppError> {
        let sample = CoordinateSample {
            lat,
            lng,
            timestamp: Utc::now(),
        };

        let coordinates = self.store.update_parcel(parcel_id, |parcel| {
            if parcel.assigned_agent_id != Some(acting_agent_id) {
                return Err(AppError::Forbidden(
                    "you are not assigned to this parcel".to_string(),
                ));
            }
            parcel.tracking_coordinates.push(sample.clone());
            Ok(parcel.tracking_coordinates.clone())
        })?;

        self.metrics.location_updates_total.inc();
        self.sink.publish(
            Room::All,
            "locationUpdate",
            json!({
                "parcelId": parcel_id,
                "lat": sample.lat,
                "lng": sample.lng,
                "timestamp": sample.timestamp,
            }),
        );

        Ok(coordinates)
    }

    pub fn track(&self, parcel_id: Uuid) -> Result<TrackInfo, AppError> {
        let parcel = self
            .store
            .find_parcel(parcel_id)
            .ok_or_else(|| AppError::NotFound(format!("parcel {parcel_id} not found")))?;

        Ok(TrackInfo {
            status: parcel.status,
            tracking_coordinates: parcel.tracking_coordinates,
        })
    }

    pub fn get(&self, parcel_id: Uuid) -> Result<PopulatedParcel, AppError> {
        let parcel = self
            .store
            .find_parcel(parcel_id)
            .ok_or_else(|| AppError::NotFound(format!("parcel {parcel_id} not found")))?;

        Ok(self.populate(parcel))
    }

    pub fn list(&self, filter: ParcelFilter) -> Vec<PopulatedParcel> {
        self.store
            .list_parcels(filter)
            .into_iter()
            .map(|parcel| self.populate(parcel))
            .collect()
    }

    pub fn delete(&self, parcel_id: Uuid) -> Result<(), AppError> {
        let parcel = self.store.delete_parcel(parcel_id)?;
        info!(parcel_id = %parcel.id, "parcel deleted");
        Ok(())
    }

    fn populate(&self, parcel: Parcel) -> PopulatedParcel {
        let user = self
            .store
            .find_user(parcel.user_id)
            .map(|user| UserSummary::from(&user));
        let assigned_agent = parcel
            .assigned_agent_id
            .and_then(|id| self.store.find_user(id))
            .map(|user| UserSummary::from(&user));

        PopulatedParcel {
            parcel,
            user,
            assigned_agent,
        }
    }

    fn check_version_required(&self, expected_version: Option<u64>) -> Result<(), AppError> {
        if self.require_version && expected_version.is_none() {
            return Err(AppError::Validation(
                "expected_version is required".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_expected_version(parcel: &Parcel, expected: Option<u64>) -> Result<(), AppError> {
    if let Some(expected) = expected
        && parcel.version != expected
    {
        return Err(AppError::Conflict(format!(
            "parcel version is {}, caller expected {}",
            parcel.version, expected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;
    use uuid::Uuid;

    use super::{BookingRequest, LifecycleEngine, StatusUpdate};
    use crate::broadcast::{BroadcastSink, Room};
    use crate::error::AppError;
    use crate::models::notification::NotificationType;
    use crate::models::parcel::{ParcelSize, ParcelStatus, ParcelType};
    use crate::notify::Notifier;
    use crate::observability::metrics::Metrics;
    use crate::store::Store;

    struct NullSink;

    impl BroadcastSink for NullSink {
        fn publish(&self, _room: Room, _event: &str, _payload: Value) {}
    }

    fn engine_with(require_version: bool) -> (LifecycleEngine, Arc<Store>) {
        let store = Arc::new(Store::new());
        let sink: Arc<dyn BroadcastSink> = Arc::new(NullSink);
        let metrics = Metrics::new();
        let notifier = Arc::new(Notifier::new(store.clone(), sink.clone(), metrics.clone()));
        let engine = LifecycleEngine::new(
            store.clone(),
            notifier,
            sink,
            metrics,
            require_version,
        );
        (engine, store)
    }

    fn engine() -> (LifecycleEngine, Arc<Store>) {
        engine_with(false)
    }

    fn booking(is_cod: bool, amount: f64) -> BookingRequest {
        BookingRequest {
            pickup_address: "12 Station Rd".to_string(),
            delivery_address: "7 Mill Lane".to_string(),
            parcel_type: ParcelType::Box,
            parcel_size: ParcelSize::Medium,
            is_cod,
            amount,
            receiver_name: "Jamie".to_string(),
            receiver_phone: "01234 567890".to_string(),
        }
    }

    fn status(new: ParcelStatus) -> StatusUpdate {
        StatusUpdate {
            status: new,
            custom_status: String::new(),
            message: String::new(),
            location: String::new(),
            expected_version: None,
        }
    }

    fn assign(store: &Store, parcel_id: Uuid, agent_id: Uuid) {
        store
            .update_parcel(parcel_id, |parcel| {
                parcel.assigned_agent_id = Some(agent_id);
                parcel.is_assigned = true;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn non_cod_amount_is_forced_to_zero() {
        let (engine, _) = engine();
        let parcel = engine.create(booking(false, 999.0), Uuid::new_v4()).unwrap();
        assert_eq!(parcel.amount, 0.0);
        assert_eq!(parcel.status, ParcelStatus::Pending);
    }

    #[test]
    fn cod_requires_positive_amount() {
        let (engine, _) = engine();
        let err = engine.create(booking(true, 0.0), Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let (engine, _) = engine();
        let mut request = booking(false, 0.0);
        request.receiver_name = "  ".to_string();
        let err = engine.create(request, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn booking_seeds_tracking_log_and_notifies_admins() {
        let (engine, store) = engine();
        let parcel = engine.create(booking(true, 500.0), Uuid::new_v4()).unwrap();

        assert_eq!(parcel.tracking_logs.len(), 1);
        assert_eq!(parcel.tracking_logs[0].custom_status, "Order Processing");

        let notifications = store.list_notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(
            notifications[0].notification_type,
            NotificationType::NewParcel
        );
        assert_eq!(notifications[0].target_id, Some(parcel.id));
    }

    #[test]
    fn only_the_assigned_agent_may_update_status() {
        let (engine, store) = engine();
        let parcel = engine.create(booking(false, 0.0), Uuid::new_v4()).unwrap();
        assign(&store, parcel.id, Uuid::new_v4());

        let err = engine
            .update_status(parcel.id, status(ParcelStatus::PickedUp), Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn status_updates_append_logs_and_notify_the_customer() {
        let (engine, store) = engine();
        let customer = Uuid::new_v4();
        let agent = Uuid::new_v4();
        let parcel = engine.create(booking(true, 500.0), customer).unwrap();
        assign(&store, parcel.id, agent);

        let updated = engine
            .update_status(parcel.id, status(ParcelStatus::PickedUp), agent)
            .unwrap();
        assert_eq!(updated.status, ParcelStatus::PickedUp);
        assert_eq!(updated.tracking_logs.len(), 2);

        let updated = engine
            .update_status(parcel.id, status(ParcelStatus::Delivered), agent)
            .unwrap();
        assert_eq!(updated.status, ParcelStatus::Delivered);
        assert_eq!(updated.tracking_logs.len(), 3);

        let to_customer: Vec<_> = store
            .list_notifications()
            .into_iter()
            .filter(|n| {
                n.user_id == Some(customer)
                    && n.notification_type == NotificationType::ParcelStatusUpdated
            })
            .collect();
        assert_eq!(to_customer.len(), 2);
    }

    #[test]
    fn backward_status_moves_are_conflicts() {
        let (engine, store) = engine();
        let agent = Uuid::new_v4();
        let parcel = engine.create(booking(false, 0.0), Uuid::new_v4()).unwrap();
        assign(&store, parcel.id, agent);

        engine
            .update_status(parcel.id, status(ParcelStatus::InTransit), agent)
            .unwrap();

        let err = engine
            .update_status(parcel.id, status(ParcelStatus::PickedUp), agent)
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn pending_and_cancelled_are_not_valid_update_targets() {
        let (engine, store) = engine();
        let agent = Uuid::new_v4();
        let parcel = engine.create(booking(false, 0.0), Uuid::new_v4()).unwrap();
        assign(&store, parcel.id, agent);

        for target in [ParcelStatus::Pending, ParcelStatus::Cancelled] {
            let err = engine
                .update_status(parcel.id, status(target), agent)
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }

    #[test]
    fn cancel_sets_reason_and_double_cancel_conflicts() {
        let (engine, _) = engine();
        let customer = Uuid::new_v4();
        let parcel = engine.create(booking(false, 0.0), customer).unwrap();

        let cancelled = engine
            .cancel(parcel.id, "changed mind", Some(customer), None)
            .unwrap();
        assert_eq!(cancelled.status, ParcelStatus::Cancelled);
        assert_eq!(cancelled.cancel_reason, "changed mind");

        let err = engine
            .cancel(parcel.id, "changed mind", Some(customer), None)
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn cancel_requires_a_reason_and_ownership() {
        let (engine, _) = engine();
        let customer = Uuid::new_v4();
        let parcel = engine.create(booking(false, 0.0), customer).unwrap();

        let err = engine
            .cancel(parcel.id, "   ", Some(customer), None)
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = engine
            .cancel(parcel.id, "not mine", Some(Uuid::new_v4()), None)
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn cancel_without_caller_skips_the_ownership_check() {
        let (engine, _) = engine();
        let parcel = engine.create(booking(false, 0.0), Uuid::new_v4()).unwrap();

        let cancelled = engine
            .cancel(parcel.id, "undeliverable address", None, None)
            .unwrap();
        assert_eq!(cancelled.status, ParcelStatus::Cancelled);
    }

    #[test]
    fn location_updates_are_append_only_and_ordered() {
        let (engine, store) = engine();
        let agent = Uuid::new_v4();
        let parcel = engine.create(booking(false, 0.0), Uuid::new_v4()).unwrap();
        assign(&store, parcel.id, agent);

        for i in 0..4 {
            let coordinates = engine
                .update_location(parcel.id, 50.0 + i as f64, 7.0, agent)
                .unwrap();
            assert_eq!(coordinates.len(), i + 1);
        }

        let track = engine.track(parcel.id).unwrap();
        assert_eq!(track.tracking_coordinates.len(), 4);
        for (i, sample) in track.tracking_coordinates.iter().enumerate() {
            assert_eq!(sample.lat, 50.0 + i as f64);
        }
    }

    #[test]
    fn location_update_by_stranger_is_forbidden() {
        let (engine, store) = engine();
        let parcel = engine.create(booking(false, 0.0), Uuid::new_v4()).unwrap();
        assign(&store, parcel.id, Uuid::new_v4());

        let err = engine
            .update_location(parcel.id, 50.0, 7.0, Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn track_missing_parcel_is_not_found() {
        let (engine, _) = engine();
        let err = engine.track(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn stale_version_is_a_conflict() {
        let (engine, store) = engine();
        let agent = Uuid::new_v4();
        let parcel = engine.create(booking(false, 0.0), Uuid::new_v4()).unwrap();
        assign(&store, parcel.id, agent);

        let mut update = status(ParcelStatus::PickedUp);
        update.expected_version = Some(0);

        let err = engine
            .update_status(parcel.id, update, agent)
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn matching_version_is_accepted() {
        let (engine, store) = engine();
        let agent = Uuid::new_v4();
        let parcel = engine.create(booking(false, 0.0), Uuid::new_v4()).unwrap();
        assign(&store, parcel.id, agent);

        let current = store.find_parcel(parcel.id).unwrap().version;
        let mut update = status(ParcelStatus::PickedUp);
        update.expected_version = Some(current);

        let updated = engine.update_status(parcel.id, update, agent).unwrap();
        assert_eq!(updated.status, ParcelStatus::PickedUp);
    }

    #[test]
    fn strict_mode_requires_a_version() {
        let (engine, store) = engine_with(true);
        let agent = Uuid::new_v4();
        let parcel = engine.create(booking(false, 0.0), Uuid::new_v4()).unwrap();
        assign(&store, parcel.id, agent);

        let err = engine
            .update_status(parcel.id, status(ParcelStatus::PickedUp), agent)
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
