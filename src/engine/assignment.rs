use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::notification::{NewNotification, NotificationType};
use crate::models::parcel::{Parcel, TrackingLog};
use crate::models::user::Role;
use crate::notify::Notifier;
use crate::observability::metrics::Metrics;
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct BulkAssignOutcome {
    pub modified_count: usize,
}

/// Assigns delivery agents to parcels and keeps the agent-side workload
/// bookkeeping (`current_parcels`) in step. The parcel write and the agent
/// set update are two independent writes; a crash between them leaves a
/// documented inconsistency window rather than a fatal error.
pub struct AssignmentCoordinator {
    store: Arc<Store>,
    notifier: Arc<Notifier>,
    metrics: Metrics,
}

impl AssignmentCoordinator {
    pub fn new(store: Arc<Store>, notifier: Arc<Notifier>, metrics: Metrics) -> Self {
        Self {
            store,
            notifier,
            metrics,
        }
    }

    /// Single and bulk assignment behave identically per parcel: both flag
    /// the parcel, log the assignment and notify the agent.
    pub fn assign_single(&self, parcel_id: Uuid, agent_id: Uuid) -> Result<Parcel, AppError> {
        self.require_delivery_agent(agent_id)?;

        if self.store.find_parcel(parcel_id).is_none() {
            return Err(AppError::NotFound(format!("parcel {parcel_id} not found")));
        }

        let modified = self.apply_assignment(parcel_id, agent_id)?;
        if modified {
            self.metrics.assignments_total.with_label_values(&["single"]).inc();
        }

        self.store
            .find_parcel(parcel_id)
            .ok_or_else(|| AppError::NotFound(format!("parcel {parcel_id} not found")))
    }

    /// Ids that match no parcel are skipped, not an error; re-assigning a
    /// parcel already held by the same agent is a no-op. Returns how many
    /// parcels actually changed.
    pub fn assign_bulk(
        &self,
        parcel_ids: &[Uuid],
        agent_id: Uuid,
    ) -> Result<BulkAssignOutcome, AppError> {
        if parcel_ids.is_empty() {
            return Err(AppError::Validation(
                "parcel_ids must be a non-empty list".to_string(),
            ));
        }

        self.require_delivery_agent(agent_id)?;

        let mut modified_count = 0;
        for &parcel_id in parcel_ids {
            if self.store.find_parcel(parcel_id).is_none() {
                continue;
            }
            if self.apply_assignment(parcel_id, agent_id)? {
                modified_count += 1;
            }
        }

        if modified_count > 0 {
            self.metrics.assignments_total.with_label_values(&["bulk"]).inc();
        }

        info!(agent_id = %agent_id, modified_count, "bulk assignment applied");
        Ok(BulkAssignOutcome { modified_count })
    }

    /// One parcel's worth of assignment: parcel flags + tracking log, then
    /// the agent's `current_parcels` set, then the notification. Returns
    /// false when the parcel was already assigned to this agent.
    fn apply_assignment(&self, parcel_id: Uuid, agent_id: Uuid) -> Result<bool, AppError> {
        let modified = self.store.update_parcel(parcel_id, |parcel| {
            if parcel.is_assigned && parcel.assigned_agent_id == Some(agent_id) {
                return Ok(false);
            }

            parcel.assigned_agent_id = Some(agent_id);
            parcel.is_assigned = true;
            parcel.tracking_logs.push(TrackingLog {
                custom_status: "Agent Assigned".to_string(),
                message: "A delivery agent has been assigned to this parcel.".to_string(),
                location: String::new(),
                timestamp: Utc::now(),
            });
            Ok(true)
        })?;

        if !modified {
            return Ok(false);
        }

        // Set semantics: the id is added at most once.
        let bookkeeping = self.store.update_agent_by_user(agent_id, |agent| {
            if !agent.current_parcels.contains(&parcel_id) {
                agent.current_parcels.push(parcel_id);
            }
            Ok(())
        });
        if let Err(err) = bookkeeping {
            warn!(agent_id = %agent_id, parcel_id = %parcel_id, error = %err,
                "parcel assigned but agent bookkeeping failed");
        }

        self.notifier.emit(NewNotification {
            title: "New Parcel Assigned".to_string(),
            description: "A parcel has been assigned to you.".to_string(),
            notification_type: NotificationType::NewParcel,
            user_id: Some(agent_id),
            receiver_role: None,
            send_to_all: false,
            target_id: Some(parcel_id),
        });

        Ok(true)
    }

    fn require_delivery_agent(&self, agent_id: Uuid) -> Result<(), AppError> {
        match self.store.find_user(agent_id) {
            Some(user) if user.role == Role::DeliveryAgent => Ok(()),
            _ => Err(AppError::Validation("invalid delivery agent".to_string())),
        }
    }
}
