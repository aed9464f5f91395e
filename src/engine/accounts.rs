use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::broadcast::{BroadcastSink, Room};
use crate::error::AppError;
use crate::models::agent::{Agent, AgentStatus, VehicleType};
use crate::models::notification::{NewNotification, NotificationType};
use crate::models::user::{Address, Role, User, UserStatus, UserSummary};
use crate::notify::Notifier;
use crate::observability::metrics::Metrics;
use crate::store::Store;

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    /// Already hashed by the excluded auth layer.
    pub password_hash: String,
    pub role: Role,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub addresses: Vec<Address>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentProfileUpdate {
    #[serde(default)]
    pub areas: Option<Vec<String>>,
    #[serde(default)]
    pub vehicle_type: Option<VehicleType>,
    #[serde(default)]
    pub agent_status: Option<AgentStatus>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub experience_in_years: Option<u32>,
}

/// Agent profile with its owning user joined in.
#[derive(Debug, Clone, Serialize)]
pub struct PopulatedAgent {
    #[serde(flatten)]
    pub agent: Agent,
    pub user: Option<UserSummary>,
}

/// User directory plus agent-profile management, including the
/// role-promotion path that must keep User and Agent 1:1.
pub struct AccountsService {
    store: Arc<Store>,
    notifier: Arc<Notifier>,
    sink: Arc<dyn BroadcastSink>,
    metrics: Metrics,
}

impl AccountsService {
    pub fn new(
        store: Arc<Store>,
        notifier: Arc<Notifier>,
        sink: Arc<dyn BroadcastSink>,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            notifier,
            sink,
            metrics,
        }
    }

    pub fn create_user(&self, new: NewUser) -> Result<User, AppError> {
        if new.name.trim().is_empty() || new.email.trim().is_empty() {
            return Err(AppError::Validation("name and email are required".to_string()));
        }

        let user = User {
            id: Uuid::new_v4(),
            name: new.name.trim().to_string(),
            email: new.email.trim().to_string(),
            phone: new.phone,
            password_hash: new.password_hash,
            role: new.role,
            provider_id: new.provider_id,
            ip_history: Vec::new(),
            login_devices: Vec::new(),
            addresses: new.addresses,
            status: UserStatus::Active,
            created_at: Utc::now(),
        };

        self.store.insert_user(user.clone())?;

        // Registering directly as a delivery agent still gets a profile,
        // same as promotion.
        if user.role == Role::DeliveryAgent {
            self.store.insert_agent(Agent::new(user.id))?;
        }

        self.notifier.emit(NewNotification {
            title: "New User Registered".to_string(),
            description: format!("{} has joined.", user.name),
            notification_type: NotificationType::UserRegistered,
            user_id: None,
            receiver_role: Some(Role::Admin),
            send_to_all: false,
            target_id: Some(user.id),
        });

        info!(user_id = %user.id, role = ?user.role, "user created");
        Ok(user)
    }

    pub fn get_user(&self, id: Uuid) -> Result<User, AppError> {
        self.store
            .find_user(id)
            .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))
    }

    pub fn list_users(&self) -> Vec<User> {
        self.store.list_users()
    }

    pub fn list_delivery_agents(&self) -> Vec<User> {
        self.store.list_users_by_role(Role::DeliveryAgent)
    }

    pub fn delete_user(&self, id: Uuid) -> Result<User, AppError> {
        self.store.delete_user(id)
    }

    /// Role change with the companion Agent record created in the same
    /// logical transaction. The agent insert happens first and is removed
    /// again if the role write fails, so the 1:1 User-Agent invariant holds
    /// across any mid-sequence failure.
    pub fn make_role(&self, user_id: Uuid, role: Role) -> Result<User, AppError> {
        if self.store.find_user(user_id).is_none() {
            return Err(AppError::NotFound(format!("user {user_id} not found")));
        }

        let needs_agent =
            role == Role::DeliveryAgent && self.store.find_agent_by_user(user_id).is_none();

        if role == Role::DeliveryAgent && !needs_agent {
            return Err(AppError::Conflict(
                "user already has an agent profile".to_string(),
            ));
        }

        if needs_agent {
            self.store.insert_agent(Agent::new(user_id))?;
        }

        let updated = self.store.update_user(user_id, |user| {
            user.role = role;
            Ok(user.clone())
        });

        match updated {
            Ok(user) => {
                info!(user_id = %user_id, role = ?role, "user role updated");
                Ok(user)
            }
            Err(err) => {
                // Compensation: never leave an agent record without the role.
                if needs_agent {
                    self.store.remove_agent_by_user(user_id);
                }
                Err(err)
            }
        }
    }

    pub fn get_agent(&self, user_id: Uuid) -> Result<PopulatedAgent, AppError> {
        let agent = self
            .store
            .find_agent_by_user(user_id)
            .ok_or_else(|| AppError::NotFound("agent profile not found".to_string()))?;
        Ok(self.populate(agent))
    }

    pub fn list_agents(&self) -> Vec<PopulatedAgent> {
        self.store
            .list_agents()
            .into_iter()
            .map(|agent| self.populate(agent))
            .collect()
    }

    pub fn update_agent_profile(
        &self,
        user_id: Uuid,
        update: AgentProfileUpdate,
    ) -> Result<Agent, AppError> {
        self.store.update_agent_by_user(user_id, |agent| {
            if let Some(areas) = update.areas.clone() {
                agent.areas = areas;
            }
            if let Some(vehicle_type) = update.vehicle_type {
                agent.vehicle_type = vehicle_type;
            }
            if let Some(status) = update.agent_status {
                agent.agent_status = status;
            }
            if let Some(rating) = update.rating {
                agent.rating = rating.clamp(0.0, 5.0);
            }
            if let Some(years) = update.experience_in_years {
                agent.experience_in_years = years;
            }
            Ok(agent.clone())
        })
    }

    /// Stores the agent's own position and broadcasts it globally; the
    /// payload goes out verbatim, no interpolation.
    pub fn update_agent_location(
        &self,
        user_id: Uuid,
        lat: f64,
        lng: f64,
    ) -> Result<Agent, AppError> {
        let agent = self.store.update_agent_by_user(user_id, |agent| {
            agent.current_location.lat = lat;
            agent.current_location.lng = lng;
            agent.current_location.updated_at = Utc::now();
            Ok(agent.clone())
        })?;

        self.metrics.location_updates_total.inc();
        self.sink.publish(
            Room::All,
            "agentLocationUpdate",
            json!({
                "agentId": user_id,
                "lat": lat,
                "lng": lng,
                "updatedAt": agent.current_location.updated_at,
            }),
        );

        Ok(agent)
    }

    fn populate(&self, agent: Agent) -> PopulatedAgent {
        let user = self
            .store
            .find_user(agent.user_id)
            .map(|user| UserSummary::from(&user));
        PopulatedAgent { agent, user }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;
    use uuid::Uuid;

    use super::{AccountsService, AgentProfileUpdate, NewUser};
    use crate::broadcast::{BroadcastSink, Room};
    use crate::error::AppError;
    use crate::models::user::Role;
    use crate::notify::Notifier;
    use crate::observability::metrics::Metrics;
    use crate::store::Store;

    struct NullSink;

    impl BroadcastSink for NullSink {
        fn publish(&self, _room: Room, _event: &str, _payload: Value) {}
    }

    fn service() -> (AccountsService, Arc<Store>) {
        let store = Arc::new(Store::new());
        let sink: Arc<dyn BroadcastSink> = Arc::new(NullSink);
        let metrics = Metrics::new();
        let notifier = Arc::new(Notifier::new(store.clone(), sink.clone(), metrics.clone()));
        (
            AccountsService::new(store.clone(), notifier, sink, metrics),
            store,
        )
    }

    fn new_user(role: Role) -> NewUser {
        let id = Uuid::new_v4();
        NewUser {
            name: "Sam".to_string(),
            email: format!("{id}@example.test"),
            phone: None,
            password_hash: "hash".to_string(),
            role,
            provider_id: None,
            addresses: Vec::new(),
        }
    }

    #[test]
    fn duplicate_email_is_a_conflict() {
        let (service, _) = service();
        let mut first = new_user(Role::Customer);
        first.email = "same@example.test".to_string();
        let mut second = new_user(Role::Customer);
        second.email = "same@example.test".to_string();

        service.create_user(first).unwrap();
        let err = service.create_user(second).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn promotion_creates_exactly_one_agent_profile() {
        let (service, store) = service();
        let user = service.create_user(new_user(Role::Customer)).unwrap();

        let promoted = service.make_role(user.id, Role::DeliveryAgent).unwrap();
        assert_eq!(promoted.role, Role::DeliveryAgent);
        assert!(store.find_agent_by_user(user.id).is_some());

        let err = service.make_role(user.id, Role::DeliveryAgent).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn promotion_of_unknown_user_is_not_found_and_leaves_no_agent() {
        let (service, store) = service();
        let ghost = Uuid::new_v4();

        let err = service.make_role(ghost, Role::DeliveryAgent).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(store.find_agent_by_user(ghost).is_none());
    }

    #[test]
    fn registering_as_delivery_agent_creates_the_profile() {
        let (service, store) = service();
        let user = service.create_user(new_user(Role::DeliveryAgent)).unwrap();
        assert!(store.find_agent_by_user(user.id).is_some());
    }

    #[test]
    fn demotion_keeps_the_agent_profile() {
        let (service, store) = service();
        let user = service.create_user(new_user(Role::DeliveryAgent)).unwrap();

        let demoted = service.make_role(user.id, Role::Customer).unwrap();
        assert_eq!(demoted.role, Role::Customer);
        // Agents are never auto-deleted.
        assert!(store.find_agent_by_user(user.id).is_some());
    }

    #[test]
    fn profile_update_clamps_the_rating() {
        let (service, _) = service();
        let user = service.create_user(new_user(Role::DeliveryAgent)).unwrap();

        let agent = service
            .update_agent_profile(
                user.id,
                AgentProfileUpdate {
                    rating: Some(7.5),
                    ..AgentProfileUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(agent.rating, 5.0);
    }

    #[test]
    fn location_update_stamps_the_profile() {
        let (service, _) = service();
        let user = service.create_user(new_user(Role::DeliveryAgent)).unwrap();

        let agent = service.update_agent_location(user.id, 53.55, 9.99).unwrap();
        assert_eq!(agent.current_location.lat, 53.55);
        assert_eq!(agent.current_location.lng, 9.99);
    }
}
