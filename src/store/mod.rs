use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::agent::Agent;
use crate::models::notification::Notification;
use crate::models::parcel::{Parcel, ParcelStatus};
use crate::models::user::{Role, User};

/// Filter applied when listing parcels, mirroring the inbound list surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParcelFilter {
    All,
    Owner(Uuid),
    AssignedAgent(Uuid),
    Status(ParcelStatus),
    Unassigned,
}

/// In-memory entity store. Each map gives per-document write atomicity;
/// cross-entity updates are sequenced by the callers, which accept the
/// documented inconsistency window between the two writes.
pub struct Store {
    users: DashMap<Uuid, User>,
    agents: DashMap<Uuid, Agent>,
    parcels: DashMap<Uuid, Parcel>,
    notifications: DashMap<Uuid, Notification>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            agents: DashMap::new(),
            parcels: DashMap::new(),
            notifications: DashMap::new(),
        }
    }

    // users

    pub fn insert_user(&self, user: User) -> Result<(), AppError> {
        let duplicate = self.users.iter().any(|entry| {
            entry.email.eq_ignore_ascii_case(&user.email)
                || (user.phone.is_some() && entry.phone == user.phone)
        });
        if duplicate {
            return Err(AppError::Conflict(
                "a user with this email or phone already exists".to_string(),
            ));
        }
        self.users.insert(user.id, user);
        Ok(())
    }

    pub fn find_user(&self, id: Uuid) -> Option<User> {
        self.users.get(&id).map(|entry| entry.value().clone())
    }

    pub fn list_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.iter().map(|entry| entry.value().clone()).collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        users
    }

    pub fn list_users_by_role(&self, role: Role) -> Vec<User> {
        let mut users: Vec<User> = self
            .users
            .iter()
            .filter(|entry| entry.role == role)
            .map(|entry| entry.value().clone())
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        users
    }

    pub fn update_user<R>(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut User) -> Result<R, AppError>,
    ) -> Result<R, AppError> {
        let mut user = self
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;
        apply(&mut user)
    }

    pub fn delete_user(&self, id: Uuid) -> Result<User, AppError> {
        self.users
            .remove(&id)
            .map(|(_, user)| user)
            .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))
    }

    // agents

    pub fn insert_agent(&self, agent: Agent) -> Result<(), AppError> {
        if self
            .agents
            .iter()
            .any(|entry| entry.user_id == agent.user_id)
        {
            return Err(AppError::Conflict(format!(
                "user {} already has an agent profile",
                agent.user_id
            )));
        }
        self.agents.insert(agent.id, agent);
        Ok(())
    }

    pub fn find_agent_by_user(&self, user_id: Uuid) -> Option<Agent> {
        self.agents
            .iter()
            .find(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
    }

    pub fn list_agents(&self) -> Vec<Agent> {
        let mut agents: Vec<Agent> = self.agents.iter().map(|entry| entry.value().clone()).collect();
        agents.sort_by(|a, b| b.joined_at.cmp(&a.joined_at));
        agents
    }

    pub fn update_agent_by_user<R>(
        &self,
        user_id: Uuid,
        apply: impl FnOnce(&mut Agent) -> Result<R, AppError>,
    ) -> Result<R, AppError> {
        let agent_id = self
            .agents
            .iter()
            .find(|entry| entry.user_id == user_id)
            .map(|entry| entry.id)
            .ok_or_else(|| AppError::NotFound("agent profile not found".to_string()))?;
        let mut agent = self
            .agents
            .get_mut(&agent_id)
            .ok_or_else(|| AppError::NotFound("agent profile not found".to_string()))?;
        apply(&mut agent)
    }

    pub fn remove_agent_by_user(&self, user_id: Uuid) -> Option<Agent> {
        let agent_id = self
            .agents
            .iter()
            .find(|entry| entry.user_id == user_id)
            .map(|entry| entry.id)?;
        self.agents.remove(&agent_id).map(|(_, agent)| agent)
    }

    // parcels

    pub fn insert_parcel(&self, parcel: Parcel) {
        self.parcels.insert(parcel.id, parcel);
    }

    pub fn find_parcel(&self, id: Uuid) -> Option<Parcel> {
        self.parcels.get(&id).map(|entry| entry.value().clone())
    }

    pub fn list_parcels(&self, filter: ParcelFilter) -> Vec<Parcel> {
        let mut parcels: Vec<Parcel> = self
            .parcels
            .iter()
            .filter(|entry| match filter {
                ParcelFilter::All => true,
                ParcelFilter::Owner(user_id) => entry.user_id == user_id,
                ParcelFilter::AssignedAgent(agent_id) => {
                    entry.assigned_agent_id == Some(agent_id)
                }
                ParcelFilter::Status(status) => entry.status == status,
                ParcelFilter::Unassigned => !entry.is_assigned,
            })
            .map(|entry| entry.value().clone())
            .collect();
        parcels.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        parcels
    }

    /// Applies a mutation under the parcel's write lock; on success the
    /// version counter and `updated_at` are bumped in the same write.
    pub fn update_parcel<R>(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut Parcel) -> Result<R, AppError>,
    ) -> Result<R, AppError> {
        let mut parcel = self
            .parcels
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("parcel {id} not found")))?;
        let result = apply(&mut parcel)?;
        parcel.version += 1;
        parcel.updated_at = Utc::now();
        Ok(result)
    }

    pub fn delete_parcel(&self, id: Uuid) -> Result<Parcel, AppError> {
        self.parcels
            .remove(&id)
            .map(|(_, parcel)| parcel)
            .ok_or_else(|| AppError::NotFound(format!("parcel {id} not found")))
    }

    // notifications

    pub fn insert_notification(&self, notification: Notification) {
        self.notifications.insert(notification.id, notification);
    }

    /// Unread selection: directly addressed to the user, or a role broadcast
    /// matching the caller's role, minus anything the caller already read.
    /// Newest first.
    pub fn list_unread_notifications(&self, user_id: Uuid, role: Role) -> Vec<Notification> {
        let mut matches: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|entry| {
                let addressed = entry.user_id == Some(user_id)
                    || (entry.user_id.is_none() && entry.receiver_role == Some(role))
                    || (entry.user_id.is_none() && entry.send_to_all);
                addressed && !entry.read_by.contains(&user_id)
            })
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matches
    }

    pub fn update_notification<R>(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut Notification) -> Result<R, AppError>,
    ) -> Result<R, AppError> {
        let mut notification = self
            .notifications
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))?;
        apply(&mut notification)
    }

    pub fn list_notifications(&self) -> Vec<Notification> {
        let mut all: Vec<Notification> = self
            .notifications
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    pub fn counts(&self) -> (usize, usize, usize, usize) {
        (
            self.users.len(),
            self.agents.len(),
            self.parcels.len(),
            self.notifications.len(),
        )
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
