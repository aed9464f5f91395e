use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::models::user::Role;

/// Logical rooms a connected client can join by declaring its role, plus the
/// global channel used for raw location fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Room {
    Admins,
    DeliveryAgents,
    Customers,
    All,
}

impl Room {
    pub fn for_role(role: Role) -> Room {
        match role {
            Role::Admin => Room::Admins,
            Role::DeliveryAgent => Room::DeliveryAgents,
            Role::Customer => Room::Customers,
        }
    }
}

/// Wire frame pushed to websocket clients.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub event: String,
    pub payload: Value,
}

/// Fire-and-forget fan-out sink. Injected into the lifecycle engine, the
/// assignment coordinator and the notifier; never looked up ambiently.
/// Delivery is at-most-once with no replay buffer.
pub trait BroadcastSink: Send + Sync {
    fn publish(&self, room: Room, event: &str, payload: Value);
}

/// Production sink backed by one tokio broadcast channel per room. A send
/// with no subscribers is not an error; late subscribers miss earlier
/// events by design.
pub struct ChannelBroadcaster {
    admins: broadcast::Sender<Envelope>,
    delivery_agents: broadcast::Sender<Envelope>,
    customers: broadcast::Sender<Envelope>,
    global: broadcast::Sender<Envelope>,
}

impl ChannelBroadcaster {
    pub fn new(buffer_size: usize) -> Self {
        let (admins, _) = broadcast::channel(buffer_size);
        let (delivery_agents, _) = broadcast::channel(buffer_size);
        let (customers, _) = broadcast::channel(buffer_size);
        let (global, _) = broadcast::channel(buffer_size);

        Self {
            admins,
            delivery_agents,
            customers,
            global,
        }
    }

    pub fn subscribe(&self, room: Room) -> broadcast::Receiver<Envelope> {
        self.sender(room).subscribe()
    }

    /// Every connected client listens on the global channel regardless of
    /// room membership.
    pub fn subscribe_global(&self) -> broadcast::Receiver<Envelope> {
        self.global.subscribe()
    }

    fn sender(&self, room: Room) -> &broadcast::Sender<Envelope> {
        match room {
            Room::Admins => &self.admins,
            Room::DeliveryAgents => &self.delivery_agents,
            Room::Customers => &self.customers,
            Room::All => &self.global,
        }
    }
}

impl BroadcastSink for ChannelBroadcaster {
    fn publish(&self, room: Room, event: &str, payload: Value) {
        let envelope = Envelope {
            event: event.to_string(),
            payload,
        };
        // A closed or empty channel just drops the event.
        let _ = self.sender(room).send(envelope);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{BroadcastSink, ChannelBroadcaster, Room};

    #[tokio::test]
    async fn subscriber_receives_room_event() {
        let broadcaster = ChannelBroadcaster::new(8);
        let mut rx = broadcaster.subscribe(Room::Admins);

        broadcaster.publish(Room::Admins, "new_notification", json!({"title": "hi"}));

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event, "new_notification");
        assert_eq!(envelope.payload["title"], "hi");
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let broadcaster = ChannelBroadcaster::new(8);
        let mut customers = broadcaster.subscribe(Room::Customers);

        broadcaster.publish(Room::Admins, "new_notification", json!({}));

        assert!(customers.try_recv().is_err());
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let broadcaster = ChannelBroadcaster::new(8);
        broadcaster.publish(Room::All, "locationUpdate", json!({"lat": 1.0}));
    }
}
