//! Registry of live subscriber connections and event fan-out.
//!
//! Broadcasts serialize once and go out through per-subscriber bounded
//! queues with a non-blocking send: a slow or closed subscriber is skipped
//! for that event and never back-pressures the ingest path. Removal happens
//! only from the connection's own close/error path.

use crate::metrics::{BROADCAST_DROPPED_TOTAL, WS_CLIENTS};
use crate::model::WsEvent;
use axum::extract::ws::Message;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error};

const SUBSCRIBER_QUEUE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

pub struct FanoutHub {
    subscribers: DashMap<u64, mpsc::Sender<Message>>,
    next_id: AtomicU64,
    bus_connected: AtomicBool,
}

impl FanoutHub {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            bus_connected: AtomicBool::new(false),
        }
    }

    /// Registers a connection and returns its id plus the queue the send
    /// loop drains. Late joiners immediately get a bus-status snapshot so
    /// they are never left in an unknown state; missed events are not
    /// replayed.
    pub fn add_subscriber(&self) -> (SubscriberId, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let snapshot = WsEvent::MqttStatus {
            connected: self.bus_connected.load(Ordering::Relaxed),
        };
        if let Some(message) = encode(&snapshot) {
            let _ = tx.try_send(message);
        }

        self.subscribers.insert(id, tx);
        WS_CLIENTS.set(self.subscribers.len() as f64);
        debug!(
            "Subscriber {} connected. Total subscribers: {}",
            id,
            self.subscribers.len()
        );
        (SubscriberId(id), rx)
    }

    /// No-op for ids that were already removed or never existed.
    pub fn remove_subscriber(&self, id: SubscriberId) {
        self.subscribers.remove(&id.0);
        WS_CLIENTS.set(self.subscribers.len() as f64);
        debug!(
            "Subscriber {} disconnected. Total subscribers: {}",
            id.0,
            self.subscribers.len()
        );
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn bus_connected(&self) -> bool {
        self.bus_connected.load(Ordering::Relaxed)
    }

    /// Records the bus state and broadcasts a status event on actual
    /// transitions only.
    pub fn set_bus_connected(&self, connected: bool) {
        if self.bus_connected.swap(connected, Ordering::Relaxed) != connected {
            self.broadcast(&WsEvent::MqttStatus { connected });
        }
    }

    /// Serializes the event once and fans it out to every registered
    /// subscriber whose queue has room.
    pub fn broadcast(&self, event: &WsEvent) {
        let Some(message) = encode(event) else {
            return;
        };
        for entry in self.subscribers.iter() {
            if entry.value().try_send(message.clone()).is_err() {
                BROADCAST_DROPPED_TOTAL.inc();
            }
        }
    }

    /// Direct reply to one subscriber, through its own queue so ordering
    /// with broadcasts is preserved.
    pub fn send_to(&self, id: SubscriberId, event: &WsEvent) {
        let Some(message) = encode(event) else {
            return;
        };
        if let Some(tx) = self.subscribers.get(&id.0) {
            let _ = tx.try_send(message);
        }
    }
}

fn encode(event: &WsEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            error!("Failed to serialize event: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Device, DeviceStatus, FireStatus, OperatingMode};
    use chrono::Utc;
    use uuid::Uuid;

    fn device() -> Device {
        Device {
            id: Uuid::new_v4(),
            name: "turret-1".to_string(),
            serial_number: "SN-1".to_string(),
            group_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            status: DeviceStatus::Online,
            mode: OperatingMode::Automatic,
            fire_status: FireStatus::Safe,
            battery_level: 80.0,
            pressure_level: 100.0,
            co2_level: 420.0,
            particulate_matter: 12.0,
            wind_speed: 3.0,
            wind_direction: 180.0,
            height: 10.0,
            last_maintenance: None,
            x: None,
            y: None,
            aws_thing_name: Some("turret-1".to_string()),
            created_at: Utc::now(),
        }
    }

    fn text(message: Message) -> serde_json::Value {
        match message {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn new_subscriber_gets_status_snapshot() {
        let hub = FanoutHub::new();
        hub.set_bus_connected(true);

        // A burst of broadcasts before this subscriber existed.
        for _ in 0..5 {
            hub.broadcast(&WsEvent::DeviceUpdate { device: device() });
        }

        let (_id, mut rx) = hub.add_subscriber();
        let snapshot = text(rx.recv().await.unwrap());
        assert_eq!(snapshot["type"], "mqtt_status");
        assert_eq!(snapshot["connected"], true);

        // No replay of events broadcast before the join.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_skips_closed_subscribers() {
        let hub = FanoutHub::new();
        let (_a, mut rx_a) = hub.add_subscriber();
        let (_b, rx_b) = hub.add_subscriber();
        let (_c, mut rx_c) = hub.add_subscriber();

        // Drain the join snapshots.
        rx_a.recv().await.unwrap();
        rx_c.recv().await.unwrap();
        drop(rx_b);

        hub.broadcast(&WsEvent::DeviceUpdate { device: device() });

        assert_eq!(text(rx_a.recv().await.unwrap())["type"], "device_update");
        assert_eq!(text(rx_c.recv().await.unwrap())["type"], "device_update");
        // Broadcast never removes subscribers, even dead ones.
        assert_eq!(hub.subscriber_count(), 3);
    }

    #[tokio::test]
    async fn remove_subscriber_is_idempotent() {
        let hub = FanoutHub::new();
        let (id, _rx) = hub.add_subscriber();

        hub.remove_subscriber(id);
        hub.remove_subscriber(id);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn send_to_reaches_only_the_target() {
        let hub = FanoutHub::new();
        let (id_a, mut rx_a) = hub.add_subscriber();
        let (_b, mut rx_b) = hub.add_subscriber();
        rx_a.recv().await.unwrap();
        rx_b.recv().await.unwrap();

        hub.send_to(id_a, &WsEvent::Pong);

        assert_eq!(text(rx_a.recv().await.unwrap())["type"], "pong");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn status_broadcast_only_on_transitions() {
        let hub = FanoutHub::new();
        let (_id, mut rx) = hub.add_subscriber();
        rx.recv().await.unwrap();

        hub.set_bus_connected(true);
        hub.set_bus_connected(true);
        hub.set_bus_connected(false);

        assert_eq!(text(rx.recv().await.unwrap())["connected"], true);
        assert_eq!(text(rx.recv().await.unwrap())["connected"], false);
        assert!(rx.try_recv().is_err());
    }
}
