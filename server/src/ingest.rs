//! Composition root of the telemetry pipeline: wires the bus connection to
//! the reconciler, the registry, and the fan-out hub. One loop consumes the
//! bus event channel, so handler state is never shared between concurrent
//! deliveries.

use crate::errors::{Error, Result};
use crate::fanout::FanoutHub;
use crate::metrics::{
    DB_FAILURES_TOTAL, DEVICE_UPDATES_TOTAL, INGEST_LATENCY_SECONDS, INVALID_MESSAGES_TOTAL,
    MESSAGES_TOTAL, NOTIFICATIONS_TOTAL, UNKNOWN_DEVICE_TOTAL,
};
use crate::model::{IngestMessage, IngestStatus, WsEvent};
use crate::mqtt::{BusConnection, BusCredentials, BusEvent};
use crate::reconcile;
use crate::registry::DeviceRegistry;
use crate::validate::validate;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub struct IngestService {
    hub: Arc<FanoutHub>,
    events: mpsc::Sender<BusEvent>,
    bus: Mutex<Option<BusConnection>>,
}

impl IngestService {
    pub fn new(hub: Arc<FanoutHub>, events: mpsc::Sender<BusEvent>) -> Self {
        Self {
            hub,
            events,
            bus: Mutex::new(None),
        }
    }

    /// Opens a bus connection with the given credentials, replacing any
    /// previous one, and subscribes the topic list. Individual topic
    /// failures are logged and do not abort the remaining subscriptions.
    pub async fn configure(&self, credentials: BusCredentials, topics: &[String]) -> bool {
        let mut bus = self.bus.lock().await;
        if let Some(old) = bus.take() {
            info!("Replacing existing bus connection");
            old.disconnect().await;
            self.hub.set_bus_connected(false);
        }

        match BusConnection::connect(&credentials, self.events.clone()).await {
            Ok(connection) => {
                for topic in topics {
                    if let Err(e) = connection.subscribe(topic).await {
                        warn!("Failed to subscribe to {}: {}", topic, e);
                    }
                }
                self.hub.set_bus_connected(true);
                *bus = Some(connection);
                true
            }
            Err(e) => {
                error!("Failed to connect to bus: {}", e);
                false
            }
        }
    }

    pub fn status(&self) -> IngestStatus {
        IngestStatus {
            connected: self.hub.bus_connected(),
            subscriber_count: self.hub.subscriber_count(),
        }
    }

    /// Drops the bus connection if one is up. Fan-out subscribers are left
    /// untouched; client connections are independent of bus health.
    pub async fn shutdown(&self) {
        if let Some(connection) = self.bus.lock().await.take() {
            connection.disconnect().await;
            self.hub.set_bus_connected(false);
        }
    }
}

/// Consumes the bus event channel until it closes. Every per-message error
/// is isolated to that message; nothing here can take the loop down.
pub async fn run_ingest<R>(mut rx: mpsc::Receiver<BusEvent>, registry: R, hub: Arc<FanoutHub>)
where
    R: DeviceRegistry,
{
    info!("Ingest loop started");
    while let Some(event) = rx.recv().await {
        match event {
            BusEvent::Status(connected) => {
                info!(
                    "Bus {}",
                    if connected { "connected" } else { "disconnected" }
                );
                hub.set_bus_connected(connected);
            }
            BusEvent::Message { topic, payload } => {
                MESSAGES_TOTAL.inc();
                let start = Instant::now();
                match handle_message(&registry, &hub, &topic, &payload).await {
                    Ok(true) => {
                        DEVICE_UPDATES_TOTAL.inc();
                        INGEST_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
                    }
                    Ok(false) => {
                        debug!("Message on {} carried no recognized fields", topic);
                    }
                    Err(Error::UnknownDevice(thing_name)) => {
                        UNKNOWN_DEVICE_TOTAL.inc();
                        warn!("Dropping message for unknown device: {}", thing_name);
                    }
                    Err(Error::Decode(e)) => {
                        INVALID_MESSAGES_TOTAL.inc();
                        warn!("Dropping undecodable message on {}: {}", topic, e);
                    }
                    Err(Error::Validation(e)) => {
                        INVALID_MESSAGES_TOTAL.inc();
                        warn!("Dropping out-of-range message on {}: {}", topic, e);
                    }
                    Err(Error::Database(e)) => {
                        DB_FAILURES_TOTAL.inc();
                        error!("Failed to persist update from {}: {}", topic, e);
                    }
                    Err(e) => {
                        error!("Failed to process message on {}: {}", topic, e);
                    }
                }
            }
        }
    }
    info!("Ingest loop stopped");
}

/// Decode → reconcile → persist → broadcast for one message. Returns
/// `Ok(false)` when the message resolved but carried nothing to apply.
///
/// The device update is durable before the broadcast is attempted; a failed
/// notification write is logged but does not withhold the update from
/// subscribers.
async fn handle_message<R: DeviceRegistry>(
    registry: &R,
    hub: &FanoutHub,
    topic: &str,
    payload: &[u8],
) -> Result<bool> {
    let message: IngestMessage = serde_json::from_slice(payload)?;
    validate(&message)?;

    let thing_name = match message
        .thing_name
        .as_deref()
        .or_else(|| reconcile::thing_name_from_topic(topic))
    {
        Some(name) => name.to_string(),
        None => return Err(Error::UnknownDevice(format!("topic {}", topic))),
    };

    let device = registry
        .device_by_thing_name(&thing_name)
        .await?
        .ok_or_else(|| Error::UnknownDevice(format!("thing name {}", thing_name)))?;

    let Some(reconciled) = reconcile::reconcile(&device, &message) else {
        return Ok(false);
    };

    let updated = registry
        .update_device(device.id, &reconciled.patch)
        .await?
        .ok_or_else(|| Error::UnknownDevice(format!("thing name {}", thing_name)))?;

    if let Some(alert) = &reconciled.alert {
        match registry.create_notification(alert).await {
            Ok(notification) => {
                NOTIFICATIONS_TOTAL.inc();
                info!("{} for device {}", notification.title, updated.name);
            }
            Err(e) => {
                error!("Failed to record notification for {}: {}", updated.name, e);
            }
        }
    }

    hub.broadcast(&WsEvent::DeviceUpdate { device: updated });
    Ok(true)
}
