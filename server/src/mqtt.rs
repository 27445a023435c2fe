use crate::errors::{Error, Result};
use crate::metrics::BUS_RECONNECTS_TOTAL;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const INITIAL_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 30_000;
const DEFAULT_PORT: u16 = 8883;
const KEEP_ALIVE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct BusCredentials {
    pub endpoint: String,
    pub cert_path: String,
    pub key_path: String,
    pub ca_path: String,
    pub client_id: String,
}

/// What the bus task pushes into the ingest channel. Status transitions and
/// raw messages travel the same queue so the consumer sees them in order.
#[derive(Debug)]
pub enum BusEvent {
    Status(bool),
    Message { topic: String, payload: Vec<u8> },
}

/// One logical connection to the publish/subscribe bus.
///
/// The event loop lives in a background task that keeps polling after a
/// connection loss with capped exponential backoff; the transport re-dials on
/// the next poll, and recorded subscriptions are re-issued on every
/// successful connect since sessions are clean.
pub struct BusConnection {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    topics: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl BusConnection {
    /// Dials the broker with mutual TLS and waits for its acknowledgement, so
    /// the caller learns synchronously whether the credentials worked.
    pub async fn connect(
        credentials: &BusCredentials,
        events: mpsc::Sender<BusEvent>,
    ) -> Result<Self> {
        let ca = read_credential(&credentials.ca_path, "CA certificate")?;
        let cert = read_credential(&credentials.cert_path, "client certificate")?;
        let key = read_credential(&credentials.key_path, "private key")?;

        let (host, port) = split_endpoint(&credentials.endpoint);
        info!("Connecting to bus at {}:{}", host, port);

        let mut options = MqttOptions::new(&credentials.client_id, host, port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);
        options.set_transport(Transport::tls(ca, Some((cert, key)), None));

        let (client, mut eventloop) = AsyncClient::new(options, 100);

        tokio::time::timeout(CONNECT_TIMEOUT, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| Error::Connect("timed out waiting for broker acknowledgement".into()))??;

        info!("Bus connection established");
        let connected = Arc::new(AtomicBool::new(true));
        let closed = Arc::new(AtomicBool::new(false));
        let topics = Arc::new(Mutex::new(Vec::new()));

        let _ = events.send(BusEvent::Status(true)).await;

        let task = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            events,
            connected.clone(),
            closed.clone(),
            topics.clone(),
        ));

        Ok(Self {
            client,
            connected,
            closed,
            topics,
            task,
        })
    }

    /// Registers a topic subscription at QoS 1 and records it for
    /// re-subscription after a reconnect.
    pub async fn subscribe(&self, topic: &str) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.client.subscribe(topic, QoS::AtLeastOnce).await?;
        self.topics.lock().await.push(topic.to_string());
        info!("Subscribed to {} with QoS 1", topic);
        Ok(())
    }

    #[allow(dead_code)]
    pub async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await?;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.connected.load(Ordering::SeqCst)
    }

    /// Tears the connection down: drops all topic subscriptions and stops the
    /// event task. In-flight deliveries already handed to the ingest channel
    /// are unaffected.
    pub async fn disconnect(self) {
        self.closed.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.topics.lock().await.clear();
        if let Err(e) = self.client.disconnect().await {
            debug!("disconnect request failed: {}", e);
        }
        // The task exits on the next poll once `closed` is set; don't wait
        // out a long reconnect backoff.
        if tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .is_err()
        {
            debug!("bus event task still draining after disconnect");
        }
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => continue,
            Err(e) => return Err(classify(e)),
        }
    }
}

fn classify(error: ConnectionError) -> Error {
    match error {
        ConnectionError::ConnectionRefused(code) => {
            Error::Auth(format!("broker refused connection: {:?}", code))
        }
        ConnectionError::Tls(e) => Error::Auth(format!("TLS handshake failed: {}", e)),
        other => Error::Connect(other.to_string()),
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    events: mpsc::Sender<BusEvent>,
    connected: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    topics: Arc<Mutex<Vec<String>>>,
) {
    let mut backoff_ms = INITIAL_BACKOFF_MS;
    loop {
        if closed.load(Ordering::SeqCst) {
            break;
        }
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                backoff_ms = INITIAL_BACKOFF_MS;
                if !connected.swap(true, Ordering::SeqCst) {
                    info!("Bus connection re-established");
                    BUS_RECONNECTS_TOTAL.inc();
                    let _ = events.send(BusEvent::Status(true)).await;
                }
                // Clean sessions forget subscriptions; restore the topic set.
                for topic in topics.lock().await.iter() {
                    if let Err(e) = client.subscribe(topic, QoS::AtLeastOnce).await {
                        warn!("Failed to re-subscribe to {}: {}", topic, e);
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!(
                    "Received message on topic {}, size: {} bytes",
                    publish.topic,
                    publish.payload.len()
                );
                let message = BusEvent::Message {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                };
                if events.send(message).await.is_err() {
                    // Ingest loop is gone; nothing left to deliver to.
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                if closed.load(Ordering::SeqCst) {
                    break;
                }
                if connected.swap(false, Ordering::SeqCst) {
                    warn!("Bus connection lost: {}", e);
                    let _ = events.send(BusEvent::Status(false)).await;
                } else {
                    debug!("Bus reconnect attempt failed: {}", e);
                }
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
}

fn read_credential(path: &str, what: &str) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| Error::Auth(format!("cannot read {} {}: {}", what, path, e)))
}

fn split_endpoint(endpoint: &str) -> (String, u16) {
    match endpoint.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (endpoint.to_string(), DEFAULT_PORT),
        },
        None => (endpoint.to_string(), DEFAULT_PORT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_splits_host_and_port() {
        assert_eq!(
            split_endpoint("broker.example.com:1883"),
            ("broker.example.com".to_string(), 1883)
        );
        assert_eq!(
            split_endpoint("broker.example.com"),
            ("broker.example.com".to_string(), DEFAULT_PORT)
        );
    }

    #[tokio::test]
    async fn missing_credential_files_fail_as_auth_error() {
        let (tx, _rx) = mpsc::channel(8);
        let credentials = BusCredentials {
            endpoint: "localhost:8883".to_string(),
            cert_path: "/nonexistent/cert.pem".to_string(),
            key_path: "/nonexistent/key.pem".to_string(),
            ca_path: "/nonexistent/ca.pem".to_string(),
            client_id: "test-client".to_string(),
        };

        let Err(error) = BusConnection::connect(&credentials, tx).await else {
            panic!("connect must fail without credential files");
        };
        assert!(matches!(error, Error::Auth(_)));
    }
}
