//! # Broker Session Module
//!
//! MQTT over TLS towards the remote broker, authenticated with a client certificate.
//! The rumqttc event loop runs in its own task and forwards connection changes and
//! inbound publishes over a channel. The bridge loop stays cooperative:
//! [`Uplink::connect`] waits until the broker accepts the session, and
//! [`Uplink::service`] drains whatever the event-loop task forwarded since the last
//! call, queueing publishes on subscribed topics as [`DownlinkMessage`]s.
//!
//! ## Session states
//!
//! ```text
//!  Unconnected --connect ok--> Connected --keep-alive / io failure--> Unconnected
//! ```
//!
//! After a failure the event-loop task stays idle until the next connect attempt, so
//! reconnection follows the fixed delay between attempts, optionally capped by
//! `broker.max_connect_attempts`.

pub mod network;

use log::{debug, info, warn};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS, Transport,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};

use crate::bridge::MAX_DRAIN_BYTES;
use crate::config::{BrokerConfig, TlsConfig};
use crate::error::{BridgeError, BridgeResult};
use crate::metrics;
use crate::xbee::codec::KIND_REPORT;

/// Longest wait for a CONNACK before an attempt counts as failed.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Shortest serial frame that is published: `REPORT:` plus its newline.
const MIN_REPORT_FRAME: usize = KIND_REPORT.len() + 2;
/// Client request channel capacity. One serial drain can enqueue a publish for every
/// line it routes, plus the subscribe issued on connect.
const REQUEST_CAPACITY: usize = MAX_DRAIN_BYTES / MIN_REPORT_FRAME + 1;

/// Something that accepts messages for a topic.
pub trait Publisher {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> BridgeResult<()>;
}

/// A message received from the broker on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownlinkMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Connected,
}

/// The broker-facing half of the bridge.
#[allow(async_fn_in_trait)]
pub trait Uplink: Publisher {
    fn is_connected(&self) -> bool;

    /// Establish the session, retrying with a fixed delay. Returns an error only when a
    /// configured attempt cap is exhausted.
    async fn connect(&mut self) -> BridgeResult<()>;

    /// Pick up connection changes and inbound messages without blocking.
    async fn service(&mut self);

    /// Take every downlink message queued since the last call.
    fn drain_downlink(&mut self) -> Vec<DownlinkMessage>;
}

/// PEM identity material for the TLS session.
#[derive(Clone)]
pub struct TlsMaterial {
    pub ca_cert: Vec<u8>,
    pub client_cert: Vec<u8>,
    pub client_key: Vec<u8>,
}

impl TlsMaterial {
    pub fn load(cfg: &TlsConfig) -> BridgeResult<Self> {
        Ok(Self {
            ca_cert: read_pem(&cfg.ca_cert)?,
            client_cert: read_pem(&cfg.client_cert)?,
            client_key: read_pem(&cfg.client_key)?,
        })
    }
}

fn read_pem(path: &str) -> BridgeResult<Vec<u8>> {
    std::fs::read(path).map_err(|source| BridgeError::TlsMaterial {
        path: path.to_string(),
        source,
    })
}

/// What the event-loop task reports back to the session.
#[derive(Debug)]
enum SessionEvent {
    Connected,
    Lost(String),
    Downlink(DownlinkMessage),
}

/// Owns the rumqttc event loop. `poll` always runs to completion; after a failure the
/// task parks until `resume` is notified by the next connect attempt.
async fn drive(
    mut eventloop: EventLoop,
    events: mpsc::UnboundedSender<SessionEvent>,
    resume: Arc<Notify>,
) {
    resume.notified().await;
    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    SessionEvent::Connected
                } else {
                    SessionEvent::Lost(format!("broker refused connection: {:?}", ack.code))
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                SessionEvent::Downlink(DownlinkMessage {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                })
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("Broker sent DISCONNECT");
                continue;
            }
            Ok(event) => {
                debug!("MQTT event: {:?}", event);
                continue;
            }
            Err(e) => SessionEvent::Lost(e.to_string()),
        };
        let failed = matches!(event, SessionEvent::Lost(_));
        if events.send(event).is_err() {
            // Session dropped
            return;
        }
        if failed {
            resume.notified().await;
        }
    }
}

pub struct SecureSession {
    client: AsyncClient,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    resume: Arc<Notify>,
    driver: JoinHandle<()>,
    state: SessionState,
    endpoint: String,
    command_topic: String,
    reconnect_delay: Duration,
    max_attempts: Option<u32>,
    downlink: VecDeque<DownlinkMessage>,
    connected_before: bool,
}

impl SecureSession {
    /// Build the client and spawn its event-loop task. Must be called from within a
    /// tokio runtime; nothing touches the network before the first `connect`.
    pub fn new(broker: &BrokerConfig, tls: TlsMaterial, command_topic: &str) -> Self {
        let mut options =
            MqttOptions::new(broker.client_id.clone(), broker.host.clone(), broker.port);
        options.set_keep_alive(Duration::from_secs(broker.keep_alive_secs.max(1)));
        options.set_clean_session(true);
        if let Some(user) = &broker.username {
            options.set_credentials(user.clone(), broker.password.clone().unwrap_or_default());
        }
        options.set_transport(Transport::tls(
            tls.ca_cert,
            Some((tls.client_cert, tls.client_key)),
            None,
        ));
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (tx, events) = mpsc::unbounded_channel();
        let resume = Arc::new(Notify::new());
        let driver = tokio::spawn(drive(eventloop, tx, Arc::clone(&resume)));
        Self {
            client,
            events,
            resume,
            driver,
            state: SessionState::Unconnected,
            endpoint: format!("{}:{}", broker.host, broker.port),
            command_topic: command_topic.to_string(),
            reconnect_delay: broker.reconnect_delay(),
            max_attempts: broker.max_connect_attempts,
            downlink: VecDeque::new(),
            connected_before: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Wait for the event-loop task to report the outcome of the current attempt.
    async fn await_connack(&mut self) -> Result<(), String> {
        loop {
            match self.events.recv().await {
                Some(SessionEvent::Connected) => return Ok(()),
                Some(SessionEvent::Lost(reason)) => return Err(reason),
                Some(SessionEvent::Downlink(message)) => self.queue_downlink(message),
                None => return Err("MQTT event loop stopped".to_string()),
            }
        }
    }

    fn on_connected(&mut self) {
        self.state = SessionState::Connected;
        if self.connected_before {
            metrics::inc_session_reconnects();
        }
        self.connected_before = true;
        info!("MQTT connected to {}", self.endpoint);
        match self
            .client
            .try_subscribe(self.command_topic.as_str(), QoS::AtMostOnce)
        {
            Ok(()) => info!("Subscribed to {}", self.command_topic),
            Err(e) => warn!("Subscribe to {} failed: {}", self.command_topic, e),
        }
    }

    fn on_lost(&mut self, reason: &str) {
        if self.state == SessionState::Connected {
            warn!("MQTT session lost: {}", reason);
        }
        self.state = SessionState::Unconnected;
    }

    fn queue_downlink(&mut self, message: DownlinkMessage) {
        debug!(
            "MQTT message arrived on {} ({} bytes)",
            message.topic,
            message.payload.len()
        );
        metrics::inc_downlink_received();
        self.downlink.push_back(message);
    }
}

impl Drop for SecureSession {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

impl Publisher for SecureSession {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> BridgeResult<()> {
        if self.state != SessionState::Connected {
            return Err(BridgeError::PublishFailure {
                topic: topic.to_string(),
                reason: "session not connected".to_string(),
            });
        }
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .map_err(|e| BridgeError::PublishFailure {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

impl Uplink for SecureSession {
    fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    async fn connect(&mut self) -> BridgeResult<()> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            info!("Connecting to MQTT broker {} (attempt {})...", self.endpoint, attempt);
            self.resume.notify_one();
            let outcome = match timeout(CONNECT_TIMEOUT, self.await_connack()).await {
                Ok(result) => result,
                Err(_) => Err(format!("no CONNACK within {}s", CONNECT_TIMEOUT.as_secs())),
            };
            match outcome {
                Ok(()) => {
                    self.on_connected();
                    return Ok(());
                }
                Err(reason) => {
                    self.state = SessionState::Unconnected;
                    if let Some(max) = self.max_attempts {
                        if attempt >= max {
                            return Err(BridgeError::ConnectionFailure(format!(
                                "{} after {} attempts: {}",
                                self.endpoint, attempt, reason
                            )));
                        }
                    }
                    warn!(
                        "MQTT connect failed: {}; retrying in {}s",
                        reason,
                        self.reconnect_delay.as_secs()
                    );
                    sleep(self.reconnect_delay).await;
                }
            }
        }
    }

    async fn service(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(SessionEvent::Downlink(message)) => self.queue_downlink(message),
                Ok(SessionEvent::Lost(reason)) => self.on_lost(&reason),
                // CONNACK for an attempt that already timed out
                Ok(SessionEvent::Connected) => self.on_connected(),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.on_lost("event loop stopped");
                    break;
                }
            }
        }
        // Let the event-loop task run on a current-thread runtime.
        tokio::task::yield_now().await;
    }

    fn drain_downlink(&mut self) -> Vec<DownlinkMessage> {
        self.downlink.drain(..).collect()
    }
}
