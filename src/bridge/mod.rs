//! # Bridge Control Loop
//!
//! [`Bridge`] is the device-session context: it owns the serial peer, the line framer,
//! the router, the periodic emitter, the network link and the broker session, and runs
//! the single-threaded cooperative loop that ties them together.
//!
//! Each iteration:
//!
//! 1. reconnect the broker session if it dropped (blocks until it succeeds)
//! 2. service the session and log any downlink messages
//! 3. drain buffered serial input, routing every complete line in arrival order
//! 4. fire the periodic emitter when due
//! 5. idle briefly
//!
//! ```rust,no_run
//! use xbeebridge::bridge::Bridge;
//! use xbeebridge::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let mut bridge = Bridge::from_config(&config)?;
//!     bridge.run().await?;
//!     Ok(())
//! }
//! ```

pub mod emitter;
pub mod router;

use log::{debug, info, warn};
use tokio::time::{sleep, Duration};

use crate::config::Config;
use crate::error::BridgeResult;
use crate::logutil::escape_bytes;
use crate::metrics;
use crate::mqtt::network::{HostLink, NetworkLink};
use crate::mqtt::{DownlinkMessage, SecureSession, TlsMaterial, Uplink};
use crate::xbee::framer::LineFramer;
use crate::xbee::{SerialPeer, XBeeSerial};
use emitter::PeriodicEmitter;
use router::{RouteOutcome, Router};

/// Serial read chunk size.
pub const READ_CHUNK: usize = 256;
/// Upper bound on reads per drain. Input left on the port is picked up by the next
/// iteration, after the session has been serviced.
pub const MAX_READS_PER_DRAIN: usize = 64;
/// Most serial bytes routed by a single drain.
pub const MAX_DRAIN_BYTES: usize = READ_CHUNK * MAX_READS_PER_DRAIN;

/// What one loop iteration did; used by tests and debug logging.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StepSummary {
    pub reconnected: bool,
    pub downlink: Vec<DownlinkMessage>,
    pub outcomes: Vec<RouteOutcome>,
    pub commands_sent: usize,
}

pub struct Bridge<S, U, N> {
    serial: S,
    uplink: U,
    network: N,
    framer: LineFramer,
    router: Router,
    emitter: Option<PeriodicEmitter>,
    idle: Duration,
}

impl Bridge<XBeeSerial, SecureSession, HostLink> {
    /// Wire the production collaborators from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let serial = XBeeSerial::open(&config.serial.port, config.serial.baud_rate)?;
        let tls = TlsMaterial::load(&config.tls)?;
        let uplink = SecureSession::new(&config.broker, tls, &config.topics.commands);
        let network = HostLink::new(
            config.network.ssid.clone(),
            &config.broker.host,
            config.broker.port,
        );
        let emitter = if config.emitter.enabled {
            Some(PeriodicEmitter::new(
                config.emitter.interval(),
                config.emitter.pause(),
                config.emitter.outbound_commands()?,
            ))
        } else {
            None
        };
        Ok(Bridge::new(
            serial,
            uplink,
            network,
            Router::new(&config.topics.reports),
            emitter,
            Duration::from_millis(config.bridge_loop.idle_ms),
        ))
    }
}

impl<S: SerialPeer, U: Uplink, N: NetworkLink> Bridge<S, U, N> {
    pub fn new(
        serial: S,
        uplink: U,
        network: N,
        router: Router,
        emitter: Option<PeriodicEmitter>,
        idle: Duration,
    ) -> Self {
        Self {
            serial,
            uplink,
            network,
            framer: LineFramer::new(),
            router,
            emitter,
            idle,
        }
    }

    pub fn serial(&self) -> &S {
        &self.serial
    }

    pub fn serial_mut(&mut self) -> &mut S {
        &mut self.serial
    }

    pub fn uplink(&self) -> &U {
        &self.uplink
    }

    pub fn uplink_mut(&mut self) -> &mut U {
        &mut self.uplink
    }

    /// Associate the network and open the broker session.
    pub async fn start(&mut self) -> BridgeResult<()> {
        info!("XBee bridge ready...");
        self.network.associate().await;
        self.uplink.connect().await
    }

    /// Run until Ctrl-C. Returns an error only if a capped reconnect gives up.
    pub async fn run(&mut self) -> BridgeResult<()> {
        self.start().await?;
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);
        loop {
            let summary = self.step().await?;
            if !summary.outcomes.is_empty() {
                debug!("Routed {} serial line(s)", summary.outcomes.len());
            }
            tokio::select! {
                _ = sleep(self.idle) => {}
                _ = &mut shutdown => {
                    info!("Ctrl+C received, stopping bridge");
                    break;
                }
            }
        }
        let stats = metrics::snapshot();
        info!(
            "Bridge stopped: lines={} published={} publish_failures={} malformed={} \
             unknown={} radio_errors={} commands={} downlink={} reconnects={}",
            stats.lines_received,
            stats.reports_published,
            stats.publish_failures,
            stats.malformed_lines,
            stats.unknown_kinds,
            stats.radio_errors,
            stats.commands_sent,
            stats.downlink_received,
            stats.session_reconnects
        );
        Ok(())
    }

    /// One loop iteration without the trailing idle delay.
    pub async fn step(&mut self) -> BridgeResult<StepSummary> {
        let mut summary = StepSummary::default();

        if !self.uplink.is_connected() {
            warn!("MQTT session down, reconnecting");
            if !self.network.is_associated().await {
                warn!("Network link lost");
                self.network.associate().await;
            }
            self.uplink.connect().await?;
            summary.reconnected = true;
        }

        self.uplink.service().await;
        for message in self.uplink.drain_downlink() {
            handle_downlink(&message);
            summary.downlink.push(message);
        }

        summary.outcomes = self.drain_serial();

        if let Some(emitter) = self.emitter.as_mut() {
            summary.commands_sent = emitter.tick(&mut self.serial).await;
        }

        Ok(summary)
    }

    /// Read what is buffered on the serial link, up to [`MAX_DRAIN_BYTES`], and route
    /// each complete line.
    fn drain_serial(&mut self) -> Vec<RouteOutcome> {
        let mut outcomes = Vec::new();
        let mut buf = [0u8; READ_CHUNK];
        for _ in 0..MAX_READS_PER_DRAIN {
            let n = match self.serial.read_available(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!("Serial read error (continuing): {}", e);
                    break;
                }
            };
            for line in self.framer.push_lines(&buf[..n]) {
                let outcome = self.router.route_line(&line, &mut self.uplink);
                if outcome != RouteOutcome::Empty {
                    outcomes.push(outcome);
                }
            }
        }
        outcomes
    }
}

/// Downlink messages are only logged; there is no defined format for relaying them to
/// the radio yet.
fn handle_downlink(message: &DownlinkMessage) {
    info!(
        "MQTT message arrived [{}]: {}",
        message.topic,
        escape_bytes(&message.payload)
    );
}
