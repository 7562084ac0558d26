//! Network association for the bridge host.
//!
//! The gateway's operating system owns the Wi-Fi credentials; from the bridge's point of
//! view the network is associated once a route to the broker endpoint exists. Probing
//! binds a UDP socket and `connect`s it to the broker address, which selects a local
//! address through the routing table without sending any packets.
use log::{debug, info, warn};
use std::net::{IpAddr, SocketAddr, UdpSocket};
use tokio::time::{sleep, Duration};

/// Interval between association probes while waiting for the link.
pub const ASSOCIATION_POLL: Duration = Duration::from_secs(1);

#[allow(async_fn_in_trait)]
pub trait NetworkLink {
    /// Block until associated. No timeout.
    async fn associate(&mut self);

    /// Re-probe the link and report whether it is usable.
    async fn is_associated(&mut self) -> bool;
}

pub struct HostLink {
    ssid: Option<String>,
    host: String,
    port: u16,
    local_addr: Option<IpAddr>,
}

impl HostLink {
    pub fn new(ssid: Option<String>, host: &str, port: u16) -> Self {
        Self {
            ssid,
            host: host.to_string(),
            port,
            local_addr: None,
        }
    }

    pub fn local_addr(&self) -> Option<IpAddr> {
        self.local_addr
    }

    async fn probe(&self) -> Option<IpAddr> {
        let addrs = match tokio::net::lookup_host((self.host.as_str(), self.port)).await {
            Ok(addrs) => addrs.collect::<Vec<_>>(),
            Err(e) => {
                debug!("Resolving {} failed: {}", self.host, e);
                return None;
            }
        };
        addrs.into_iter().find_map(route_source)
    }
}

/// Local address the routing table would use to reach `target`, if any.
fn route_source(target: SocketAddr) -> Option<IpAddr> {
    let bind = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind).ok()?;
    socket.connect(target).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    if ip.is_unspecified() {
        None
    } else {
        Some(ip)
    }
}

impl NetworkLink for HostLink {
    async fn associate(&mut self) {
        match &self.ssid {
            Some(ssid) => info!("Connecting to network '{}'...", ssid),
            None => info!("Waiting for network route to {}...", self.host),
        }
        let mut waited = 0u32;
        loop {
            if let Some(ip) = self.probe().await {
                self.local_addr = Some(ip);
                info!("Network connected, IP address: {}", ip);
                return;
            }
            waited += 1;
            if waited % 30 == 0 {
                warn!("Still waiting for network ({}s)", waited);
            }
            sleep(ASSOCIATION_POLL).await;
        }
    }

    async fn is_associated(&mut self) -> bool {
        self.local_addr = self.probe().await;
        self.local_addr.is_some()
    }
}
