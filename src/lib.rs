//! # xbeebridge - XBee to MQTT/TLS bridge
//!
//! xbeebridge relays telemetry from a serial-attached XBee mesh radio to a remote MQTT
//! broker over TLS, logs the radio's responses and error reports, and periodically sends
//! scripted commands back to the radio.
//!
//! ## Features
//!
//! - **Line protocol**: `KIND:payload` lines classified as REPORT, REPORT_RESPONSE,
//!   CAMERA_RESPONSE, ERROR* or unknown; REPORT payloads decompose into node id,
//!   battery and data.
//! - **Verbatim uplink**: REPORT lines are published unchanged to the reports topic.
//! - **Mutual TLS**: CA certificate, client certificate and private key from PEM files.
//! - **Self-healing session**: fixed-delay reconnect whenever the broker session drops.
//! - **Scripted commands**: a free-running timer emits configured commands to the radio.
//!
//! ## Module Organization
//!
//! - [`xbee`] - serial link, line framer and message codec
//! - [`bridge`] - control loop, router and periodic emitter
//! - [`mqtt`] - broker session and network association
//! - [`config`] - TOML configuration
//! - [`error`] - error types
//! - [`logutil`] - log sanitizing helpers
//! - [`metrics`] - process-lifetime counters
//!
//! ## Architecture
//!
//! ```text
//!  XBee ──serial──> LineFramer ──> codec::parse ──> Router ──publish──> Broker
//!   ^                                                 │
//!   └──── PeriodicEmitter                            └──> log
//!  Broker ──downlink──> SecureSession queue ──> log
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod logutil;
pub mod metrics;
pub mod mqtt;
pub mod xbee;
