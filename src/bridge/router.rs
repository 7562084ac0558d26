//! Dispatch table for parsed serial lines.
//!
//! REPORT lines are published verbatim to the reports topic; responses and radio errors
//! are only logged; anything else is reported as unrecognized. Publish failures are
//! logged and the report is dropped.
use log::{error, info, warn};
use serde::Serialize;

use crate::logutil::escape_log;
use crate::metrics;
use crate::mqtt::Publisher;
use crate::xbee::codec::{self, InboundMessage, MessageKind, Report};

/// What the router did with one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RouteOutcome {
    /// Blank line, nothing to do
    Empty,
    /// No `KIND:` separator
    Malformed,
    /// REPORT published; `report` is present when the payload decomposed
    Published { report: Option<Report> },
    /// REPORT could not be published and was dropped
    PublishFailed { report: Option<Report> },
    /// Logged locally without any network action
    Logged { kind: MessageKind },
    /// Kind tag not recognized
    Unknown { tag: String },
}

pub struct Router {
    reports_topic: String,
}

impl Router {
    pub fn new(reports_topic: &str) -> Self {
        Self {
            reports_topic: reports_topic.to_string(),
        }
    }

    pub fn reports_topic(&self) -> &str {
        &self.reports_topic
    }

    /// Parse and route one raw line from the serial peer.
    pub fn route_line<P: Publisher>(&self, line: &str, uplink: &mut P) -> RouteOutcome {
        match codec::parse(line) {
            Ok(None) => RouteOutcome::Empty,
            Ok(Some(msg)) => {
                metrics::inc_lines_received();
                info!("Received from XBee: {}", escape_log(&msg.original_line()));
                self.route(&msg, uplink)
            }
            Err(e) => {
                metrics::inc_lines_received();
                metrics::inc_malformed_lines();
                warn!("Invalid message format: {}", escape_log(&e.to_string()));
                RouteOutcome::Malformed
            }
        }
    }

    pub fn route<P: Publisher>(&self, msg: &InboundMessage, uplink: &mut P) -> RouteOutcome {
        match msg.kind() {
            MessageKind::Report => self.route_report(msg, uplink),
            MessageKind::ReportResponse => {
                info!("Report response: {}", escape_log(msg.payload()));
                RouteOutcome::Logged { kind: msg.kind() }
            }
            MessageKind::CameraResponse => {
                info!("Camera response: {}", escape_log(msg.payload()));
                RouteOutcome::Logged { kind: msg.kind() }
            }
            MessageKind::Error => {
                metrics::inc_radio_errors();
                error!(
                    "Error from XBee ({}): {}",
                    escape_log(msg.tag()),
                    escape_log(msg.payload())
                );
                RouteOutcome::Logged { kind: msg.kind() }
            }
            MessageKind::Unknown => {
                metrics::inc_unknown_kinds();
                warn!("Unknown message type: {}", escape_log(msg.tag()));
                RouteOutcome::Unknown {
                    tag: msg.tag().to_string(),
                }
            }
        }
    }

    fn route_report<P: Publisher>(&self, msg: &InboundMessage, uplink: &mut P) -> RouteOutcome {
        let line = msg.original_line();
        let published = match uplink.publish(&self.reports_topic, line.as_bytes()) {
            Ok(()) => {
                metrics::inc_reports_published();
                info!("Report published to {}", self.reports_topic);
                true
            }
            Err(e) => {
                metrics::inc_publish_failures();
                warn!("Failed to publish report: {}", e);
                false
            }
        };

        let report = msg.report();
        if let Some(r) = &report {
            info!(
                "Report from {} - Battery: {} - Data: {}",
                escape_log(&r.node_id),
                escape_log(&r.battery),
                escape_log(&r.data)
            );
        }

        if published {
            RouteOutcome::Published { report }
        } else {
            RouteOutcome::PublishFailed { report }
        }
    }
}
