//! Process-lifetime bridge counters.
//! Updated from the bridge loop; a snapshot is logged at shutdown.
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

static LINES_RECEIVED: AtomicU64 = AtomicU64::new(0);
static REPORTS_PUBLISHED: AtomicU64 = AtomicU64::new(0);
static PUBLISH_FAILURES: AtomicU64 = AtomicU64::new(0);
static MALFORMED_LINES: AtomicU64 = AtomicU64::new(0);
static UNKNOWN_KINDS: AtomicU64 = AtomicU64::new(0);
static RADIO_ERRORS: AtomicU64 = AtomicU64::new(0);
static COMMANDS_SENT: AtomicU64 = AtomicU64::new(0);
static DOWNLINK_RECEIVED: AtomicU64 = AtomicU64::new(0);
static SESSION_RECONNECTS: AtomicU64 = AtomicU64::new(0);

pub fn inc_lines_received() {
    LINES_RECEIVED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_reports_published() {
    REPORTS_PUBLISHED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_publish_failures() {
    PUBLISH_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_malformed_lines() {
    MALFORMED_LINES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_unknown_kinds() {
    UNKNOWN_KINDS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_radio_errors() {
    RADIO_ERRORS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_commands_sent() {
    COMMANDS_SENT.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_downlink_received() {
    DOWNLINK_RECEIVED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_session_reconnects() {
    SESSION_RECONNECTS.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub lines_received: u64,
    pub reports_published: u64,
    pub publish_failures: u64,
    pub malformed_lines: u64,
    pub unknown_kinds: u64,
    pub radio_errors: u64,
    pub commands_sent: u64,
    pub downlink_received: u64,
    pub session_reconnects: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        lines_received: LINES_RECEIVED.load(Ordering::Relaxed),
        reports_published: REPORTS_PUBLISHED.load(Ordering::Relaxed),
        publish_failures: PUBLISH_FAILURES.load(Ordering::Relaxed),
        malformed_lines: MALFORMED_LINES.load(Ordering::Relaxed),
        unknown_kinds: UNKNOWN_KINDS.load(Ordering::Relaxed),
        radio_errors: RADIO_ERRORS.load(Ordering::Relaxed),
        commands_sent: COMMANDS_SENT.load(Ordering::Relaxed),
        downlink_received: DOWNLINK_RECEIVED.load(Ordering::Relaxed),
        session_reconnects: SESSION_RECONNECTS.load(Ordering::Relaxed),
    }
}
