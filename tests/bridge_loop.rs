use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use xbeebridge::bridge::emitter::PeriodicEmitter;
use xbeebridge::bridge::router::{RouteOutcome, Router};
use xbeebridge::bridge::{Bridge, MAX_READS_PER_DRAIN};
use xbeebridge::error::{BridgeError, BridgeResult};
use xbeebridge::mqtt::network::NetworkLink;
use xbeebridge::mqtt::{DownlinkMessage, Publisher, Uplink};
use xbeebridge::xbee::codec::{MessageKind, OutboundCommand};
use xbeebridge::xbee::SerialPeer;

#[derive(Default)]
struct FakeSerial {
    inbound: VecDeque<Vec<u8>>,
    written: Vec<String>,
}

impl FakeSerial {
    fn feed(&mut self, chunk: &[u8]) {
        self.inbound.push_back(chunk.to_vec());
    }
}

impl SerialPeer for FakeSerial {
    fn read_available(&mut self, buf: &mut [u8]) -> BridgeResult<usize> {
        match self.inbound.pop_front() {
            Some(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.inbound.push_front(chunk[n..].to_vec());
                }
                Ok(n)
            }
            None => Ok(0),
        }
    }

    fn write_command(&mut self, command: &OutboundCommand) -> BridgeResult<()> {
        self.written.push(command.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct FakeUplink {
    connected: bool,
    connects: usize,
    reject_publish: bool,
    published: Vec<(String, String)>,
    downlink: Vec<DownlinkMessage>,
}

impl Publisher for FakeUplink {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> BridgeResult<()> {
        if self.reject_publish {
            return Err(BridgeError::PublishFailure {
                topic: topic.to_string(),
                reason: "broker rejected".to_string(),
            });
        }
        self.published
            .push((topic.to_string(), String::from_utf8_lossy(payload).into_owned()));
        Ok(())
    }
}

impl Uplink for FakeUplink {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> BridgeResult<()> {
        self.connects += 1;
        self.connected = true;
        Ok(())
    }

    async fn service(&mut self) {}

    fn drain_downlink(&mut self) -> Vec<DownlinkMessage> {
        std::mem::take(&mut self.downlink)
    }
}

struct AlwaysUp;

impl NetworkLink for AlwaysUp {
    async fn associate(&mut self) {}

    async fn is_associated(&mut self) -> bool {
        true
    }
}

fn bridge(emitter: Option<PeriodicEmitter>) -> Bridge<FakeSerial, FakeUplink, AlwaysUp> {
    Bridge::new(
        FakeSerial::default(),
        FakeUplink::default(),
        AlwaysUp,
        Router::new("xbee/reports"),
        emitter,
        Duration::from_millis(1),
    )
}

fn scripted() -> Vec<OutboundCommand> {
    vec![
        OutboundCommand::new("REPORT:SENSOR_1").unwrap(),
        OutboundCommand::new("CAMERA:SENSOR_1:ON").unwrap(),
    ]
}

#[tokio::test]
async fn start_connects_the_session() {
    let mut b = bridge(None);
    b.start().await.unwrap();
    assert!(b.uplink().is_connected());
    assert_eq!(b.uplink().connects, 1);
}

#[tokio::test]
async fn step_reconnects_a_dropped_session() {
    let mut b = bridge(None);
    let summary = b.step().await.unwrap();
    assert!(summary.reconnected);
    let summary = b.step().await.unwrap();
    assert!(!summary.reconnected);
    assert_eq!(b.uplink().connects, 1);
}

#[tokio::test]
async fn routes_lines_in_arrival_order_across_chunks() {
    let mut b = bridge(None);
    b.start().await.unwrap();
    b.serial_mut().feed(b"REPORT:N1:80:te");
    b.serial_mut().feed(b"mp=22\r\nERRORX:oops\r\n\r\nFOO:bar\r\nREPORT:only");
    b.serial_mut().feed(b"onefield\r\nnocolon\r\nCAMERA_RESPONSE:ON\r\n");

    let summary = b.step().await.unwrap();
    assert_eq!(summary.outcomes.len(), 6);
    match &summary.outcomes[0] {
        RouteOutcome::Published { report: Some(r) } => {
            assert_eq!(r.node_id, "N1");
            assert_eq!(r.battery, "80");
            assert_eq!(r.data, "temp=22");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(
        summary.outcomes[1],
        RouteOutcome::Logged {
            kind: MessageKind::Error
        }
    );
    assert_eq!(
        summary.outcomes[2],
        RouteOutcome::Unknown {
            tag: "FOO".to_string()
        }
    );
    assert_eq!(summary.outcomes[3], RouteOutcome::Published { report: None });
    assert_eq!(summary.outcomes[4], RouteOutcome::Malformed);
    assert_eq!(
        summary.outcomes[5],
        RouteOutcome::Logged {
            kind: MessageKind::CameraResponse
        }
    );

    let published: Vec<_> = b.uplink().published.iter().map(|(_, m)| m.as_str()).collect();
    assert_eq!(published, vec!["REPORT:N1:80:temp=22", "REPORT:onlyonefield"]);
    assert!(b.uplink().published.iter().all(|(t, _)| t == "xbee/reports"));
}

#[tokio::test]
async fn partial_line_waits_for_its_terminator() {
    let mut b = bridge(None);
    b.start().await.unwrap();
    b.serial_mut().feed(b"REPORT:N9:50:");
    assert!(b.step().await.unwrap().outcomes.is_empty());
    assert!(b.uplink().published.is_empty());
    b.serial_mut().feed(b"door=open\n");
    assert_eq!(b.step().await.unwrap().outcomes.len(), 1);
    assert_eq!(b.uplink().published[0].1, "REPORT:N9:50:door=open");
}

#[tokio::test]
async fn publish_failure_does_not_stop_later_lines() {
    let mut b = bridge(None);
    b.start().await.unwrap();
    b.uplink_mut().reject_publish = true;
    b.serial_mut().feed(b"REPORT:N1:80:a\nREPORT_RESPONSE:N1:OK\n");
    let summary = b.step().await.unwrap();
    assert!(matches!(summary.outcomes[0], RouteOutcome::PublishFailed { .. }));
    assert_eq!(
        summary.outcomes[1],
        RouteOutcome::Logged {
            kind: MessageKind::ReportResponse
        }
    );

    b.uplink_mut().reject_publish = false;
    b.serial_mut().feed(b"REPORT:N1:81:b\n");
    b.step().await.unwrap();
    assert_eq!(b.uplink().published.len(), 1);
    assert_eq!(b.uplink().published[0].1, "REPORT:N1:81:b");
}

#[tokio::test]
async fn downlink_messages_are_drained_and_not_forwarded() {
    let mut b = bridge(None);
    b.start().await.unwrap();
    b.uplink_mut().downlink.push(DownlinkMessage {
        topic: "esp32/commands".to_string(),
        payload: b"REPORT:SENSOR_1".to_vec(),
    });
    let summary = b.step().await.unwrap();
    assert_eq!(summary.downlink.len(), 1);
    assert!(b.serial().written.is_empty());
    assert!(b.step().await.unwrap().downlink.is_empty());
}

#[tokio::test]
async fn emitter_sends_scripted_commands_when_due() {
    // Started two intervals ago, so the first step fires immediately
    let start = Instant::now() - Duration::from_millis(200);
    let emitter = PeriodicEmitter::starting_at(
        Duration::from_millis(100),
        Duration::from_millis(5),
        scripted(),
        start,
    );
    let mut b = bridge(Some(emitter));
    b.start().await.unwrap();

    let summary = b.step().await.unwrap();
    assert_eq!(summary.commands_sent, 2);
    assert_eq!(b.serial().written, vec!["REPORT:SENSOR_1", "CAMERA:SENSOR_1:ON"]);

    // Timer was reset by the firing
    let summary = b.step().await.unwrap();
    assert_eq!(summary.commands_sent, 0);
    assert_eq!(b.serial().written.len(), 2);
}

#[tokio::test]
async fn emitter_cadence_ignores_serial_traffic() {
    let emitter = PeriodicEmitter::new(Duration::from_secs(3600), Duration::ZERO, scripted());
    let mut b = bridge(Some(emitter));
    b.start().await.unwrap();
    for i in 0..20 {
        b.serial_mut().feed(format!("REPORT:N{}:80:x\n", i).as_bytes());
        assert_eq!(b.step().await.unwrap().commands_sent, 0);
    }
    assert!(b.serial().written.is_empty());
    assert_eq!(b.uplink().published.len(), 20);
}

#[tokio::test]
async fn serial_backlog_beyond_one_drain_is_routed_next_step() {
    let mut b = bridge(None);
    b.start().await.unwrap();
    let total = MAX_READS_PER_DRAIN + 6;
    for i in 0..total {
        b.serial_mut().feed(format!("REPORT:N{i}:80:seq={i}\r\n").as_bytes());
    }

    let first = b.step().await.unwrap();
    assert_eq!(first.outcomes.len(), MAX_READS_PER_DRAIN);
    let second = b.step().await.unwrap();
    assert_eq!(second.outcomes.len(), 6);

    let published = &b.uplink().published;
    assert_eq!(published.len(), total);
    for (i, (topic, payload)) in published.iter().enumerate() {
        assert_eq!(topic, "xbee/reports");
        assert_eq!(payload, &format!("REPORT:N{i}:80:seq={i}"));
    }
}
