//! Line codec for the XBee serial protocol.
//!
//! Inbound lines have the shape `KIND:payload`. The kind tag is everything before the
//! first colon and is matched case-sensitively; the payload is everything after it and
//! may itself contain colons. REPORT payloads carry `nodeId:battery:data`.
//!
//! Outbound commands are plain text lines; the command text is the wire format and the
//! encoder only appends the CRLF terminator.
use serde::Serialize;
use std::fmt;

use crate::error::CodecError;

pub const KIND_REPORT: &str = "REPORT";
pub const KIND_REPORT_RESPONSE: &str = "REPORT_RESPONSE";
pub const KIND_CAMERA_RESPONSE: &str = "CAMERA_RESPONSE";
/// Any kind tag starting with this prefix is an error report from the radio.
pub const ERROR_PREFIX: &str = "ERROR";

/// Line terminator written after every outbound command.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Classification of an inbound line by its kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Report,
    ReportResponse,
    CameraResponse,
    Error,
    Unknown,
}

impl MessageKind {
    pub fn classify(tag: &str) -> Self {
        match tag {
            KIND_REPORT => MessageKind::Report,
            KIND_REPORT_RESPONSE => MessageKind::ReportResponse,
            KIND_CAMERA_RESPONSE => MessageKind::CameraResponse,
            t if t.starts_with(ERROR_PREFIX) => MessageKind::Error,
            _ => MessageKind::Unknown,
        }
    }
}

/// One parsed line from the serial peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundMessage {
    kind: MessageKind,
    tag: String,
    payload: String,
}

impl InboundMessage {
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// The kind tag exactly as received (e.g. `ERRORX` for an error variant).
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// The line as received, after trimming: tag and payload rejoined at the colon.
    pub fn original_line(&self) -> String {
        format!("{}:{}", self.tag, self.payload)
    }

    /// REPORT decomposition; `None` for other kinds or payloads with fewer than two colons.
    pub fn report(&self) -> Option<Report> {
        if self.kind != MessageKind::Report {
            return None;
        }
        Report::from_payload(&self.payload)
    }
}

/// Fields of a REPORT payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub node_id: String,
    pub battery: String,
    pub data: String,
}

impl Report {
    pub fn from_payload(payload: &str) -> Option<Self> {
        let (node_id, rest) = payload.split_once(':')?;
        let (battery, data) = rest.split_once(':')?;
        Some(Report {
            node_id: node_id.to_string(),
            battery: battery.to_string(),
            data: data.to_string(),
        })
    }
}

/// Parse one serial line.
///
/// Returns `Ok(None)` for blank lines, `Err(MalformedMessage)` when no colon is present.
pub fn parse(line: &str) -> Result<Option<InboundMessage>, CodecError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (tag, payload) = line
        .split_once(':')
        .ok_or_else(|| CodecError::MalformedMessage(line.to_string()))?;
    Ok(Some(InboundMessage {
        kind: MessageKind::classify(tag),
        tag: tag.to_string(),
        payload: payload.to_string(),
    }))
}

/// A single command line for the serial peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCommand(String);

impl OutboundCommand {
    pub fn new(text: impl Into<String>) -> Result<Self, CodecError> {
        let text = text.into();
        if text.is_empty() {
            return Err(CodecError::InvalidCommand("empty command".to_string()));
        }
        if text.contains(|c: char| matches!(c, '\0' | '\r' | '\n')) {
            return Err(CodecError::InvalidCommand(format!(
                "command contains NUL or line break: {}",
                crate::logutil::escape_log(&text)
            )));
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutboundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wire bytes for a command: the text followed by CRLF.
pub fn encode(command: &OutboundCommand) -> Vec<u8> {
    let mut out = Vec::with_capacity(command.0.len() + LINE_TERMINATOR.len());
    out.extend_from_slice(command.0.as_bytes());
    out.extend_from_slice(LINE_TERMINATOR);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_report_with_fields() {
        let msg = parse("REPORT:N1:80:temp=22").unwrap().unwrap();
        assert_eq!(msg.kind(), MessageKind::Report);
        assert_eq!(msg.payload(), "N1:80:temp=22");
        assert_eq!(msg.original_line(), "REPORT:N1:80:temp=22");
        let report = msg.report().expect("decomposable");
        assert_eq!(report.node_id, "N1");
        assert_eq!(report.battery, "80");
        assert_eq!(report.data, "temp=22");
    }

    #[test]
    fn report_data_keeps_extra_colons() {
        let report = Report::from_payload("N2:3.9:t=1:h=2").unwrap();
        assert_eq!(report.data, "t=1:h=2");
    }

    #[test]
    fn report_with_single_field_is_not_decomposed() {
        let msg = parse("REPORT:onlyonefield").unwrap().unwrap();
        assert_eq!(msg.kind(), MessageKind::Report);
        assert!(msg.report().is_none());
        assert!(Report::from_payload("N1:80").is_none());
    }

    #[test]
    fn trims_whitespace_and_carriage_return() {
        let msg = parse("  CAMERA_RESPONSE:OK\r").unwrap().unwrap();
        assert_eq!(msg.kind(), MessageKind::CameraResponse);
        assert_eq!(msg.payload(), "OK");
    }

    #[test]
    fn blank_lines_produce_nothing() {
        assert_eq!(parse(""), Ok(None));
        assert_eq!(parse(" \r\n"), Ok(None));
    }

    #[test]
    fn missing_colon_is_malformed() {
        assert_eq!(
            parse("HELLO"),
            Err(CodecError::MalformedMessage("HELLO".to_string()))
        );
    }

    #[test]
    fn classifies_kinds_case_sensitively() {
        assert_eq!(
            MessageKind::classify("REPORT_RESPONSE"),
            MessageKind::ReportResponse
        );
        assert_eq!(MessageKind::classify("ERROR"), MessageKind::Error);
        assert_eq!(MessageKind::classify("ERRORX"), MessageKind::Error);
        assert_eq!(MessageKind::classify("report"), MessageKind::Unknown);
        assert_eq!(MessageKind::classify("error"), MessageKind::Unknown);
        assert_eq!(MessageKind::classify("FOO"), MessageKind::Unknown);
    }

    #[test]
    fn empty_payload_is_allowed() {
        let msg = parse("REPORT_RESPONSE:").unwrap().unwrap();
        assert_eq!(msg.payload(), "");
        assert_eq!(msg.tag(), "REPORT_RESPONSE");
    }

    #[test]
    fn encode_appends_crlf() {
        let cmd = OutboundCommand::new("CAMERA:SENSOR_1:ON").unwrap();
        assert_eq!(encode(&cmd), b"CAMERA:SENSOR_1:ON\r\n".to_vec());
    }

    #[test]
    fn rejects_commands_with_line_breaks() {
        assert!(OutboundCommand::new("REPORT:A\nREPORT:B").is_err());
        assert!(OutboundCommand::new("X\0").is_err());
        assert!(OutboundCommand::new("").is_err());
    }
}
