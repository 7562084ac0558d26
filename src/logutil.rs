//! Logging utilities for sanitizing serial lines and downlink payloads so logs stay single-line.
use std::fmt::{self, Write};

/// Longest preview of untrusted text written to the log.
pub const MAX_PREVIEW: usize = 300;

/// Display adapter that renders untrusted text on one line. Backslash, newline, CR and
/// tab get their usual two-character escapes, any other control character becomes
/// `\xNN`, and text past [`MAX_PREVIEW`] characters is cut with an ellipsis.
pub struct Preview<'a>(pub &'a str);

impl fmt::Display for Preview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chars = self.0.chars();
        for ch in chars.by_ref().take(MAX_PREVIEW) {
            match short_escape(ch) {
                Some(escaped) => f.write_str(escaped)?,
                None if ch.is_control() => write!(f, "\\x{:02X}", u32::from(ch))?,
                None => f.write_char(ch)?,
            }
        }
        if chars.next().is_some() {
            f.write_char('…')?;
        }
        Ok(())
    }
}

fn short_escape(ch: char) -> Option<&'static str> {
    Some(match ch {
        '\\' => "\\\\",
        '\n' => "\\n",
        '\r' => "\\r",
        '\t' => "\\t",
        _ => return None,
    })
}

/// [`Preview`] rendered into an owned string.
pub fn escape_log(s: &str) -> String {
    Preview(s).to_string()
}

/// Lossy UTF-8 rendering of raw bytes (e.g. an MQTT payload), escaped for the log.
pub fn escape_bytes(data: &[u8]) -> String {
    escape_log(&String::from_utf8_lossy(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_newlines_and_tabs() {
        let s = "REPORT:N1\r\n\tEnd";
        assert_eq!(escape_log(s), "REPORT:N1\\r\\n\\tEnd");
    }

    #[test]
    fn escapes_other_control_chars_as_hex() {
        assert_eq!(escape_log("a\u{0}b\u{7}"), "a\\x00b\\x07");
    }

    #[test]
    fn truncates_long_lines() {
        let s = "x".repeat(MAX_PREVIEW + 50);
        let esc = escape_log(&s);
        assert!(esc.ends_with('…'));
        assert_eq!(esc.chars().count(), MAX_PREVIEW + 1);
    }

    #[test]
    fn text_at_the_preview_limit_is_not_cut() {
        let s = "y".repeat(MAX_PREVIEW);
        assert_eq!(escape_log(&s), s);
    }

    #[test]
    fn preview_formats_inline() {
        let rendered = format!("[{}] {}", Preview("a\\b"), Preview("ERROR:x\n"));
        assert_eq!(rendered, "[a\\\\b] ERROR:x\\n");
    }

    #[test]
    fn bytes_are_rendered_lossily() {
        assert_eq!(escape_bytes(b"on\xff"), "on\u{FFFD}");
    }
}
