//! Line codec for [`StreamEvent`]s.
//!
//! Payloads are escaped so that every event occupies exactly one line:
//! backslash becomes `\\`, newline becomes `\n` and carriage return becomes
//! `\r`. The decoder reverses this.

use super::StreamEvent;
use tracing::warn;

const EVENT_PREFIX: &str = "event: ";
const DATA_SEPARATOR: &str = " data: ";

/// Message carried by the error event synthesized when input ends early.
pub const TRUNCATED_STREAM: &str = "stream ended before terminal event";

/// Encode one event as a single `\n`-terminated line.
pub fn encode_event(event: &StreamEvent) -> String {
    match event {
        StreamEvent::Done => "event: done\n".to_string(),
        other => format!(
            "{}{}{}{}\n",
            EVENT_PREFIX,
            other.kind(),
            DATA_SEPARATOR,
            escape(other.payload())
        ),
    }
}

fn escape(payload: &str) -> String {
    let mut out = String::with_capacity(payload.len());
    for c in payload.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(payload: &str) -> String {
    let mut out = String::with_capacity(payload.len());
    let mut chars = payload.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Parse one complete line. `None` for lines that are not events.
pub fn decode_line(line: &str) -> Option<StreamEvent> {
    let rest = line.strip_prefix(EVENT_PREFIX)?;

    let (kind, payload) = match rest.split_once(DATA_SEPARATOR) {
        Some((kind, payload)) => (kind, payload),
        None => (rest.strip_suffix(" data:").unwrap_or(rest).trim_end(), ""),
    };

    match kind {
        "context" => Some(StreamEvent::Context(unescape(payload))),
        "token" => Some(StreamEvent::Token(unescape(payload))),
        "error" => Some(StreamEvent::Error(unescape(payload))),
        "done" => Some(StreamEvent::Done),
        _ => None,
    }
}

/// Incremental decoder over arbitrarily split reads.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across reads decode intact. Blank lines are skipped and
/// lines that are not events are logged and skipped. After the first
/// terminal event everything else is ignored.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    finished: bool,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a terminal event has been decoded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed a chunk of input and return the events it completes.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = self.process(&line[..line.len() - 1]) {
                events.push(event);
                if self.finished {
                    self.buffer.clear();
                    break;
                }
            }
        }
        events
    }

    /// Signal end of input. Flushes an unterminated last line and reports a
    /// truncated stream as an error event.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut events = Vec::new();
        let rest = std::mem::take(&mut self.buffer);
        if let Some(event) = self.process(&rest) {
            events.push(event);
        }
        if !self.finished {
            self.finished = true;
            events.push(StreamEvent::Error(TRUNCATED_STREAM.to_string()));
        }
        events
    }

    fn process(&mut self, raw: &[u8]) -> Option<StreamEvent> {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim_end_matches('\r');
        if line.trim().is_empty() {
            return None;
        }

        match decode_line(line) {
            Some(event) => {
                self.finished = event.is_terminal();
                Some(event)
            }
            None => {
                warn!(line = %line, "Skipping malformed stream line");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn decode_all(parts: &[&[u8]]) -> Vec<StreamEvent> {
        let mut decoder = LineDecoder::new();
        let mut events = Vec::new();
        for part in parts {
            events.extend(decoder.feed(part));
        }
        events.extend(decoder.finish());
        events
    }

    #[test]
    fn test_encode_lines() {
        assert_eq!(
            encode_event(&StreamEvent::Token("Hello".into())),
            "event: token data: Hello\n"
        );
        assert_eq!(encode_event(&StreamEvent::Done), "event: done\n");
        assert_eq!(
            encode_event(&StreamEvent::Context("B\n\nA".into())),
            "event: context data: B\\n\\nA\n"
        );
    }

    #[test]
    fn test_multiline_payload_survives() {
        let payload = "line one\nline two\r\nback\\slash \\n literal";
        let mut wire = encode_event(&StreamEvent::Context(payload.into()));
        wire.push_str(&encode_event(&StreamEvent::Done));

        let events = decode_all(&[wire.as_bytes()]);
        assert_eq!(
            events,
            vec![StreamEvent::Context(payload.into()), StreamEvent::Done]
        );
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(7)]
    #[case(22)]
    fn test_split_reads(#[case] step: usize) {
        let wire = [&b"event: token data: Hel"[..], &b"lo\nevent: done\n"[..]].concat();
        let parts: Vec<&[u8]> = wire.chunks(step).collect();

        assert_eq!(
            decode_all(&parts),
            vec![StreamEvent::Token("Hello".into()), StreamEvent::Done]
        );
    }

    #[test]
    fn test_multibyte_split() {
        let wire = "event: token data: 天气\nevent: done\n".as_bytes();
        let parts: Vec<&[u8]> = wire.chunks(1).collect();

        assert_eq!(
            decode_all(&parts),
            vec![StreamEvent::Token("天气".into()), StreamEvent::Done]
        );
    }

    #[test]
    fn test_ignores_lines_after_terminal() {
        let wire = b"event: error data: boom\nevent: token data: late\nevent: done\n";
        assert_eq!(decode_all(&[&wire[..]]), vec![StreamEvent::Error("boom".into())]);
    }

    #[test]
    fn test_skips_blank_and_unknown_lines() {
        let wire = b"\r\n: ping\nevent: bogus data: x\nevent: token data: ok\r\nevent: done\n";
        assert_eq!(
            decode_all(&[&wire[..]]),
            vec![StreamEvent::Token("ok".into()), StreamEvent::Done]
        );
    }

    #[test]
    fn test_truncated_stream_is_error() {
        let events = decode_all(&[&b"event: token data: partial\n"[..]]);
        assert_eq!(
            events,
            vec![
                StreamEvent::Token("partial".into()),
                StreamEvent::Error(TRUNCATED_STREAM.into()),
            ]
        );
    }

    #[test]
    fn test_unterminated_final_line_is_flushed() {
        assert_eq!(
            decode_all(&[&b"event: token data: a\nevent: done"[..]]),
            vec![StreamEvent::Token("a".into()), StreamEvent::Done]
        );
    }

    #[test]
    fn test_empty_payloads() {
        assert_eq!(
            decode_line("event: token data: "),
            Some(StreamEvent::Token(String::new()))
        );
        assert_eq!(
            decode_line("event: context data:"),
            Some(StreamEvent::Context(String::new()))
        );
        assert_eq!(decode_line("event: done"), Some(StreamEvent::Done));
        assert_eq!(decode_line("data: nope"), None);
    }
}
