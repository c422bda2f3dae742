//! Classifies complete lines of the chat stream into typed events.

use serde::{Deserialize, Deserializer};
use tracing::debug;

use nexus_core::error::{DecodeError, NexusError, Result};
use nexus_core::turn::Source;

/// Only lines with this prefix carry payload.
pub const DATA_PREFIX: &str = "data: ";
/// Payload marking the end of the answer.
pub const DONE_SENTINEL: &str = "[DONE]";

/// An event decoded from one `data:` line.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fragment of the answer text.
    Token(String),
    /// The full set of sources for the answer so far.
    SourcesUpdate(Vec<Source>),
    /// The sender finished the answer.
    Done,
    /// A `data:` line whose payload could not be parsed.
    Unparseable { raw_line: String, reason: String },
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Token(_) => "token",
            Self::SourcesUpdate(_) => "sources",
            Self::Done => "done",
            Self::Unparseable { .. } => "unparseable",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default)]
    token: Option<String>,
    #[serde(default, deserialize_with = "lenient_sources")]
    sources: Option<Vec<Source>>,
}

/// Keep every entry that reads as a source and drop the rest, so one bad
/// entry does not cost the token on the same line.
fn lenient_sources<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<Source>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(entries) = Option::<Vec<serde_json::Value>>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let total = entries.len();
    let sources: Vec<Source> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect();
    if sources.len() < total {
        debug!(dropped = total - sources.len(), "Dropped malformed source entries");
    }
    Ok(Some(sources))
}

/// Stateful line decoder for one response.
///
/// After the `[DONE]` sentinel every further line is ignored, including
/// lines that arrived in the same chunk as the sentinel.
#[derive(Debug, Default)]
pub struct EventDecoder {
    done: bool,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Decode one complete line. Returns zero, one, or two events.
    pub fn decode(&mut self, line: &str) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }
        let events = decode_line(line);
        if events.contains(&StreamEvent::Done) {
            self.done = true;
        }
        events
    }
}

/// Stateless classification of a single line.
///
/// Non-`data:` lines yield nothing. A payload carrying both a token and
/// sources yields the token first.
pub fn decode_line(line: &str) -> Vec<StreamEvent> {
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return Vec::new();
    };
    let data = data.trim();
    if data == DONE_SENTINEL {
        return vec![StreamEvent::Done];
    }

    let payload = match parse_payload(line, data) {
        Ok(p) => p,
        Err(NexusError::Decode(DecodeError::MalformedPayload { line, reason })) => {
            return vec![StreamEvent::Unparseable {
                raw_line: line,
                reason,
            }];
        }
        Err(other) => {
            return vec![StreamEvent::Unparseable {
                raw_line: line.to_string(),
                reason: other.to_string(),
            }];
        }
    };

    let mut events = Vec::new();
    if let Some(token) = payload.token {
        if !token.is_empty() {
            events.push(StreamEvent::Token(token));
        }
    }
    if let Some(sources) = payload.sources {
        events.push(StreamEvent::SourcesUpdate(sources));
    }
    events
}

fn parse_payload(line: &str, data: &str) -> Result<Payload> {
    let payload = serde_json::from_str(data).map_err(|e| DecodeError::MalformedPayload {
        line: line.to_string(),
        reason: e.to_string(),
    })?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_data_lines_are_ignored() {
        assert!(decode_line("event: message").is_empty());
        assert!(decode_line("id: 7").is_empty());
        assert!(decode_line(": keepalive").is_empty());
        assert!(decode_line("data:{\"token\":\"x\"}").is_empty());
        assert!(decode_line("").is_empty());
    }

    #[test]
    fn done_sentinel() {
        assert_eq!(decode_line("data: [DONE]"), vec![StreamEvent::Done]);
        assert_eq!(decode_line("data:  [DONE]  "), vec![StreamEvent::Done]);
    }

    #[test]
    fn token_payload() {
        assert_eq!(
            decode_line(r#"data: {"token":"你好"}"#),
            vec![StreamEvent::Token("你好".into())]
        );
    }

    #[test]
    fn empty_token_is_not_emitted() {
        assert!(decode_line(r#"data: {"token":""}"#).is_empty());
        assert!(decode_line(r#"data: {"token":null}"#).is_empty());
        assert!(decode_line(r#"data: {}"#).is_empty());
    }

    #[test]
    fn sources_payload_with_both_shapes() {
        let events =
            decode_line(r#"data: {"sources":["a.pdf",{"source_file":"b.pdf","score":0.9,"content":"..."}]}"#);
        assert_eq!(
            events,
            vec![StreamEvent::SourcesUpdate(vec![
                Source::named("a.pdf"),
                Source::new("b.pdf", Some(0.9), "..."),
            ])]
        );
    }

    #[test]
    fn sources_emitted_even_with_empty_token() {
        let events = decode_line(r#"data: {"token":"","sources":[]}"#);
        assert_eq!(events, vec![StreamEvent::SourcesUpdate(vec![])]);
    }

    #[test]
    fn token_before_sources_when_both_present() {
        let events = decode_line(r#"data: {"sources":["a.pdf"],"token":"x"}"#);
        assert_eq!(
            events,
            vec![
                StreamEvent::Token("x".into()),
                StreamEvent::SourcesUpdate(vec![Source::named("a.pdf")]),
            ]
        );
    }

    #[test]
    fn malformed_payload_is_unparseable() {
        let events = decode_line("data: {not json");
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Unparseable { raw_line, reason } => {
                assert_eq!(raw_line, "data: {not json");
                assert!(!reason.is_empty());
            }
            other => panic!("Expected Unparseable, got {other:?}"),
        }
    }

    #[test]
    fn bad_source_entry_keeps_token_and_good_entries() {
        let events = decode_line(r#"data: {"token":"x","sources":[42,"a.pdf",{"score":0.5}]}"#);
        assert_eq!(
            events,
            vec![
                StreamEvent::Token("x".into()),
                StreamEvent::SourcesUpdate(vec![Source::named("a.pdf")]),
            ]
        );
    }

    #[test]
    fn sources_that_are_not_a_list_are_unparseable() {
        assert_eq!(
            decode_line(r#"data: {"token":"x","sources":"a.pdf"}"#)[0].kind(),
            "unparseable"
        );
    }

    #[test]
    fn non_object_payload_is_unparseable() {
        assert_eq!(decode_line("data: 42")[0].kind(), "unparseable");
        assert_eq!(decode_line(r#"data: {"token":5}"#)[0].kind(), "unparseable");
    }

    #[test]
    fn decoder_ignores_everything_after_done() {
        let mut decoder = EventDecoder::new();
        assert_eq!(decoder.decode(r#"data: {"token":"a"}"#).len(), 1);
        assert_eq!(decoder.decode("data: [DONE]"), vec![StreamEvent::Done]);
        assert!(decoder.is_done());
        assert!(decoder.decode(r#"data: {"token":"late"}"#).is_empty());
        assert!(decoder.decode("data: [DONE]").is_empty());
    }

    #[test]
    fn decoder_survives_bad_line() {
        let mut decoder = EventDecoder::new();
        assert_eq!(decoder.decode("data: ???")[0].kind(), "unparseable");
        assert!(!decoder.is_done());
        assert_eq!(
            decoder.decode(r#"data: {"token":"ok"}"#),
            vec![StreamEvent::Token("ok".into())]
        );
    }
}
