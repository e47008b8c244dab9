//! Pieces shared by the per-client engine message routers.

use tracing::{debug, warn};

use crate::protocol::EngineEvent;

/// What a router did with one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Handled,
    /// Valid JSON with a `type` this client does not act on.
    Ignored,
    /// Not decodable; logged and dropped.
    Malformed,
}

/// Decode a frame, logging anything that cannot be routed. The error side
/// says why the frame was dropped.
pub fn decode(text: &str) -> Result<EngineEvent, Routed> {
    match EngineEvent::parse(text) {
        Ok(EngineEvent::Unsupported) => {
            debug!(frame = %truncate(text, 120), "unsupported event");
            Err(Routed::Ignored)
        }
        Ok(event) => Ok(event),
        Err(e) => {
            warn!(error = %e, frame = %truncate(text, 120), "malformed engine message");
            Err(Routed::Malformed)
        }
    }
}

/// `"1 player"`, `"3 players"`.
pub fn count_label(count: u64, noun: &str) -> String {
    format!("{count} {noun}{}", if count == 1 { "" } else { "s" })
}

/// Image URL with a random query so a viewer refetches the file.
pub fn cache_busted(filename: &str, nonce: f64) -> String {
    format!("{filename}?cache_buster={nonce}")
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_label_pluralizes() {
        assert_eq!(count_label(1, "player"), "1 player");
        assert_eq!(count_label(0, "player"), "0 players");
        assert_eq!(count_label(3, "client"), "3 clients");
    }

    #[test]
    fn cache_busted_appends_query() {
        assert_eq!(cache_busted("graph.png", 0.25), "graph.png?cache_buster=0.25");
    }

    #[test]
    fn decode_drops_unsupported_and_malformed() {
        assert_eq!(decode(r#"{"type":"whatever"}"#), Err(Routed::Ignored));
        assert_eq!(decode("not json"), Err(Routed::Malformed));
        assert_eq!(decode(r#"{"type":"stop_mode"}"#), Ok(EngineEvent::StopMode));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
