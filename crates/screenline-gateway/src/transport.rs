//! Telephony media-stream wire format.
//!
//! Frames are JSON objects tagged by an `event` field. Inbound frames
//! the bridge does not understand are dropped, never fatal; outbound
//! frames are built here so the field names live in one place.

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// Inbound frames from the telephony provider.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TransportEvent {
    /// Stream opened; carries the call and stream identifiers.
    Start { start: StartMeta },
    /// One chunk of caller audio, base64-encoded.
    Media { media: MediaMeta },
    /// Echo of a previously sent mark, after playback reached it.
    Mark { mark: MarkMeta },
    /// Stream closed by the provider (caller hung up or call ended).
    Stop,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StartMeta {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "callSid")]
    pub call_sid: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MediaMeta {
    pub payload: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MarkMeta {
    pub name: String,
}

/// Parse one inbound text frame. Unknown event types and malformed
/// JSON are logged at debug and dropped.
pub fn parse_frame(text: &str) -> Option<TransportEvent> {
    match serde_json::from_str::<TransportEvent>(text) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(%e, "Dropping unrecognized transport frame");
            None
        }
    }
}

/// Outbound audio frame carrying a base64 payload to play to the caller.
pub fn media_frame(stream_sid: &str, payload: &str) -> String {
    json!({
        "event": "media",
        "streamSid": stream_sid,
        "media": { "payload": payload },
    })
    .to_string()
}

/// Outbound mark frame; the provider echoes it back once playback of
/// everything queued before it has finished.
pub fn mark_frame(stream_sid: &str, name: &str) -> String {
    json!({
        "event": "mark",
        "streamSid": stream_sid,
        "mark": { "name": name },
    })
    .to_string()
}

/// Outbound clear frame; discards all audio buffered on the provider
/// side but not yet played.
pub fn clear_frame(stream_sid: &str) -> String {
    json!({
        "event": "clear",
        "streamSid": stream_sid,
    })
    .to_string()
}
