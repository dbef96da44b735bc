//! Typed surface over the speech engine's JSON event stream.

use serde_json::Value;

/// Events the bridge consumes. Anything else on the wire is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Session configuration acknowledged; the call may begin.
    SessionReady,
    /// A generation turn started producing output.
    ResponseStarted,
    /// The in-flight generation turn finished (done, cancelled, or failed).
    ResponseCompleted,
    /// Caller speech detected — during playback this is a barge-in.
    SpeechStarted,
    /// A finalized caller transcript, with its item id for dedupe.
    TranscriptCompleted { item_id: String, transcript: String },
    /// A chunk of synthesized audio, base64-encoded in the transport codec.
    AudioDelta { payload: String },
    /// All audio for the current turn has been emitted.
    AudioDone,
    /// Engine-side error; recoverable at the bridge level.
    Error { message: String },
    /// The engine connection closed.
    Closed,
}

/// Parse one inbound text frame. Returns `None` for frames the bridge
/// does not care about, including malformed ones — never fatal.
pub fn parse_event(text: &str) -> Option<EngineEvent> {
    let value: Value = serde_json::from_str(text).ok()?;
    let event_type = value.get("type")?.as_str()?;

    match event_type {
        "session.updated" => Some(EngineEvent::SessionReady),
        "response.created" => Some(EngineEvent::ResponseStarted),
        "response.done" => Some(EngineEvent::ResponseCompleted),
        "input_audio_buffer.speech_started" => Some(EngineEvent::SpeechStarted),
        "conversation.item.input_audio_transcription.completed" => {
            let item_id = value.get("item_id")?.as_str()?.to_string();
            let transcript = value.get("transcript")?.as_str()?.to_string();
            Some(EngineEvent::TranscriptCompleted {
                item_id,
                transcript,
            })
        }
        "response.audio.delta" => {
            let payload = value.get("delta")?.as_str()?.to_string();
            Some(EngineEvent::AudioDelta { payload })
        }
        "response.audio.done" => Some(EngineEvent::AudioDone),
        "error" => {
            let message = value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("unknown engine error")
                .to_string();
            Some(EngineEvent::Error { message })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_ready() {
        let event = parse_event(r#"{"type":"session.updated","session":{}}"#);
        assert_eq!(event, Some(EngineEvent::SessionReady));
    }

    #[test]
    fn test_parse_response_lifecycle() {
        assert_eq!(
            parse_event(r#"{"type":"response.created"}"#),
            Some(EngineEvent::ResponseStarted)
        );
        assert_eq!(
            parse_event(r#"{"type":"response.done","response":{"status":"completed"}}"#),
            Some(EngineEvent::ResponseCompleted)
        );
    }

    #[test]
    fn test_parse_transcript() {
        let event = parse_event(
            r#"{"type":"conversation.item.input_audio_transcription.completed","item_id":"item_7","transcript":"dale"}"#,
        );
        assert_eq!(
            event,
            Some(EngineEvent::TranscriptCompleted {
                item_id: "item_7".into(),
                transcript: "dale".into(),
            })
        );
    }

    #[test]
    fn test_parse_audio_delta() {
        let event = parse_event(r#"{"type":"response.audio.delta","delta":"AAEC"}"#);
        assert_eq!(
            event,
            Some(EngineEvent::AudioDelta {
                payload: "AAEC".into()
            })
        );
    }

    #[test]
    fn test_parse_error_with_and_without_message() {
        assert_eq!(
            parse_event(r#"{"type":"error","error":{"message":"rate limited"}}"#),
            Some(EngineEvent::Error {
                message: "rate limited".into()
            })
        );
        assert_eq!(
            parse_event(r#"{"type":"error"}"#),
            Some(EngineEvent::Error {
                message: "unknown engine error".into()
            })
        );
    }

    #[test]
    fn test_malformed_and_unknown_frames_are_dropped() {
        assert_eq!(parse_event("not json"), None);
        assert_eq!(parse_event(r#"{"no_type":true}"#), None);
        assert_eq!(parse_event(r#"{"type":"rate_limits.updated"}"#), None);
        // Transcript missing its item id is unusable for dedupe.
        assert_eq!(
            parse_event(
                r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"x"}"#
            ),
            None
        );
    }
}
