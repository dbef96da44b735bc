//! Engine connection lifecycle — session configuration, command
//! writer, event reader.

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use screenline_core::config::EngineConfig;
use screenline_core::prompts;

use crate::events::{parse_event, EngineEvent};

const DEFAULT_ENGINE_URL: &str = "wss://api.openai.com/v1/realtime";
const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview";
const DEFAULT_VOICE: &str = "alloy";
const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";
const DEFAULT_LANGUAGE: &str = "es";

/// Resolved connection settings for one speech session.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub voice: String,
    pub transcription_model: String,
    pub language: String,
}

impl EngineSettings {
    /// Resolve settings from config, failing if no API key is available.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| anyhow::anyhow!("No speech engine API key configured"))?;

        Ok(Self {
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_ENGINE_URL.to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            voice: config
                .voice
                .clone()
                .unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            transcription_model: config
                .transcription_model
                .clone()
                .unwrap_or_else(|| DEFAULT_TRANSCRIPTION_MODEL.to_string()),
            language: config
                .language
                .clone()
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}?model={}", self.base_url.trim_end_matches('/'), self.model)
    }
}

/// Commands the bridge sends to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    /// Forward a base64 audio payload verbatim into the input buffer.
    AppendAudio(String),
    /// Request one generation turn, optionally overriding the default
    /// behavior with per-turn instructions.
    CreateResponse { instructions: Option<String> },
    /// Cancel the in-flight generation (barge-in).
    CancelResponse,
    /// Close the engine connection.
    Close,
}

/// Handle for sending commands to a connected engine session.
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    /// Wrap an existing command channel. Used by the bridge tests to
    /// observe commands without a live socket.
    pub fn from_sender(command_tx: mpsc::UnboundedSender<EngineCommand>) -> Self {
        Self { command_tx }
    }

    pub fn send(&self, command: EngineCommand) {
        // A closed channel means the session is already torn down;
        // callers treat that as call end, not an error.
        if self.command_tx.send(command).is_err() {
            debug!("Engine command channel closed");
        }
    }

    pub fn append_audio(&self, payload: String) {
        self.send(EngineCommand::AppendAudio(payload));
    }

    pub fn create_response(&self, instructions: Option<String>) {
        self.send(EngineCommand::CreateResponse { instructions });
    }

    pub fn cancel_response(&self) {
        self.send(EngineCommand::CancelResponse);
    }

    pub fn close(&self) {
        self.send(EngineCommand::Close);
    }
}

/// Build the one-time session configuration message.
///
/// Auto-generation is explicitly disabled: the bridge, not the engine,
/// decides when to generate a reply.
fn build_session_update(settings: &EngineSettings) -> serde_json::Value {
    json!({
        "type": "session.update",
        "session": {
            "modalities": ["audio", "text"],
            "instructions": prompts::BASE_INSTRUCTIONS,
            "voice": settings.voice,
            "input_audio_format": "g711_ulaw",
            "output_audio_format": "g711_ulaw",
            "input_audio_transcription": {
                "model": settings.transcription_model,
                "language": settings.language,
            },
            "turn_detection": {
                "type": "server_vad",
                "create_response": false,
                "interrupt_response": false,
            },
        }
    })
}

/// Serialize a command to its wire message, or `None` for `Close`.
fn command_to_message(command: &EngineCommand) -> Option<String> {
    let value = match command {
        EngineCommand::AppendAudio(payload) => json!({
            "type": "input_audio_buffer.append",
            "audio": payload,
        }),
        EngineCommand::CreateResponse { instructions } => match instructions {
            Some(text) => json!({
                "type": "response.create",
                "response": { "instructions": text },
            }),
            None => json!({ "type": "response.create" }),
        },
        EngineCommand::CancelResponse => json!({ "type": "response.cancel" }),
        EngineCommand::Close => return None,
    };
    Some(value.to_string())
}

/// Open one engine session: connect, send the session configuration,
/// and spawn the relay task. Returns a command handle and the event
/// receiver. The task ends when the socket closes or `Close` is sent;
/// a final `Closed` event is always delivered.
pub async fn connect(
    settings: EngineSettings,
) -> Result<(EngineHandle, mpsc::UnboundedReceiver<EngineEvent>)> {
    let endpoint = settings.endpoint();
    let mut request = endpoint.clone().into_client_request()?;
    let headers = request.headers_mut();
    headers.insert(
        "Authorization",
        HeaderValue::from_str(&format!("Bearer {}", settings.api_key))?,
    );
    headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

    let (mut ws, _resp) = connect_async(request).await?;
    debug!(endpoint = %endpoint, "Engine connected");

    let session_update = build_session_update(&settings);
    ws.send(Message::Text(session_update.to_string().into()))
        .await?;

    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<EngineCommand>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<EngineEvent>();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    let Some(command) = command else { break };
                    match command_to_message(&command) {
                        Some(text) => {
                            if ws.send(Message::Text(text.into())).await.is_err() {
                                warn!("Engine send failed, closing session");
                                break;
                            }
                        }
                        None => break, // Close
                    }
                }
                frame = ws.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = parse_event(&text) {
                                if event_tx.send(event).is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            warn!(%e, "Engine socket error");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }
        let _ = ws.close(None).await;
        let _ = event_tx.send(EngineEvent::Closed);
        debug!("Engine session ended");
    });

    Ok((EngineHandle { command_tx }, event_rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> EngineSettings {
        EngineSettings {
            api_key: "sk-test".into(),
            base_url: DEFAULT_ENGINE_URL.into(),
            model: "gpt-4o-realtime-preview".into(),
            voice: "alloy".into(),
            transcription_model: "whisper-1".into(),
            language: "es".into(),
        }
    }

    #[test]
    fn test_session_update_disables_auto_response() {
        let update = build_session_update(&test_settings());
        assert_eq!(update["type"], "session.update");

        let session = &update["session"];
        assert_eq!(session["turn_detection"]["type"], "server_vad");
        assert_eq!(session["turn_detection"]["create_response"], false);
        assert_eq!(session["input_audio_format"], "g711_ulaw");
        assert_eq!(session["output_audio_format"], "g711_ulaw");
        assert_eq!(session["input_audio_transcription"]["language"], "es");
    }

    #[test]
    fn test_command_serialization() {
        let append = command_to_message(&EngineCommand::AppendAudio("AAEC".into())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&append).unwrap();
        assert_eq!(value["type"], "input_audio_buffer.append");
        assert_eq!(value["audio"], "AAEC");

        let create = command_to_message(&EngineCommand::CreateResponse {
            instructions: Some("say hi".into()),
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&create).unwrap();
        assert_eq!(value["type"], "response.create");
        assert_eq!(value["response"]["instructions"], "say hi");

        let unconstrained =
            command_to_message(&EngineCommand::CreateResponse { instructions: None }).unwrap();
        let value: serde_json::Value = serde_json::from_str(&unconstrained).unwrap();
        assert_eq!(value["type"], "response.create");
        assert!(value.get("response").is_none());

        let cancel = command_to_message(&EngineCommand::CancelResponse).unwrap();
        let value: serde_json::Value = serde_json::from_str(&cancel).unwrap();
        assert_eq!(value["type"], "response.cancel");

        assert!(command_to_message(&EngineCommand::Close).is_none());
    }

    #[test]
    fn test_endpoint_includes_model() {
        let settings = test_settings();
        assert_eq!(
            settings.endpoint(),
            "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview"
        );
    }
}
