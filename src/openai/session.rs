//! Realtime session manager: owns the WebSocket to the Azure OpenAI
//! realtime deployment, pushes caller audio upstream, and relays session
//! events to the outbound adapter.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::config::OpenAiConfig;
use crate::openai::events::{
    ClientEvent, InputAudioTranscription, ServerEvent, SessionConfig, TurnDetection,
};
use crate::relay::OutboundAudio;

const API_VERSION: &str = "2024-10-01-preview";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to connect realtime session: {0}")]
    Connect(String),
    #[error("failed to send on realtime session: {0}")]
    Send(String),
}

/// One live realtime conversation. Created per call once the media stream
/// connects; the configuration message is sent before any audio.
pub struct RealtimeSession {
    write: Arc<Mutex<WsSink>>,
    read: WsSource,
}

impl RealtimeSession {
    /// Connect and configure the session: instructions, server VAD turn
    /// detection, voice, PCM16 in/out, and input transcription.
    pub async fn connect(cfg: &OpenAiConfig) -> Result<Self, SessionError> {
        let url = realtime_url(&cfg.endpoint, &cfg.deployment);
        let mut request = url
            .into_client_request()
            .map_err(|e| SessionError::Connect(e.to_string()))?;
        let key = HeaderValue::from_str(&cfg.api_key)
            .map_err(|e| SessionError::Connect(e.to_string()))?;
        request.headers_mut().insert("api-key", key);

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| SessionError::Connect(e.to_string()))?;
        tracing::info!(deployment = %cfg.deployment, "Realtime session connected");

        let (mut write, read) = stream.split();

        let update = ClientEvent::SessionUpdate {
            session: SessionConfig {
                instructions: cfg.instructions.clone(),
                turn_detection: TurnDetection::ServerVad {},
                voice: cfg.voice.clone(),
                input_audio_format: "pcm16".to_string(),
                output_audio_format: "pcm16".to_string(),
                input_audio_transcription: InputAudioTranscription {
                    model: "whisper-1".to_string(),
                },
            },
        };
        send_event(&mut write, &update).await?;

        Ok(Self {
            write: Arc::new(Mutex::new(write)),
            read,
        })
    }

    /// Cheap clone-able handle for pushing caller audio while the receive
    /// loop owns the read half.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            write: Arc::clone(&self.write),
        }
    }

    /// Receive loop: classify each session event and dispatch it until the
    /// connection closes, then fire `closed` so the media loop can end too.
    ///
    /// Dispatch is inline on this task, so frames reach the outbound
    /// adapter in event order — the barge-in stop frame always precedes
    /// audio deltas that arrive after it.
    pub async fn run(self, outbound: OutboundAudio, closed: CancellationToken) {
        let mut read = self.read;
        while let Some(msg) = read.next().await {
            let text = match msg {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => {
                    tracing::info!("Realtime session closed by server");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::error!("Realtime session error: {e}");
                    break;
                }
            };

            let event: ServerEvent = match serde_json::from_str(&text) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("Undecodable session event: {e}");
                    continue;
                }
            };

            handle_event(event, &outbound).await;
        }

        tracing::info!("Realtime receive loop ended");
        closed.cancel();
    }
}

#[derive(Clone)]
pub struct SessionHandle {
    write: Arc<Mutex<WsSink>>,
}

impl SessionHandle {
    /// Push one caller-audio fragment upstream. The payload must already be
    /// in the session's negotiated input format; it is forwarded opaquely.
    pub async fn send_audio(&self, audio: String) -> Result<(), SessionError> {
        let event = ClientEvent::InputAudioBufferAppend { audio };
        let mut write = self.write.lock().await;
        send_event(&mut write, &event).await
    }

    pub async fn close(&self) {
        let _ = self.write.lock().await.close().await;
    }
}

async fn send_event(write: &mut WsSink, event: &ClientEvent) -> Result<(), SessionError> {
    let text = serde_json::to_string(event).map_err(|e| SessionError::Send(e.to_string()))?;
    write
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| SessionError::Send(e.to_string()))
}

/// Dispatch one classified session event.
///
/// Frame-level failures are logged and dropped; only a closed connection
/// ends the loop (handled by the caller).
pub(crate) async fn handle_event(event: ServerEvent, outbound: &OutboundAudio) {
    match event {
        ServerEvent::SessionCreated { session } => {
            tracing::info!(session_id = %session.id, "Session created");
        }
        ServerEvent::Error { error } => {
            tracing::error!("Session error event: {error}");
        }
        ServerEvent::InputAudioBufferCleared => {
            tracing::debug!("Input audio buffer cleared");
        }
        ServerEvent::SpeechStarted { audio_start_ms } => {
            tracing::info!(audio_start_ms, "Caller speech detected, stopping playback");
            if let Err(e) = outbound.send_stop_frame().await {
                tracing::warn!("Failed to send stop frame: {e}");
            }
        }
        ServerEvent::SpeechStopped { audio_end_ms } => {
            tracing::debug!(audio_end_ms, "Caller speech stopped");
        }
        ServerEvent::TranscriptionCompleted { transcript } => {
            tracing::info!(%transcript, "Caller transcript");
        }
        ServerEvent::TranscriptionFailed { error } => {
            tracing::warn!("Caller transcription failed: {error}");
        }
        ServerEvent::ResponseDone { response } => {
            match &response.status_details {
                Some(details) => tracing::info!(
                    response_id = %response.id,
                    status = response.status.as_deref().unwrap_or("unknown"),
                    %details,
                    "Response done"
                ),
                None => tracing::info!(response_id = %response.id, "Response done"),
            };
        }
        ServerEvent::AudioTranscriptDone { transcript } => {
            tracing::info!(%transcript, "Assistant transcript");
        }
        ServerEvent::AudioDelta { delta } => {
            if let Err(e) = outbound.send_audio_frame(&delta).await {
                tracing::warn!("Dropping audio frame: {e}");
            }
        }
        ServerEvent::Unknown => {}
    }
}

fn realtime_url(endpoint: &str, deployment: &str) -> String {
    let base = endpoint
        .trim_end_matches('/')
        .replace("https://", "wss://")
        .replace("http://", "ws://");
    format!("{base}/openai/realtime?api-version={API_VERSION}&deployment={deployment}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionRegistry;
    use crate::relay::{FrameKind, OutStreamingData};
    use axum::extract::ws::Message as WsMessage;
    use tokio::sync::mpsc;

    fn delta(payload: &str) -> ServerEvent {
        ServerEvent::AudioDelta {
            delta: payload.to_string(),
        }
    }

    async fn wired() -> (OutboundAudio, mpsc::Receiver<WsMessage>) {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::channel(32);
        registry.register("c1", tx).await;
        (OutboundAudio::new(registry), rx)
    }

    fn decode(msg: WsMessage) -> OutStreamingData {
        match msg {
            WsMessage::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn realtime_url_swaps_scheme_and_carries_deployment() {
        let url = realtime_url("https://res.openai.azure.com/", "gpt-4o-realtime");
        assert_eq!(
            url,
            format!(
                "wss://res.openai.azure.com/openai/realtime?api-version={API_VERSION}&deployment=gpt-4o-realtime"
            )
        );
    }

    #[tokio::test]
    async fn deltas_relay_in_order() {
        let (outbound, mut rx) = wired().await;

        for payload in ["A", "B", "C"] {
            handle_event(delta(payload), &outbound).await;
        }

        for expected in ["A", "B", "C"] {
            let frame = decode(rx.recv().await.unwrap());
            assert_eq!(frame.kind, FrameKind::AudioData);
            assert_eq!(frame.audio_data.unwrap().data, expected);
        }
    }

    #[tokio::test]
    async fn speech_started_interleaves_stop_frame() {
        let (outbound, mut rx) = wired().await;

        handle_event(delta("A"), &outbound).await;
        handle_event(ServerEvent::SpeechStarted { audio_start_ms: 10 }, &outbound).await;
        handle_event(delta("B"), &outbound).await;

        let first = decode(rx.recv().await.unwrap());
        assert_eq!(first.kind, FrameKind::AudioData);
        assert_eq!(first.audio_data.unwrap().data, "A");

        let second = decode(rx.recv().await.unwrap());
        assert_eq!(second.kind, FrameKind::StopAudio);
        assert!(second.stop_audio.is_some());

        let third = decode(rx.recv().await.unwrap());
        assert_eq!(third.kind, FrameKind::AudioData);
        assert_eq!(third.audio_data.unwrap().data, "B");
    }

    #[tokio::test]
    async fn unknown_event_emits_nothing_and_loop_continues() {
        let (outbound, mut rx) = wired().await;

        let unknown: ServerEvent = serde_json::from_str(r#"{"type":"foo.bar"}"#).unwrap();
        handle_event(unknown, &outbound).await;
        handle_event(delta("after"), &outbound).await;

        let frame = decode(rx.recv().await.unwrap());
        assert_eq!(frame.audio_data.unwrap().data, "after");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn log_only_events_emit_no_frames() {
        let (outbound, mut rx) = wired().await;

        handle_event(ServerEvent::InputAudioBufferCleared, &outbound).await;
        handle_event(ServerEvent::SpeechStopped { audio_end_ms: 99 }, &outbound).await;
        handle_event(
            ServerEvent::TranscriptionCompleted {
                transcript: "hello".to_string(),
            },
            &outbound,
        )
        .await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dispatch_survives_missing_connection() {
        let outbound = OutboundAudio::new(ConnectionRegistry::new());
        // Both paths log-and-drop; neither panics.
        handle_event(delta("A"), &outbound).await;
        handle_event(ServerEvent::SpeechStarted { audio_start_ms: 0 }, &outbound).await;
    }
}
