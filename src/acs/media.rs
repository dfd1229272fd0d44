//! ACS media streaming WebSocket: the caller-facing duplex transport.
//!
//! One task multiplexes three flows with `tokio::select!`: caller audio in
//! (forwarded to the realtime session), relay frames out (written to the
//! socket), and the session-closed signal (ends the loop so the call does
//! not hang waiting for audio that will never arrive).

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::openai::session::RealtimeSession;
use crate::relay::OutboundAudio;
use crate::AppState;

/// Messages ACS sends on the media WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind")]
enum StreamMessage {
    /// One caller-audio frame.
    AudioData {
        #[serde(rename = "audioData")]
        audio_data: AudioPayload,
    },
    /// Format metadata, sent once when the subscription starts.
    AudioMetadata {
        #[serde(rename = "audioMetadata", default)]
        audio_metadata: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct AudioPayload {
    /// Base64 PCM from the call.
    #[serde(default)]
    data: String,
    #[serde(default)]
    silent: bool,
}

/// WebSocket upgrade handler for GET /ws.
pub async fn handle_media_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_media_stream(socket, state))
}

async fn handle_media_stream(mut socket: WebSocket, state: AppState) {
    tracing::info!("Media stream connected");

    // The call id comes from call placement, not the socket — ACS does not
    // identify the call on the transport itself.
    let call_id = match state.calls.current_call_id().await {
        Some(id) => id,
        None => {
            tracing::warn!("Media stream connected with no call in progress");
            "unidentified".to_string()
        }
    };

    let (response_tx, mut response_rx) = mpsc::channel::<Message>(64);
    state.registry.register(&call_id, response_tx).await;

    // Open the realtime session before relaying any audio. Connection
    // failure ends the call's AI leg; the caller socket is closed too.
    let session = match RealtimeSession::connect(&state.config.openai).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(call_id = %call_id, "Failed to open realtime session: {e}");
            state.registry.clear(&call_id).await;
            return;
        }
    };
    let handle = session.handle();
    let session_closed = CancellationToken::new();
    tokio::spawn(session.run(
        OutboundAudio::new(state.registry.clone()),
        session_closed.clone(),
    ));

    loop {
        tokio::select! {
            ws_msg = socket.recv() => {
                let text = match ws_msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!(call_id = %call_id, "Media stream closed");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::error!(call_id = %call_id, "Media stream error: {e}");
                        break;
                    }
                    _ => continue,
                };

                let msg: StreamMessage = match serde_json::from_str(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::warn!("Undecodable media message: {e}");
                        continue;
                    }
                };

                match msg {
                    StreamMessage::AudioData { audio_data } => {
                        if let Err(e) = handle.send_audio(audio_data.data).await {
                            tracing::warn!("Failed to push caller audio upstream: {e}");
                        }
                    }
                    StreamMessage::AudioMetadata { audio_metadata } => {
                        tracing::info!(metadata = %audio_metadata, "Media format negotiated");
                    }
                    StreamMessage::Unknown => {}
                }
            }

            Some(msg) = response_rx.recv() => {
                if let Err(e) = socket.send(msg).await {
                    tracing::error!(call_id = %call_id, "Failed to write to media stream: {e}");
                    break;
                }
            }

            _ = session_closed.cancelled() => {
                tracing::info!(call_id = %call_id, "Realtime session ended, closing media stream");
                break;
            }
        }
    }

    // Invalidate the handle so later sends fail cleanly, then drop the
    // upstream session.
    state.registry.clear(&call_id).await;
    handle.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_audio_data_frame() {
        let msg: StreamMessage = serde_json::from_str(
            r#"{"kind":"AudioData","audioData":{"timestamp":"2024-01-01T00:00:00Z","data":"cGNt","silent":false}}"#,
        )
        .unwrap();
        match msg {
            StreamMessage::AudioData { audio_data } => {
                assert_eq!(audio_data.data, "cGNt");
                assert!(!audio_data.silent);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn decodes_audio_metadata_frame() {
        let msg: StreamMessage = serde_json::from_str(
            r#"{"kind":"AudioMetadata","audioMetadata":{"subscriptionId":"s1","encoding":"PCM","sampleRate":24000}}"#,
        )
        .unwrap();
        match msg {
            StreamMessage::AudioMetadata { audio_metadata } => {
                assert_eq!(audio_metadata["sampleRate"], 24000);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_is_tolerated() {
        let msg: StreamMessage =
            serde_json::from_str(r#"{"kind":"DtmfData","dtmfData":{"data":"5"}}"#).unwrap();
        assert!(matches!(msg, StreamMessage::Unknown));
    }
}
