//! Outbound adapter: serializes audio and barge-in frames into the ACS
//! bidirectional streaming envelope and writes them to the registered
//! media connection.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use crate::registry::ConnectionRegistry;

/// Envelope ACS expects on the media WebSocket in the server-to-caller
/// direction. Unused arms are serialized as explicit nulls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutStreamingData {
    #[serde(rename = "Kind")]
    pub kind: FrameKind,
    #[serde(rename = "AudioData")]
    pub audio_data: Option<AudioData>,
    #[serde(rename = "StopAudio")]
    pub stop_audio: Option<StopAudio>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameKind {
    AudioData,
    StopAudio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioData {
    /// Base64 PCM, passed through from the realtime session unmodified.
    #[serde(rename = "Data")]
    pub data: String,
}

/// Barge-in control signal: tells ACS to discard buffered playback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StopAudio {}

impl OutStreamingData {
    pub fn audio(payload: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::AudioData,
            audio_data: Some(AudioData {
                data: payload.into(),
            }),
            stop_audio: None,
        }
    }

    pub fn stop() -> Self {
        Self {
            kind: FrameKind::StopAudio,
            audio_data: None,
            stop_audio: Some(StopAudio {}),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// No media connection registered, or the registered channel is gone.
    /// Non-fatal: the frame is dropped and the call continues.
    #[error("no active media connection")]
    NoActiveConnection,
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Sends frames to whichever media connection is currently registered.
///
/// The registry is read on every send, so a handle registered after a
/// failure is picked up by the next frame without any rebinding.
#[derive(Clone)]
pub struct OutboundAudio {
    registry: ConnectionRegistry,
}

impl OutboundAudio {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// Queue one synthesized audio fragment for the caller.
    pub async fn send_audio_frame(&self, payload: &str) -> Result<(), RelayError> {
        self.send(OutStreamingData::audio(payload)).await
    }

    /// Queue a barge-in stop signal. Must be sent ahead of any audio from
    /// the interrupted turn, which holds because the session event loop
    /// dispatches frames in arrival order on one task.
    pub async fn send_stop_frame(&self) -> Result<(), RelayError> {
        self.send(OutStreamingData::stop()).await
    }

    async fn send(&self, frame: OutStreamingData) -> Result<(), RelayError> {
        let handle = self
            .registry
            .active_handle()
            .await
            .ok_or(RelayError::NoActiveConnection)?;
        let text = serde_json::to_string(&frame)?;
        handle
            .send(Message::Text(text.into()))
            .await
            .map_err(|_| RelayError::NoActiveConnection)
    }
}
