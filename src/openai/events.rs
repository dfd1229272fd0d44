//! Typed messages for the Azure OpenAI Realtime WebSocket protocol.
//!
//! Events are tagged by a string `type` field. Server events we do not
//! handle decode into `Unknown` so a new event kind never breaks the loop.

use serde::{Deserialize, Serialize};

/// Events sent to the realtime session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },
    /// One caller-audio fragment, base64 PCM in the session's input format.
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionConfig {
    pub instructions: String,
    pub turn_detection: TurnDetection,
    pub voice: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub input_audio_transcription: InputAudioTranscription,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    /// Server-side voice activity detection; drives the barge-in signal.
    #[serde(rename = "server_vad")]
    ServerVad {},
}

#[derive(Debug, Clone, Serialize)]
pub struct InputAudioTranscription {
    pub model: String,
}

/// Events received from the realtime session.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated {
        #[serde(default)]
        session: SessionInfo,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: serde_json::Value,
    },
    #[serde(rename = "input_audio_buffer.cleared")]
    InputAudioBufferCleared,
    /// VAD detected the caller talking — the barge-in trigger.
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        #[serde(default)]
        audio_start_ms: u64,
    },
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        #[serde(default)]
        audio_end_ms: u64,
    },
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        #[serde(default)]
        transcript: String,
    },
    #[serde(rename = "conversation.item.input_audio_transcription.failed")]
    TranscriptionFailed {
        #[serde(default)]
        error: serde_json::Value,
    },
    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: ResponseInfo,
    },
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone {
        #[serde(default)]
        transcript: String,
    },
    /// One fragment of synthesized audio, base64 PCM.
    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionInfo {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub status_details: Option<serde_json::Value>,
}
