//! Call lifecycle webhook payloads. Event types decode once into a closed
//! enum; anything unrecognized becomes `Other` and is ignored downstream.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackEvent {
    #[serde(rename = "type")]
    pub kind: CallEventKind,
    #[serde(default)]
    pub data: CallEventData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CallEventKind {
    #[serde(rename = "Microsoft.Communication.CallConnected")]
    CallConnected,
    #[serde(rename = "Microsoft.Communication.MediaStreamingStarted")]
    MediaStreamingStarted,
    #[serde(rename = "Microsoft.Communication.MediaStreamingStopped")]
    MediaStreamingStopped,
    #[serde(rename = "Microsoft.Communication.MediaStreamingFailed")]
    MediaStreamingFailed,
    #[serde(rename = "Microsoft.Communication.CallDisconnected")]
    CallDisconnected,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEventData {
    #[serde(default)]
    pub call_connection_id: String,
    #[serde(default)]
    pub correlation_id: String,
    #[serde(default)]
    pub media_streaming_update: Option<MediaStreamingUpdate>,
    #[serde(default)]
    pub result_information: Option<ResultInformation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaStreamingUpdate {
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub media_streaming_status: String,
    #[serde(default)]
    pub media_streaming_status_details: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultInformation {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub sub_code: i64,
    #[serde(default)]
    pub message: String,
}
