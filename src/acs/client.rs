//! REST client for the ACS Call Automation API. Only the two operations
//! the relay consumes: placing a call and reading its properties.

use serde::{Deserialize, Serialize};

use crate::acs::auth::{self, AcsCredentials};

const API_VERSION: &str = "2024-09-15";

#[derive(Debug, thiserror::Error)]
pub enum AcsError {
    #[error("HTTP request failed: {0}")]
    Request(String),
    #[error("ACS API error: {0}")]
    Api(String),
    #[error("request signing failed: {0}")]
    Auth(#[from] auth::AuthError),
}

/// Media streaming subscription parameters sent with call creation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaStreamingOptions {
    pub transport_url: String,
    pub transport_type: String,
    pub content_type: String,
    pub audio_channel_type: String,
    pub audio_format: String,
    pub start_media_streaming: bool,
    pub enable_bidirectional: bool,
}

impl MediaStreamingOptions {
    /// Bidirectional PCM 24 kHz mono over a WebSocket transport, started
    /// as soon as the call connects.
    pub fn bidirectional_pcm(transport_url: impl Into<String>) -> Self {
        Self {
            transport_url: transport_url.into(),
            transport_type: "websocket".to_string(),
            content_type: "audio".to_string(),
            audio_channel_type: "mixed".to_string(),
            audio_format: "Pcm24KMono".to_string(),
            start_media_streaming: true,
            enable_bidirectional: true,
        }
    }
}

/// Subset of call connection properties the relay reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallProperties {
    pub call_connection_id: String,
    #[serde(default)]
    pub call_connection_state: Option<String>,
    #[serde(default)]
    pub media_streaming_subscription: Option<serde_json::Value>,
}

pub struct AcsClient {
    client: reqwest::Client,
    credentials: AcsCredentials,
}

impl AcsClient {
    pub fn new(credentials: AcsCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
        }
    }

    /// Place an outbound call with a media streaming subscription. Returns
    /// the call connection properties; the id keys everything downstream.
    pub async fn create_call(
        &self,
        target: &str,
        source: &str,
        callback_url: &str,
        media_streaming: MediaStreamingOptions,
    ) -> Result<CallProperties, AcsError> {
        let body = serde_json::json!({
            "targets": [{
                "kind": "phoneNumber",
                "phoneNumber": { "value": target },
            }],
            "sourceCallerIdNumber": { "value": source },
            "callbackUri": callback_url,
            "mediaStreamingOptions": media_streaming,
        });

        let path = format!("/calling/callConnections?api-version={API_VERSION}");
        let value = self
            .request(reqwest::Method::POST, &path, Some(body))
            .await?;
        serde_json::from_value(value).map_err(|e| AcsError::Api(e.to_string()))
    }

    pub async fn get_call_properties(
        &self,
        call_connection_id: &str,
    ) -> Result<CallProperties, AcsError> {
        let path =
            format!("/calling/callConnections/{call_connection_id}?api-version={API_VERSION}");
        let value = self.request(reqwest::Method::GET, &path, None).await?;
        serde_json::from_value(value).map_err(|e| AcsError::Api(e.to_string()))
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path_and_query: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, AcsError> {
        let body_bytes = match &body {
            Some(v) => serde_json::to_vec(v).map_err(|e| AcsError::Request(e.to_string()))?,
            None => Vec::new(),
        };

        let signed = auth::sign_request(
            &self.credentials.access_key,
            method.as_str(),
            path_and_query,
            self.credentials.host(),
            &body_bytes,
        )?;

        let url = format!("{}{}", self.credentials.endpoint, path_and_query);
        let mut request = self
            .client
            .request(method, &url)
            .header("x-ms-date", &signed.date)
            .header("x-ms-content-sha256", &signed.content_hash)
            .header("Authorization", &signed.authorization);
        if body.is_some() {
            request = request
                .header("Content-Type", "application/json")
                .body(body_bytes);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AcsError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AcsError::Api(format!("{status}: {text}")));
        }

        response
            .json()
            .await
            .map_err(|e| AcsError::Request(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_streaming_options_wire_shape() {
        let json =
            serde_json::to_value(MediaStreamingOptions::bidirectional_pcm("wss://h/ws")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "transportUrl": "wss://h/ws",
                "transportType": "websocket",
                "contentType": "audio",
                "audioChannelType": "mixed",
                "audioFormat": "Pcm24KMono",
                "startMediaStreaming": true,
                "enableBidirectional": true,
            })
        );
    }

    #[test]
    fn call_properties_decode_with_subscription() {
        let props: CallProperties = serde_json::from_value(serde_json::json!({
            "callConnectionId": "441f1200-aaaa",
            "callConnectionState": "connected",
            "mediaStreamingSubscription": { "state": "active" },
            "answeredBy": { "kind": "phoneNumber" },
        }))
        .unwrap();
        assert_eq!(props.call_connection_id, "441f1200-aaaa");
        assert_eq!(props.call_connection_state.as_deref(), Some("connected"));
        assert!(props.media_streaming_subscription.is_some());
    }
}
