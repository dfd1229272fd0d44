//! Call lifecycle webhook. Independent of the audio path: events only
//! update the call mirror and clear the connection registry on disconnect.

use axum::extract::State;
use axum::http::StatusCode;

use crate::acs::events::{CallEventKind, CallbackEvent};
use crate::registry::CallState;
use crate::AppState;

/// Handle POST /api/callbacks — ACS delivers an array of lifecycle events.
///
/// Always responds 200 with an empty body; ACS has no retry semantics to
/// signal, so a malformed payload is logged and acknowledged anyway.
pub async fn handle_callbacks(State(state): State<AppState>, body: String) -> StatusCode {
    let events: Vec<CallbackEvent> = match serde_json::from_str(&body) {
        Ok(events) => events,
        Err(e) => {
            tracing::warn!("Undecodable callback payload: {e}");
            return StatusCode::OK;
        }
    };

    for event in events {
        process_event(&state, event).await;
    }

    StatusCode::OK
}

pub(crate) async fn process_event(state: &AppState, event: CallbackEvent) {
    let call_id = event.data.call_connection_id.clone();
    tracing::info!(
        kind = ?event.kind,
        call_id = %call_id,
        correlation_id = %event.data.correlation_id,
        "Callback event"
    );

    match event.kind {
        CallEventKind::CallConnected => {
            state.calls.set_state(&call_id, CallState::Connected).await;
            match state.acs.get_call_properties(&call_id).await {
                Ok(props) => tracing::info!(
                    call_id = %call_id,
                    subscription = ?props.media_streaming_subscription,
                    "Call connected"
                ),
                Err(e) => tracing::warn!(call_id = %call_id, "Failed to fetch call properties: {e}"),
            }
        }
        CallEventKind::MediaStreamingStarted => {
            state.calls.set_state(&call_id, CallState::Streaming).await;
            if let Some(update) = &event.data.media_streaming_update {
                tracing::info!(
                    content_type = %update.content_type,
                    status = %update.media_streaming_status,
                    details = %update.media_streaming_status_details,
                    "Media streaming started"
                );
            }
        }
        CallEventKind::MediaStreamingStopped => {
            state
                .calls
                .set_state(&call_id, CallState::StreamingStopped)
                .await;
            if let Some(update) = &event.data.media_streaming_update {
                tracing::info!(
                    content_type = %update.content_type,
                    status = %update.media_streaming_status,
                    details = %update.media_streaming_status_details,
                    "Media streaming stopped"
                );
            }
        }
        CallEventKind::MediaStreamingFailed => {
            if let Some(info) = &event.data.result_information {
                tracing::error!(
                    code = info.code,
                    sub_code = info.sub_code,
                    message = %info.message,
                    "Media streaming failed"
                );
            } else {
                tracing::error!(call_id = %call_id, "Media streaming failed");
            }
        }
        CallEventKind::CallDisconnected => {
            state.registry.clear(&call_id).await;
            state.calls.remove(&call_id).await;
            tracing::info!(call_id = %call_id, "Call disconnected");
        }
        CallEventKind::Other => {
            tracing::debug!("Ignoring unrecognized callback event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acs::auth::AcsCredentials;
    use crate::acs::client::AcsClient;
    use crate::config::{AcsConfig, Config, OpenAiConfig, ServerConfig};
    use crate::registry::{CallDirectory, CallSession, ConnectionRegistry};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn test_state() -> AppState {
        let credentials = AcsCredentials {
            endpoint: "https://res.communication.azure.com".to_string(),
            access_key: "c2VjcmV0".to_string(),
        };
        AppState {
            config: Config {
                server: ServerConfig {
                    host: "127.0.0.1".to_string(),
                    port: 8080,
                    callback_host: "https://example.test".to_string(),
                },
                acs: AcsConfig {
                    connection: credentials.clone(),
                    source_number: "+15550001111".to_string(),
                    target_number: "+15550002222".to_string(),
                },
                openai: OpenAiConfig {
                    endpoint: "https://res.openai.azure.com".to_string(),
                    api_key: "key".to_string(),
                    deployment: "gpt-4o-realtime".to_string(),
                    voice: "shimmer".to_string(),
                    instructions: "test".to_string(),
                },
            },
            acs: Arc::new(AcsClient::new(credentials)),
            registry: ConnectionRegistry::new(),
            calls: CallDirectory::new(),
        }
    }

    fn parse(payload: &str) -> CallbackEvent {
        serde_json::from_str(payload).unwrap()
    }

    #[tokio::test]
    async fn call_disconnected_clears_registry_and_mirror() {
        let state = test_state();
        let (tx, _rx) = mpsc::channel(4);
        state.registry.register("c1", tx).await;
        state
            .calls
            .insert(CallSession {
                call_connection_id: "c1".to_string(),
                target_number: "+15550002222".to_string(),
                source_number: "+15550001111".to_string(),
                state: crate::registry::CallState::Streaming,
            })
            .await;

        let event = parse(
            r#"{"type":"Microsoft.Communication.CallDisconnected","data":{"callConnectionId":"c1","correlationId":"x"}}"#,
        );
        process_event(&state, event).await;

        assert!(state.registry.get("c1").await.is_none());
        assert!(state.registry.active_handle().await.is_none());
        assert!(state.calls.get("c1").await.is_none());
    }

    #[tokio::test]
    async fn handler_acknowledges_disconnect_with_200() {
        let state = test_state();
        let (tx, _rx) = mpsc::channel(4);
        state.registry.register("c1", tx).await;

        let body = r#"[{"type":"Microsoft.Communication.CallDisconnected","data":{"callConnectionId":"c1","correlationId":"x"}}]"#;
        let status = handle_callbacks(State(state.clone()), body.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert!(state.registry.get("c1").await.is_none());
    }

    #[tokio::test]
    async fn handler_acknowledges_malformed_payload_with_200() {
        let state = test_state();
        let status = handle_callbacks(State(state), "not json".to_string()).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn disconnect_for_other_call_leaves_registration() {
        let state = test_state();
        let (tx, _rx) = mpsc::channel(4);
        state.registry.register("c1", tx).await;

        let event = parse(
            r#"{"type":"Microsoft.Communication.CallDisconnected","data":{"callConnectionId":"c2","correlationId":"x"}}"#,
        );
        process_event(&state, event).await;

        assert!(state.registry.get("c1").await.is_some());
    }

    #[tokio::test]
    async fn media_streaming_events_update_call_state() {
        let state = test_state();
        state
            .calls
            .insert(CallSession {
                call_connection_id: "c1".to_string(),
                target_number: "+15550002222".to_string(),
                source_number: "+15550001111".to_string(),
                state: crate::registry::CallState::Connected,
            })
            .await;

        let event = parse(
            r#"{"type":"Microsoft.Communication.MediaStreamingStarted","data":{"callConnectionId":"c1","mediaStreamingUpdate":{"contentType":"audio","mediaStreamingStatus":"mediaStreamingStarted","mediaStreamingStatusDetails":"subscriptionStarted"}}}"#,
        );
        process_event(&state, event).await;
        assert_eq!(
            state.calls.get("c1").await.unwrap().state,
            crate::registry::CallState::Streaming
        );

        let event = parse(
            r#"{"type":"Microsoft.Communication.MediaStreamingStopped","data":{"callConnectionId":"c1"}}"#,
        );
        process_event(&state, event).await;
        assert_eq!(
            state.calls.get("c1").await.unwrap().state,
            crate::registry::CallState::StreamingStopped
        );
    }

    #[tokio::test]
    async fn unknown_event_is_ignored() {
        let state = test_state();
        let event = parse(
            r#"{"type":"Microsoft.Communication.ParticipantsUpdated","data":{"callConnectionId":"c1"}}"#,
        );
        // Must not panic or mutate anything.
        process_event(&state, event).await;
        assert!(state.calls.get("c1").await.is_none());
    }
}
