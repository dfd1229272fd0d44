use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};

use crate::acs::client::MediaStreamingOptions;
use crate::registry::{CallSession, CallState};
use crate::AppState;

/// GET /outboundCall — place one call to the configured target number.
///
/// The media subscription points ACS at our /ws endpoint; the call id from
/// the response becomes the current call, so the media handler can key its
/// registration before any lifecycle event arrives.
pub async fn handle_outbound_call(State(state): State<AppState>) -> Response {
    let options = MediaStreamingOptions::bidirectional_pcm(state.config.server.websocket_url());

    let result = state
        .acs
        .create_call(
            &state.config.acs.target_number,
            &state.config.acs.source_number,
            &state.config.server.callback_url(),
            options,
        )
        .await;

    match result {
        Ok(props) => {
            tracing::info!(
                call_connection_id = %props.call_connection_id,
                to = %state.config.acs.target_number,
                "Created call"
            );
            state
                .calls
                .insert(CallSession {
                    call_connection_id: props.call_connection_id,
                    target_number: state.config.acs.target_number.clone(),
                    source_number: state.config.acs.source_number.clone(),
                    state: CallState::Dialing,
                })
                .await;
            Redirect::to("/").into_response()
        }
        Err(e) => {
            tracing::error!("Failed to create call: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to create call").into_response()
        }
    }
}
