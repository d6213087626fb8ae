//! HTTP routes.
//!
//! `/status` is served by the protocol selected at startup; `/reset` restarts
//! the simulation. Handlers only translate between HTTP and the functions in
//! [`protocol`](crate::protocol); all state lives in [`Simulation`].

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::{MethodRouter, get, post},
};
use futures::StreamExt;

use crate::messages::{MessageResponse, RequestError, ResetDefaults, ResetRequest, StatusResponse};
use crate::protocol::{self, PollingMethod};
use crate::simulation::Simulation;

#[derive(Clone)]
#[allow(clippy::disallowed_methods)] // Arc::clone is safe and expected for shared state
struct AppState {
    simulation: Arc<Simulation>,
    /// Values for fields omitted from `/reset` bodies.
    reset_defaults: ResetDefaults,
}

/// Build the router serving `/status` with `method` and `/reset`.
pub fn router(
    simulation: Arc<Simulation>,
    method: PollingMethod,
    reset_defaults: ResetDefaults,
) -> Router {
    let status: MethodRouter<AppState> = match method {
        PollingMethod::ShortPolling => get(short_poll_handler),
        PollingMethod::LongPolling => get(long_poll_handler),
        PollingMethod::Sse => get(sse_handler),
    };

    Router::new()
        .route("/status", status)
        .route("/reset", post(reset_handler).fallback(method_not_allowed))
        .with_state(AppState {
            simulation,
            reset_defaults,
        })
}

async fn short_poll_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let result = protocol::short_poll(&state.simulation).await;
    Json(StatusResponse { result })
}

async fn long_poll_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let result = protocol::long_poll(&state.simulation).await;
    tracing::debug!(%result, "long poll answered");
    Json(StatusResponse { result })
}

// No keep-alive comments are sent, so a disconnected client is only noticed on
// the next write; its wait lives on until the run resolves, at most `delay`.
async fn sse_handler(State(state): State<AppState>) -> impl IntoResponse {
    tracing::debug!("event stream opened");
    let events = protocol::status_stream(state.simulation).map(|result| {
        Ok::<_, Infallible>(Event::default().data(StatusResponse { result }.event_data()))
    });

    (
        [(header::CONNECTION, HeaderValue::from_static("keep-alive"))],
        Sse::new(events),
    )
}

#[allow(clippy::disallowed_methods)] // Arc::clone is safe and expected
async fn reset_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let params = match ResetRequest::from_body(&body).and_then(|request| {
        request.into_params(&state.reset_defaults, state.simulation.params().wait_timeout)
    }) {
        Ok(params) => params,
        Err(e) => return e.into_response(),
    };

    // The reset runs on its own task so a client that disconnects while the
    // in-flight run resolves cannot cancel it.
    let reset = tokio::spawn({
        let simulation = Arc::clone(&state.simulation);
        async move { simulation.reset(params).await }
    });

    match reset.await {
        Ok(Ok(notifier)) => {
            tracing::info!(run_id = notifier.run_id(), "simulation reset");
            Json(MessageResponse::reset_confirmation()).into_response()
        }
        Ok(Err(e)) => {
            tracing::error!("reset failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            tracing::error!("reset task failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "reset failed").into_response()
        }
    }
}

async fn method_not_allowed() -> RequestError {
    RequestError::MethodNotAllowed
}
