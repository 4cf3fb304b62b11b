use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::push::PushPayload;
use crate::sink::Sink;

#[derive(Clone)]
pub struct IntakeState {
    pub sink: Arc<dyn Sink>,
    pub measurement: String,
}

pub fn router(path: &str, state: IntakeState) -> Router {
    Router::new()
        .route(path, post(accept_current))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Accepts one pushed telemetry snapshot. The device gets its answer from
/// the decode alone: 400 with the decode error on a bad body, 200 otherwise.
/// The sink write happens after the ack; the device cannot fix a sink fault
/// and re-pushing the same instantaneous reading would gain nothing.
async fn accept_current(State(state): State<IntakeState>, body: Bytes) -> Response {
    let payload: PushPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, body = %String::from_utf8_lossy(&body), "cannot decode pushed payload");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };
    debug!(timestamp = %payload.head.timestamp, "decoded pushed payload");

    let points = payload.into_points();
    tokio::spawn(async move {
        if let Err(e) = state.sink.put(&state.measurement, &points).await {
            error!(error = %e, "write batch to sink failed");
        }
    });
    StatusCode::OK.into_response()
}
