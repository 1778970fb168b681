//! HTTP route handlers
//!
//! # Endpoints
//!
//! - `POST /` - records keyed by the client address, default topic
//! - `POST /rbdata/{uuid}/{topic}` - records keyed by sensor UUID, published to `topic`
//! - `POST` anywhere else - same as `POST /`
//!
//! Every accepted request answers an empty 200 once the body is consumed,
//! whatever the decode outcome.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{Method, StatusCode};
use http_body_util::BodyExt;
use sluice_pipeline::{Pipeline, SessionIdentity};

use super::BodyFormat;
use super::session::RequestSession;
use crate::common::SourceMetrics;

/// Shared state for handlers
pub struct HandlerState {
    pub pipeline: Arc<Pipeline>,
    pub metrics: Arc<SourceMetrics>,
    pub format: BodyFormat,
}

/// POST /
pub async fn ingest_root(State(state): State<Arc<HandlerState>>, request: Request) -> StatusCode {
    let identity = SessionIdentity::client(client_of(&request));
    ingest(&state, identity, request.into_body()).await
}

/// Any other path: POST ingests like `/`, other methods get 405
pub async fn ingest_any(state: State<Arc<HandlerState>>, request: Request) -> StatusCode {
    if request.method() != Method::POST {
        return StatusCode::METHOD_NOT_ALLOWED;
    }
    ingest_root(state, request).await
}

/// POST /rbdata/{uuid}/{topic}
pub async fn ingest_rbdata(
    State(state): State<Arc<HandlerState>>,
    Path((uuid, topic)): Path<(String, String)>,
    request: Request,
) -> StatusCode {
    let identity = SessionIdentity::sensor(client_of(&request), uuid, topic);
    ingest(&state, identity, request.into_body()).await
}

async fn ingest(state: &HandlerState, identity: SessionIdentity, mut body: Body) -> StatusCode {
    let mut session = RequestSession::begin_request(
        Arc::clone(&state.pipeline),
        Arc::clone(&state.metrics),
        state.format,
        identity,
    );

    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                if let Ok(data) = frame.into_data() {
                    session.on_data(&data);
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "request body error");
                state.metrics.error();
                // The session drops unfinished and flushes what completed.
                return StatusCode::OK;
            }
        }
    }

    session.end_request();
    StatusCode::OK
}

/// Client IP as a string, or "unknown" without connect info
fn client_of(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_canonical().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
