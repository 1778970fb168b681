//! Per-request decode state
//!
//! A [`RequestSession`] is created when a POST starts, fed each body chunk
//! and finished when the body ends. Finalization also runs from `Drop`, so
//! a request aborted mid-body still flushes its session exactly once.

use std::sync::Arc;

use sluice_pipeline::{Pipeline, Session, SessionIdentity};

use super::BodyFormat;
use crate::common::SourceMetrics;

enum Body {
    /// Streamed through the incremental decoder
    Json(Session),
    /// Whole body collected for the MSE converter
    Mse {
        identity: SessionIdentity,
        body: Vec<u8>,
        overflowed: bool,
    },
}

pub(crate) struct RequestSession {
    pipeline: Arc<Pipeline>,
    metrics: Arc<SourceMetrics>,
    body: Option<Body>,
}

impl RequestSession {
    pub(crate) fn begin_request(
        pipeline: Arc<Pipeline>,
        metrics: Arc<SourceMetrics>,
        format: BodyFormat,
        identity: SessionIdentity,
    ) -> Self {
        metrics.connection_opened();
        tracing::debug!(session = %identity, "request started");

        let body = match format {
            BodyFormat::Json => Body::Json(pipeline.open_session(identity)),
            BodyFormat::Mse => Body::Mse {
                identity,
                body: Vec::new(),
                overflowed: false,
            },
        };

        Self {
            pipeline,
            metrics,
            body: Some(body),
        }
    }

    pub(crate) fn on_data(&mut self, chunk: &[u8]) {
        self.metrics.message_received(chunk.len());

        match &mut self.body {
            Some(Body::Json(session)) => self.pipeline.process(session, chunk),
            Some(Body::Mse {
                identity,
                body,
                overflowed,
            }) => {
                if *overflowed {
                    return;
                }
                let limit = self.pipeline.config().growth.max;
                if body.len() + chunk.len() > limit {
                    tracing::warn!(session = %identity, limit, "MSE body exceeds limit, dropping");
                    self.metrics.error();
                    *overflowed = true;
                    *body = Vec::new();
                    return;
                }
                body.extend_from_slice(chunk);
            }
            None => {}
        }
    }

    /// The body is complete
    pub(crate) fn end_request(mut self) {
        self.finalize(true);
    }

    fn finalize(&mut self, complete: bool) {
        let Some(body) = self.body.take() else {
            return;
        };

        match body {
            Body::Json(mut session) => {
                if !complete {
                    tracing::debug!(session = %session.identity(), "request aborted");
                }
                self.pipeline.finish(&mut session);
            }
            Body::Mse {
                identity,
                body,
                overflowed,
            } => {
                if complete && !overflowed {
                    self.pipeline.process_mse(&identity, &body);
                } else if !complete {
                    tracing::debug!(session = %identity, "request aborted, dropping MSE body");
                }
            }
        }
        self.metrics.connection_closed();
    }
}

impl Drop for RequestSession {
    fn drop(&mut self) {
        self.finalize(false);
    }
}
