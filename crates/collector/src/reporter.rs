//! Periodic metrics reporter
//!
//! Logs pipeline, sink and per-listener counters at the configured interval.

use std::sync::Arc;

use serde_json::json;
use sluice_config::{MetricsConfig, MetricsFormat};
use sluice_pipeline::Pipeline;
use sluice_sources::SourceMetrics;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Counters of one listener, by name
pub struct ListenerMetrics {
    pub name: String,
    pub metrics: Arc<SourceMetrics>,
}

/// Metrics reporter
pub struct MetricsReporter {
    config: MetricsConfig,
    pipeline: Arc<Pipeline>,
    listeners: Vec<ListenerMetrics>,
}

impl MetricsReporter {
    pub fn new(config: MetricsConfig, pipeline: Arc<Pipeline>, listeners: Vec<ListenerMetrics>) -> Self {
        Self {
            config,
            pipeline,
            listeners,
        }
    }

    /// Run the reporter until cancellation, reporting once more on exit
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        info!(
            interval_secs = self.config.interval.as_secs(),
            format = ?self.config.format,
            "metrics reporter started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.report();
                    info!("metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.report();
                }
            }
        }
    }

    /// Log one report
    pub fn report(&self) {
        match self.config.format {
            MetricsFormat::Human => self.report_human(),
            MetricsFormat::Json => info!(metrics = %self.to_json(), "metrics"),
        }
    }

    fn report_human(&self) {
        let p = self.pipeline.metrics().snapshot();
        info!(
            sessions_active = p.sessions_active(),
            sessions_faulted = p.sessions_faulted,
            bytes = p.bytes_fed,
            decoded = p.values_decoded,
            enriched = p.values_enriched,
            published = p.messages_published,
            malformed = p.malformed_regions,
            discarded_bytes = p.bytes_discarded,
            "pipeline metrics"
        );

        let publisher = self.pipeline.publisher();
        let s = publisher.metrics();
        info!(
            sink = publisher.name(),
            published = s.messages_published,
            bytes = s.bytes_published,
            dropped = s.messages_dropped,
            errors = s.write_errors,
            "sink metrics"
        );

        for listener in &self.listeners {
            let l = listener.metrics.snapshot();
            info!(
                listener = %listener.name,
                active = l.connections_active,
                total = l.connections_total,
                rejected = l.connections_rejected,
                messages = l.messages_received,
                bytes = l.bytes_received,
                errors = l.errors,
                "listener metrics"
            );
        }
    }

    fn to_json(&self) -> serde_json::Value {
        let p = self.pipeline.metrics().snapshot();
        let publisher = self.pipeline.publisher();
        let s = publisher.metrics();

        let listeners: Vec<_> = self
            .listeners
            .iter()
            .map(|listener| {
                let l = listener.metrics.snapshot();
                json!({
                    "name": listener.name,
                    "connections_active": l.connections_active,
                    "connections_total": l.connections_total,
                    "connections_rejected": l.connections_rejected,
                    "messages_received": l.messages_received,
                    "bytes_received": l.bytes_received,
                    "errors": l.errors,
                })
            })
            .collect();

        json!({
            "pipeline": {
                "sessions_opened": p.sessions_opened,
                "sessions_closed": p.sessions_closed,
                "sessions_faulted": p.sessions_faulted,
                "bytes_fed": p.bytes_fed,
                "values_decoded": p.values_decoded,
                "values_enriched": p.values_enriched,
                "messages_published": p.messages_published,
                "malformed_regions": p.malformed_regions,
                "bytes_discarded": p.bytes_discarded,
            },
            "sink": {
                "type": publisher.name(),
                "messages_published": s.messages_published,
                "bytes_published": s.bytes_published,
                "messages_dropped": s.messages_dropped,
                "write_errors": s.write_errors,
            },
            "listeners": listeners,
        })
    }
}
