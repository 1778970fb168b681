//! Decode → enrich → publish
//!
//! [`Pipeline`] is the callback every listener drives. It owns nothing
//! per-connection: callers keep their [`Session`]s and pass them in, so a
//! session is only ever touched by the thread that owns its connection.

use std::sync::Arc;

use serde_json::Value;
use sluice_sinks::{Message, Publisher};

use crate::buffer::GrowthPolicy;
use crate::decoder::{self, Decoded};
use crate::enrich::{EnrichmentDb, SharedEnrichment};
use crate::metrics::PipelineMetrics;
use crate::mse;
use crate::session::{Session, SessionIdentity, SessionStore};

/// Pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Topic for sessions without a request topic
    pub default_topic: String,
    /// Decode buffer growth policy for new sessions
    pub growth: GrowthPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_topic: "sluice".into(),
            growth: GrowthPolicy::default(),
        }
    }
}

/// Shared decode/enrich/publish stage
pub struct Pipeline {
    config: PipelineConfig,
    enrichment: SharedEnrichment,
    publisher: Arc<dyn Publisher>,
    metrics: Arc<PipelineMetrics>,
}

impl Pipeline {
    /// Create a pipeline publishing to `publisher`
    pub fn new(
        config: PipelineConfig,
        enrichment: SharedEnrichment,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            config,
            enrichment,
            publisher,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Start a session for `identity`
    pub fn open_session(&self, identity: SessionIdentity) -> Session {
        self.metrics.record_session_opened();
        Session::new(identity, self.config.growth)
    }

    /// Empty session store using this pipeline's growth policy
    pub fn session_store<K: std::hash::Hash + Eq>(&self) -> SessionStore<K> {
        SessionStore::new(self.config.growth)
    }

    /// Feed bytes read for `session`, publishing every complete record
    pub fn process(&self, session: &mut Session, bytes: &[u8]) {
        self.metrics.record_fed(bytes.len());
        tracing::trace!(
            session = %session.identity(),
            bytes = bytes.len(),
            "chunk received"
        );

        match decoder::feed(session, bytes) {
            Ok(decoded) => self.emit(session, decoded),
            Err(e) => {
                self.metrics.record_fault();
                tracing::warn!(
                    session = %session.identity(),
                    error = %e,
                    "session faulted, dropping its input"
                );
            }
        }
    }

    /// End of stream for `session`: emit what completed, drop the rest
    pub fn finish(&self, session: &mut Session) {
        let (decoded, leftover) = decoder::flush(session);
        self.emit(session, decoded);

        if leftover > 0 {
            self.metrics.record_discarded(leftover);
            tracing::debug!(
                session = %session.identity(),
                bytes = leftover,
                "discarding incomplete input at close"
            );
        }
        self.metrics.record_session_closed();
    }

    /// Decode one datagram as its own session
    pub fn process_datagram(&self, identity: SessionIdentity, bytes: &[u8]) {
        let mut session = self.open_session(identity);
        self.process(&mut session, bytes);
        self.finish(&mut session);
    }

    /// Convert a complete MSE body and publish its notifications
    ///
    /// Notifications are enriched by subscription name when the database
    /// has a record for it, else by the session identity.
    pub fn process_mse(&self, identity: &SessionIdentity, body: &[u8]) {
        self.metrics.record_fed(body.len());

        let records = match mse::convert(body) {
            Ok(records) => records,
            Err(e) => {
                self.metrics.record_malformed(body.len());
                tracing::warn!(session = %identity, error = %e, "dropping MSE body");
                return;
            }
        };
        self.metrics.record_decoded(records.len());

        let db = self.enrichment.load();
        let topic = self.topic_of(identity);

        for mut record in records {
            let key = record
                .subscription
                .as_deref()
                .filter(|s| db.lookup(s).is_some())
                .unwrap_or_else(|| identity.enrichment_key());
            if db.enrich(&mut record.value, key) {
                self.metrics.record_enriched();
            }

            if let Some(payload) = serialize(&record.value, identity) {
                self.publisher.publish(
                    Message::new(topic.clone(), payload).with_partition_key(record.client_mac),
                );
                self.metrics.record_published(1);
            }
        }
    }

    fn emit(&self, session: &mut Session, decoded: Decoded) {
        if let Some(malformed) = decoded.malformed {
            self.metrics.record_malformed(malformed.bytes);
            tracing::warn!(
                session = %session.identity(),
                bytes = malformed.bytes,
                error = %malformed.error,
                "dropping malformed input"
            );
        }

        if decoded.values.is_empty() {
            return;
        }
        self.metrics.record_decoded(decoded.values.len());

        let db = self.enrichment.load();
        let topic = self.topic_of(session.identity());
        let key = session.identity().enrichment_key().to_string();

        for value in decoded.values {
            if let Some(message) = self.prepare(&db, value, &key, &topic, session.identity()) {
                session.queue(message);
            }
        }

        let batch = session.take_batch();
        self.metrics.record_published(batch.len());
        for message in batch {
            self.publisher.publish(message);
        }
    }

    fn prepare(
        &self,
        db: &EnrichmentDb,
        mut value: Value,
        key: &str,
        topic: &str,
        identity: &SessionIdentity,
    ) -> Option<Message> {
        if db.enrich(&mut value, key) {
            self.metrics.record_enriched();
        }
        let partition_key = db
            .topic(topic)
            .and_then(|settings| settings.partition_key_of(&value));

        let payload = serialize(&value, identity)?;
        Some(Message::new(topic, payload).with_partition_key(partition_key))
    }

    fn topic_of(&self, identity: &SessionIdentity) -> String {
        identity
            .topic
            .clone()
            .unwrap_or_else(|| self.config.default_topic.clone())
    }

    /// The shared enrichment handle, for reloads
    pub fn enrichment(&self) -> &SharedEnrichment {
        &self.enrichment
    }

    /// The publish sink
    pub fn publisher(&self) -> &Arc<dyn Publisher> {
        &self.publisher
    }

    /// Pipeline counters
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Settings in effect
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

fn serialize(value: &Value, identity: &SessionIdentity) -> Option<Vec<u8>> {
    match serde_json::to_vec(value) {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::warn!(session = %identity, error = %e, "failed to serialize record");
            None
        }
    }
}

#[cfg(test)]
#[path = "ingest_test.rs"]
mod ingest_test;
