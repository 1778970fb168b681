//! Build runtime components from configuration

use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use sluice_config::{
    Config, DecodeAs, EnrichmentConfig, GlobalConfig, ListenerConfig, LogOutput, Protocol,
    SinkConfig, ThreadMode,
};
use sluice_pipeline::{EnrichmentDb, GrowthPolicy, Pipeline, PipelineConfig, SharedEnrichment};
use sluice_sinks::{NullSink, Publisher, StdoutConfig, StdoutSink};
use sluice_sources::{
    Blacklist, BodyFormat, HttpListener, HttpListenerConfig, Listener, ListenerError,
    ReactorMode, TcpDistributor, TcpListenerConfig, UdpListener, UdpListenerConfig,
};

/// Create the configured publish sink
pub fn build_publisher(config: &SinkConfig) -> Arc<dyn Publisher> {
    match config {
        SinkConfig::Null(_) => Arc::new(NullSink::new()),
        SinkConfig::Stdout(stdout) => Arc::new(StdoutSink::new(StdoutConfig {
            show_topic: stdout.show_topic,
            color: std::io::stdout().is_terminal(),
        })),
    }
}

/// Whether log lines would interleave with records on stdout
pub fn logs_share_stdout(config: &Config) -> bool {
    config.log.output == LogOutput::Stdout && matches!(config.sink, SinkConfig::Stdout(_))
}

/// Load the enrichment file, then overlay inline entries
pub fn load_enrichment(config: &EnrichmentConfig) -> Result<EnrichmentDb> {
    let mut db = match &config.file {
        Some(path) => EnrichmentDb::from_file(path)
            .with_context(|| format!("failed to load enrichment file {}", path.display()))?,
        None => EnrichmentDb::new(),
    };

    let inline = EnrichmentDb::from_value(config.inline_document())
        .context("invalid inline enrichment")?;
    db.merge(inline);
    Ok(db)
}

/// Pipeline settings from `[global]`
pub fn pipeline_config(global: &GlobalConfig) -> PipelineConfig {
    PipelineConfig {
        default_topic: global.default_topic.clone(),
        growth: GrowthPolicy::new(
            global.initial_buffer_size,
            global.growth_factor,
            global.max_buffer_size,
        ),
    }
}

/// Build the shared pipeline for every listener
pub fn build_pipeline(config: &Config) -> Result<Arc<Pipeline>> {
    let db = load_enrichment(&config.enrichment)?;
    tracing::info!(
        records = db.len(),
        topics = db.topic_count(),
        "enrichment database loaded"
    );

    let publisher = build_publisher(&config.sink);
    Ok(Arc::new(Pipeline::new(
        pipeline_config(&config.global),
        SharedEnrichment::new(db),
        publisher,
    )))
}

/// The client blacklist, shared by every TCP listener
pub fn build_blacklist(config: &Config) -> Arc<Blacklist> {
    Arc::new(config.blacklist.iter().copied().collect())
}

fn reactor_mode(mode: ThreadMode) -> ReactorMode {
    match mode {
        ThreadMode::ThreadPerConnection => ReactorMode::ThreadPerConnection,
        ThreadMode::Select => ReactorMode::Select,
        ThreadMode::Poll => ReactorMode::Poll,
        ThreadMode::Epoll => ReactorMode::Epoll,
    }
}

/// Start one listener
pub fn start_listener(
    config: &ListenerConfig,
    global: &GlobalConfig,
    pipeline: &Arc<Pipeline>,
    blacklist: &Arc<Blacklist>,
) -> Result<Listener, ListenerError> {
    let id = config.name();
    let mode = reactor_mode(config.mode);
    let pipeline = Arc::clone(pipeline);

    match config.proto {
        Protocol::Tcp => TcpDistributor::start(
            TcpListenerConfig {
                id,
                address: config.address.clone(),
                port: config.port,
                num_threads: config.num_threads,
                mode,
                keepalive: config.tcp_keepalive,
                handoff_capacity: config.handoff_capacity,
                read_buffer_size: global.read_buffer_size,
                greeting: global.greeting.clone().map(Bytes::from),
                greeting_timeout: config.greeting_timeout,
            },
            pipeline,
            Arc::clone(blacklist),
        )
        .map(Listener::from),
        Protocol::Udp => UdpListener::start(
            UdpListenerConfig {
                id,
                address: config.address.clone(),
                port: config.port,
                num_threads: config.num_threads,
                mode,
            },
            pipeline,
        )
        .map(Listener::from),
        Protocol::Http => HttpListener::start(
            HttpListenerConfig {
                id,
                address: config.address.clone(),
                port: config.port,
                num_threads: config.num_threads,
                mode,
                format: match config.decode_as {
                    Some(DecodeAs::Mse) => BodyFormat::Mse,
                    None => BodyFormat::Json,
                },
            },
            pipeline,
        )
        .map(Listener::from),
    }
}

/// Start every configured listener
///
/// Listeners already started are shut down when a later one fails.
pub fn start_listeners(
    config: &Config,
    pipeline: &Arc<Pipeline>,
    blacklist: &Arc<Blacklist>,
) -> Result<Vec<Listener>> {
    let mut listeners = Vec::with_capacity(config.listeners.len());
    for listener in &config.listeners {
        let started = start_listener(listener, &config.global, pipeline, blacklist)
            .with_context(|| format!("failed to start listener {}", listener.name()))?;
        listeners.push(started);
    }
    Ok(listeners)
}

#[cfg(test)]
#[path = "wiring_test.rs"]
mod wiring_test;
