//! Serve command - run the ingestion server
//!
//! Starts every configured listener against one shared pipeline, reports
//! metrics, reloads enrichment on SIGHUP and stops cleanly on Ctrl+C or
//! SIGTERM.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sluice_config::Config;
use sluice_pipeline::{EnrichmentDb, SharedEnrichment};
use sluice_sources::Listener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::reporter::{ListenerMetrics, MetricsReporter};
use crate::wiring;

/// Run the serve command
pub async fn run(config_path: PathBuf, config: Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        platform = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        config = %config_path.display(),
        "sluice starting"
    );

    config.require_listeners()?;
    if wiring::logs_share_stdout(&config) {
        warn!("logs and the stdout sink both write to stdout, records will interleave with log lines");
    }

    if let Err(e) = run_server(&config_path, config).await {
        error!(error = %e, "server error");
        return Err(e);
    }

    info!("sluice shutdown complete");
    Ok(())
}

async fn run_server(config_path: &Path, config: Config) -> Result<()> {
    let cancel = CancellationToken::new();

    let pipeline = wiring::build_pipeline(&config)?;
    let blacklist = wiring::build_blacklist(&config);
    info!(
        sink = pipeline.publisher().name(),
        blacklist = blacklist.len(),
        default_topic = %pipeline.config().default_topic,
        "pipeline ready"
    );

    let listeners = wiring::start_listeners(&config, &pipeline, &blacklist)?;

    #[cfg(unix)]
    let reload_task = spawn_reload(
        config_path.to_path_buf(),
        pipeline.enrichment().clone(),
        cancel.clone(),
    )?;
    #[cfg(not(unix))]
    let _ = config_path;

    let metrics_task = if config.metrics.enabled {
        let handles = listeners
            .iter()
            .zip(&config.listeners)
            .map(|(listener, cfg)| ListenerMetrics {
                name: cfg.name(),
                metrics: listener.metrics().clone(),
            })
            .collect();
        let reporter = MetricsReporter::new(config.metrics.clone(), pipeline.clone(), handles);
        let cancel = cancel.clone();
        Some(tokio::spawn(async move { reporter.run(cancel).await }))
    } else {
        info!("metrics reporting disabled");
        None
    };

    info!(
        listener_count = listeners.len(),
        metrics_enabled = config.metrics.enabled,
        "sluice running"
    );

    wait_for_shutdown().await?;
    info!("shutdown signal received, stopping listeners...");

    // Joining listener threads blocks.
    let stopped = tokio::task::spawn_blocking(move || stop_listeners(listeners)).await;
    if let Err(e) = stopped {
        warn!(error = %e, "listener shutdown task failed");
    }

    cancel.cancel();
    if let Some(task) = metrics_task
        && let Err(e) = task.await
    {
        warn!(error = %e, "metrics reporter panicked");
    }
    #[cfg(unix)]
    reload_task.abort();

    Ok(())
}

fn stop_listeners(listeners: Vec<Listener>) {
    for mut listener in listeners {
        let address = listener.local_addr();
        listener.shutdown();
        info!(
            protocol = listener.protocol(),
            address = %address,
            state = %listener.state(),
            "listener stopped"
        );
    }
}

/// Re-read the config file and build a fresh enrichment database
fn reload_enrichment(config_path: &Path) -> Result<EnrichmentDb> {
    let config = Config::from_file(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    wiring::load_enrichment(&config.enrichment)
}

/// Swap in a new enrichment snapshot on every SIGHUP
#[cfg(unix)]
fn spawn_reload(
    config_path: PathBuf,
    enrichment: SharedEnrichment,
    cancel: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let mut hangup = signal::unix::signal(signal::unix::SignalKind::hangup())
        .context("failed to install SIGHUP handler")?;

    info!("SIGHUP handler installed for enrichment hot reload");
    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    match reload_enrichment(&config_path) {
                        Ok(db) => {
                            info!(
                                records = db.len(),
                                topics = db.topic_count(),
                                "SIGHUP: reloaded enrichment"
                            );
                            enrichment.store(db);
                        }
                        Err(e) => error!(error = %format!("{e:#}"), "SIGHUP: failed to reload enrichment"),
                    }
                }
            }
        }
    }))
}

async fn wait_for_shutdown() -> Result<()> {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;
    #[cfg(unix)]
    let terminate = terminate.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        result = ctrl_c => result.context("failed to listen for Ctrl+C")?,
        _ = terminate => {},
    }
    Ok(())
}
