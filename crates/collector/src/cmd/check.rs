//! Check command - validate a configuration without serving

use std::path::Path;

use anyhow::{Context, Result};
use sluice_config::Config;

use crate::wiring;

/// Load, validate and summarize the configuration at `path`
pub fn run(path: &Path) -> Result<()> {
    let config = Config::from_file(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    config.require_listeners()?;

    let db = wiring::load_enrichment(&config.enrichment)?;
    let blacklist = wiring::build_blacklist(&config);

    println!("{}: ok", path.display());
    for listener in &config.listeners {
        let clamped = if listener.is_clamped() {
            format!(" (clamped to {})", listener.effective_threads())
        } else {
            String::new()
        };
        println!(
            "  listener {} on {} threads={}{} mode={}",
            listener.name(),
            listener.bind_address(),
            listener.num_threads,
            clamped,
            listener.mode.as_str(),
        );
    }
    println!("  sink {}", config.sink.sink_type());
    println!(
        "  enrichment {} records, {} topics",
        db.len(),
        db.topic_count()
    );
    println!("  blacklist {} entries", blacklist.len());

    Ok(())
}
