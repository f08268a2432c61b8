//! Discovery worker
//!
//! Probes the discovery feed at startup, once more after a short delay to
//! catch slow responders, then periodically.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use crate::discovery::{resolve_record, DiscoveryFeed, DiscoveryRecord, Resolver};
use crate::engine::EngineHandle;
use crate::storage::settings::DiscoverySettings;

/// Discovery worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Delay before the catch-up probe
    pub initial_delay: Duration,

    /// Probe interval afterwards
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self::from_settings(&DiscoverySettings::default())
    }
}

impl Options {
    pub fn from_settings(settings: &DiscoverySettings) -> Self {
        Self {
            initial_delay: Duration::from_secs(settings.initial_probe_delay_secs),
            interval: Duration::from_secs(settings.probe_interval_secs),
        }
    }
}

/// Run the discovery worker
pub async fn run<S, F>(
    options: &Options,
    feed: &mut dyn DiscoveryFeed,
    resolver: &dyn Resolver,
    engine: &EngineHandle,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Discovery worker starting...");

    probe(feed, resolver, engine).await;

    let mut delay = options.initial_delay;
    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Discovery worker shutting down...");
                return;
            }
            _ = sleep_fn(delay) => {}
        }

        probe(feed, resolver, engine).await;
        delay = options.interval;
    }
}

async fn probe(feed: &mut dyn DiscoveryFeed, resolver: &dyn Resolver, engine: &EngineHandle) {
    debug!("Probing for controllers...");
    let records = match feed.probe().await {
        Ok(records) => records,
        Err(e) => {
            warn!("Discovery probe failed: {}", e);
            return;
        }
    };

    for record in records {
        handle_record(&record, resolver, engine).await;
    }
}

async fn handle_record(record: &DiscoveryRecord, resolver: &dyn Resolver, engine: &EngineHandle) {
    if !record.is_irrigation_controller() {
        trace!("Ignoring service {} ({:?})", record.name, record.record_type());
        return;
    }

    match resolve_record(record, resolver).await {
        Ok(sighting) => {
            if let Err(e) = engine.report_sighting(sighting) {
                error!("Unable to report {}: {}", record.name, e);
            }
        }
        Err(e) => warn!("Skipping {}: {}", record.name, e),
    }
}
