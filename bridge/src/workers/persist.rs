//! Persistence worker
//!
//! Receives full document snapshots from the engine and writes them out.
//! Only the newest pending snapshot of each document is written.

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::filesys::file::File;
use crate::storage::cache::CacheDocument;
use crate::storage::known::KnownDocument;

pub type PersistSender = mpsc::UnboundedSender<PersistJob>;
pub type PersistReceiver = mpsc::UnboundedReceiver<PersistJob>;

#[derive(Debug, Clone)]
pub enum PersistJob {
    Customizations(CacheDocument),
    KnownDevices(KnownDocument),
}

/// Persistence worker options
#[derive(Debug, Clone)]
pub struct Options {
    pub cache_file: File,
    pub known_devices_file: File,
}

/// Run the persistence worker until every sender is dropped
pub async fn run(options: &Options, mut jobs: PersistReceiver) {
    info!("Persistence worker starting...");

    while let Some(job) = jobs.recv().await {
        let mut customizations = None;
        let mut known = None;
        collect(job, &mut customizations, &mut known);
        while let Ok(job) = jobs.try_recv() {
            collect(job, &mut customizations, &mut known);
        }

        if let Some(doc) = customizations {
            write(&options.cache_file, &doc).await;
        }
        if let Some(doc) = known {
            write(&options.known_devices_file, &doc).await;
        }
    }

    info!("Persistence worker stopped");
}

fn collect(
    job: PersistJob,
    customizations: &mut Option<CacheDocument>,
    known: &mut Option<KnownDocument>,
) {
    match job {
        PersistJob::Customizations(doc) => *customizations = Some(doc),
        PersistJob::KnownDevices(doc) => *known = Some(doc),
    }
}

async fn write<T: serde::Serialize>(file: &File, doc: &T) {
    match file.write_json(doc).await {
        Ok(()) => debug!("Wrote {}", file.path().display()),
        Err(e) => error!("Failed to write {}: {}", file.path().display(), e),
    }
}
