//! Fire-and-forget work scheduled by request handlers.
//!
//! Handlers push jobs onto an unbounded queue and return immediately. A single
//! worker task drains the queue and runs every job on its own task, so a slow
//! or failing job never delays a response or another job. Results are only
//! logged; nothing flows back to the requester.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, warn};

/// Input for generating a listing description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentJob {
    pub brand: String,
    pub make: String,
    pub year: i32,
    pub picture_url: String,
}

#[derive(Debug, Error)]
#[error("enrichment failed: {0}")]
pub struct EnrichmentError(pub String);

/// The deferred step itself. Implementations may take as long as they need.
#[async_trait]
pub trait Enricher: Send + Sync + 'static {
    async fn enrich(&self, job: EnrichmentJob) -> Result<(), EnrichmentError>;
}

/// Default enricher: records the request in the log
pub struct TracingEnricher;

#[async_trait]
impl Enricher for TracingEnricher {
    async fn enrich(&self, job: EnrichmentJob) -> Result<(), EnrichmentError> {
        info!(
            brand = %job.brand,
            make = %job.make,
            year = job.year,
            picture_url = %job.picture_url,
            "description requested"
        );
        Ok(())
    }
}

/// Handle used by request handlers to schedule jobs
#[derive(Clone)]
pub struct BackgroundTasks {
    sender: mpsc::UnboundedSender<EnrichmentJob>,
}

/// The running worker. Finishes once every `BackgroundTasks` clone is dropped
/// and the queued jobs have run.
pub struct BackgroundWorker {
    handle: JoinHandle<()>,
}

impl BackgroundTasks {
    /// Start the worker on the current tokio runtime
    pub fn spawn(enricher: Arc<dyn Enricher>) -> (Self, BackgroundWorker) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_worker(enricher, receiver));
        (Self { sender }, BackgroundWorker { handle })
    }

    /// Queue a job. Never blocks and never fails the caller.
    pub fn schedule(&self, job: EnrichmentJob) {
        if let Err(mpsc::error::SendError(job)) = self.sender.send(job) {
            warn!(
                "background worker stopped; dropping enrichment for {} {}",
                job.brand, job.make
            );
        }
    }
}

impl BackgroundWorker {
    /// Wait for the queue to drain
    pub async fn shutdown(self) {
        if let Err(e) = self.handle.await {
            warn!("background worker ended abnormally: {}", e);
        }
    }
}

async fn run_worker(enricher: Arc<dyn Enricher>, mut receiver: mpsc::UnboundedReceiver<EnrichmentJob>) {
    let mut running = JoinSet::new();

    while let Some(job) = receiver.recv().await {
        let enricher = Arc::clone(&enricher);
        running.spawn(async move {
            let label = format!("{} {} ({})", job.brand, job.make, job.year);
            if let Err(e) = enricher.enrich(job).await {
                warn!("{} for {}", e, label);
            }
        });

        // Reap finished jobs so the set does not grow with uptime
        while let Some(done) = running.try_join_next() {
            log_join(done);
        }
    }

    while let Some(done) = running.join_next().await {
        log_join(done);
    }
    info!("background worker drained");
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        warn!("enrichment task panicked: {}", e);
    }
}
