use std::collections::HashMap;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};

use crate::catalog::{CatalogClient, MAX_BATCH_SIZE};

pub const DEFAULT_CONCURRENCY: usize = 5;

/// Fans a set of track ids out to the catalog in batches, with at most
/// `concurrency` batches in flight.
pub struct BatchScheduler {
    client: CatalogClient,
    concurrency: usize,
    progress: ProgressBar,
}

impl BatchScheduler {
    pub fn new(client: CatalogClient, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
            progress: ProgressBar::hidden(),
        }
    }

    /// Reports completed batches on `progress`.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        progress.set_style(
            ProgressStyle::with_template("[{percent:>3}%] {pos}/{len} batches {wide_bar} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> &ProgressBar {
        &self.progress
    }

    /// Catalog answers keyed by the requested id: `Some(record)`, or `None`
    /// when the catalog has no such track. Ids whose batch failed are absent.
    pub async fn fetch_all(&self, ids: &[String]) -> HashMap<String, Option<Value>> {
        let batches: Vec<Vec<String>> = ids.chunks(MAX_BATCH_SIZE).map(<[String]>::to_vec).collect();
        let total = batches.len();

        self.progress.reset();
        self.progress.set_length(total as u64);

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let (tx, mut rx) = mpsc::channel(total.max(1));

        for batch in batches {
            let client = self.client.clone();
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let records = client.fetch_tracks_batch(&batch).await;
                let _ = tx.send((batch, records)).await;
            });
        }

        drop(tx);

        let mut results = HashMap::with_capacity(ids.len());
        let mut completed = 0;

        // The channel closes once every worker has reported: the join barrier.
        while let Some((batch, records)) = rx.recv().await {
            results.extend(batch.into_iter().zip(records));
            completed += 1;
            self.progress.inc(1);
        }

        self.progress.finish();
        debug!(
            "Fetched {} of {} tracks in {}/{} batches",
            results.values().filter(|record| record.is_some()).count(),
            ids.len(),
            completed,
            total
        );

        results
    }
}
