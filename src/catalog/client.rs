use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{error, warn};
use serde_json::Value;

use super::{CatalogService, Sleeper, TokioSleeper};
use crate::error::CatalogError;

/// Per-call id ceiling of the catalog's batched track lookup.
pub const MAX_BATCH_SIZE: usize = 50;

enum CallState {
    Fetching,
    Backoff(Duration),
}

/// Retry-aware front of a [`CatalogService`].
///
/// Rate-limit responses pause the calling task for the server's advertised
/// wait and retry the same call, with no attempt limit. Any other failure
/// is logged and degraded to an empty result.
#[derive(Clone)]
pub struct CatalogClient {
    service: Arc<dyn CatalogService>,
    sleeper: Arc<dyn Sleeper>,
}

impl CatalogClient {
    pub fn new(service: Arc<dyn CatalogService>) -> Self {
        Self::with_sleeper(service, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(service: Arc<dyn CatalogService>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { service, sleeper }
    }

    /// Raw records for `ids`, same length and order, or empty if the batch
    /// failed. Callers partition into chunks of at most [`MAX_BATCH_SIZE`].
    pub async fn fetch_tracks_batch(&self, ids: &[String]) -> Vec<Option<Value>> {
        if ids.is_empty() {
            return Vec::new();
        }
        if ids.len() > MAX_BATCH_SIZE {
            error!(
                "Refusing batch of {} ids, the catalog accepts at most {}",
                ids.len(),
                MAX_BATCH_SIZE
            );
            return Vec::new();
        }

        let what = format!("batch of {} tracks", ids.len());
        match self.with_backoff(&what, || self.service.get_tracks(ids)).await {
            Ok(tracks) => {
                if tracks.len() != ids.len() {
                    warn!(
                        "Catalog returned {} records for {} ids",
                        tracks.len(),
                        ids.len()
                    );
                }
                tracks
            }
            Err(e) => {
                error!("Catalog error for {}: {}", what, e);
                Vec::new()
            }
        }
    }

    /// Raw artist record, or `None` if the artist is unknown or the call failed.
    pub async fn fetch_artist(&self, id: &str) -> Option<Value> {
        let what = format!("artist {}", id);
        match self.with_backoff(&what, || self.service.get_artist(id)).await {
            Ok(artist) => artist,
            Err(e) => {
                error!("Catalog error for {}: {}", what, e);
                None
            }
        }
    }

    async fn with_backoff<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T, CatalogError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CatalogError>>,
    {
        let mut state = CallState::Fetching;
        loop {
            state = match state {
                CallState::Fetching => match call().await {
                    Err(CatalogError::RateLimited { retry_after }) => CallState::Backoff(retry_after),
                    result => return result,
                },
                CallState::Backoff(wait) => {
                    warn!("Rate limited on {}, pausing for {:?}", what, wait);
                    self.sleeper.sleep(wait).await;
                    CallState::Fetching
                }
            };
        }
    }
}
