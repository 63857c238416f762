use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CatalogError;

mod client;
pub mod models;
mod spotify;
#[cfg(test)]
pub(crate) mod testing;

pub use client::{CatalogClient, MAX_BATCH_SIZE};
pub use spotify::SpotifyCatalog;

#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Raw track records for up to [`MAX_BATCH_SIZE`] ids, in request order,
    /// `None` where the catalog does not know the id.
    async fn get_tracks(&self, ids: &[String]) -> Result<Vec<Option<Value>>, CatalogError>;

    /// Raw artist record, `None` if the artist does not exist.
    async fn get_artist(&self, id: &str) -> Result<Option<Value>, CatalogError>;
}

/// Pauses the calling task. Injected so backoff can be observed in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
