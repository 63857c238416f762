use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by a catalog service call.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The service asked us to wait before calling again.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    #[error("malformed catalog response: {0}")]
    Malformed(String),

    #[error("catalog authentication failed: {0}")]
    Auth(String),
}

impl From<reqwest::Error> for CatalogError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            CatalogError::Malformed(e.to_string())
        } else {
            CatalogError::Unavailable(e.to_string())
        }
    }
}

/// Failures that stop a single chart file from being enriched.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to persist {path}: {source}")]
    Persistence {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EnrichError {
    /// Structural problems skip the file; everything else fails it.
    pub fn is_structural(&self) -> bool {
        matches!(self, EnrichError::MissingColumns(_))
    }
}
