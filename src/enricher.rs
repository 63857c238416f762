use std::sync::Arc;

use async_trait::async_trait;
use entity::prelude::{ArtistMetadata, TrackMetadata};
use log::warn;
use serde::Deserialize;
use serde_json::Value;

use crate::cache::ResultCache;
use crate::catalog::models::{RawArtist, RawTrack};
use crate::catalog::CatalogClient;

/// Resolves artist metadata by catalog id. `None` means "unknown or failed";
/// the enricher then falls back to empty artist fields.
#[async_trait]
pub trait ArtistLookup: Send + Sync {
    async fn artist(&self, id: &str) -> Option<ArtistMetadata>;
}

/// Artist lookup that consults the cache before the catalog and caches
/// every successfully parsed artist.
pub struct CachedArtistLookup {
    cache: Arc<ResultCache>,
    client: CatalogClient,
}

impl CachedArtistLookup {
    pub fn new(cache: Arc<ResultCache>, client: CatalogClient) -> Self {
        Self { cache, client }
    }
}

#[async_trait]
impl ArtistLookup for CachedArtistLookup {
    async fn artist(&self, id: &str) -> Option<ArtistMetadata> {
        if let Some(artist) = self.cache.artist(id) {
            return Some(artist);
        }

        let raw = self.client.fetch_artist(id).await?;
        let artist = match RawArtist::deserialize(&raw) {
            Ok(artist) => artist,
            Err(e) => {
                warn!("Malformed artist record {}: {}", id, e);
                return None;
            }
        };

        let metadata = ArtistMetadata {
            genres: artist.genres,
            image: artist.images.into_iter().next().map(|image| image.url),
            followers: artist.followers.and_then(|followers| followers.total),
        };
        self.cache.put_artist(id, metadata.clone());
        Some(metadata)
    }
}

/// Turns raw catalog track records into [`TrackMetadata`].
pub struct TrackEnricher {
    cache: Arc<ResultCache>,
}

impl TrackEnricher {
    pub fn new(cache: Arc<ResultCache>) -> Self {
        Self { cache }
    }

    /// Metadata for `track_id`, or `None` when the catalog had no record or
    /// the record is malformed. Results are cached under `track_id`.
    pub async fn enrich(
        &self,
        track_id: &str,
        raw: Option<&Value>,
        artists: &dyn ArtistLookup,
    ) -> Option<TrackMetadata> {
        if let Some(cached) = self.cache.track(track_id) {
            return Some(cached);
        }

        let raw = raw?;
        let track = match RawTrack::deserialize(raw) {
            Ok(track) => track,
            Err(e) => {
                warn!("Skipping malformed track record {}: {}", track_id, e);
                return None;
            }
        };

        let artist = match track.primary_artist_id() {
            Some(artist_id) => artists.artist(artist_id).await.unwrap_or_default(),
            None => ArtistMetadata::default(),
        };

        let metadata = TrackMetadata {
            track_id: track_id.to_string(),
            popularity: track.popularity,
            duration_ms: track.duration_ms,
            explicit: track.explicit,
            genre: artist.primary_genre().map(str::to_string),
            release_date: track.album.release_date.clone(),
            track_image: track.image_url(),
            artist_image: artist.image,
            monthly_listeners: artist.followers,
        };

        self.cache.put_track(metadata.clone());
        Some(metadata)
    }
}
