use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::{CatalogService, Sleeper};
use crate::error::CatalogError;

pub fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

pub fn track_json(id: &str, artist_id: Option<&str>) -> Value {
    let artists = match artist_id {
        Some(artist_id) => json!([{ "id": artist_id, "name": format!("Artist {}", artist_id) }]),
        None => json!([]),
    };
    json!({
        "id": id,
        "name": format!("Track {}", id),
        "popularity": 70,
        "duration_ms": 180_000,
        "explicit": false,
        "album": {
            "release_date": "2024-01-01",
            "images": [{ "url": format!("https://img/{}", id), "width": 640, "height": 640 }]
        },
        "artists": artists
    })
}

pub fn artist_json(id: &str, genres: &[&str], followers: u64) -> Value {
    json!({
        "id": id,
        "genres": genres,
        "images": [{ "url": format!("https://img/artist/{}", id) }],
        "followers": { "href": null, "total": followers }
    })
}

#[derive(Default)]
pub struct FakeCatalog {
    tracks: HashMap<String, Value>,
    artists: HashMap<String, Value>,
    failing_artists: HashSet<String>,
    fail_tracks: bool,
    track_rate_limits: Mutex<VecDeque<Duration>>,
    artist_rate_limits: Mutex<VecDeque<Duration>>,
    track_calls: Mutex<Vec<Vec<String>>>,
    artist_calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_track(mut self, track: Value) -> Self {
        let id = track["id"].as_str().unwrap_or_default().to_string();
        self.tracks.insert(id, track);
        self
    }

    /// Registers a record under `id` regardless of its content.
    pub fn with_raw_track(mut self, id: &str, track: Value) -> Self {
        self.tracks.insert(id.to_string(), track);
        self
    }

    pub fn with_artist(mut self, artist: Value) -> Self {
        let id = artist["id"].as_str().unwrap_or_default().to_string();
        self.artists.insert(id, artist);
        self
    }

    pub fn failing_artist(mut self, id: &str) -> Self {
        self.failing_artists.insert(id.to_string());
        self
    }

    pub fn failing_tracks(mut self) -> Self {
        self.fail_tracks = true;
        self
    }

    pub fn rate_limit_tracks(self, retry_after: Duration) -> Self {
        self.track_rate_limits.lock().push_back(retry_after);
        self
    }

    pub fn rate_limit_artists(self, retry_after: Duration) -> Self {
        self.artist_rate_limits.lock().push_back(retry_after);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn track_calls(&self) -> Vec<Vec<String>> {
        self.track_calls.lock().clone()
    }

    pub fn artist_calls(&self) -> Vec<String> {
        self.artist_calls.lock().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.track_calls.lock().len() + self.artist_calls.lock().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogService for FakeCatalog {
    async fn get_tracks(&self, ids: &[String]) -> Result<Vec<Option<Value>>, CatalogError> {
        self.track_calls.lock().push(ids.to_vec());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(retry_after) = self.track_rate_limits.lock().pop_front() {
            return Err(CatalogError::RateLimited { retry_after });
        }
        if self.fail_tracks {
            return Err(CatalogError::Unavailable("HTTP 502".to_string()));
        }
        Ok(ids.iter().map(|id| self.tracks.get(id).cloned()).collect())
    }

    async fn get_artist(&self, id: &str) -> Result<Option<Value>, CatalogError> {
        self.artist_calls.lock().push(id.to_string());

        if let Some(retry_after) = self.artist_rate_limits.lock().pop_front() {
            return Err(CatalogError::RateLimited { retry_after });
        }
        if self.failing_artists.contains(id) {
            return Err(CatalogError::Unavailable("HTTP 500".to_string()));
        }
        Ok(self.artists.get(id).cloned())
    }
}

/// Records requested pauses and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().push(duration);
    }
}
