use serde::{Deserialize, Serialize};

/// Catalog metadata for one unique track identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub track_id: String,
    /// 0-100, as reported by the catalog.
    pub popularity: u32,
    pub duration_ms: u64,
    pub explicit: bool,
    pub genre: Option<String>,
    pub release_date: String,
    pub track_image: Option<String>,
    pub artist_image: Option<String>,
    /// Follower total of the track's primary artist.
    pub monthly_listeners: Option<u64>,
}

/// Per-artist data shared by every track of that artist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistMetadata {
    pub genres: Vec<String>,
    pub image: Option<String>,
    pub followers: Option<u64>,
}

impl ArtistMetadata {
    pub fn primary_genre(&self) -> Option<&str> {
        self.genres.first().map(String::as_str)
    }
}
