use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RawTrack {
    pub id: String,
    pub popularity: u32,
    pub duration_ms: u64,
    pub explicit: bool,
    pub album: RawAlbum,
    #[serde(default)]
    pub artists: Vec<RawArtistRef>,
}

#[derive(Debug, Deserialize)]
pub struct RawAlbum {
    pub release_date: String,
    #[serde(default)]
    pub images: Vec<RawImage>,
}

#[derive(Debug, Deserialize)]
pub struct RawArtistRef {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawImage {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct RawArtist {
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub images: Vec<RawImage>,
    pub followers: Option<RawFollowers>,
}

#[derive(Debug, Deserialize)]
pub struct RawFollowers {
    pub total: Option<u64>,
}

impl RawTrack {
    pub fn primary_artist_id(&self) -> Option<&str> {
        self.artists
            .first()
            .and_then(|artist| artist.id.as_deref())
            .filter(|id| !id.is_empty())
    }

    pub fn image_url(&self) -> Option<String> {
        self.album.images.first().map(|image| image.url.clone())
    }
}
