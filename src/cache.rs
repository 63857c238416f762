use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use entity::prelude::{ArtistMetadata, TrackMetadata};
use log::{debug, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::EnrichError;

/// String-keyed map safe to share between enrichment workers.
/// Concurrent inserts under the same key keep the last write.
pub struct SharedMap<V> {
    inner: RwLock<HashMap<String, V>>,
}

impl<V: Clone> SharedMap<V> {
    pub fn new() -> Self {
        Self::from_map(HashMap::new())
    }

    fn from_map(map: HashMap<String, V>) -> Self {
        Self {
            inner: RwLock::new(map),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    pub fn insert(&self, key: String, value: V) {
        self.inner.write().insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Ordered copy, so serialized snapshots are stable.
    pub fn snapshot(&self) -> BTreeMap<String, V> {
        self.inner
            .read()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

impl<V: Clone> Default for SharedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize, Deserialize, Default)]
struct CacheFile {
    tracks: BTreeMap<String, TrackMetadata>,
    artists: BTreeMap<String, ArtistMetadata>,
    #[serde(default)]
    not_found: BTreeSet<String>,
}

pub struct ResultCache {
    path: PathBuf,
    tracks: SharedMap<TrackMetadata>,
    artists: SharedMap<ArtistMetadata>,
    /// Track ids the catalog answered with no record.
    not_found: RwLock<BTreeSet<String>>,
}

impl ResultCache {
    /// Empty cache that will flush to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tracks: SharedMap::new(),
            artists: SharedMap::new(),
            not_found: RwLock::new(BTreeSet::new()),
        }
    }

    /// Restores both mappings from `path`, or starts empty if nothing was
    /// flushed there yet.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, EnrichError> {
        let path = path.into();
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No cache at {}, starting empty", path.display());
                return Ok(Self::new(path));
            }
            Err(e) => {
                return Err(EnrichError::Read {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };

        let file: CacheFile = serde_json::from_slice(&data)?;
        info!(
            "Loaded cache from {}: {} tracks, {} artists, {} unknown ids",
            path.display(),
            file.tracks.len(),
            file.artists.len(),
            file.not_found.len()
        );

        Ok(Self {
            path,
            tracks: SharedMap::from_map(file.tracks.into_iter().collect()),
            artists: SharedMap::from_map(file.artists.into_iter().collect()),
            not_found: RwLock::new(file.not_found),
        })
    }

    /// Writes both mappings next to the target and renames over it, so a
    /// failed flush leaves the previous checkpoint intact.
    pub async fn flush(&self) -> Result<(), EnrichError> {
        let file = CacheFile {
            tracks: self.tracks.snapshot(),
            artists: self.artists.snapshot(),
            not_found: self.not_found.read().clone(),
        };
        let data = serde_json::to_vec(&file)?;
        write_atomic(&self.path, &data).await?;

        debug!(
            "Flushed cache to {} ({} tracks, {} artists)",
            self.path.display(),
            file.tracks.len(),
            file.artists.len()
        );
        Ok(())
    }

    pub fn track(&self, id: &str) -> Option<TrackMetadata> {
        self.tracks.get(id)
    }

    pub fn contains_track(&self, id: &str) -> bool {
        self.tracks.contains(id)
    }

    pub fn put_track(&self, metadata: TrackMetadata) {
        self.tracks.insert(metadata.track_id.clone(), metadata);
    }

    /// Whether the catalog already answered `id` with no record.
    pub fn is_not_found(&self, id: &str) -> bool {
        self.not_found.read().contains(id)
    }

    pub fn mark_not_found(&self, id: &str) {
        self.not_found.write().insert(id.to_string());
    }

    pub fn artist(&self, id: &str) -> Option<ArtistMetadata> {
        self.artists.get(id)
    }

    pub fn put_artist(&self, id: &str, metadata: ArtistMetadata) {
        self.artists.insert(id.to_string(), metadata);
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn artist_count(&self) -> usize {
        self.artists.len()
    }
}

/// Write-new-then-replace. The temporary file sits in the target's
/// directory so the rename never crosses filesystems.
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), EnrichError> {
    let persistence = |source| EnrichError::Persistence {
        path: path.display().to_string(),
        source,
    };

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    tokio::fs::write(&temp_path, data).await.map_err(persistence)?;
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(persistence(e));
    }
    Ok(())
}
