use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::chart_row::ChartRow;
use crate::track_metadata::TrackMetadata;

/// A chart row left-joined with its track's catalog metadata.
///
/// Field order is the column order of the enriched files; the query layer
/// reads them back with the same struct, so columns are only ever appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedRow {
    pub rank: u32,
    pub uri: Option<String>,
    pub track_id: String,
    pub artist_names: String,
    pub track_name: String,
    pub source: String,
    pub streams: Option<u64>,
    pub peak_rank: Option<u32>,
    pub previous_rank: Option<i32>,
    pub weeks_on_chart: u32,
    pub country: String,
    pub week_date: NaiveDate,
    pub popularity: Option<u32>,
    pub duration_ms: Option<u64>,
    pub explicit: Option<bool>,
    pub genre: Option<String>,
    pub release_date: Option<String>,
    pub track_image: Option<String>,
    pub artist_image: Option<String>,
    pub monthly_listeners: Option<u64>,
}

impl EnrichedRow {
    pub fn join(row: &ChartRow, metadata: Option<&TrackMetadata>) -> Self {
        Self {
            rank: row.rank,
            uri: row.uri.clone(),
            track_id: row.track_id.clone(),
            artist_names: row.artist_names.clone(),
            track_name: row.track_name.clone(),
            source: row.source.clone(),
            streams: row.streams,
            peak_rank: row.peak_rank,
            previous_rank: row.previous_rank,
            weeks_on_chart: row.weeks_on_chart,
            country: row.country.clone(),
            week_date: row.week_date,
            popularity: metadata.map(|m| m.popularity),
            duration_ms: metadata.map(|m| m.duration_ms),
            explicit: metadata.map(|m| m.explicit),
            genre: metadata.and_then(|m| m.genre.clone()),
            release_date: metadata.map(|m| m.release_date.clone()),
            track_image: metadata.and_then(|m| m.track_image.clone()),
            artist_image: metadata.and_then(|m| m.artist_image.clone()),
            monthly_listeners: metadata.and_then(|m| m.monthly_listeners),
        }
    }
}
