use std::collections::{BTreeMap, HashSet};
use std::fmt;

use entity::prelude::EnrichedRow;
use serde::Serialize;

use crate::query::{ChartStore, TextMatcher};

// A chart entry counts when rank <= MAX_RANK and weeks_on_chart > MIN_WEEKS.
const MAX_RANK: u32 = 10;
const MIN_WEEKS: u32 = 2;
const INTERNATIONAL_CONTINENTS: usize = 3;

const SEASONS: [(&str, &str); 5] = [
    ("christmas", "Christmas"),
    ("holiday", "Holiday"),
    ("winter", "Winter"),
    ("summer", "Summer"),
    ("halloween", "Halloween"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SongDetails {
    pub release_date: Option<String>,
    pub genre: Option<String>,
    pub track_image: Option<String>,
    pub artist_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularityReport {
    /// Country codes where the song charted high enough for long enough.
    pub popular_countries: Vec<String>,
    pub popular_continents: Vec<String>,
    pub is_international: bool,
    pub country_streams: BTreeMap<String, u64>,
    pub song_details: Option<SongDetails>,
    pub season: Option<String>,
}

/// Where a song matching `track` and `artist` (case-insensitive substrings)
/// is popular.
pub fn analyze(
    store: &ChartStore,
    track: &str,
    artist: &str,
) -> Result<PopularityReport, regex::Error> {
    let track = TextMatcher::new(track)?;
    let artist = TextMatcher::new(artist)?;

    let mut popular_countries = Vec::new();
    let mut country_streams = BTreeMap::new();
    let mut continent_totals: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    let mut song_details = None;
    let mut season = None;

    for (continent, chart) in store.charts() {
        let totals = continent_totals.entry(continent).or_default();
        totals.1 += 1;

        let mut seen = HashSet::new();
        let counted: Vec<&EnrichedRow> = chart
            .rows
            .iter()
            .filter(|row| track.is_match(&row.track_name) && artist.is_match(&row.artist_names))
            .filter(|row| seen.insert((row.track_name.as_str(), row.artist_names.as_str())))
            .filter(|row| row.rank <= MAX_RANK && row.weeks_on_chart > MIN_WEEKS)
            .collect();

        let Some(first) = counted.first() else {
            continue;
        };

        totals.0 += 1;
        popular_countries.push(chart.country.code.clone());
        // Later matches overwrite earlier ones, for streams and season alike.
        if let Some(streams) = counted.iter().rev().find_map(|row| row.streams) {
            country_streams.insert(chart.country.code.clone(), streams);
        }

        if song_details.is_none() {
            song_details = Some(SongDetails {
                release_date: first.release_date.clone(),
                genre: first.genre.clone(),
                track_image: first.track_image.clone(),
                artist_image: first.artist_image.clone(),
            });
        }
        if let Some(latest) = counted
            .iter()
            .rev()
            .find_map(|row| season_of(row.genre.as_deref()))
        {
            season = Some(latest);
        }
    }

    let popular_continents: Vec<String> = continent_totals
        .into_iter()
        .filter(|(_, (popular, total))| *popular * 2 > *total)
        .map(|(continent, _)| continent.replace('_', " "))
        .collect();

    Ok(PopularityReport {
        is_international: popular_continents.len() >= INTERNATIONAL_CONTINENTS,
        popular_countries,
        popular_continents,
        country_streams,
        song_details,
        season,
    })
}

fn season_of(genre: Option<&str>) -> Option<String> {
    let genre = genre?.to_lowercase();
    SEASONS
        .iter()
        .find(|(keyword, _)| genre.contains(keyword))
        .map(|(_, season)| season.to_string())
}

impl fmt::Display for PopularityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(details) = &self.song_details {
            writeln!(f, "Song details:")?;
            writeln!(
                f,
                "  release date: {}",
                details.release_date.as_deref().unwrap_or("N/A")
            )?;
            writeln!(f, "  genre: {}", details.genre.as_deref().unwrap_or("Unknown"))?;
            writeln!(
                f,
                "  track image: {}",
                details.track_image.as_deref().unwrap_or("not available")
            )?;
            writeln!(
                f,
                "  artist image: {}",
                details.artist_image.as_deref().unwrap_or("not available")
            )?;
        }

        if self.popular_countries.is_empty() {
            return writeln!(f, "Not popular in any charted country");
        }

        writeln!(f, "Popular in: {}", self.popular_countries.join(", "))?;
        for (country, streams) in &self.country_streams {
            writeln!(f, "  {}: {} streams", country, streams)?;
        }

        if !self.popular_continents.is_empty() {
            writeln!(f, "Popular continents: {}", self.popular_continents.join(", "))?;
        }
        if self.is_international {
            writeln!(f, "International hit")?;
        }
        if let Some(season) = &self.season {
            writeln!(f, "Seasonal: tracks for {}", season)?;
        }
        Ok(())
    }
}
