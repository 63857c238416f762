use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use entity::prelude::EnrichedRow;
use log::{info, warn};
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::error::EnrichError;

const CONTINENT_PREFIX: &str = "Charts_";
const SEARCH_LIMIT: usize = 10;
const TOP_TRACKS: usize = 10;

/// Case-insensitive literal substring match.
pub struct TextMatcher(Regex);

impl TextMatcher {
    pub fn new(needle: &str) -> Result<Self, regex::Error> {
        RegexBuilder::new(&regex::escape(needle))
            .case_insensitive(true)
            .build()
            .map(Self)
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.0.is_match(haystack)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Country {
    pub code: String,
    pub name: String,
    pub flag: String,
}

impl Country {
    /// `FRA🇫🇷` -> code/name `FRA`, flag `🇫🇷`.
    pub fn from_key(key: &str) -> Self {
        let split = key
            .char_indices()
            .rev()
            .take_while(|(_, c)| is_regional_indicator(*c))
            .last()
            .map(|(index, _)| index)
            .unwrap_or(key.len());
        let (name, flag) = key.split_at(split);

        Self {
            code: name.to_string(),
            name: name.to_string(),
            flag: flag.to_string(),
        }
    }
}

fn is_regional_indicator(c: char) -> bool {
    ('\u{1F1E6}'..='\u{1F1FF}').contains(&c)
}

/// One country's enriched chart file.
#[derive(Debug, Clone)]
pub struct CountryChart {
    /// File name between the first `_` and the extension.
    pub key: String,
    pub country: Country,
    pub rows: Vec<EnrichedRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub track_id: String,
    pub track_name: String,
    pub artist_names: String,
    pub track_image: Option<String>,
    pub popularity: Option<u32>,
    pub streams: Option<u64>,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopTrack {
    pub track_name: String,
    pub artist_names: String,
    pub streams: Option<u64>,
    pub popularity: Option<u32>,
    pub track_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularityPoint {
    pub week_date: String,
    /// Mean over the week's rows that carry a popularity.
    pub popularity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryCharts {
    pub top_tracks: Vec<TopTrack>,
    pub popularity_trends: Vec<PopularityPoint>,
}

/// Enriched charts keyed by continent (region directory minus `Charts_`).
#[derive(Debug, Clone, Default)]
pub struct ChartStore {
    root: PathBuf,
    continents: BTreeMap<String, Vec<CountryChart>>,
}

impl ChartStore {
    /// Loads `<root>/<region dir>/<prefix>_<key>.csv`. A missing root gives
    /// an empty store; unreadable rows are dropped.
    pub async fn load(root: impl Into<PathBuf>) -> Result<Self, EnrichError> {
        let root = root.into();
        let mut store = Self {
            root: root.clone(),
            continents: BTreeMap::new(),
        };

        let mut regions = match tokio::fs::read_dir(&root).await {
            Ok(regions) => regions,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Chart directory {} does not exist", root.display());
                return Ok(store);
            }
            Err(source) => return Err(read_error(&root, source)),
        };

        while let Some(region) = regions.next_entry().await.map_err(|e| read_error(&root, e))? {
            let path = region.path();
            if !path.is_dir() {
                continue;
            }
            let dir_name = region.file_name().to_string_lossy().to_string();
            let continent = dir_name
                .strip_prefix(CONTINENT_PREFIX)
                .unwrap_or(&dir_name)
                .to_string();

            let countries = load_region(&path).await?;
            store.continents.insert(continent, countries);
        }

        info!(
            "Loaded {} continents, {} countries from {}",
            store.continents.len(),
            store.continents.values().map(Vec::len).sum::<usize>(),
            root.display()
        );
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn continents(&self) -> Vec<String> {
        self.continents.keys().cloned().collect()
    }

    pub fn charts(&self) -> impl Iterator<Item = (&str, &CountryChart)> {
        self.continents.iter().flat_map(|(continent, countries)| {
            countries
                .iter()
                .map(move |country| (continent.as_str(), country))
        })
    }

    pub fn countries(&self, continent: &str) -> Option<Vec<Country>> {
        self.continents
            .get(continent)
            .map(|countries| countries.iter().map(|chart| chart.country.clone()).collect())
    }

    /// First country in `continent` whose key contains `country`.
    pub fn country(&self, continent: &str, country: &str) -> Option<&CountryChart> {
        self.continents
            .get(continent)?
            .iter()
            .find(|chart| chart.key.contains(country))
    }

    /// Tracks whose name or artists contain `query`, one hit per track id,
    /// most popular first.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>, regex::Error> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let matcher = TextMatcher::new(query)?;

        let mut seen = HashSet::new();
        let mut hits: Vec<SearchHit> = self
            .charts()
            .flat_map(|(_, chart)| chart.rows.iter())
            .filter(|row| matcher.is_match(&row.track_name) || matcher.is_match(&row.artist_names))
            .filter(|row| seen.insert(row.track_id.as_str()))
            .map(|row| SearchHit {
                track_id: row.track_id.clone(),
                track_name: row.track_name.clone(),
                artist_names: row.artist_names.clone(),
                track_image: row.track_image.clone(),
                popularity: row.popularity,
                streams: row.streams,
                country: row.country.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.popularity.cmp(&a.popularity));
        hits.truncate(SEARCH_LIMIT);
        Ok(hits)
    }

    pub fn country_charts(&self, continent: &str, country: &str) -> Option<CountryCharts> {
        let chart = self.country(continent, country)?;
        Some(CountryCharts {
            top_tracks: top_tracks(&chart.rows),
            popularity_trends: popularity_trends(&chart.rows),
        })
    }
}

fn read_error(path: &Path, source: std::io::Error) -> EnrichError {
    EnrichError::Read {
        path: path.display().to_string(),
        source,
    }
}

async fn load_region(dir: &Path) -> Result<Vec<CountryChart>, EnrichError> {
    let mut countries = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| read_error(dir, e))?;

    while let Some(entry) = entries.next_entry().await.map_err(|e| read_error(dir, e))? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("csv") {
            continue;
        }
        let Some(stem) = path.file_stem().map(|stem| stem.to_string_lossy().to_string()) else {
            continue;
        };
        let key = match stem.split_once('_') {
            Some((_, key)) => key.to_string(),
            None => stem,
        };

        let rows = read_enriched_rows(&path).await?;
        countries.push(CountryChart {
            country: Country::from_key(&key),
            key,
            rows,
        });
    }

    countries.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(countries)
}

async fn read_enriched_rows(path: &Path) -> Result<Vec<EnrichedRow>, EnrichError> {
    let data = tokio::fs::read(path).await.map_err(|e| read_error(path, e))?;
    let mut reader = csv::Reader::from_reader(data.as_slice());

    let mut rows = Vec::new();
    for record in reader.deserialize::<EnrichedRow>() {
        match record {
            Ok(row) => rows.push(row),
            Err(e) => warn!("{}: skipping unreadable row: {}", path.display(), e),
        }
    }
    Ok(rows)
}

/// The latest week's row per track, top by streams.
fn top_tracks(rows: &[EnrichedRow]) -> Vec<TopTrack> {
    let mut latest: HashMap<&str, &EnrichedRow> = HashMap::new();
    for row in rows {
        let newer = latest
            .get(row.track_id.as_str())
            .map_or(true, |current| current.week_date <= row.week_date);
        if newer {
            latest.insert(row.track_id.as_str(), row);
        }
    }

    let mut latest: Vec<&EnrichedRow> = latest.into_values().collect();
    latest.sort_by(|a, b| b.streams.cmp(&a.streams).then_with(|| a.track_id.cmp(&b.track_id)));

    latest
        .into_iter()
        .take(TOP_TRACKS)
        .map(|row| TopTrack {
            track_name: row.track_name.clone(),
            artist_names: row.artist_names.clone(),
            streams: row.streams,
            popularity: row.popularity,
            track_image: row.track_image.clone(),
        })
        .collect()
}

fn popularity_trends(rows: &[EnrichedRow]) -> Vec<PopularityPoint> {
    let mut weeks: BTreeMap<NaiveDate, (u64, u64)> = BTreeMap::new();
    for row in rows {
        let week = weeks.entry(row.week_date).or_default();
        if let Some(popularity) = row.popularity {
            week.0 += u64::from(popularity);
            week.1 += 1;
        }
    }

    weeks
        .into_iter()
        .map(|(week, (sum, count))| PopularityPoint {
            week_date: week.format("%Y-%m-%d").to_string(),
            popularity: (count > 0).then(|| sum as f64 / count as f64),
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::testing::{row, write_chart};
    use super::*;

    async fn store() -> (tempfile::TempDir, ChartStore) {
        let dir = tempfile::tempdir().unwrap();

        let mut old = row("t1", "Flowers", "Miley Cyrus", "2024-01-04", 900);
        old.popularity = Some(80);
        let mut new = row("t1", "Flowers", "Miley Cyrus", "2024-01-11", 500);
        new.popularity = Some(90);
        let mut other = row("t2", "Houdini", "Dua Lipa", "2024-01-11", 700);
        other.popularity = None;
        write_chart(dir.path(), "Charts_Europe", "charts_FRA🇫🇷.csv", &[old, new, other]);
        write_chart(
            dir.path(),
            "Charts_Europe",
            "charts_BEL🇧🇪.csv",
            &[row("t3", "Lovin On Me", "Jack Harlow", "2024-01-11", 100)],
        );
        write_chart(
            dir.path(),
            "Charts_Asia",
            "charts_JPN🇯🇵.csv",
            &[row("t1", "Flowers", "Miley Cyrus", "2024-01-11", 300)],
        );
        std::fs::write(dir.path().join("README.txt"), "not a region").unwrap();

        let store = ChartStore::load(dir.path()).await.unwrap();
        (dir, store)
    }

    #[test]
    fn splits_trailing_flag_from_code() {
        assert_eq!(
            Country::from_key("FRA🇫🇷"),
            Country {
                code: "FRA".to_string(),
                name: "FRA".to_string(),
                flag: "🇫🇷".to_string(),
            }
        );
        assert_eq!(Country::from_key("USA").flag, "");
    }

    #[tokio::test]
    async fn lists_continents_and_countries() {
        let (_dir, store) = store().await;

        assert_eq!(store.continents(), vec!["Asia", "Europe"]);
        let europe = store.countries("Europe").unwrap();
        assert_eq!(europe.len(), 2);
        assert_eq!(europe[0].code, "BEL");
        assert_eq!(europe[1].flag, "🇫🇷");
        assert!(store.countries("Atlantis").is_none());
    }

    #[tokio::test]
    async fn missing_root_is_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::load(dir.path().join("nope")).await.unwrap();
        assert!(store.continents().is_empty());
    }

    #[tokio::test]
    async fn search_dedupes_by_track_and_ranks_by_popularity() {
        let (_dir, store) = store().await;

        let hits = store.search("LIPA").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].track_id, "t2");

        let hits = store.search("o").unwrap();
        let ids: Vec<&str> = hits.iter().map(|hit| hit.track_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t3", "t2"]);

        assert!(store.search("").unwrap().is_empty());
    }

    #[tokio::test]
    async fn country_charts_use_the_latest_week_per_track() {
        let (_dir, store) = store().await;

        let charts = store.country_charts("Europe", "FRA").unwrap();

        assert_eq!(charts.top_tracks.len(), 2);
        assert_eq!(charts.top_tracks[0].track_name, "Houdini");
        assert_eq!(charts.top_tracks[1].streams, Some(500));
        assert_eq!(
            charts.popularity_trends,
            vec![
                PopularityPoint {
                    week_date: "2024-01-04".to_string(),
                    popularity: Some(80.0),
                },
                PopularityPoint {
                    week_date: "2024-01-11".to_string(),
                    popularity: Some(90.0),
                },
            ]
        );
    }

    #[tokio::test]
    async fn unknown_country_or_continent_is_none() {
        let (_dir, store) = store().await;

        assert!(store.country_charts("Europe", "ZZZ").is_none());
        assert!(store.country_charts("Mars", "FRA").is_none());
    }
}
