use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Columns a chart file must carry, besides one of `track_id` / `uri`.
pub const REQUIRED_COLUMNS: [&str; 9] = [
    "rank",
    "artist_names",
    "track_name",
    "source",
    "streams",
    "peak_rank",
    "weeks_on_chart",
    "country",
    "week_date",
];

/// Columns that can carry the track identifier.
pub const TRACK_ID_COLUMNS: [&str; 2] = ["track_id", "uri"];

/// A chart row exactly as it appears in a per-country file.
#[derive(Debug, Clone, Deserialize)]
pub struct ChartRecord {
    pub rank: u32,
    pub uri: Option<String>,
    pub track_id: Option<String>,
    pub artist_names: String,
    pub track_name: String,
    pub source: String,
    pub streams: Option<u64>,
    pub peak_rank: Option<u32>,
    pub previous_rank: Option<i32>,
    pub weeks_on_chart: u32,
    pub country: String,
    pub week_date: NaiveDate,
}

/// One track's weekly position in one country's chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRow {
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
}

impl ChartRecord {
    /// Resolves the track identifier, preferring an explicit `track_id`
    /// over the one embedded in `uri`. Returns `None` when neither yields one.
    pub fn into_row(self) -> Option<ChartRow> {
        let track_id = self
            .track_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| self.uri.as_deref().and_then(track_id_from_uri))?;

        Some(ChartRow {
            rank: self.rank,
            uri: self.uri,
            track_id,
            artist_names: self.artist_names,
            track_name: self.track_name,
            source: self.source,
            streams: self.streams,
            peak_rank: self.peak_rank,
            previous_rank: self.previous_rank,
            weeks_on_chart: self.weeks_on_chart,
            country: self.country,
            week_date: self.week_date,
        })
    }
}

/// `spotify:track:abc123` -> `abc123`
pub fn track_id_from_uri(uri: &str) -> Option<String> {
    let id = uri.trim().rsplit(':').next()?;
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Names of the required columns missing from `headers`.
pub fn missing_columns<'a, I>(headers: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    // Matched verbatim: rows are deserialized by these exact names.
    let present: Vec<&str> = headers.into_iter().collect();

    let mut missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|column| !present.contains(column))
        .map(|column| column.to_string())
        .collect();

    if !TRACK_ID_COLUMNS.iter().any(|column| present.contains(column)) {
        missing.push(TRACK_ID_COLUMNS.join("|"));
    }

    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_id_after_last_separator() {
        assert_eq!(
            track_id_from_uri("spotify:track:4uLU6hMCjMI75M1A2tKUQC"),
            Some("4uLU6hMCjMI75M1A2tKUQC".to_string())
        );
        assert_eq!(track_id_from_uri("plainid"), Some("plainid".to_string()));
        assert_eq!(track_id_from_uri("spotify:track:"), None);
    }

    #[test]
    fn missing_columns_reports_absent_id_columns() {
        let headers = ["rank", "artist_names", "track_name", "source", "streams"];
        let missing = missing_columns(headers);

        assert!(missing.contains(&"peak_rank".to_string()));
        assert!(missing.contains(&"week_date".to_string()));
        assert!(missing.contains(&"track_id|uri".to_string()));
        assert!(!missing.contains(&"rank".to_string()));
    }

    #[test]
    fn padded_header_names_do_not_count() {
        let mut headers = REQUIRED_COLUMNS.to_vec();
        headers[0] = " rank";
        headers.push("uri");

        assert_eq!(missing_columns(headers), vec!["rank".to_string()]);
    }

    #[test]
    fn uri_alone_satisfies_the_id_requirement() {
        let mut headers = REQUIRED_COLUMNS.to_vec();
        headers.push("uri");
        assert!(missing_columns(headers).is_empty());
    }

    #[test]
    fn record_prefers_explicit_track_id() {
        let data = "\
rank,uri,track_id,artist_names,track_name,source,streams,peak_rank,weeks_on_chart,country,week_date
1,spotify:track:fromuri,explicit,Artist,Song,Label,1000,1,3,FRA,2024-01-04
2,spotify:track:onlyuri,,Other,Tune,Label,900,2,1,FRA,2024-01-04
3,spotify:track:nostreams,,Third,Air,Label,,,1,FRA,2024-01-04
";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let rows: Vec<ChartRow> = reader
            .deserialize::<ChartRecord>()
            .map(|record| record.unwrap().into_row().unwrap())
            .collect();

        assert_eq!(rows[0].track_id, "explicit");
        assert_eq!(rows[1].track_id, "onlyuri");
        assert_eq!(rows[1].previous_rank, None);
        assert_eq!(rows[2].streams, None);
        assert_eq!(rows[2].peak_rank, None);
        assert_eq!(rows[0].week_date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
    }
}
