use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use entity::chart_row::missing_columns;
use entity::prelude::{ChartRecord, ChartRow, EnrichedRow, TrackMetadata};
use futures::stream::{self, StreamExt};
use indicatif::{MultiProgress, ProgressBar};
use log::{error, info, warn};

use crate::cache::{write_atomic, ResultCache};
use crate::catalog::CatalogClient;
use crate::enricher::{CachedArtistLookup, TrackEnricher};
use crate::error::EnrichError;
use crate::scheduler::BatchScheduler;

/// Where a chart file's enrichment ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Pending,
    ColumnsValidated,
    IdsExtracted,
    Fetching,
    Merging,
    Persisted,
    /// Structurally unusable input, nothing was written.
    Skipped,
    /// Reading or persisting failed, output and cache are untrusted.
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichStats {
    pub rows: usize,
    pub unique_ids: usize,
    pub cache_hits: usize,
    pub fetched: usize,
    pub resolved: usize,
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub state: FileState,
    pub stats: EnrichStats,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Complete,
    Partial,
    Failed,
    NothingToDo,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub files: Vec<FileReport>,
}

impl RunSummary {
    fn count(&self, state: FileState) -> usize {
        self.files.iter().filter(|file| file.state == state).count()
    }

    pub fn enriched(&self) -> usize {
        self.count(FileState::Persisted)
    }

    pub fn skipped(&self) -> usize {
        self.count(FileState::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(FileState::Failed)
    }

    pub fn outcome(&self) -> RunOutcome {
        match (self.files.len(), self.enriched()) {
            (0, _) => RunOutcome::NothingToDo,
            (_, 0) => RunOutcome::Failed,
            (total, enriched) if enriched == total => RunOutcome::Complete,
            _ => RunOutcome::Partial,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fetched: usize = self.files.iter().map(|file| file.stats.fetched).sum();
        let hits: usize = self.files.iter().map(|file| file.stats.cache_hits).sum();
        write!(
            f,
            "{} files: {} enriched, {} skipped, {} failed ({} tracks fetched, {} cache hits)",
            self.files.len(),
            self.enriched(),
            self.skipped(),
            self.failed(),
            fetched,
            hits
        )
    }
}

pub struct Orchestrator {
    cache: Arc<ResultCache>,
    client: CatalogClient,
    concurrency: usize,
    input_dir: PathBuf,
    output_dir: PathBuf,
    multi: Option<MultiProgress>,
}

impl Orchestrator {
    pub fn new(
        cache: Arc<ResultCache>,
        client: CatalogClient,
        concurrency: usize,
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cache,
            client,
            concurrency: concurrency.max(1),
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            multi: None,
        }
    }

    pub fn with_progress(mut self, multi: MultiProgress) -> Self {
        self.multi = Some(multi);
        self
    }

    /// Enriches every file in turn; a failed file never stops the run.
    pub async fn run(&self, inputs: &[PathBuf]) -> RunSummary {
        let mut summary = RunSummary::default();
        for input in inputs {
            summary.files.push(self.enrich_file(input).await);
        }
        info!("Enrichment finished: {}", summary);
        summary
    }

    pub async fn enrich_file(&self, input: &Path) -> FileReport {
        let mut report = FileReport {
            input: input.to_path_buf(),
            output: self.output_path_for(input),
            state: FileState::Pending,
            stats: EnrichStats::default(),
            error: None,
        };

        info!("Processing chart file: {}", input.display());

        if let Err(e) = self.process(input, &mut report).await {
            report.state = if e.is_structural() {
                FileState::Skipped
            } else {
                FileState::Failed
            };
            error!("Could not enrich {}: {}", input.display(), e);
            report.error = Some(e.to_string());
        }

        report
    }

    async fn process(&self, input: &Path, report: &mut FileReport) -> Result<(), EnrichError> {
        let rows = read_chart_rows(input).await?;
        report.state = FileState::ColumnsValidated;

        let enriched = self.enrich_tracked(&rows, report).await;

        let data = write_enriched(&enriched)?;
        if let Some(parent) = report.output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| EnrichError::Persistence {
                    path: parent.display().to_string(),
                    source,
                })?;
        }
        write_atomic(&report.output, &data).await?;

        // Checkpoint only once the file is fully enriched.
        self.cache.flush().await?;
        report.state = FileState::Persisted;

        info!(
            "Enriched {} -> {} ({} rows, {}/{} tracks with metadata)",
            input.display(),
            report.output.display(),
            report.stats.rows,
            report.stats.resolved,
            report.stats.unique_ids
        );
        Ok(())
    }

    /// Left-joins `rows` with catalog metadata. Output has one row per input
    /// row, in input order; rows without metadata keep empty columns.
    pub async fn enrich_rows(&self, rows: &[ChartRow]) -> (Vec<EnrichedRow>, EnrichStats) {
        let mut report = FileReport {
            input: PathBuf::new(),
            output: PathBuf::new(),
            state: FileState::ColumnsValidated,
            stats: EnrichStats::default(),
            error: None,
        };
        let enriched = self.enrich_tracked(rows, &mut report).await;
        (enriched, report.stats)
    }

    async fn enrich_tracked(&self, rows: &[ChartRow], report: &mut FileReport) -> Vec<EnrichedRow> {
        let ids = unique_track_ids(rows);
        let pending: Vec<String> = ids
            .iter()
            .filter(|id| !self.cache.contains_track(id) && !self.cache.is_not_found(id))
            .cloned()
            .collect();
        report.state = FileState::IdsExtracted;
        report.stats.rows = rows.len();
        report.stats.unique_ids = ids.len();
        report.stats.cache_hits = ids.len() - pending.len();

        info!(
            "Fetching catalog data for {} of {} tracks",
            pending.len(),
            ids.len()
        );

        report.state = FileState::Fetching;
        report.stats.fetched = self.resolve(&pending).await;

        report.state = FileState::Merging;
        let metadata: HashMap<&str, TrackMetadata> = ids
            .iter()
            .filter_map(|id| self.cache.track(id).map(|track| (id.as_str(), track)))
            .collect();
        report.stats.resolved = metadata.len();

        rows.iter()
            .map(|row| EnrichedRow::join(row, metadata.get(row.track_id.as_str())))
            .collect()
    }

    /// Fetches and enriches `ids`, populating the cache. Returns how many
    /// raw records the catalog returned. Ids the catalog answered without a
    /// record are remembered; failed batches and malformed records are not.
    async fn resolve(&self, ids: &[String]) -> usize {
        if ids.is_empty() {
            return 0;
        }

        let mut scheduler = BatchScheduler::new(self.client.clone(), self.concurrency);
        let bar = self.multi.as_ref().map(|multi| multi.add(ProgressBar::new(0)));
        if let Some(bar) = &bar {
            scheduler = scheduler.with_progress(bar.clone());
        }

        let answers = scheduler.fetch_all(ids).await;

        if let (Some(multi), Some(bar)) = (&self.multi, &bar) {
            multi.remove(bar);
        }

        let mut raw = HashMap::with_capacity(answers.len());
        for (id, record) in answers {
            match record {
                Some(record) => {
                    raw.insert(id, record);
                }
                None => self.cache.mark_not_found(&id),
            }
        }

        let enricher = TrackEnricher::new(self.cache.clone());
        let artists = CachedArtistLookup::new(self.cache.clone(), self.client.clone());
        let enriched: Vec<Option<TrackMetadata>> = stream::iter(ids)
            .map(|id| enricher.enrich(id, raw.get(id), &artists))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let missing = enriched.iter().filter(|track| track.is_none()).count();
        if missing > 0 {
            warn!("{} tracks could not be enriched", missing);
        }

        raw.len()
    }

    /// Mirrors `input`'s position under the input directory into the output
    /// directory; inputs from elsewhere keep their parent directory name.
    pub fn output_path_for(&self, input: &Path) -> PathBuf {
        if let Ok(relative) = input.strip_prefix(&self.input_dir) {
            return self.output_dir.join(relative);
        }

        let mut output = self.output_dir.clone();
        if let Some(parent) = input.parent().and_then(Path::file_name) {
            output.push(parent);
        }
        if let Some(name) = input.file_name() {
            output.push(name);
        }
        output
    }
}

/// Unique ids in order of first appearance.
fn unique_track_ids(rows: &[ChartRow]) -> Vec<String> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter(|row| seen.insert(row.track_id.as_str()))
        .map(|row| row.track_id.clone())
        .collect()
}

/// Reads a chart file. Missing required columns fail the whole file;
/// individual unparsable rows are logged and dropped.
pub async fn read_chart_rows(path: &Path) -> Result<Vec<ChartRow>, EnrichError> {
    let data = tokio::fs::read(path).await.map_err(|source| EnrichError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let mut reader = csv::Reader::from_reader(data.as_slice());
    let missing = missing_columns(reader.headers()?.iter());
    if !missing.is_empty() {
        return Err(EnrichError::MissingColumns(missing));
    }

    let mut rows = Vec::new();
    for (index, record) in reader.deserialize::<ChartRecord>().enumerate() {
        // +2: header line, and lines count from 1
        let line = index + 2;
        match record {
            Ok(record) => match record.into_row() {
                Some(row) => rows.push(row),
                None => warn!("{}:{}: row has no track identifier", path.display(), line),
            },
            Err(e) => warn!("{}:{}: skipping malformed row: {}", path.display(), line, e),
        }
    }

    Ok(rows)
}

fn write_enriched(rows: &[EnrichedRow]) -> Result<Vec<u8>, EnrichError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| EnrichError::Persistence {
            path: "<buffer>".to_string(),
            source: e.into_error(),
        })
}

/// Every `*.csv` file under `dir`, sorted.
pub fn discover_inputs(dir: &Path) -> Result<Vec<PathBuf>, EnrichError> {
    let mut files = Vec::new();
    collect_csv_files(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_csv_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), EnrichError> {
    let read_error = |source| EnrichError::Read {
        path: dir.display().to_string(),
        source,
    };

    for entry in dir.read_dir().map_err(read_error)? {
        let path = entry.map_err(read_error)?.path();
        if path.is_dir() {
            collect_csv_files(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")) {
            files.push(path);
        }
    }
    Ok(())
}
