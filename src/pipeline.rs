use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::info;

use crate::catalog::{PaginationStop, Paginator, RecordSet};
use crate::config::HarvestConfig;
use crate::download::{DownloadCoordinator, DownloadReport};
use crate::error::HarvestError;
use crate::organize::{Categorizer, OrganizeReport};
use crate::retry::{RetryingFetcher, Sleeper, ThreadSleeper};
use crate::store::{read_metadata, write_metadata};
use crate::transport::{HttpTransport, Transport};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct HarvestSummary {
    pub query: String,
    pub records: usize,
    pub declared_total: Option<u64>,
    pub stop: PaginationStop,
    pub species: Vec<String>,
    pub metadata_path: Option<Utf8PathBuf>,
    pub raw_dir: Utf8PathBuf,
    pub organized_dir: Utf8PathBuf,
    pub downloads: DownloadReport,
    pub organized: OrganizeReport,
    pub finished_at: String,
}

/// Runs the retrieve → snapshot → download → organize pipeline.
pub struct Harvester<T: Transport, S: Sleeper> {
    config: HarvestConfig,
    fetcher: RetryingFetcher<T, S>,
}

impl Harvester<HttpTransport, ThreadSleeper> {
    pub fn from_config(config: HarvestConfig) -> Result<Self, HarvestError> {
        let transport = HttpTransport::new(config.request_timeout)?;
        Ok(Self::new(config, transport, ThreadSleeper))
    }
}

impl<T: Transport, S: Sleeper> Harvester<T, S> {
    pub fn new(config: HarvestConfig, transport: T, sleeper: S) -> Self {
        let fetcher = RetryingFetcher::new(transport, sleeper, config.retry);
        Self { config, fetcher }
    }

    pub fn run(&self, sink: &dyn ProgressSink) -> Result<HarvestSummary, HarvestError> {
        let credential = self
            .config
            .credential
            .as_ref()
            .ok_or(HarvestError::MissingCredential)?;

        sink.event(ProgressEvent {
            message: format!("phase=Retrieve; query {}", self.config.query),
            elapsed: None,
        });
        let start = Instant::now();
        let paginator = Paginator::new(
            &self.fetcher,
            credential,
            &self.config.catalog_url,
            self.config.page_delay,
        );
        let record_set = paginator.retrieve(&self.config.query, self.config.max_recordings);
        sink.event(ProgressEvent {
            message: format!("catalog.response records={}", record_set.len()),
            elapsed: Some(start.elapsed()),
        });

        if record_set.is_empty() {
            info!(stop = ?record_set.stop, "no recordings found for the specified region");
            return Ok(self.summary(&record_set, None, Default::default(), Default::default()));
        }

        let species = record_set.species();
        info!(
            records = record_set.len(),
            unique_species = species.len(),
            "metadata retrieved"
        );

        self.config.layout.ensure_raw_dir()?;
        let metadata_path = self.config.layout.metadata_path();
        write_metadata(&metadata_path, &record_set.records)?;
        sink.event(ProgressEvent {
            message: format!("phase=Store; metadata saved to {metadata_path}"),
            elapsed: None,
        });

        self.download_and_organize(record_set, Some(metadata_path), sink)
    }

    /// Re-runs download and organize from the saved metadata snapshot without
    /// querying the catalog.
    pub fn resume(&self, sink: &dyn ProgressSink) -> Result<HarvestSummary, HarvestError> {
        let record_set = self.load_snapshot(sink)?;
        let metadata_path = self.config.layout.metadata_path();
        self.download_and_organize(record_set, Some(metadata_path), sink)
    }

    /// Files whatever is already in the raw directory, matching records to
    /// files by name. No network access.
    pub fn organize_only(&self, sink: &dyn ProgressSink) -> Result<HarvestSummary, HarvestError> {
        let record_set = self.load_snapshot(sink)?;
        sink.event(ProgressEvent {
            message: "phase=Organize; organizing by species".to_string(),
            elapsed: None,
        });
        let organized = Categorizer::new(self.config.layout.organized_dir())
            .organize(&record_set.records, self.config.layout.raw_dir())?;
        let metadata_path = self.config.layout.metadata_path();
        Ok(self.summary(
            &record_set,
            Some(metadata_path),
            DownloadReport::default(),
            organized,
        ))
    }

    fn load_snapshot(&self, sink: &dyn ProgressSink) -> Result<RecordSet, HarvestError> {
        let metadata_path = self.config.layout.metadata_path();
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; loading {metadata_path}"),
            elapsed: None,
        });
        let records = read_metadata(&metadata_path)?;
        info!(records = records.len(), path = %metadata_path, "loaded metadata snapshot");
        Ok(RecordSet::from_snapshot(records))
    }

    fn download_and_organize(
        &self,
        record_set: RecordSet,
        metadata_path: Option<Utf8PathBuf>,
        sink: &dyn ProgressSink,
    ) -> Result<HarvestSummary, HarvestError> {
        sink.event(ProgressEvent {
            message: format!(
                "phase=Download; {} recordings with {} workers",
                record_set.len(),
                self.config.workers
            ),
            elapsed: None,
        });
        let start = Instant::now();
        let downloads = DownloadCoordinator::new(&self.fetcher).download_all(
            &record_set.records,
            self.config.layout.raw_dir(),
            self.config.workers,
        )?;
        sink.event(ProgressEvent {
            message: format!(
                "download.done downloaded={} failed={}",
                downloads.downloaded, downloads.failed
            ),
            elapsed: Some(start.elapsed()),
        });

        sink.event(ProgressEvent {
            message: "phase=Organize; organizing by species".to_string(),
            elapsed: None,
        });
        let organized = Categorizer::new(self.config.layout.organized_dir())
            .organize_downloads(&record_set.records, &downloads)?;

        Ok(self.summary(&record_set, metadata_path, downloads, organized))
    }

    fn summary(
        &self,
        record_set: &RecordSet,
        metadata_path: Option<Utf8PathBuf>,
        downloads: DownloadReport,
        organized: OrganizeReport,
    ) -> HarvestSummary {
        HarvestSummary {
            query: self.config.query.to_string(),
            records: record_set.len(),
            declared_total: record_set.declared_total,
            stop: record_set.stop.clone(),
            species: record_set.species(),
            metadata_path,
            raw_dir: self.config.layout.raw_dir().to_path_buf(),
            organized_dir: self.config.layout.organized_dir().to_path_buf(),
            downloads,
            organized,
            finished_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
