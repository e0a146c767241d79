use std::iter::Enumerate;
use std::slice;
use std::sync::{Mutex, mpsc};
use std::thread;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{Record, asset_file_name, is_usable_id, normalize_asset_url};
use crate::error::HarvestError;
use crate::retry::{RetryingFetcher, Sleeper};
use crate::store::{ensure_dir, write_bytes_atomic};
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadStatus {
    Fetched { path: Utf8PathBuf },
    AlreadyPresent { path: Utf8PathBuf },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadOutcome {
    pub id: String,
    #[serde(flatten)]
    pub status: DownloadStatus,
}

impl DownloadOutcome {
    fn failed(id: &str, err: HarvestError) -> Self {
        Self {
            id: id.to_string(),
            status: DownloadStatus::Failed {
                reason: err.to_string(),
            },
        }
    }

    /// Local file backing this record, if the download succeeded.
    pub fn path(&self) -> Option<&Utf8Path> {
        match &self.status {
            DownloadStatus::Fetched { path } | DownloadStatus::AlreadyPresent { path } => {
                Some(path)
            }
            DownloadStatus::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadReport {
    /// Records with a resolved local file, fresh or already present.
    pub downloaded: usize,
    pub fetched: usize,
    pub already_present: usize,
    pub failed: usize,
    /// One entry per input record, in input order.
    pub outcomes: Vec<DownloadOutcome>,
}

impl DownloadReport {
    pub fn from_outcomes(outcomes: Vec<DownloadOutcome>) -> Self {
        let mut report = Self::default();
        for outcome in &outcomes {
            match outcome.status {
                DownloadStatus::Fetched { .. } => {
                    report.downloaded += 1;
                    report.fetched += 1;
                }
                DownloadStatus::AlreadyPresent { .. } => {
                    report.downloaded += 1;
                    report.already_present += 1;
                }
                DownloadStatus::Failed { .. } => report.failed += 1,
            }
        }
        report.outcomes = outcomes;
        report
    }
}

type JobQueue<'r> = Mutex<Enumerate<slice::Iter<'r, Record>>>;

pub struct DownloadCoordinator<'a, T: Transport, S: Sleeper> {
    fetcher: &'a RetryingFetcher<T, S>,
}

impl<'a, T: Transport, S: Sleeper> DownloadCoordinator<'a, T, S> {
    pub fn new(fetcher: &'a RetryingFetcher<T, S>) -> Self {
        Self { fetcher }
    }

    /// Downloads every record's asset into `dest_dir` with at most
    /// `concurrency` transfers in flight. The pool drains the whole batch.
    pub fn download_all(
        &self,
        records: &[Record],
        dest_dir: &Utf8Path,
        concurrency: usize,
    ) -> Result<DownloadReport, HarvestError> {
        ensure_dir(dest_dir)?;
        let total = records.len();
        if total == 0 {
            return Ok(DownloadReport::default());
        }
        let workers = concurrency.max(1).min(total);
        info!(total, workers, dest = %dest_dir, "downloading recordings");

        let queue: JobQueue<'_> = Mutex::new(records.iter().enumerate());
        let (result_tx, result_rx) = mpsc::channel::<(usize, DownloadOutcome)>();
        let mut slots: Vec<Option<DownloadOutcome>> = vec![None; total];

        thread::scope(|scope| {
            for _ in 0..workers {
                let result_tx = result_tx.clone();
                let queue = &queue;
                scope.spawn(move || {
                    while let Some((index, record)) = next_job(queue) {
                        let outcome = self.download_one(record, dest_dir);
                        if result_tx.send((index, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            for (completed, (index, outcome)) in result_rx.iter().enumerate() {
                slots[index] = Some(outcome);
                let completed = completed + 1;
                if completed % 10 == 0 || completed == total {
                    info!(completed, total, "download progress");
                }
            }
        });

        let report = DownloadReport::from_outcomes(slots.into_iter().flatten().collect());
        info!(
            downloaded = report.downloaded,
            fetched = report.fetched,
            already_present = report.already_present,
            failed = report.failed,
            "download complete"
        );
        Ok(report)
    }

    fn download_one(&self, record: &Record, dest_dir: &Utf8Path) -> DownloadOutcome {
        let id = record.id.as_str();
        if id.trim().is_empty() {
            return DownloadOutcome::failed(id, HarvestError::MissingIdentifier);
        }
        if !is_usable_id(id) {
            return DownloadOutcome::failed(id, HarvestError::InvalidIdentifier(id.to_string()));
        }
        let Some(url) = normalize_asset_url(&record.asset_url) else {
            return DownloadOutcome::failed(
                id,
                HarvestError::MissingAssetReference(id.to_string()),
            );
        };

        let path = dest_dir.join(asset_file_name(id, record.asset_format()));
        if path.as_std_path().exists() {
            debug!(id, path = %path, "already downloaded");
            return DownloadOutcome {
                id: id.to_string(),
                status: DownloadStatus::AlreadyPresent { path },
            };
        }

        match self.fetch_to(&url, &path) {
            Ok(()) => DownloadOutcome {
                id: id.to_string(),
                status: DownloadStatus::Fetched { path },
            },
            Err(err) => {
                warn!(id, error = %err, "error downloading recording");
                DownloadOutcome::failed(id, err)
            }
        }
    }

    fn fetch_to(&self, url: &str, path: &Utf8Path) -> Result<(), HarvestError> {
        let reply = self.fetcher.fetch(url)?;
        if !reply.is_success() {
            return Err(HarvestError::HttpStatus {
                status: reply.status,
                url: url.to_string(),
            });
        }
        write_bytes_atomic(path, &reply.body)
    }
}

fn next_job<'r>(queue: &JobQueue<'r>) -> Option<(usize, &'r Record)> {
    queue.lock().ok()?.next()
}
