use std::collections::{BTreeMap, HashMap};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{AssetFormat, Category, Record, asset_file_name, is_usable_id};
use crate::download::DownloadReport;
use crate::error::HarvestError;
use crate::store::{copy_file_atomic, ensure_dir};

#[derive(Debug, Clone, Default, Serialize)]
pub struct OrganizeReport {
    /// Records with a copy in their category directory, new or pre-existing.
    pub organized: usize,
    pub copied: usize,
    pub already_present: usize,
    /// Records without a downloaded source file.
    pub missing: usize,
    pub failed: usize,
    pub per_category: BTreeMap<Category, usize>,
}

impl OrganizeReport {
    pub fn category_count(&self) -> usize {
        self.per_category.len()
    }

    /// Categories ordered by descending record count, then by name.
    pub fn ranked_categories(&self) -> Vec<(&Category, usize)> {
        let mut ranked = self
            .per_category
            .iter()
            .map(|(category, count)| (category, *count))
            .collect::<Vec<_>>();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }
}

enum Placement {
    Copied,
    AlreadyPresent,
}

/// Copies downloaded assets into one directory per species. Runs on a single
/// thread after the download batch has settled.
pub struct Categorizer {
    dest_root: Utf8PathBuf,
}

impl Categorizer {
    pub fn new(dest_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            dest_root: dest_root.into(),
        }
    }

    /// Locates each record's asset in `source_dir` by naming convention.
    pub fn organize(
        &self,
        records: &[Record],
        source_dir: &Utf8Path,
    ) -> Result<OrganizeReport, HarvestError> {
        self.organize_with(records, |record| locate_source(source_dir, &record.id))
    }

    /// Uses the exact paths resolved by the download phase.
    pub fn organize_downloads(
        &self,
        records: &[Record],
        downloads: &DownloadReport,
    ) -> Result<OrganizeReport, HarvestError> {
        let resolved: HashMap<&str, &Utf8Path> = downloads
            .outcomes
            .iter()
            .filter_map(|outcome| outcome.path().map(|path| (outcome.id.as_str(), path)))
            .collect();
        self.organize_with(records, |record| {
            resolved
                .get(record.id.as_str())
                .filter(|path| path.as_std_path().is_file())
                .map(|path| path.to_path_buf())
        })
    }

    fn organize_with<F>(
        &self,
        records: &[Record],
        mut source_of: F,
    ) -> Result<OrganizeReport, HarvestError>
    where
        F: FnMut(&Record) -> Option<Utf8PathBuf>,
    {
        ensure_dir(&self.dest_root)?;
        let mut report = OrganizeReport::default();

        for record in records {
            let category = record.category();
            let Some(source) = source_of(record) else {
                debug!(id = %record.id, "no downloaded file, skipping");
                report.missing += 1;
                continue;
            };
            match self.place(&source, &category) {
                Ok(placement) => {
                    match placement {
                        Placement::Copied => report.copied += 1,
                        Placement::AlreadyPresent => report.already_present += 1,
                    }
                    report.organized += 1;
                    *report.per_category.entry(category).or_insert(0) += 1;
                }
                Err(err) => {
                    warn!(id = %record.id, error = %err, "error organizing recording");
                    report.failed += 1;
                }
            }
        }

        info!(
            organized = report.organized,
            copied = report.copied,
            categories = report.category_count(),
            dest = %self.dest_root,
            "organized recordings by species"
        );
        Ok(report)
    }

    fn place(&self, source: &Utf8Path, category: &Category) -> Result<Placement, HarvestError> {
        let file_name = source
            .file_name()
            .ok_or_else(|| HarvestError::Filesystem(format!("no file name in {source}")))?;
        let category_dir = self.dest_root.join(category.as_str());
        ensure_dir(&category_dir)?;
        let dest = category_dir.join(file_name);
        if dest.as_std_path().exists() {
            return Ok(Placement::AlreadyPresent);
        }
        copy_file_atomic(source, &dest)?;
        Ok(Placement::Copied)
    }
}

/// First existing `<prefix><id>.<ext>` in `source_dir`, trying extensions in
/// priority order.
pub fn locate_source(source_dir: &Utf8Path, id: &str) -> Option<Utf8PathBuf> {
    if !is_usable_id(id) {
        return None;
    }
    AssetFormat::PRIORITY
        .into_iter()
        .map(|format| source_dir.join(asset_file_name(id, format)))
        .find(|path| path.as_std_path().is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_prefers_mp3_over_wav() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        std::fs::write(dir.join("XC7.wav").as_std_path(), b"w").unwrap();
        assert_eq!(locate_source(&dir, "7"), Some(dir.join("XC7.wav")));
        std::fs::write(dir.join("XC7.mp3").as_std_path(), b"m").unwrap();
        assert_eq!(locate_source(&dir, "7"), Some(dir.join("XC7.mp3")));
        assert_eq!(locate_source(&dir, "../7"), None);
    }
}
