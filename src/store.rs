use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::domain::Record;
use crate::error::HarvestError;

pub const METADATA_FILE: &str = "metadata.json";

/// Raw download directory plus the species-organized tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    raw_dir: Utf8PathBuf,
    organized_dir: Utf8PathBuf,
}

impl Layout {
    pub fn new(raw_dir: Utf8PathBuf, organized_dir: Utf8PathBuf) -> Self {
        Self {
            raw_dir,
            organized_dir,
        }
    }

    pub fn raw_dir(&self) -> &Utf8Path {
        &self.raw_dir
    }

    pub fn organized_dir(&self) -> &Utf8Path {
        &self.organized_dir
    }

    pub fn metadata_path(&self) -> Utf8PathBuf {
        self.raw_dir.join(METADATA_FILE)
    }

    pub fn ensure_raw_dir(&self) -> Result<(), HarvestError> {
        ensure_dir(&self.raw_dir)
    }
}

pub fn ensure_dir(path: &Utf8Path) -> Result<(), HarvestError> {
    fs::create_dir_all(path.as_std_path())
        .map_err(|err| HarvestError::Filesystem(format!("create {path}: {err}")))
}

/// Persists the record set verbatim as a pretty-printed JSON array.
pub fn write_metadata(path: &Utf8Path, records: &[Record]) -> Result<(), HarvestError> {
    let content = serde_json::to_vec_pretty(records)
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    write_bytes_atomic(path, &content)
}

pub fn read_metadata(path: &Utf8Path) -> Result<Vec<Record>, HarvestError> {
    if !path.as_std_path().exists() {
        return Err(HarvestError::MetadataNotFound(path.as_std_path().to_path_buf()));
    }
    let content = fs::read(path.as_std_path())
        .map_err(|err| HarvestError::Filesystem(format!("read {path}: {err}")))?;
    serde_json::from_slice(&content)
        .map_err(|err| HarvestError::Filesystem(format!("parse {path}: {err}")))
}

/// Writes through a temp file in the destination directory, so `path` either
/// holds the complete content or does not exist.
pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), HarvestError> {
    let parent = path
        .parent()
        .ok_or_else(|| HarvestError::Filesystem(format!("invalid destination path {path}")))?;
    ensure_dir(parent)?;
    let mut temp = Builder::new()
        .prefix(".xeno-harvest")
        .suffix(".part")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), HarvestError> {
    let parent = dest
        .parent()
        .ok_or_else(|| HarvestError::Filesystem(format!("invalid destination path {dest}")))?;
    ensure_dir(parent)?;
    let temp = Builder::new()
        .prefix(".xeno-harvest")
        .suffix(".part")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    fs::copy(source.as_std_path(), temp.path())
        .map_err(|err| HarvestError::Filesystem(format!("copy {source}: {err}")))?;
    temp.persist(dest.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    Ok(())
}
