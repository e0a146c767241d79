use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("Xeno-canto API key not configured (set XENO_CANTO_API_KEY)")]
    #[diagnostic(help("get a free key at https://xeno-canto.org/account"))]
    MissingCredential,

    #[error("invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("request to {url} failed after {attempts} attempts: {message}")]
    Transport {
        url: String,
        attempts: usize,
        message: String,
    },

    #[error("{url} returned status {status}")]
    HttpStatus { status: u16, url: String },

    #[error("unexpected catalog response: {0}")]
    Catalog(String),

    #[error("record has no identifier")]
    MissingIdentifier,

    #[error("record identifier {0:?} is not usable as a file name")]
    InvalidIdentifier(String),

    #[error("record {0} has no asset reference")]
    MissingAssetReference(String),

    #[error("metadata snapshot not found at {0}")]
    MetadataNotFound(PathBuf),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
