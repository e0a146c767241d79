use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::catalog::DEFAULT_CATALOG_URL;
use crate::domain::{BoundingBox, Credential, SearchQuery};
use crate::error::HarvestError;
use crate::retry::RetryPolicy;
use crate::store::Layout;

pub const API_KEY_ENV: &str = "XENO_CANTO_API_KEY";
pub const DEFAULT_CONFIG_FILE: &str = "xeno-harvest.json";

pub const DEFAULT_COUNTRY: &str = "India";
/// Sundarbans / West Bengal: lat_min, lat_max, lon_min, lon_max.
pub const DEFAULT_BOX: &str = "21.5504,22.2017,88.2518,89.0905";
pub const DEFAULT_RAW_DIR: &str = "output/xeno_canto";
pub const DEFAULT_ORGANIZED_DIR: &str = "output/organized_audio";
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_MAX_RECORDINGS: usize = 100;
pub const DEFAULT_PAGE_DELAY_MS: u64 = 500;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// On-disk configuration (`xeno-harvest.json`). Every field is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default, rename = "box")]
    pub bbox: Option<String>,
    #[serde(default)]
    pub catalog_url: Option<String>,
    #[serde(default)]
    pub raw_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub organized_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub max_workers: Option<usize>,
    #[serde(default)]
    pub max_recordings: Option<usize>,
    #[serde(default)]
    pub no_limit: bool,
    #[serde(default)]
    pub page_delay_ms: Option<u64>,
    #[serde(default)]
    pub retry_attempts: Option<usize>,
    #[serde(default)]
    pub retry_base_ms: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Command-line overrides; `None` leaves the file or default value in place.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub country: Option<String>,
    pub bbox: Option<String>,
    pub raw_dir: Option<Utf8PathBuf>,
    pub organized_dir: Option<Utf8PathBuf>,
    pub max_workers: Option<usize>,
    pub max_recordings: Option<usize>,
    pub no_limit: bool,
}

/// Everything a harvest run needs, resolved up front and passed in explicitly.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub credential: Option<Credential>,
    pub query: SearchQuery,
    pub catalog_url: String,
    pub layout: Layout,
    pub workers: usize,
    pub max_recordings: Option<usize>,
    pub page_delay: Duration,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
}

impl HarvestConfig {
    pub fn new(query: SearchQuery, layout: Layout) -> Self {
        Self {
            credential: None,
            query,
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            layout,
            workers: DEFAULT_WORKERS,
            max_recordings: Some(DEFAULT_MAX_RECORDINGS),
            page_delay: Duration::from_millis(DEFAULT_PAGE_DELAY_MS),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the config file (explicit path, or `xeno-harvest.json` when it
    /// exists), applies overrides and picks up the API key from `env_key`.
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
        env_key: Option<String>,
    ) -> Result<HarvestConfig, HarvestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if path.is_some() || config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| HarvestError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content)
                .map_err(|err| HarvestError::ConfigParse(err.to_string()))?
        } else {
            Config::default()
        };

        Self::resolve_config(config, overrides, env_key)
    }

    pub fn resolve_config(
        config: Config,
        overrides: ConfigOverrides,
        env_key: Option<String>,
    ) -> Result<HarvestConfig, HarvestError> {
        let credential = env_key
            .into_iter()
            .chain(config.api_key)
            .find_map(|value| Credential::new(&value).ok());

        let country = overrides
            .country
            .or(config.country)
            .unwrap_or_else(|| DEFAULT_COUNTRY.to_string());
        if country.trim().is_empty() {
            return Err(HarvestError::InvalidConfig(
                "country must not be empty".to_string(),
            ));
        }
        let bbox: BoundingBox = overrides
            .bbox
            .or(config.bbox)
            .as_deref()
            .unwrap_or(DEFAULT_BOX)
            .parse()?;

        let workers = overrides
            .max_workers
            .or(config.max_workers)
            .unwrap_or(DEFAULT_WORKERS);
        if workers == 0 {
            return Err(HarvestError::InvalidConfig(
                "max_workers must be at least 1".to_string(),
            ));
        }

        let max_recordings = if overrides.no_limit || config.no_limit {
            None
        } else {
            let cap = overrides
                .max_recordings
                .or(config.max_recordings)
                .unwrap_or(DEFAULT_MAX_RECORDINGS);
            if cap == 0 {
                return Err(HarvestError::InvalidConfig(
                    "max_recordings must be at least 1 (use no_limit for all)".to_string(),
                ));
            }
            Some(cap)
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: config.retry_attempts.unwrap_or(defaults.max_attempts),
            base_delay: config
                .retry_base_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
        };
        if retry.max_attempts == 0 {
            return Err(HarvestError::InvalidConfig(
                "retry_attempts must be at least 1".to_string(),
            ));
        }

        let layout = Layout::new(
            overrides
                .raw_dir
                .or(config.raw_dir)
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_RAW_DIR)),
            overrides
                .organized_dir
                .or(config.organized_dir)
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_ORGANIZED_DIR)),
        );

        Ok(HarvestConfig {
            credential,
            query: SearchQuery {
                country: country.trim().to_string(),
                bbox,
            },
            catalog_url: config
                .catalog_url
                .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string()),
            layout,
            workers,
            max_recordings,
            page_delay: Duration::from_millis(
                config.page_delay_ms.unwrap_or(DEFAULT_PAGE_DELAY_MS),
            ),
            retry,
            request_timeout: Duration::from_secs(
                config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        })
    }
}
