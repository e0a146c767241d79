use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::{Credential, Record, SearchQuery};
use crate::error::HarvestError;
use crate::retry::{RetryingFetcher, Sleeper, redact};
use crate::transport::Transport;

pub const DEFAULT_CATALOG_URL: &str = "https://xeno-canto.org/api/3/recordings";

#[derive(Debug, Deserialize)]
struct CatalogPage {
    #[serde(default)]
    recordings: Vec<Value>,
    #[serde(rename = "numPages", default, deserialize_with = "lenient_count")]
    num_pages: Option<u64>,
    #[serde(rename = "numRecordings", default, deserialize_with = "lenient_count")]
    num_recordings: Option<u64>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(value)) => Ok(value.as_u64()),
        Some(Value::String(value)) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a count, got {other}"
        ))),
    }
}

/// Why pagination ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PaginationStop {
    Exhausted { pages: u32 },
    EmptyPage { page: u32 },
    CapReached { cap: usize },
    ApiError { page: u32, message: String },
    FetchFailed { page: u32, message: String },
    InvalidResponse { page: u32, message: String },
    Snapshot,
}

impl PaginationStop {
    /// True when the catalog was not fully walked because of a failure.
    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            PaginationStop::ApiError { .. }
                | PaginationStop::FetchFailed { .. }
                | PaginationStop::InvalidResponse { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct RecordSet {
    pub records: Vec<Record>,
    pub pages_fetched: u32,
    pub declared_total: Option<u64>,
    pub stop: PaginationStop,
}

impl RecordSet {
    pub fn from_snapshot(records: Vec<Record>) -> Self {
        Self {
            records,
            pages_fetched: 0,
            declared_total: None,
            stop: PaginationStop::Snapshot,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Sorted, de-duplicated `"Genus species (Common)"` labels.
    pub fn species(&self) -> Vec<String> {
        self.records
            .iter()
            .filter_map(Record::species_label)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

pub struct Paginator<'a, T: Transport, S: Sleeper> {
    fetcher: &'a RetryingFetcher<T, S>,
    credential: &'a Credential,
    base_url: &'a str,
    page_delay: Duration,
}

impl<'a, T: Transport, S: Sleeper> Paginator<'a, T, S> {
    pub fn new(
        fetcher: &'a RetryingFetcher<T, S>,
        credential: &'a Credential,
        base_url: &'a str,
        page_delay: Duration,
    ) -> Self {
        Self {
            fetcher,
            credential,
            base_url,
            page_delay,
        }
    }

    pub fn retrieve(&self, query: &SearchQuery, cap: Option<usize>) -> RecordSet {
        let mut records: Vec<Record> = Vec::new();
        let mut pages_fetched = 0u32;
        let mut declared_total = None;

        if cap == Some(0) {
            return RecordSet {
                records,
                pages_fetched,
                declared_total,
                stop: PaginationStop::CapReached { cap: 0 },
            };
        }

        let query_text = query.to_string();
        let mut page = 1u32;
        let stop = loop {
            let url = page_url(self.base_url, &query_text, self.credential, page);
            info!(page, url = %redact(&url), "fetching catalog page");

            let reply = match self.fetcher.fetch(&url) {
                Ok(reply) => reply,
                Err(err) => {
                    warn!(page, error = %err, "failed to fetch catalog page");
                    break PaginationStop::FetchFailed {
                        page,
                        message: err.to_string(),
                    };
                }
            };

            let parsed: CatalogPage = match serde_json::from_slice(&reply.body) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(page, status = reply.status, error = %err, "unreadable catalog page");
                    break PaginationStop::InvalidResponse {
                        page,
                        message: format!("status {}: {err}", reply.status),
                    };
                }
            };

            if let Some(error) = parsed.error {
                let message = parsed.message.unwrap_or_else(|| match error {
                    Value::String(text) => text,
                    other => other.to_string(),
                });
                warn!(page, %message, "catalog reported an error");
                break PaginationStop::ApiError { page, message };
            }

            if parsed.recordings.is_empty() {
                if page == 1 {
                    info!("no recordings found for this query");
                }
                break PaginationStop::EmptyPage { page };
            }

            let num_pages = parsed.num_pages.unwrap_or(1);
            if parsed.num_recordings.is_some() {
                declared_total = parsed.num_recordings;
            }
            let received = parsed.recordings.len();
            let mut skipped = 0usize;
            for (index, entry) in parsed.recordings.into_iter().enumerate() {
                match parse_record(entry) {
                    Ok(record) => records.push(record),
                    Err(err) => {
                        warn!(page, index, error = %err, "skipping malformed recording");
                        skipped += 1;
                    }
                }
            }
            pages_fetched = page;
            info!(
                page,
                num_pages,
                received,
                skipped,
                total = declared_total.unwrap_or(0),
                "catalog page received"
            );

            if let Some(cap) = cap {
                if records.len() >= cap {
                    records.truncate(cap);
                    info!(cap, "reached maximum number of recordings");
                    break PaginationStop::CapReached { cap };
                }
            }

            if u64::from(page) >= num_pages {
                break PaginationStop::Exhausted { pages: page };
            }
            page += 1;
            self.fetcher.sleeper().sleep(self.page_delay);
        };

        RecordSet {
            records,
            pages_fetched,
            declared_total,
            stop,
        }
    }
}

fn parse_record(entry: Value) -> Result<Record, HarvestError> {
    serde_json::from_value(entry).map_err(|err| HarvestError::Catalog(err.to_string()))
}

pub fn page_url(base_url: &str, query: &str, credential: &Credential, page: u32) -> String {
    let page = page.to_string();
    build_query_url(
        base_url,
        &[
            ("query", query),
            ("key", credential.as_str()),
            ("page", page.as_str()),
        ],
    )
}

fn encode_url_component(value: &str) -> String {
    let mut out = String::new();
    for byte in value.as_bytes() {
        let ch = *byte as char;
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' || ch == '~' {
            out.push(ch);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn build_query_url(base: &str, params: &[(&str, &str)]) -> String {
    let mut out = String::from(base);
    out.push(if base.contains('?') { '&' } else { '?' });
    for (idx, (key, value)) in params.iter().enumerate() {
        if idx > 0 {
            out.push('&');
        }
        out.push_str(&encode_url_component(key));
        out.push('=');
        out.push_str(&encode_url_component(value));
    }
    out
}
