#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use camino::Utf8PathBuf;
use serde_json::{Value, json};

use xeno_harvest::domain::Record;
use xeno_harvest::retry::Sleeper;
use xeno_harvest::transport::{Reply, Transport, TransportError};

pub const CATALOG_URL: &str = "https://catalog.test/api/3/recordings";

type Handler = Box<dyn Fn(&str) -> Result<Reply, TransportError> + Send + Sync>;

/// Transport answering from a closure and logging every requested URL.
pub struct MockTransport {
    handler: Handler,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Duration,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str) -> Result<Reply, TransportError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn catalog_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|url| url.starts_with(CATALOG_URL))
            .count()
    }

    pub fn asset_calls(&self) -> usize {
        self.calls().len() - self.catalog_calls()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn get(&self, url: &str) -> Result<Reply, TransportError> {
        self.calls.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        let result = (self.handler)(url);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

pub fn ok(body: impl Into<Vec<u8>>) -> Result<Reply, TransportError> {
    Ok(Reply {
        status: 200,
        body: body.into(),
    })
}

pub fn recording(id: u32, genus: &str, species: &str, common: &str) -> Value {
    json!({
        "id": id.to_string(),
        "gen": genus,
        "sp": species,
        "en": common,
        "cnt": "India",
        "file": format!("//xeno-canto.org/{id}/download"),
        "file-name": format!("XC{id}-{genus}-{species}.mp3"),
    })
}

pub fn record(id: u32, genus: &str, species: &str, common: &str) -> Record {
    serde_json::from_value(recording(id, genus, species, common)).unwrap()
}

/// `count` records with ids `first..first+count`, cycling over three species.
pub fn records(first: u32, count: u32) -> Vec<Record> {
    let species = [
        ("Halcyon", "smyrnensis", "White-throated Kingfisher"),
        ("Pycnonotus", "cafer", "Red-vented Bulbul"),
        ("Copsychus", "saularis", "Oriental Magpie-Robin"),
    ];
    (first..first + count)
        .map(|id| {
            let (genus, sp, en) = species[(id as usize) % species.len()];
            record(id, genus, sp, en)
        })
        .collect()
}

pub fn page_body(records: &[Record], num_pages: u32, total: usize) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "numRecordings": total.to_string(),
        "numSpecies": "3",
        "page": 1,
        "numPages": num_pages,
        "recordings": records,
    }))
    .unwrap()
}

pub fn page_of(url: &str) -> u32 {
    url.split('&')
        .find_map(|pair| pair.strip_prefix("page="))
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

/// Catalog serving `pages` pages of `per_page` records each, and asset bytes
/// `audio-<id>` for every download URL.
pub fn catalog_transport(pages: u32, per_page: u32) -> MockTransport {
    MockTransport::new(move |url| {
        if url.starts_with(CATALOG_URL) {
            let page = page_of(url);
            if page == 0 || page > pages {
                return ok(page_body(&[], pages, (pages * per_page) as usize));
            }
            let batch = records((page - 1) * per_page + 1, per_page);
            return ok(page_body(&batch, pages, (pages * per_page) as usize));
        }
        ok(asset_bytes(url))
    })
}

pub fn asset_bytes(url: &str) -> Vec<u8> {
    let id = url
        .trim_end_matches("/download")
        .rsplit('/')
        .next()
        .unwrap_or_default();
    format!("audio-{id}").into_bytes()
}

pub fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}
