use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use thiserror::Error;

use crate::error::HarvestError;

/// Body and status of a completed request.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("server returned retryable status {0}")]
    RetryableStatus(u16),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::InvalidRequest(_))
    }
}

/// A single GET attempt. Implementations must not retry on their own.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<Reply, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, url: &str) -> Result<Reply, TransportError> {
        (**self).get(url)
    }
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("xeno-harvest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| HarvestError::Http(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, */*"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| HarvestError::Http(err.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Reply, TransportError> {
        let mut response = self.client.get(url).send().map_err(classify)?;
        let status = response.status().as_u16();
        if is_retryable_status(status) {
            return Err(TransportError::RetryableStatus(status));
        }
        let mut body = Vec::new();
        response
            .read_to_end(&mut body)
            .map_err(|err| TransportError::Protocol(err.to_string()))?;
        Ok(Reply { status, body })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Protocol(err.to_string())
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}
