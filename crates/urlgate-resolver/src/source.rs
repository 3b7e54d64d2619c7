//! Pattern sources.
//!
//! The registry refreshes its pattern list from a [`PatternSource`]. The
//! production source is [`HttpPatternSource`], which reads a JSON array of
//! pattern records from an HTTP endpoint. [`StaticPatternSource`] serves a
//! fixed list (inline configuration, tests).

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;
use urlgate_core::PatternRecord;

use crate::error::{FetchError, FetchResult};

/// A provider of pattern records.
#[async_trait]
pub trait PatternSource: Send + Sync {
    /// Name of this source (for logging).
    fn name(&self) -> &str;

    /// Fetches the full list of pattern records.
    async fn fetch(&self) -> FetchResult<Vec<PatternRecord>>;
}

/// Parses a pattern source response body.
///
/// Accepts a bare array or an object with a `patterns` array. Individual
/// records that do not deserialize are skipped with a warning so that one bad
/// record does not discard the whole list.
///
/// # Errors
///
/// Returns [`FetchError::Parse`] if the body is not JSON or holds no array.
pub fn parse_records(body: &[u8]) -> FetchResult<Vec<PatternRecord>> {
    let value: Value = serde_json::from_slice(body).map_err(|e| FetchError::parse(e.to_string()))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("patterns") {
            Some(Value::Array(items)) => items,
            _ => return Err(FetchError::parse("expected an array of pattern records")),
        },
        _ => return Err(FetchError::parse("expected an array of pattern records")),
    };

    let total = items.len();
    let records: Vec<PatternRecord> = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(index, error = %e, "Skipping malformed pattern record");
                None
            }
        })
        .collect();

    debug!(total, accepted = records.len(), "Parsed pattern records");
    Ok(records)
}

// =============================================================================
// HTTP Source
// =============================================================================

/// Fetches pattern records from an HTTP endpoint.
pub struct HttpPatternSource {
    client: reqwest::Client,
    url: Url,
    timeout: Duration,
}

impl HttpPatternSource {
    /// Creates a source for `url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the HTTP client cannot be built.
    pub fn new(url: Url, timeout: Duration) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Client {
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    /// Endpoint this source reads from.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    fn request_error(&self, e: &reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                after: self.timeout,
            }
        } else {
            FetchError::network(e.to_string())
        }
    }
}

#[async_trait]
impl PatternSource for HttpPatternSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self) -> FetchResult<Vec<PatternRecord>> {
        debug!(url = %self.url, "Fetching pattern records");

        let response = self
            .client
            .get(self.url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.request_error(&e))?;
        parse_records(&body)
    }
}


// =============================================================================
// Static Source
// =============================================================================

/// Serves a fixed, replaceable list of pattern records.
#[derive(Debug, Default)]
pub struct StaticPatternSource {
    records: RwLock<Vec<PatternRecord>>,
}

impl StaticPatternSource {
    /// Creates a source serving `records`.
    #[must_use]
    pub fn new(records: Vec<PatternRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Replaces the served records. Takes effect on the next fetch.
    pub fn replace(&self, records: Vec<PatternRecord>) {
        match self.records.write() {
            Ok(mut current) => *current = records,
            Err(poisoned) => *poisoned.into_inner() = records,
        }
    }
}

#[async_trait]
impl PatternSource for StaticPatternSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> FetchResult<Vec<PatternRecord>> {
        let records = match self.records.read() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        Ok(records)
    }
}
