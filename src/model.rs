//! Data types shared across the fetch and extraction pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One completed HTTP attempt.
///
/// Invariant: exactly one of {successful response fields populated, `error`
/// populated}. `body.len() <= content_buffer_size` and the serialized form
/// of `headers` is bounded by `header_buffer_size`; both caps are enforced
/// by the fetch worker, not by this type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchResult {
    pub created_at: DateTime<Utc>,
    pub url: String,
    /// Raw response body bytes as received on the wire (may be
    /// gzip-compressed), truncated to the worker's content buffer cap.
    pub body: Vec<u8>,
    /// Ordered `(name, value)` pairs; last value wins on a repeated name.
    /// Names are whatever casing `http::HeaderName` normalizes to (see
    /// DESIGN.md) — lookups elsewhere must still be treated as
    /// case-insensitive.
    pub headers: Vec<(String, String)>,
    /// Final HTTP status code after redirects; 0 if no response line was
    /// received.
    pub http_code: u16,
    /// Bytes downloaded as reported by the client (pre-truncation size).
    pub size: u64,
    /// Average bytes/sec over the request's lifetime.
    pub speed: f64,
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub redirects: u32,
    /// `None` on success, else a short tag of the form `(code)` or
    /// `(code - message)`.
    pub error: Option<String>,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Case-insensitive header lookup, honoring last-value-wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An ordered list of [`FetchResult`]s persisted as one serialized unit.
pub type Batch = Vec<FetchResult>;

/// Point-in-time counters published by the Stat Collector.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatSnapshot {
    pub submitted: u64,
    pub processed: u64,
    pub successes: u64,
    pub errors: u64,
    pub error_types: std::collections::HashMap<String, u64>,
}
