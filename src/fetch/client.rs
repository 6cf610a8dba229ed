//! Per-request HTTP client construction and error classification.
//!
//! Each slot gets its own short-lived [`reqwest::Client`] built from a
//! shared [`ClientTemplate`]. This is the Rust stand-in for the original's
//! `FRESH_CONNECT` / `FORBID_REUSE` / `DNS_CACHE_TIMEOUT=0` curl options: a
//! fresh client means a cold connection pool and a cold resolver cache,
//! and it is also the only way to recover a redirect count per request,
//! since `reqwest::redirect::Policy` is installed once per `Client`, not
//! per request (see DESIGN.md).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{redirect, Client};

use super::resolver::AresResolver;

const ACCEPT_HEADER: &str = "text/html,application/xhtml+xml,application/xml";
const MAX_REDIRECTS: usize = 20;

#[derive(Clone)]
pub struct ClientTemplate {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub useragent: Option<String>,
    pub resolver: Option<Arc<AresResolver>>,
}

impl ClientTemplate {
    /// Builds a fresh client plus a shared counter that a custom redirect
    /// policy fills in with the number of hops actually followed.
    pub fn build_slot_client(&self) -> (Client, Arc<AtomicU32>) {
        let redirects = Arc::new(AtomicU32::new(0));
        let counter = redirects.clone();

        let policy = redirect::Policy::custom(move |attempt| {
            let hops = attempt.previous().len();
            counter.store(hops as u32, Ordering::Relaxed);
            if hops >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else {
                attempt.follow()
            }
        });

        // The "gzip" cargo feature is deliberately left off reqwest: we
        // want the still-compressed wire bytes, not transparent decoding
        // (decompression happens later, in extraction).
        let mut builder = Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .redirect(policy)
            .pool_max_idle_per_host(0); // no reuse: forbid_reuse equivalent

        if let Some(ua) = &self.useragent {
            builder = builder.user_agent(ua.clone());
        }
        if let Some(resolver) = &self.resolver {
            builder = builder.dns_resolver(resolver.clone());
        }

        let client = builder
            .build()
            .expect("reqwest client config is always valid here");

        (client, redirects)
    }

    pub fn accept_header() -> &'static str {
        ACCEPT_HEADER
    }
}

/// Maps a `reqwest::Error` to the `(tag)` / `(tag - message)` shape stored
/// in `FetchResult.error`.
pub fn classify_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        return "(timeout)".to_string();
    }
    if err.is_connect() {
        return format!("(connect - {err})");
    }
    if err.is_redirect() {
        return "(redirect - too many redirects)".to_string();
    }
    if let Some(status) = err.status() {
        return format!("(http - {status})");
    }
    if err.is_decode() {
        return format!("(decode - {err})");
    }
    if err.is_request() {
        return format!("(request - {err})");
    }
    format!("(error - {err})")
}
