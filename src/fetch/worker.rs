//! Fetch Worker: owns a bounded set of in-flight request slots and
//! drains a fixed URL batch to completion.

use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, USER_AGENT};

use crate::model::FetchResult;

use super::client::{classify_error, ClientTemplate};

/// Unexpected exception escaping a worker's event loop.
#[derive(Debug, Clone)]
pub struct WorkerFatal(pub String);

impl std::fmt::Display for WorkerFatal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker fatal: {}", self.0)
    }
}

impl std::error::Error for WorkerFatal {}

#[derive(Clone)]
pub struct SlotLimits {
    pub content_buffer_size: usize,
    pub header_buffer_size: usize,
}

#[async_trait]
pub trait FetchWorker {
    async fn run(self: Box<Self>) -> Result<Vec<FetchResult>, WorkerFatal>;
}

/// One in-flight request: does the GET, captures a truncated body/header
/// buffer, and synthesizes a [`FetchResult`] on completion or error.
async fn perform_one(url: String, template: ClientTemplate, limits: SlotLimits) -> FetchResult {
    let (client, redirect_counter) = template.build_slot_client();
    let started = Instant::now();

    let send_result = client
        .get(&url)
        .header(ACCEPT, ClientTemplate::accept_header())
        .header(ACCEPT_ENCODING, "gzip")
        .send()
        .await;

    let resp = match send_result {
        Ok(resp) => resp,
        Err(err) => {
            return FetchResult {
                created_at: chrono::Utc::now(),
                url,
                body: Vec::new(),
                headers: Vec::new(),
                http_code: 0,
                size: 0,
                speed: 0.0,
                ip: None,
                port: None,
                redirects: redirect_counter.load(Ordering::Relaxed),
                error: Some(classify_error(&err)),
            };
        }
    };

    let http_code = resp.status().as_u16();
    let remote = resp.remote_addr();
    let headers = capture_headers(resp.headers(), limits.header_buffer_size);

    let (body, downloaded, body_err) = capture_body(resp, limits.content_buffer_size).await;
    let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);

    if let Some(err) = body_err {
        return FetchResult {
            created_at: chrono::Utc::now(),
            url,
            body: Vec::new(),
            headers: Vec::new(),
            http_code: 0,
            size: 0,
            speed: 0.0,
            ip: None,
            port: None,
            redirects: redirect_counter.load(Ordering::Relaxed),
            error: Some(err),
        };
    }

    FetchResult {
        created_at: chrono::Utc::now(),
        url,
        body,
        headers,
        http_code,
        size: downloaded,
        speed: downloaded as f64 / elapsed,
        ip: remote.map(|a| a.ip().to_string()),
        port: remote.map(|a| a.port()),
        redirects: redirect_counter.load(Ordering::Relaxed),
        error: None,
    }
}

/// Reconstructs a capped, ordered header list with last-value-wins
/// semantics from `reqwest`'s already-parsed `HeaderMap`.
fn capture_headers(headers: &reqwest::header::HeaderMap, cap: usize) -> Vec<(String, String)> {
    let mut raw_len = 0usize;
    let mut ordered: Vec<(String, String)> = Vec::new();
    for (name, value) in headers.iter() {
        let value_str = value.to_str().unwrap_or("");
        let line_len = name.as_str().len() + 2 + value_str.len() + 2;
        if raw_len + line_len > cap {
            break;
        }
        raw_len += line_len;

        let key = name.as_str().to_string();
        if let Some(existing) = ordered.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&key)) {
            existing.1 = value_str.to_string();
        } else {
            ordered.push((key, value_str.to_string()));
        }
    }
    ordered
}

/// Streams the body, keeping bytes up to `cap` and counting the full
/// download size even past the cap ("truncate, not fail").
async fn capture_body(resp: reqwest::Response, cap: usize) -> (Vec<u8>, u64, Option<String>) {
    let mut body = Vec::new();
    let mut downloaded: u64 = 0;
    let mut stream = resp.bytes_stream();

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                downloaded += bytes.len() as u64;
                if body.len() < cap {
                    let remaining = cap - body.len();
                    let take = remaining.min(bytes.len());
                    body.extend_from_slice(&bytes[..take]);
                }
            }
            Err(err) => return (Vec::new(), 0, Some(classify_error(&err))),
        }
    }
    (body, downloaded, None)
}

type SlotFuture = Pin<Box<dyn std::future::Future<Output = FetchResult> + Send>>;

fn spawn_slot(url: String, template: &ClientTemplate, limits: &SlotLimits) -> SlotFuture {
    Box::pin(perform_one(url, template.clone(), limits.clone()))
}

/// The `pycurl`-equivalent backend: a curl-multi-style event loop
/// multiplexing up to `max_handles` concurrent requests over a single
/// task.
pub struct MultiplexedWorker {
    pub urls: Vec<String>,
    pub template: ClientTemplate,
    pub limits: SlotLimits,
    pub max_handles: usize,
    pub read_interval: Duration,
    pub lastfill_waittime: Duration,
}

#[async_trait]
impl FetchWorker for MultiplexedWorker {
    async fn run(self: Box<Self>) -> Result<Vec<FetchResult>, WorkerFatal> {
        let Self {
            urls,
            template,
            limits,
            max_handles,
            read_interval,
            lastfill_waittime,
        } = *self;

        if max_handles == 0 {
            return Err(WorkerFatal("max_handles must be >= 1".to_string()));
        }

        let mut idx = 0usize;
        let mut in_flight: FuturesUnordered<SlotFuture> = FuturesUnordered::new();
        let mut results = Vec::with_capacity(urls.len());

        let fill = |idx: &mut usize, in_flight: &mut FuturesUnordered<SlotFuture>, free: usize| {
            let end = (*idx + free).min(urls.len());
            for url in &urls[*idx..end] {
                in_flight.push(spawn_slot(url.clone(), &template, &limits));
            }
            *idx = end;
            *idx >= urls.len()
        };

        let mut still_running = !fill(&mut idx, &mut in_flight, max_handles);
        let mut last_fill = Instant::now();
        let mut last_read = Instant::now();

        while still_running || !in_flight.is_empty() {
            let delta = last_read.elapsed();
            if delta > read_interval {
                last_read = Instant::now();
            } else {
                tokio::time::sleep(read_interval - delta).await;
                last_read = Instant::now();
            }

            loop {
                match in_flight.next().now_or_never() {
                    Some(Some(result)) => results.push(result),
                    _ => break,
                }
            }

            let now = Instant::now();
            let free = max_handles.saturating_sub(in_flight.len());
            let free_threshold = (max_handles as f64 * 0.1).ceil() as usize;
            if free >= free_threshold && now.duration_since(last_fill) > lastfill_waittime {
                let exhausted = fill(&mut idx, &mut in_flight, free);
                still_running = !exhausted;
                last_fill = now;
            }
        }

        Ok(results)
    }
}

/// The `requests`-equivalent backend: one request at a time, grounded in
/// `engine_requests_processpool.py`'s `fetcher_main`. `max_handles` does
/// not apply to this backend.
pub struct SequentialWorker {
    pub urls: Vec<String>,
    pub template: ClientTemplate,
    pub limits: SlotLimits,
}

#[async_trait]
impl FetchWorker for SequentialWorker {
    async fn run(self: Box<Self>) -> Result<Vec<FetchResult>, WorkerFatal> {
        let mut results = Vec::with_capacity(self.urls.len());
        for url in self.urls {
            results.push(perform_one(url, self.template.clone(), self.limits.clone()).await);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn template(timeout_secs: u64) -> ClientTemplate {
        ClientTemplate {
            timeout: Duration::from_secs(timeout_secs),
            connect_timeout: Duration::from_secs(timeout_secs),
            useragent: None,
            resolver: None,
        }
    }

    fn limits(cap: usize) -> SlotLimits {
        SlotLimits {
            content_buffer_size: cap,
            header_buffer_size: cap,
        }
    }

    #[tokio::test]
    async fn successful_fetch_captures_status_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<title>Hello</title>")
                    .insert_header("Content-Type", "text/html"),
            )
            .mount(&server)
            .await;

        let result = perform_one(format!("{}/ok", server.uri()), template(5), limits(4096)).await;

        assert!(result.is_success());
        assert_eq!(result.http_code, 200);
        assert_eq!(result.body, b"<title>Hello</title>");
        assert_eq!(result.header("content-type"), Some("text/html"));
        assert_eq!(result.redirects, 0);
    }

    #[tokio::test]
    async fn body_is_truncated_to_content_buffer_cap_but_still_a_success() {
        let server = MockServer::start().await;
        let body = "x".repeat(100);
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
            .mount(&server)
            .await;

        let result = perform_one(format!("{}/big", server.uri()), template(5), limits(10)).await;

        assert!(result.is_success());
        assert_eq!(result.body.len(), 10);
        assert_eq!(result.body, body.as_bytes()[..10].to_vec());
        // size reports the full download, not the truncated capture.
        assert_eq!(result.size, 100);
    }

    #[tokio::test]
    async fn connect_failure_yields_error_tagged_result() {
        // Port 0 never accepts connections; this forces a connect-time failure
        // without depending on external network access.
        let result = perform_one(
            "http://127.0.0.1:0/unreachable".to_string(),
            template(2),
            limits(4096),
        )
        .await;

        assert!(!result.is_success());
        assert!(result.error.is_some());
        assert_eq!(result.http_code, 0);
        assert!(result.body.is_empty());
    }

    #[tokio::test]
    async fn repeated_header_keeps_last_value() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Tag", "first")
                    .append_header("X-Tag", "second"),
            )
            .mount(&server)
            .await;

        let result = perform_one(format!("{}/dup", server.uri()), template(5), limits(4096)).await;

        assert_eq!(result.header("x-tag"), Some("second"));
    }

    #[tokio::test]
    async fn multiplexed_worker_drains_every_url_in_a_small_batch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let urls: Vec<String> = (0..5).map(|i| format!("{}/{i}", server.uri())).collect();
        let worker = Box::new(MultiplexedWorker {
            urls: urls.clone(),
            template: template(5),
            limits: limits(4096),
            max_handles: 2,
            read_interval: Duration::from_millis(5),
            lastfill_waittime: Duration::from_millis(0),
        });

        let results = worker.run().await.unwrap();
        assert_eq!(results.len(), urls.len());
        assert!(results.iter().all(FetchResult::is_success));
    }

    #[tokio::test]
    async fn multiplexed_worker_rejects_zero_max_handles() {
        let worker = Box::new(MultiplexedWorker {
            urls: vec!["http://127.0.0.1:0/x".to_string()],
            template: template(1),
            limits: limits(4096),
            max_handles: 0,
            read_interval: Duration::from_millis(5),
            lastfill_waittime: Duration::from_millis(0),
        });

        let err = worker.run().await.unwrap_err();
        assert!(err.0.contains("max_handles"));
    }
}
