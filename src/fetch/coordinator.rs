//! Fetch Coordinator: owns the worker pool, staggers spawn rate, drains
//! completed workers, and yields results downstream.
//!
//! "OS processes, not threads" in the original is a CPython-GIL-era
//! rationale; the Rust stand-in is one `tokio` task per worker on a
//! multi-threaded runtime, which gives true OS-thread-backed parallelism
//! and, via `JoinError` on panic, the same "fatal sentinel crosses a
//! process boundary" semantics (see DESIGN.md).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::cli::Backend;
use crate::config::CrawlConfig;
use crate::error::{CrawlError, Result};
use crate::fetch::client::ClientTemplate;
use crate::fetch::resolver::AresResolver;
use crate::fetch::worker::{FetchWorker, MultiplexedWorker, SequentialWorker, SlotLimits};
use crate::model::FetchResult;
use crate::stats::StatCollector;
use crate::url_source::UrlSource;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct FetchCoordinator {
    config: Arc<CrawlConfig>,
}

impl FetchCoordinator {
    pub fn new(config: Arc<CrawlConfig>) -> Self {
        Self { config }
    }

    /// Drives the scheduling loop until the URL source is exhausted and no
    /// worker is in-flight, sending each yielded `FetchResult` downstream.
    pub async fn run(self, mut url_source: UrlSource, tx: mpsc::Sender<FetchResult>) -> Result<()> {
        let config = self.config;
        let mut stats = StatCollector::new();
        stats.start_clock();

        let template = build_client_template(&config);
        let limits = SlotLimits {
            content_buffer_size: config.pycurl_contentbuffersize,
            header_buffer_size: config.pycurl_headerbuffersize,
        };

        let mut joins: JoinSet<std::result::Result<Vec<FetchResult>, crate::fetch::worker::WorkerFatal>> =
            JoinSet::new();
        let mut exhausted = false;

        loop {
            let mut spawned = 0usize;
            while joins.len() < config.workers
                && spawned < config.pycurl_max_spawns_per_iteration
                && !exhausted
            {
                let batch = url_source.get_batch(config.batchsize).await?;
                if batch.is_empty() {
                    exhausted = true;
                    break;
                }
                stats.add_submitted(batch.len() as u64);

                let worker = build_worker(&config, &template, &limits, batch);
                joins.spawn(worker.run());
                spawned += 1;
            }

            if exhausted && joins.is_empty() {
                break;
            }

            match tokio::time::timeout(DRAIN_POLL_INTERVAL, joins.join_next()).await {
                Ok(Some(Ok(Ok(results)))) => {
                    for result in results {
                        match &result.error {
                            Some(tag) => stats.add_error(tag),
                            None => stats.add_success(),
                        }
                        stats.add_processed();
                        if tx.send(result).await.is_err() {
                            // downstream sink dropped; nothing more to do
                            return Ok(());
                        }
                    }
                }
                Ok(Some(Ok(Err(fatal)))) => {
                    return Err(CrawlError::WorkerFatal {
                        worker: "fetch".to_string(),
                        reason: fatal.0,
                    });
                }
                Ok(Some(Err(join_err))) => {
                    return Err(CrawlError::WorkerFatal {
                        worker: "fetch".to_string(),
                        reason: join_err.to_string(),
                    });
                }
                Ok(None) => {}
                Err(_elapsed) => {}
            }

            stats.print_periodic(joins.len(), DRAIN_POLL_INTERVAL);
        }

        stats.print_final();
        Ok(())
    }
}

fn build_client_template(config: &CrawlConfig) -> ClientTemplate {
    let resolver = if config.pycurl_enabled_ares {
        AresResolver::new(&config.nsserver).map(Arc::new)
    } else {
        None
    };

    ClientTemplate {
        timeout: config.timeout,
        connect_timeout: config.connect_timeout,
        useragent: config.useragent.clone(),
        resolver,
    }
}

fn build_worker(
    config: &CrawlConfig,
    template: &ClientTemplate,
    limits: &SlotLimits,
    batch: Vec<String>,
) -> Box<dyn FetchWorker + Send> {
    match config.backend {
        Backend::Pycurl => Box::new(MultiplexedWorker {
            urls: batch,
            template: template.clone(),
            limits: limits.clone(),
            max_handles: config.pycurl_maxhandles,
            read_interval: config.pycurl_read_interval,
            lastfill_waittime: config.pycurl_lastfill_waittime,
        }),
        Backend::Requests => Box::new(SequentialWorker {
            urls: batch,
            template: template.clone(),
            limits: limits.clone(),
        }),
    }
}
