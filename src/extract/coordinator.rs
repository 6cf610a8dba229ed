//! Extraction Coordinator: globs batch files, fans them out across a
//! worker pool, and streams each worker's output to stdout.

use std::time::{Duration, Instant};

use regex::RegexBuilder;
use tokio::task::JoinSet;

use crate::config::AnalyseConfig;
use crate::error::{CrawlError, Result};
use crate::stats::StatCollector;

use super::worker::ExtractionWorker;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_secs(5);
const STATUS_INTERVAL: Duration = Duration::from_secs(1);

pub struct ExtractionCoordinator {
    config: AnalyseConfig,
}

impl ExtractionCoordinator {
    pub fn new(config: AnalyseConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config;

        let files: Vec<_> = glob::glob(&config.file_glob)
            .map_err(|e| CrawlError::config(format!("invalid --file-glob: {e}")))?
            .filter_map(|entry| entry.ok())
            .collect();

        tracing::info!(file_count = files.len(), "resolved batch files");
        if files.is_empty() {
            println!("0");
            return Ok(());
        }

        let regex = match &config.regexp {
            Some(pattern) => Some(
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .multi_line(true)
                    .build()
                    .map_err(|e| CrawlError::config(format!("invalid --regexp: {e}")))?,
            ),
            None => None,
        };

        let mut stats = StatCollector::new();
        stats.start_clock();
        let started_at = Instant::now();

        let mut joins: JoinSet<Result<(usize, String)>> = JoinSet::new();
        let mut next_file = 0usize;
        let total_files = files.len();
        let mut last_status = Instant::now();
        let mut last_processed = 0u64;

        loop {
            while joins.len() < config.max_workers && next_file < total_files {
                let worker = ExtractionWorker {
                    path: files[next_file].clone(),
                    function: config.function.clone(),
                    regex: regex.clone(),
                };
                joins.spawn(worker.run());
                next_file += 1;
                stats.add_submitted(1);
            }

            if next_file >= total_files && joins.is_empty() {
                break;
            }

            match tokio::time::timeout(DRAIN_POLL_INTERVAL, joins.join_next()).await {
                Ok(Some(Ok(Ok((count, text))))) => {
                    if !text.is_empty() {
                        print!("{text}");
                    }
                    stats.add_processed_n(count as u64);
                }
                Ok(Some(Ok(Err(err)))) => return Err(err),
                Ok(Some(Err(join_err))) => {
                    return Err(CrawlError::WorkerFatal {
                        worker: "extract".to_string(),
                        reason: join_err.to_string(),
                    });
                }
                Ok(None) => {}
                Err(_elapsed) => {}
            }

            if last_status.elapsed() >= STATUS_INTERVAL {
                let snapshot = stats.snapshot();
                let since_last = last_status.elapsed().as_secs_f64().max(f64::EPSILON);
                let since_start = started_at.elapsed().as_secs_f64().max(f64::EPSILON);
                let instantaneous_rate = (snapshot.processed - last_processed) as f64 / since_last;
                let cumulative_rate = snapshot.processed as f64 / since_start;
                eprintln!(
                    "STATUS: files {}/{total_files}, rate {instantaneous_rate:.0} rec/s, cumulative {cumulative_rate:.0} rec/s",
                    snapshot.submitted
                );
                last_processed = snapshot.processed;
                last_status = Instant::now();
            }
        }

        stats.print_final();
        Ok(())
    }
}
