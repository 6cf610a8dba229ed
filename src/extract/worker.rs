//! Extraction Worker: replays one batch file through a single extraction
//! function and returns the record count plus the accumulated output text.

use std::path::PathBuf;

use regex::Regex;

use crate::batch_store::BatchStoreReader;
use crate::error::{CrawlError, Result};

use super::functions;

pub struct ExtractionWorker {
    pub path: PathBuf,
    pub function: String,
    pub regex: Option<Regex>,
}

impl ExtractionWorker {
    /// Loads every record from the batch file, then runs the pure
    /// CPU-bound extraction pass on a blocking thread.
    pub async fn run(self) -> Result<(usize, String)> {
        let mut reader = BatchStoreReader::open(&self.path).await?;
        let records = reader.read_all().await;

        let function = self.function;
        let regex = self.regex;

        tokio::task::spawn_blocking(move || {
            let mut out = String::new();
            for record in &records {
                functions::apply(&function, regex.as_ref(), record, &mut out);
            }
            (records.len(), out)
        })
        .await
        .map_err(|e| CrawlError::WorkerFatal {
            worker: "extract".to_string(),
            reason: e.to_string(),
        })
    }
}
