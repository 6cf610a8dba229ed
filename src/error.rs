//! Crate-wide error taxonomy.
//!
//! Per-URL failures never reach here — they are folded into
//! [`crate::model::FetchResult::error`] instead. These variants are for the
//! things that *do* abort a run.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrawlError>;

#[derive(Debug, Error)]
pub enum CrawlError {
    /// Bad CLI inputs: missing file, nonsensical sizes, unknown function.
    #[error("config error: {0}")]
    Config(String),

    /// Unexpected exception inside a Fetch Worker's event loop.
    #[error("worker {worker} crashed: {reason}")]
    WorkerFatal { worker: String, reason: String },

    /// Failure writing the summary log or a batch file.
    #[error("output I/O error writing {path}: {source}")]
    OutputIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrawlError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn output_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::OutputIo {
            path: path.into(),
            source,
        }
    }
}
