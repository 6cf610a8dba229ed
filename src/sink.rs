//! Result Sink: writes the plain-text summary log, batches records in
//! memory, and rotates compressed batch files on size threshold.

use std::path::{Path, PathBuf};

use async_compression::tokio::write::GzipEncoder;
use async_compression::Level;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::{CrawlError, Result};
use crate::model::{Batch, FetchResult};

/// flate2's "level 1" — favors CPU over size.
const GZIP_LEVEL: Level = Level::Precise(1);

pub struct ResultSink {
    summary: BufWriter<File>,
    datafile_prefix: PathBuf,
    iteration: u64,
    buffer: Batch,
    output_batch_size: usize,
    log_errors: bool,
    writer: Option<GzipEncoder<BufWriter<File>>>,
}

impl ResultSink {
    pub async fn create(
        summary_path: impl AsRef<Path>,
        datafile_prefix: impl Into<PathBuf>,
        output_batch_size: usize,
        log_errors: bool,
    ) -> Result<Self> {
        let summary_path = summary_path.as_ref();
        let summary_file = File::create(summary_path)
            .await
            .map_err(|e| CrawlError::output_io(summary_path, e))?;

        let datafile_prefix = datafile_prefix.into();

        Ok(Self {
            summary: BufWriter::new(summary_file),
            datafile_prefix,
            iteration: 0,
            buffer: Vec::new(),
            output_batch_size,
            log_errors,
            writer: None,
        })
    }

    /// Writes the summary line and accumulates the record, rotating the
    /// batch file if the buffer now exceeds `output_batch_size`.
    pub async fn accept(&mut self, result: FetchResult) -> Result<()> {
        self.write_summary_line(&result).await?;

        if self.log_errors || result.error.is_none() {
            self.buffer.push(result);
        }

        // Rotate at >= rather than a strict >: outputBatchSize=1 must yield
        // one BatchFile per record, which only holds under >=.
        if self.buffer.len() >= self.output_batch_size {
            self.rotate().await?;
        }
        Ok(())
    }

    async fn write_summary_line(&mut self, result: &FetchResult) -> Result<()> {
        let line = match &result.error {
            Some(tag) => format!("ERR {tag} {}\n", result.url),
            None => format!("{} {} {}\n", result.http_code, result.size, result.url),
        };
        self.summary
            .write_all(line.as_bytes())
            .await
            .map_err(|e| CrawlError::output_io("summary log", e))?;
        Ok(())
    }

    async fn rotate(&mut self) -> Result<()> {
        self.flush_current_batch().await?;
        self.close_current_file().await?;
        self.iteration += 1;
        Ok(())
    }

    async fn flush_current_batch(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        let encoded = bincode::serialize(&batch)
            .map_err(|e| CrawlError::config(format!("failed to encode batch: {e}")))?;
        let len = (encoded.len() as u32).to_le_bytes();

        // Opened lazily, on the first write of a new batch: eagerly opening
        // the next file on every rotation would leave a trailing empty
        // BatchFile once the buffer has already been flushed for good.
        if self.writer.is_none() {
            self.writer = Some(open_datalog(&self.datafile_prefix, self.iteration).await?);
        }
        let writer = self
            .writer
            .as_mut()
            .expect("writer was just opened above");
        writer
            .write_all(&len)
            .await
            .map_err(|e| CrawlError::output_io(&self.datafile_prefix, e))?;
        writer
            .write_all(&encoded)
            .await
            .map_err(|e| CrawlError::output_io(&self.datafile_prefix, e))?;
        Ok(())
    }

    async fn close_current_file(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .shutdown()
                .await
                .map_err(|e| CrawlError::output_io(&self.datafile_prefix, e))?;
        }
        Ok(())
    }

    /// Flushes any remaining buffered records and closes the open file.
    /// Must be called before the sink is dropped.
    pub async fn finish(mut self) -> Result<()> {
        self.flush_current_batch().await?;
        self.close_current_file().await?;
        self.summary
            .flush()
            .await
            .map_err(|e| CrawlError::output_io("summary log", e))?;
        Ok(())
    }
}

fn datalog_path(prefix: &Path, iteration: u64) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(format!("_{iteration}.bin.gz"));
    PathBuf::from(name)
}

async fn open_datalog(prefix: &Path, iteration: u64) -> Result<GzipEncoder<BufWriter<File>>> {
    let path = datalog_path(prefix, iteration);
    let file = File::create(&path)
        .await
        .map_err(|e| CrawlError::output_io(&path, e))?;
    Ok(GzipEncoder::with_quality(BufWriter::new(file), GZIP_LEVEL))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch_store::BatchStoreReader;
    use chrono::Utc;

    fn sample(url: &str, error: Option<&str>) -> FetchResult {
        FetchResult {
            created_at: Utc::now(),
            url: url.to_string(),
            body: b"<html></html>".to_vec(),
            headers: vec![("content-type".to_string(), "text/html".to_string())],
            http_code: if error.is_some() { 0 } else { 200 },
            size: 14,
            speed: 14.0,
            ip: Some("127.0.0.1".to_string()),
            port: Some(80),
            redirects: 0,
            error: error.map(|s| s.to_string()),
        }
    }

    #[tokio::test]
    async fn round_trips_through_sink_and_reader() {
        let dir = tempfile::tempdir().unwrap();
        let summary = dir.path().join("summary.log");
        let prefix = dir.path().join("data");

        let mut sink = ResultSink::create(&summary, &prefix, 100, true)
            .await
            .unwrap();
        sink.accept(sample("http://a", None)).await.unwrap();
        sink.accept(sample("http://b", Some("(timeout)"))).await.unwrap();
        sink.finish().await.unwrap();

        let datafile = datalog_path(&prefix, 0);
        let mut reader = BatchStoreReader::open(&datafile).await.unwrap();
        let records = reader.read_all().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].url, "http://a");
        assert_eq!(records[1].url, "http://b");
        assert_eq!(records[1].error.as_deref(), Some("(timeout)"));

        let summary_text = tokio::fs::read_to_string(&summary).await.unwrap();
        assert_eq!(summary_text, "200 14 http://a\nERR (timeout) http://b\n");
    }

    #[tokio::test]
    async fn log_errors_false_excludes_error_records_from_batch() {
        let dir = tempfile::tempdir().unwrap();
        let summary = dir.path().join("summary.log");
        let prefix = dir.path().join("data");

        let mut sink = ResultSink::create(&summary, &prefix, 100, false)
            .await
            .unwrap();
        sink.accept(sample("http://a", None)).await.unwrap();
        sink.accept(sample("http://b", Some("(timeout)"))).await.unwrap();
        sink.finish().await.unwrap();

        let datafile = datalog_path(&prefix, 0);
        let mut reader = BatchStoreReader::open(&datafile).await.unwrap();
        let records = reader.read_all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "http://a");
    }

    #[tokio::test]
    async fn rotates_on_threshold_with_distinct_monotonic_names() {
        let dir = tempfile::tempdir().unwrap();
        let summary = dir.path().join("summary.log");
        let prefix = dir.path().join("data");

        let mut sink = ResultSink::create(&summary, &prefix, 1, true).await.unwrap();
        sink.accept(sample("http://a", None)).await.unwrap();
        sink.accept(sample("http://b", None)).await.unwrap();
        sink.accept(sample("http://c", None)).await.unwrap();
        sink.finish().await.unwrap();

        assert!(datalog_path(&prefix, 0).exists());
        assert!(datalog_path(&prefix, 1).exists());
        assert!(datalog_path(&prefix, 2).exists());
        assert_ne!(datalog_path(&prefix, 0), datalog_path(&prefix, 1));
    }

    #[tokio::test]
    async fn finish_does_not_leave_a_trailing_empty_batch_file() {
        // Three records at output_batchsize=1 means three rotations, each
        // one writing and closing its own file. No batch file should ever
        // be opened for a fourth, never-written rotation.
        let dir = tempfile::tempdir().unwrap();
        let summary = dir.path().join("summary.log");
        let prefix = dir.path().join("data");

        let mut sink = ResultSink::create(&summary, &prefix, 1, true).await.unwrap();
        sink.accept(sample("http://a", None)).await.unwrap();
        sink.accept(sample("http://b", None)).await.unwrap();
        sink.accept(sample("http://c", None)).await.unwrap();
        sink.finish().await.unwrap();

        assert!(!datalog_path(&prefix, 3).exists());
    }

    #[tokio::test]
    async fn empty_run_writes_no_batch_file() {
        let dir = tempfile::tempdir().unwrap();
        let summary = dir.path().join("summary.log");
        let prefix = dir.path().join("data");

        let sink = ResultSink::create(&summary, &prefix, 100, true).await.unwrap();
        sink.finish().await.unwrap();

        assert!(!datalog_path(&prefix, 0).exists());
    }
}
