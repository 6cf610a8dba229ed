//! Lazy, line-batched reader over the input URL file.
//!
//! Single-consumer: concurrent `get_batch` calls are not safe. A partial
//! trailing line from one chunk read is carried forward and concatenated
//! with the next chunk so line boundaries survive chunk reads.

use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};

use crate::error::{CrawlError, Result};

/// Default chunk size for reads off the URL file (10 MiB).
pub const DEFAULT_BATCH_READ_BYTES: usize = 10 * 1024 * 1024;

pub struct UrlSource {
    reader: BufReader<File>,
    batch_read_bytes: usize,
    carry: String,
    /// Lines read from the file but not yet consumed by `get_batch`.
    pending: std::collections::VecDeque<String>,
    eof: bool,
}

impl UrlSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .map_err(|e| CrawlError::config(format!("cannot open urlfile {}: {e}", path.display())))?;
        Ok(Self {
            reader: BufReader::new(file),
            batch_read_bytes: DEFAULT_BATCH_READ_BYTES,
            carry: String::new(),
            pending: std::collections::VecDeque::new(),
            eof: false,
        })
    }

    #[cfg(test)]
    pub fn with_batch_read_bytes(mut self, n: usize) -> Self {
        self.batch_read_bytes = n;
        self
    }

    /// Returns up to `n` lines (without their terminating newline). Returns
    /// fewer, possibly zero, only when the file is exhausted.
    pub async fn get_batch(&mut self, n: usize) -> Result<Vec<String>> {
        while self.pending.len() < n && !self.eof {
            self.fill().await?;
        }

        let take = n.min(self.pending.len());
        Ok(self.pending.drain(..take).collect())
    }

    async fn fill(&mut self) -> Result<()> {
        let mut buf = vec![0u8; self.batch_read_bytes];
        let read = self.reader.read(&mut buf).await?;
        if read == 0 {
            self.eof = true;
            if !self.carry.is_empty() {
                self.pending.push_back(std::mem::take(&mut self.carry));
            }
            return Ok(());
        }

        buf.truncate(read);
        let chunk = String::from_utf8_lossy(&buf);
        let combined = if self.carry.is_empty() {
            chunk.into_owned()
        } else {
            let mut s = std::mem::take(&mut self.carry);
            s.push_str(&chunk);
            s
        };

        let ends_with_newline = combined.ends_with('\n');
        let mut lines: Vec<&str> = combined.split('\n').collect();
        // split() on a trailing \n yields a trailing "" element; drop it.
        if ends_with_newline {
            lines.pop();
        } else {
            // last element is a partial line, carry it forward
            if let Some(last) = lines.pop() {
                self.carry = last.to_string();
            }
        }

        for line in lines {
            self.pending.push_back(line.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    async fn source_for(contents: &str, chunk: usize) -> UrlSource {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        UrlSource::open(f.path())
            .await
            .unwrap()
            .with_batch_read_bytes(chunk)
    }

    #[tokio::test]
    async fn reads_all_lines_in_one_batch() {
        let mut src = source_for("http://a\nhttp://b\nhttp://c\n", 4096).await;
        let batch = src.get_batch(10).await.unwrap();
        assert_eq!(batch, vec!["http://a", "http://b", "http://c"]);
        assert!(src.get_batch(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn preserves_line_boundaries_across_small_chunks() {
        let mut src = source_for("http://example.com/one\nhttp://example.com/two\n", 5).await;
        let mut all = Vec::new();
        loop {
            let batch = src.get_batch(2).await.unwrap();
            if batch.is_empty() {
                break;
            }
            all.extend(batch);
        }
        assert_eq!(
            all,
            vec!["http://example.com/one", "http://example.com/two"]
        );
    }

    #[tokio::test]
    async fn no_trailing_newline_still_yields_last_line() {
        let mut src = source_for("http://a\nhttp://b", 4096).await;
        let batch = src.get_batch(10).await.unwrap();
        assert_eq!(batch, vec!["http://a", "http://b"]);
    }

    #[tokio::test]
    async fn empty_file_is_clean_exhaustion() {
        let mut src = source_for("", 4096).await;
        assert!(src.get_batch(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_failure_is_config_error() {
        let err = UrlSource::open("/nonexistent/path/does-not-exist")
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::Config(_)));
    }

    #[tokio::test]
    async fn get_batch_returns_fewer_only_at_eof() {
        let mut src = source_for("http://a\nhttp://b\nhttp://c\n", 4096).await;
        let first = src.get_batch(2).await.unwrap();
        assert_eq!(first.len(), 2);
        let second = src.get_batch(2).await.unwrap();
        assert_eq!(second, vec!["http://c"]);
    }
}
