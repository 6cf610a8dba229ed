//! Batch Store Reader: a truncation-tolerant iterator over a gzip +
//! length-prefixed-bincode batch file, as written by [`crate::sink`].

use std::path::{Path, PathBuf};

use async_compression::tokio::bufread::GzipDecoder;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};

use crate::error::{CrawlError, Result};
use crate::model::{Batch, FetchResult};

pub struct BatchStoreReader {
    path: PathBuf,
    inner: GzipDecoder<BufReader<File>>,
}

impl BatchStoreReader {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path)
            .await
            .map_err(|e| CrawlError::output_io(&path, e))?;
        Ok(Self {
            path,
            inner: GzipDecoder::new(BufReader::new(file)),
        })
    }

    /// Reads the next length-prefixed `Batch` frame, if any.
    ///
    /// Returns `Ok(None)` on clean EOF (no bytes read before the length
    /// prefix) and on a truncated trailing frame (fewer than 4 or fewer
    /// than `len` bytes remain) — a batch file is allowed to end mid-write
    /// and that is not an error.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>> {
        let mut len_buf = [0u8; 4];
        let read = read_fill(&mut self.inner, &mut len_buf).await?;
        if read == 0 {
            return Ok(None);
        }
        if read < 4 {
            return Ok(None);
        }
        let len = u32::from_le_bytes(len_buf) as usize;

        let mut payload = vec![0u8; len];
        let read = read_fill(&mut self.inner, &mut payload).await?;
        if read < len {
            return Ok(None);
        }

        match bincode::deserialize::<Batch>(&payload) {
            Ok(batch) => Ok(Some(batch)),
            Err(_) => Ok(None),
        }
    }

    /// Drains every well-formed batch into one flat record list, stopping
    /// silently at the first truncated or corrupt frame.
    pub async fn read_all(&mut self) -> Vec<FetchResult> {
        let mut out = Vec::new();
        while let Ok(Some(batch)) = self.next_batch().await {
            out.extend(batch);
        }
        out
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Fills `buf` from `reader`, stopping early (returning the short count) on
/// EOF instead of erroring, so a truncated tail is observable to the caller.
async fn read_fill<R: tokio::io::AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader
            .read(&mut buf[filled..])
            .await
            .map_err(CrawlError::from)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
