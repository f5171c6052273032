// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Segment download: streams each referenced media chunk to
//! `<dest>/segment_<index>.<ext>`.
//!
//! A failing segment is logged and skipped, the rest are still fetched.
//! Names are local to one call, so a second call into the same directory
//! overwrites the previous files.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{info, warn};
use url::Url;

use crate::error::{RecorderError, Result};

/// One segment written to disk.
#[derive(Debug, Clone)]
pub struct FetchedSegment {
    pub index: usize,
    pub url: Url,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Outcome of [`SegmentFetcher::fetch_all`].
#[derive(Debug, Default)]
pub struct FetchSummary {
    pub written: Vec<FetchedSegment>,
    /// Indices of segments that were skipped.
    pub failed: Vec<usize>,
}

impl FetchSummary {
    pub fn total_bytes(&self) -> u64 {
        self.written.iter().map(|s| s.bytes).sum()
    }
}

/// Streams segments over HTTP in bounded chunks.
#[derive(Debug, Clone)]
pub struct SegmentFetcher {
    client: Client,
    chunk_size: usize,
}

impl SegmentFetcher {
    pub fn new(client: Client, chunk_size: usize) -> Self {
        Self { client, chunk_size: chunk_size.max(1) }
    }

    /// Download every segment in order into `dest`.
    ///
    /// Only a failure to create `dest` is an error; per-segment failures end
    /// up in [`FetchSummary::failed`].
    pub async fn fetch_all(&self, segments: &[Url], dest: &Path) -> Result<FetchSummary> {
        tokio::fs::create_dir_all(dest).await?;

        let mut summary = FetchSummary::default();
        for (index, url) in segments.iter().enumerate() {
            let path = dest.join(segment_file_name(index, url));
            info!(index, url = %url, "Downloading segment");

            match self.fetch_one(url, &path).await {
                Ok(bytes) => summary.written.push(FetchedSegment {
                    index,
                    url: url.clone(),
                    path,
                    bytes,
                }),
                Err(e) => {
                    warn!(index, url = %url, error = %e, "Segment download failed, skipping");
                    summary.failed.push(index);
                }
            }
        }

        info!(
            written = summary.written.len(),
            failed = summary.failed.len(),
            bytes = summary.total_bytes(),
            dest = ?dest,
            "Segment fetch finished"
        );
        Ok(summary)
    }

    async fn fetch_one(&self, url: &Url, path: &Path) -> Result<u64> {
        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RecorderError::Fetch { url: url.to_string(), status: status.as_u16() });
        }

        let file = File::create(path).await?;
        match self.stream_body(resp, file).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                // Don't leave a truncated segment behind.
                let _ = tokio::fs::remove_file(path).await;
                Err(e)
            }
        }
    }

    async fn stream_body(&self, resp: reqwest::Response, file: File) -> Result<u64> {
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let mut body = resp.bytes_stream();
        let mut total = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk: Bytes = chunk?;
            for piece in chunk.chunks(self.chunk_size) {
                writer.write_all(piece).await?;
            }
            total += chunk.len() as u64;
        }
        writer.flush().await?;
        Ok(total)
    }
}

/// `segment_<index>.<ext>`, with the extension taken from the URL path
/// (`ts` when it has none).
pub fn segment_file_name(index: usize, url: &Url) -> String {
    let ext = Path::new(url.path())
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .unwrap_or("ts");
    format!("segment_{index}.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_file_name_uses_url_extension() {
        let url = Url::parse("https://h/a/media_3140861.ts?token=abc").unwrap();
        assert_eq!(segment_file_name(0, &url), "segment_0.ts");

        let url = Url::parse("https://h/a/chunk_7.m4s").unwrap();
        assert_eq!(segment_file_name(7, &url), "segment_7.m4s");

        let url = Url::parse("https://h/a/chunk").unwrap();
        assert_eq!(segment_file_name(2, &url), "segment_2.ts");
    }
}
