use std::path::PathBuf;
use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, StatusCode};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("file is larger than {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Качает файл целиком во временный файл; файл удаляется, когда `NamedTempFile` дропается.
#[derive(Clone)]
pub struct Downloader {
    http: Client,
    dir: PathBuf,
    max_bytes: u64,
}

impl Downloader {
    pub fn new(dir: PathBuf, max_bytes: u64, accept_invalid_certs: bool) -> Result<Self, DownloadError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .danger_accept_invalid_certs(accept_invalid_certs)
            .user_agent("Mozilla/5.0 (compatible; kinoteka-bot/0.1)")
            .build()?;
        Ok(Self { http, dir, max_bytes })
    }

    pub async fn download(&self, url: &str) -> Result<NamedTempFile, DownloadError> {
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(DownloadError::Status(resp.status()));
        }
        if let Some(len) = resp.content_length() {
            if len > self.max_bytes {
                return Err(DownloadError::TooLarge { limit: self.max_bytes });
            }
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = tempfile::Builder::new()
            .prefix("video-")
            .suffix(".mp4")
            .tempfile_in(&self.dir)?;
        let mut out = tokio::fs::File::from_std(tmp.reopen()?);

        let mut written: u64 = 0;
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            // Content-Length может врать или отсутствовать
            if written > self.max_bytes {
                return Err(DownloadError::TooLarge { limit: self.max_bytes });
            }
            out.write_all(&chunk).await?;
        }
        out.flush().await?;
        debug!(path = %tmp.path().display(), "download staged");
        info!(bytes = written, "download finished");
        Ok(tmp)
    }
}
