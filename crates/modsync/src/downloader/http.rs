//! HTTP transport for modfile binaries

use crate::config::SyncConfig;
use crate::core::{FileOperation, Modfile, RequestError, Result, SyncError};
use crate::downloader::BinaryTransport;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info_span, Instrument};

/// Streams a modfile's binary URL to disk
///
/// Bytes land in `<destination>.part` first and are renamed into place once
/// the body has been fully written, so the destination path never holds a
/// truncated archive.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| SyncError::Configuration {
                message: format!("failed to create HTTP client: {}", e),
                field: None,
            })?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn download_file(&self, url: &str, dest_path: &Path) -> Result<u64> {
        let temp_path = dest_path.with_extension("part");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = status.canonical_reason().unwrap_or("request failed");
            return Err(RequestError::from_status(url, status.as_u16(), message, None).into());
        }
        debug!("Content length: {:?}", response.content_length());

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| SyncError::fs(&temp_path, FileOperation::Create, e))?;

        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            file.write_all(&chunk)
                .await
                .map_err(|e| SyncError::fs(&temp_path, FileOperation::Write, e))?;
            downloaded += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| SyncError::fs(&temp_path, FileOperation::Write, e))?;
        drop(file);

        fs::rename(&temp_path, dest_path)
            .await
            .map_err(|e| SyncError::fs(dest_path, FileOperation::Move, e))?;

        debug!("Download completed: {} bytes", downloaded);
        Ok(downloaded)
    }
}

#[async_trait]
impl BinaryTransport for HttpTransport {
    async fn download(&self, modfile: &Modfile, destination: &Path) -> Result<u64> {
        let Some(locator) = modfile.download_locator.as_ref() else {
            return Err(SyncError::LocatorExpired {
                identity: modfile.identity(),
            });
        };

        let span = info_span!("http_download", url = %locator.binary_url);
        let result = self
            .download_file(&locator.binary_url, destination)
            .instrument(span)
            .await;

        if result.is_err() {
            // A failed transfer must not leave a partial file behind
            fs::remove_file(destination.with_extension("part")).await.ok();
        }
        result
    }
}
