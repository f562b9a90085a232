// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! HTTP collaborator used to fetch the CSV tables.

use crate::{
    Error,
    retry::{create_retry_policy, log_retry_configuration},
};
use async_trait::async_trait;
use futures::StreamExt as _;
use log::debug;
use reqwest::StatusCode;
use std::{path::Path, time::Duration};
use tokio::{fs::File, io::AsyncWriteExt as _};

/// Source of raw table payloads.
///
/// Any response other than `200 OK` must be reported as
/// [`Error::FetchError`] so that callers never mistake an error page for an
/// empty table.
#[async_trait]
pub trait TableSource: Send + Sync {
    /// Fetch the full body of `url` into memory.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, Error>;

    /// Write the full body of `url` to `dest`.
    ///
    /// Used for the bounding-box tables, which are too large to buffer. The
    /// default implementation writes the result of [`fetch`][Self::fetch].
    async fn download(&self, url: &str, dest: &Path) -> Result<(), Error> {
        let data = self.fetch(url).await?;
        tokio::fs::write(dest, data).await?;
        Ok(())
    }
}

/// Build the shared reqwest client.
///
/// `OPENIMAGES_TIMEOUT` (seconds, default 300) bounds how long a response may
/// go without delivering data. There is no limit on the total transfer time,
/// since the train table alone is over a gigabyte. The retry policy comes
/// from [`create_retry_policy`].
pub fn build_http_client() -> Result<reqwest::Client, Error> {
    log_retry_configuration();

    let timeout_secs = std::env::var("OPENIMAGES_TIMEOUT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(300);

    http_client(Duration::from_secs(timeout_secs))
}

fn http_client(read_timeout: Duration) -> Result<reqwest::Client, Error> {
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .read_timeout(read_timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(10)
        .retry(create_retry_policy())
        .build()?;

    Ok(http)
}

/// [`TableSource`] backed by a reqwest client.
#[derive(Debug, Clone)]
pub struct HttpSource {
    http: reqwest::Client,
}

impl HttpSource {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, Error> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if status != StatusCode::OK {
            return Err(Error::FetchError {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl TableSource for HttpSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, Error> {
        debug!("Fetching {}", url);
        let bytes = self.get(url).await?.bytes().await?;
        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<(), Error> {
        debug!("Downloading {} to {:?}", url, dest);
        let resp = self.get(url).await?;

        let mut file = File::create(dest).await?;
        let mut stream = resp.bytes_stream();
        let mut written = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;

        debug!("Downloaded {} bytes from {}", written, url);
        Ok(())
    }
}
