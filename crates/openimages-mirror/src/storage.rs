// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Object storage collaborator used to fetch individual images.
//!
//! The Open Images bucket is publicly readable, so the default
//! [`PublicBucket`] store issues plain unsigned HTTPS requests. Any other
//! backend can be plugged into the [`Client`][crate::Client] by implementing
//! [`ObjectStore`].

use crate::Error;
use async_trait::async_trait;
use futures::StreamExt as _;
use log::trace;
use std::path::{Path, PathBuf};
use tokio::{fs::File, io::AsyncWriteExt as _};
use url::Url;

/// Bucket holding the Open Images image files.
pub const DATASET_BUCKET: &str = "open-images-dataset";

/// Store that can copy an object into a local file.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch `key` from `bucket` and write it to `dest`.
    ///
    /// On error `dest` must not be left holding a partial object.
    async fn get_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), Error>;
}

/// Anonymous HTTP access to a public S3 bucket.
///
/// Without an endpoint override objects are addressed virtual-host style as
/// `https://<bucket>.s3.amazonaws.com/<key>`. With an override (MinIO,
/// LocalStack, a mirror) they are addressed path style as
/// `<endpoint>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct PublicBucket {
    http: reqwest::Client,
    endpoint: Option<String>,
}

impl PublicBucket {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            endpoint: None,
        }
    }

    /// Address objects through a custom endpoint instead of AWS.
    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Resolve the URL of `key` within `bucket`.
    pub fn object_url(&self, bucket: &str, key: &str) -> Result<Url, Error> {
        let url = match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key),
            None => format!("https://{}.s3.amazonaws.com/{}", bucket, key),
        };
        Ok(Url::parse(&url)?)
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

#[async_trait]
impl ObjectStore for PublicBucket {
    async fn get_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), Error> {
        let url = self.object_url(bucket, key)?;
        trace!("GET {}", url);

        let res = self.http.get(url.clone()).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(Error::FetchError {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Stream into a sibling file and rename once complete
        let part = partial_path(dest);
        let written: Result<(), Error> = async {
            let mut file = File::create(&part).await?;
            let mut stream = res.bytes_stream();
            while let Some(chunk) = stream.next().await {
                file.write_all(&chunk?).await?;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }

        tokio::fs::rename(&part, dest).await?;
        Ok(())
    }
}
