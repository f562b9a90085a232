// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    annotations::Split,
    storage::{DATASET_BUCKET, ObjectStore},
};
use log::{trace, warn};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Outcome of a single image download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchStatus {
    /// The image was written to the contained path.
    Downloaded(PathBuf),
    /// The image could not be fetched; the batch carries on regardless.
    Failed { key: String, reason: String },
}

impl FetchStatus {
    pub fn is_downloaded(&self) -> bool {
        matches!(self, FetchStatus::Downloaded(_))
    }
}

/// Object key of an image within the dataset bucket.
pub fn object_key(split: Split, image_id: &str) -> String {
    format!("{}/{}.jpg", split.as_str(), image_id)
}

fn is_plain_image_id(image_id: &str) -> bool {
    !image_id.is_empty()
        && image_id != "."
        && image_id != ".."
        && !image_id.contains(['/', '\\'])
}

/// Downloads images from the dataset bucket, one object per call.
///
/// Errors never escape [`fetch`][ImageFetcher::fetch]; they are logged and
/// returned as [`FetchStatus::Failed`].
#[derive(Clone)]
pub struct ImageFetcher {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl std::fmt::Debug for ImageFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageFetcher")
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl ImageFetcher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            bucket: DATASET_BUCKET.to_string(),
        }
    }

    pub fn with_bucket(mut self, bucket: &str) -> Self {
        self.bucket = bucket.to_string();
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Download `<split>/<image_id>.jpg` into `dest_dir/<image_id>.jpg`.
    ///
    /// An `image_id` that is not a plain file name (empty, `.`, `..` or
    /// containing a path separator) is reported as failed without touching
    /// the store.
    pub async fn fetch(&self, split: Split, image_id: &str, dest_dir: &Path) -> FetchStatus {
        let key = object_key(split, image_id);
        if !is_plain_image_id(image_id) {
            warn!("Skipping {}: image ID is not a plain file name", key);
            return FetchStatus::Failed {
                key,
                reason: format!("invalid image ID {:?}", image_id),
            };
        }

        let dest = dest_dir.join(format!("{}.jpg", image_id));

        match self.store.get_object(&self.bucket, &key, &dest).await {
            Ok(()) => {
                trace!("Downloaded {} to {:?}", key, dest);
                FetchStatus::Downloaded(dest)
            }
            Err(e) => {
                warn!("Failed to download {}/{}: {}", self.bucket, key, e);
                FetchStatus::Failed {
                    key,
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FlakyStore;

    #[async_trait]
    impl ObjectStore for FlakyStore {
        async fn get_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), Error> {
            assert_eq!(bucket, DATASET_BUCKET);
            if key.contains("missing") {
                return Err(Error::FetchError {
                    url: format!("s3://{}/{}", bucket, key),
                    status: 403,
                });
            }
            tokio::fs::write(dest, key.as_bytes()).await?;
            Ok(())
        }
    }

    #[test]
    fn test_object_key() {
        assert_eq!(
            object_key(Split::Validation, "0001eeaf4aed83f9"),
            "validation/0001eeaf4aed83f9.jpg"
        );
    }

    #[tokio::test]
    async fn test_fetch_downloads() {
        let dir = TempDir::new().unwrap();
        let fetcher = ImageFetcher::new(Arc::new(FlakyStore));

        let status = fetcher.fetch(Split::Train, "img1", dir.path()).await;
        let path = dir.path().join("img1.jpg");
        assert_eq!(status, FetchStatus::Downloaded(path.clone()));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "train/img1.jpg");
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let fetcher = ImageFetcher::new(Arc::new(FlakyStore));

        let status = fetcher.fetch(Split::Test, "missing1", dir.path()).await;
        match status {
            FetchStatus::Failed { key, reason } => {
                assert_eq!(key, "test/missing1.jpg");
                assert!(reason.contains("403"));
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert!(!dir.path().join("missing1.jpg").exists());
    }

    #[tokio::test]
    async fn test_fetch_rejects_path_like_ids() {
        let root = TempDir::new().unwrap();
        let dest = root.path().join("Helmet").join("images");
        std::fs::create_dir_all(&dest).unwrap();
        let fetcher = ImageFetcher::new(Arc::new(FlakyStore));

        for image_id in ["../../escaped", "a/b", "a\\b", "..", ".", ""] {
            let status = fetcher.fetch(Split::Train, image_id, &dest).await;
            assert!(
                matches!(&status, FetchStatus::Failed { reason, .. } if reason.contains("invalid image ID")),
                "{:?} gave {:?}",
                image_id,
                status
            );
        }

        assert!(!root.path().join("escaped.jpg").exists());
        assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[test]
    fn test_is_plain_image_id() {
        assert!(is_plain_image_id("000002b66c9c498e"));
        assert!(is_plain_image_id("a..b"));
        assert!(!is_plain_image_id("../x"));
        assert!(!is_plain_image_id(".."));
    }
}
