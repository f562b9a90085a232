// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! # Open Images Mirror
//!
//! Builds a filtered, capped local mirror of the
//! [Open Images](https://storage.googleapis.com/openimages/web/index.html)
//! dataset. Given a list of class labels the library resolves them to
//! dataset class codes, finds every image in the train, validation and test
//! splits with a bounding box of those classes, and downloads up to a limit of
//! images per label into `<dest>/<label>/images`.
//!
//! ## Pipeline
//!
//! - [`labels`]: label to class-code resolution from the cached
//!   class-description table
//! - [`annotations`]: per-split bounding-box tables, fetched once and cached
//! - [`grouping`]: per-label grouping of boxes by image
//! - [`fetcher`]: single image downloads that never fail the batch
//! - [`Client`]: the orchestrator tying the stages together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use openimages_mirror::{Client, Error};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let client = Client::new()?;
//!     let report = client
//!         .mirror(
//!             Path::new("./openimages"),
//!             &["Helmet"],
//!             Some(Path::new("./cache")),
//!             Some(500),
//!             None,
//!         )
//!         .await?;
//!
//!     println!(
//!         "Helmet: {} downloaded, {} failed",
//!         report.downloaded("Helmet"),
//!         report.failed("Helmet")
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Optional Features
//!
//! - `polars`: [`annotations_dataframe`] converts a split table into a Polars
//!   DataFrame
//! - `profiling`: `tracing` spans around the pipeline stages

pub mod annotations;
mod cache;
mod client;
mod error;
pub mod fetcher;
pub mod grouping;
pub mod labels;
mod retry;
mod source;
mod storage;

pub use crate::{
    annotations::{Annotation, Split, SplitLoad, SplitTable, TableOrigin},
    client::{Client, DownloadCounts, Endpoints, LabelBatch, MirrorReport, Progress},
    error::Error,
    fetcher::{FetchStatus, ImageFetcher},
    grouping::{BoundingBox, BoundingBoxGroups, ImageGroups},
    labels::{ClassDescription, LabelCodes},
    retry::{RetryScope, classify_url, create_retry_policy},
    source::{HttpSource, TableSource, build_http_client},
    storage::{DATASET_BUCKET, ObjectStore, PublicBucket},
};

#[cfg(feature = "polars")]
pub use crate::annotations::annotations_dataframe;
