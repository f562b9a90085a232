// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    Error,
    annotations::{self, Split, SplitLoad},
    fetcher::{FetchStatus, ImageFetcher},
    grouping,
    labels::{self, ClassDescription, LabelCodes},
    source::{HttpSource, TableSource, build_http_client},
    storage::{DATASET_BUCKET, ObjectStore, PublicBucket},
};
use futures::future::join_all;
use log::{debug, info, warn};
use std::{
    collections::BTreeMap,
    ffi::OsStr,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::sync::{Semaphore, mpsc::Sender};

const DEFAULT_CLASSES_URL: &str =
    "https://storage.googleapis.com/openimages/v5/class-descriptions-boxable.csv";
const DEFAULT_ANNOTATIONS_URL: &str = "https://storage.googleapis.com/openimages/2018_04";

fn max_tasks() -> usize {
    std::env::var("MAX_TASKS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| {
            // Default to half the number of CPUs, minimum 2, maximum 8
            let cpus = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4);
            (cpus / 2).clamp(2, 8)
        })
}

fn sanitize_path_component(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let component = Path::new(trimmed)
        .file_name()
        .unwrap_or_else(|| OsStr::new(trimmed));

    let sanitized: String = component
        .to_string_lossy()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect();

    match sanitized.as_str() {
        "" => "unnamed".to_string(),
        "." | ".." => sanitized.replace('.', "_"),
        _ => sanitized,
    }
}

/// Progress information for a mirror run.
///
/// `total` grows as each label batch is queued, so it only reaches its final
/// value once the last split has been indexed.
///
/// # Examples
///
/// ```rust
/// use openimages_mirror::Progress;
///
/// let progress = Progress {
///     current: 25,
///     total: 100,
/// };
/// let percentage = (progress.current as f64 / progress.total as f64) * 100.0;
/// println!(
///     "Progress: {:.1}% ({}/{})",
///     percentage, progress.current, progress.total
/// );
/// ```
#[derive(Debug, Clone)]
pub struct Progress {
    /// Number of images attempted so far.
    pub current: usize,
    /// Number of images queued so far.
    pub total: usize,
}

/// Locations of the dataset tables and images.
///
/// Defaults point at the public Open Images distribution. Each field can be
/// overridden from the environment:
///
/// - `OPENIMAGES_CLASSES_URL`: class-description table
/// - `OPENIMAGES_ANNOTATIONS_URL`: base URL of the per-split tables
/// - `OPENIMAGES_S3_ENDPOINT`: path-style endpoint serving the image bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub classes_url: String,
    pub annotations_url: String,
    pub bucket: String,
    pub s3_endpoint: Option<String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            classes_url: DEFAULT_CLASSES_URL.to_string(),
            annotations_url: DEFAULT_ANNOTATIONS_URL.to_string(),
            bucket: DATASET_BUCKET.to_string(),
            s3_endpoint: None,
        }
    }
}

impl Endpoints {
    pub fn from_env() -> Self {
        let defaults = Endpoints::default();
        Endpoints {
            classes_url: std::env::var("OPENIMAGES_CLASSES_URL").unwrap_or(defaults.classes_url),
            annotations_url: std::env::var("OPENIMAGES_ANNOTATIONS_URL")
                .unwrap_or(defaults.annotations_url),
            bucket: defaults.bucket,
            s3_endpoint: std::env::var("OPENIMAGES_S3_ENDPOINT").ok(),
        }
    }

    /// URL of the bounding-box table for `split`.
    ///
    /// ```rust
    /// use openimages_mirror::{Endpoints, Split};
    ///
    /// assert_eq!(
    ///     Endpoints::default().annotations_url(Split::Validation),
    ///     "https://storage.googleapis.com/openimages/2018_04/validation/validation-annotations-bbox.csv"
    /// );
    /// ```
    pub fn annotations_url(&self, split: Split) -> String {
        format!(
            "{}/{}/{}",
            self.annotations_url.trim_end_matches('/'),
            split.as_str(),
            split.cache_file_name()
        )
    }
}

/// Running per-label count of images queued during one mirror run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadCounts {
    counts: BTreeMap<String, usize>,
}

impl DownloadCounts {
    fn new<'a>(labels: impl Iterator<Item = &'a str>) -> Self {
        DownloadCounts {
            counts: labels.map(|l| (l.to_string(), 0)).collect(),
        }
    }

    pub fn get(&self, label: &str) -> usize {
        self.counts.get(label).copied().unwrap_or(0)
    }

    fn add(&mut self, label: &str, n: usize) {
        *self.counts.entry(label.to_string()).or_default() += n;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(l, n)| (l.as_str(), *n))
    }
}

/// Images attempted for one label in one split.
#[derive(Debug, Clone)]
pub struct LabelBatch {
    pub split: Split,
    pub label: String,
    pub statuses: Vec<FetchStatus>,
}

/// Everything a mirror run did.
#[derive(Debug, Clone, Default)]
pub struct MirrorReport {
    /// Image directory of every requested label.
    pub directories: BTreeMap<String, PathBuf>,
    /// Images queued per label across all splits.
    pub counts: DownloadCounts,
    /// Label batches in processing order.
    pub batches: Vec<LabelBatch>,
}

impl MirrorReport {
    pub fn downloaded(&self, label: &str) -> usize {
        self.statuses(label).filter(|s| s.is_downloaded()).count()
    }

    pub fn failed(&self, label: &str) -> usize {
        self.statuses(label).filter(|s| !s.is_downloaded()).count()
    }

    fn statuses<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a FetchStatus> {
        self.batches
            .iter()
            .filter(move |b| b.label == label)
            .flat_map(|b| b.statuses.iter())
    }
}

/// Client mirroring a filtered subset of Open Images to local disk.
///
/// The client owns the two collaborators the pipeline depends on: a
/// [`TableSource`] for the CSV tables and an [`ObjectStore`] for the images.
/// [`Client::new`] wires both to the public dataset over HTTPS; tests and
/// alternative deployments swap them with [`with_source`][Self::with_source]
/// and [`with_store`][Self::with_store].
///
/// # Examples
///
/// ```no_run
/// use openimages_mirror::Client;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), openimages_mirror::Error> {
/// let client = Client::new()?;
/// let directories = client
///     .download_images(
///         Path::new("./data"),
///         &["Helmet", "Person"],
///         Some(Path::new("./cache")),
///         Some(100),
///         None,
///     )
///     .await?;
///
/// for (label, dir) in &directories {
///     println!("{}: {:?}", label, dir);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    source: Arc<dyn TableSource>,
    fetcher: ImageFetcher,
    endpoints: Endpoints,
    max_tasks: usize,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoints", &self.endpoints)
            .field("max_tasks", &self.max_tasks)
            .finish()
    }
}

impl Client {
    /// Create a client using [`Endpoints::from_env`].
    pub fn new() -> Result<Self, Error> {
        Self::from_endpoints(Endpoints::from_env())
    }

    /// Create a client reading tables and images from `endpoints`.
    pub fn from_endpoints(endpoints: Endpoints) -> Result<Self, Error> {
        let http = build_http_client()?;
        let store =
            PublicBucket::new(http.clone()).with_endpoint(endpoints.s3_endpoint.clone());
        let fetcher = ImageFetcher::new(Arc::new(store)).with_bucket(&endpoints.bucket);

        Ok(Client {
            source: Arc::new(HttpSource::new(http)),
            fetcher,
            endpoints,
            max_tasks: max_tasks(),
        })
    }

    /// Replace the source of the CSV tables.
    pub fn with_source(mut self, source: Arc<dyn TableSource>) -> Self {
        self.source = source;
        self
    }

    /// Replace the store images are fetched from.
    pub fn with_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.fetcher = ImageFetcher::new(store).with_bucket(&self.endpoints.bucket);
        self
    }

    /// Limit the number of concurrent image downloads. `1` downloads images
    /// strictly one after another.
    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks.max(1);
        self
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Full class-description table, cached in `cache_dir` (or the working
    /// directory).
    pub async fn class_descriptions(
        &self,
        cache_dir: Option<&Path>,
    ) -> Result<Vec<ClassDescription>, Error> {
        labels::load_class_descriptions(self.source.as_ref(), &self.endpoints.classes_url, cache_dir)
            .await
    }

    /// Resolve class labels to class codes. Labels absent from the class
    /// table have no entry in the result.
    pub async fn resolve_labels<S: AsRef<str> + std::fmt::Debug>(
        &self,
        class_labels: &[S],
        cache_dir: Option<&Path>,
    ) -> Result<LabelCodes, Error> {
        labels::resolve(
            self.source.as_ref(),
            &self.endpoints.classes_url,
            class_labels,
            cache_dir,
        )
        .await
    }

    /// Load the bounding-box table of one split.
    pub async fn load_split(
        &self,
        split: Split,
        cache_dir: Option<&Path>,
    ) -> Result<SplitLoad, Error> {
        annotations::load_split(
            self.source.as_ref(),
            &self.endpoints.annotations_url(split),
            split,
            cache_dir,
        )
        .await
    }

    /// Download up to `limit` images per label into
    /// `dest_dir/<label>/images`, returning the directory of every label.
    ///
    /// Individual image failures are logged and do not fail the call. See
    /// [`mirror`][Self::mirror] for a report of what was fetched.
    pub async fn download_images<S: AsRef<str> + std::fmt::Debug>(
        &self,
        dest_dir: &Path,
        class_labels: &[S],
        cache_dir: Option<&Path>,
        limit: Option<usize>,
        progress: Option<Sender<Progress>>,
    ) -> Result<BTreeMap<String, PathBuf>, Error> {
        let report = self
            .mirror(dest_dir, class_labels, cache_dir, limit, progress)
            .await?;
        Ok(report.directories)
    }

    /// Mirror the images of `class_labels` into `dest_dir`.
    ///
    /// Splits are processed train, validation, test. Within a split labels
    /// are processed in class-table order and images in ascending image ID
    /// order. With a `limit`, a label's remaining allowance is checked before
    /// each split and the batch truncated to it, so no label ever has more
    /// than `limit` images queued. Every queued image counts towards the
    /// limit whether or not its download succeeds.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingLabel`] if a requested label is not in the class
    ///   table; nothing is created or downloaded in that case.
    /// - Fetch and parse errors of the class or annotation tables.
    /// - I/O errors creating the label directories.
    #[cfg_attr(
        feature = "profiling",
        tracing::instrument(skip_all, fields(dest = ?dest_dir, limit = ?limit))
    )]
    pub async fn mirror<S: AsRef<str> + std::fmt::Debug>(
        &self,
        dest_dir: &Path,
        class_labels: &[S],
        cache_dir: Option<&Path>,
        limit: Option<usize>,
        progress: Option<Sender<Progress>>,
    ) -> Result<MirrorReport, Error> {
        if class_labels.is_empty() {
            return Ok(MirrorReport::default());
        }

        let codes = self.resolve_labels(class_labels, cache_dir).await?;
        let missing = codes.missing(class_labels);
        if !missing.is_empty() {
            return Err(Error::MissingLabel(missing.join(", ")));
        }

        let directories = create_class_directories(dest_dir, &codes)?;
        let mut counts = DownloadCounts::new(codes.labels());
        let mut batches = Vec::new();
        let mut tracker = ProgressTracker::new(progress);

        for split in Split::all() {
            let load = self.load_split(split, cache_dir).await?;
            if load.cache_error.is_some() {
                warn!("Continuing without a cached {} table", split);
            }
            let groups = grouping::group(&load.table, &codes);
            drop(load);

            for (label, _) in codes.iter() {
                let mut image_ids = groups.image_ids(label);

                if let Some(limit) = limit {
                    let remaining = limit.saturating_sub(counts.get(label));
                    if remaining == 0 {
                        debug!("{}: limit of {} reached, skipping {}", label, limit, split);
                        continue;
                    }
                    image_ids.truncate(remaining);
                }

                if image_ids.is_empty() {
                    debug!("{}: no images in {}", label, split);
                    continue;
                }

                info!("{}: downloading {} {} images", label, image_ids.len(), split);
                let dir = directories
                    .get(label)
                    .ok_or_else(|| Error::MissingLabel(label.to_string()))?;
                let statuses = self
                    .fetch_batch(split, &image_ids, dir, &mut tracker)
                    .await?;

                counts.add(label, statuses.len());
                batches.push(LabelBatch {
                    split,
                    label: label.to_string(),
                    statuses,
                });
            }
        }

        Ok(MirrorReport {
            directories,
            counts,
            batches,
        })
    }

    /// Fetch one batch with at most `max_tasks` downloads in flight. Statuses
    /// are returned in `image_ids` order.
    async fn fetch_batch(
        &self,
        split: Split,
        image_ids: &[&str],
        dest_dir: &Path,
        tracker: &mut ProgressTracker,
    ) -> Result<Vec<FetchStatus>, Error> {
        tracker.queue(image_ids.len()).await;
        let sem = Arc::new(Semaphore::new(self.max_tasks));

        let tasks = image_ids
            .iter()
            .map(|image_id| {
                let sem = sem.clone();
                let fetcher = self.fetcher.clone();
                let image_id = image_id.to_string();
                let dest_dir = dest_dir.to_path_buf();
                let current = tracker.current.clone();
                let total = tracker.total;
                let progress = tracker.progress.clone();

                tokio::spawn(async move {
                    let _permit = sem.acquire().await?;
                    let status = fetcher.fetch(split, &image_id, &dest_dir).await;

                    if let Some(progress) = &progress {
                        let current = current.fetch_add(1, Ordering::SeqCst);
                        let _ = progress
                            .send(Progress {
                                current: current + 1,
                                total,
                            })
                            .await;
                    }

                    Ok::<FetchStatus, Error>(status)
                })
            })
            .collect::<Vec<_>>();

        join_all(tasks)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
    }
}

struct ProgressTracker {
    progress: Option<Sender<Progress>>,
    current: Arc<AtomicUsize>,
    total: usize,
}

impl ProgressTracker {
    fn new(progress: Option<Sender<Progress>>) -> Self {
        Self {
            progress,
            current: Arc::new(AtomicUsize::new(0)),
            total: 0,
        }
    }

    async fn queue(&mut self, n: usize) {
        self.total += n;
        if let Some(progress) = &self.progress {
            let _ = progress
                .send(Progress {
                    current: self.current.load(Ordering::SeqCst),
                    total: self.total,
                })
                .await;
        }
    }
}

/// Create `dest_dir/<label>/images` for every resolved label.
fn create_class_directories(
    dest_dir: &Path,
    codes: &LabelCodes,
) -> Result<BTreeMap<String, PathBuf>, Error> {
    let mut directories = BTreeMap::new();
    for label in codes.labels() {
        let dir = dest_dir
            .join(sanitize_path_component(label))
            .join("images");
        std::fs::create_dir_all(&dir)?;
        debug!("{}: images stored in {:?}", label, dir);
        directories.insert(label.to_string(), dir);
    }
    Ok(directories)
}
