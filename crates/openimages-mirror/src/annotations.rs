// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Per-split bounding-box tables and their on-disk cache.
//!
//! Each Open Images split publishes a `<split>-annotations-bbox.csv` table
//! with one row per annotated object:
//!
//! ```text
//! ImageID,Source,LabelName,Confidence,XMin,XMax,YMin,YMax,IsOccluded,IsTruncated,IsGroupOf,IsDepiction,IsInside
//! 000002b66c9c498e,xclick,/m/01g317,1,0.012500,0.195312,0.148438,0.587500,0,1,0,0,0
//! ```
//!
//! Only the image identifier, the class code and the box coordinates matter
//! for selecting images, so the quality and provenance columns are dropped
//! while parsing. The cache file holds that projected table.

use crate::{Error, cache::persist_atomic, source::TableSource};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    fmt::Display,
    io::BufReader,
    path::{Path, PathBuf},
    str::FromStr,
};
use tempfile::NamedTempFile;

/// One of the fixed dataset partitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Split {
    Train,
    Validation,
    Test,
}

impl Split {
    /// All splits in processing order.
    pub fn all() -> [Split; 3] {
        [Split::Train, Split::Validation, Split::Test]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Validation => "validation",
            Split::Test => "test",
        }
    }

    /// Name of the cached table for this split.
    pub fn cache_file_name(&self) -> String {
        format!("{}-annotations-bbox.csv", self.as_str())
    }
}

impl Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Split::Train),
            "validation" => Ok(Split::Validation),
            "test" => Ok(Split::Test),
            other => Err(Error::InvalidSplit(other.to_string())),
        }
    }
}

/// A single bounding-box observation with coordinates normalized to `[0, 1]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(rename = "ImageID")]
    pub image_id: String,
    /// Class code of the annotated object, e.g. `/m/0zvk5`.
    #[serde(rename = "LabelName")]
    pub label_name: String,
    #[serde(rename = "XMin")]
    pub x_min: f32,
    #[serde(rename = "XMax")]
    pub x_max: f32,
    #[serde(rename = "YMin")]
    pub y_min: f32,
    #[serde(rename = "YMax")]
    pub y_max: f32,
}

/// The projected bounding-box table of one split, in source row order.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitTable {
    split: Split,
    rows: Vec<Annotation>,
}

impl SplitTable {
    pub fn new(split: Split, rows: Vec<Annotation>) -> Self {
        Self { split, rows }
    }

    pub fn split(&self) -> Split {
        self.split
    }

    pub fn rows(&self) -> &[Annotation] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Where a [`SplitTable`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableOrigin {
    Cache,
    Source,
}

/// Result of [`load_split`].
///
/// A failure to write the cache does not discard the table that was fetched;
/// it is reported in `cache_error` instead.
#[derive(Debug)]
pub struct SplitLoad {
    pub table: SplitTable,
    pub origin: TableOrigin,
    pub cache_error: Option<Error>,
}

/// Parse a headered bounding-box table, keeping only the columns of
/// [`Annotation`].
pub fn parse_annotations<R: std::io::Read>(reader: R) -> Result<Vec<Annotation>, Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in rdr.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

/// Write `rows` as a headered CSV table.
pub fn write_annotations<W: std::io::Write>(writer: W, rows: &[Annotation]) -> Result<(), Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Load the bounding-box table of `split`.
///
/// When `cache_dir` holds `<split>-annotations-bbox.csv` it is parsed without
/// touching `source`. Otherwise the table is downloaded from `url` into a
/// scratch file in the system temporary directory, parsed from there,
/// projected, and written to the cache directory (if any) before being
/// returned.
///
/// A fetch or parse failure is returned as an error and leaves the cache
/// untouched.
#[cfg_attr(feature = "profiling", tracing::instrument(skip(source)))]
pub async fn load_split(
    source: &dyn TableSource,
    url: &str,
    split: Split,
    cache_dir: Option<&Path>,
) -> Result<SplitLoad, Error> {
    let cache_file = cache_dir.map(|dir| dir.join(split.cache_file_name()));

    if let Some(path) = cache_file.as_ref().filter(|p| p.exists()) {
        debug!("Loading {} annotations from cache {:?}", split, path);
        let path = path.clone();
        let rows = tokio::task::spawn_blocking(move || {
            parse_annotations(BufReader::new(std::fs::File::open(path)?))
        })
        .await??;
        return Ok(SplitLoad {
            table: SplitTable::new(split, rows),
            origin: TableOrigin::Cache,
            cache_error: None,
        });
    }

    info!("Fetching {} annotations from {}", split, url);
    let scratch = NamedTempFile::new()?;
    source.download(url, scratch.path()).await?;
    let rows = tokio::task::spawn_blocking(move || {
        let file = scratch.reopen()?;
        parse_annotations(BufReader::new(file))
    })
    .await??;
    let table = SplitTable::new(split, rows);
    info!("Loaded {} {} annotations", table.len(), split);

    let (table, cache_error) = match cache_file {
        Some(path) => store_split(path, table).await?,
        None => (table, None),
    };

    Ok(SplitLoad {
        table,
        origin: TableOrigin::Source,
        cache_error,
    })
}

async fn store_split(
    path: PathBuf,
    table: SplitTable,
) -> Result<(SplitTable, Option<Error>), Error> {
    let (table, result) = tokio::task::spawn_blocking(move || {
        let result = persist_atomic(&path, |file| {
            write_annotations(std::io::BufWriter::new(file), table.rows())
        });
        if let Err(e) = &result {
            warn!("Failed to cache {} annotations at {:?}: {}", table.split(), path, e);
        }
        (table, result)
    })
    .await?;

    Ok((table, result.err()))
}

/// Create a DataFrame from a split table.
///
/// Columns are `image_id`, `label_name`, `x_min`, `x_max`, `y_min` and
/// `y_max`, one row per annotation in table order.
#[cfg(feature = "polars")]
pub fn annotations_dataframe(table: &SplitTable) -> Result<polars::prelude::DataFrame, Error> {
    use polars::prelude::{DataFrame, NamedFrom, Series};

    let rows = table.rows();
    let image_ids: Vec<&str> = rows.iter().map(|r| r.image_id.as_str()).collect();
    let label_names: Vec<&str> = rows.iter().map(|r| r.label_name.as_str()).collect();
    let x_min: Vec<f32> = rows.iter().map(|r| r.x_min).collect();
    let x_max: Vec<f32> = rows.iter().map(|r| r.x_max).collect();
    let y_min: Vec<f32> = rows.iter().map(|r| r.y_min).collect();
    let y_max: Vec<f32> = rows.iter().map(|r| r.y_max).collect();

    let image_ids = Series::new("image_id".into(), image_ids).into();
    let label_names = Series::new("label_name".into(), label_names).into();
    let x_min = Series::new("x_min".into(), x_min).into();
    let x_max = Series::new("x_max".into(), x_max).into();
    let y_min = Series::new("y_min".into(), y_min).into();
    let y_max = Series::new("y_max".into(), y_max).into();

    Ok(DataFrame::new(vec![
        image_ids,
        label_names,
        x_min,
        x_max,
        y_min,
        y_max,
    ])?)
}
