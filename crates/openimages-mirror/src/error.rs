// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use tokio::sync::AcquireError;

/// Error type for Open Images mirror operations.
///
/// Failures while resolving labels or loading annotation tables are fatal for
/// a run and surface through this type. Individual image download failures
/// never do; they are reported as [`FetchStatus::Failed`][crate::FetchStatus]
/// instead.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred during file or directory operations.
    IoError(std::io::Error),
    /// HTTP request error from the reqwest client.
    HttpError(reqwest::Error),
    /// The table source answered with a non-success status.
    FetchError { url: String, status: u16 },
    /// CSV parsing or writing error.
    CsvError(csv::Error),
    /// URL parsing error.
    UrlParseError(url::ParseError),
    /// Semaphore acquisition error for concurrent image fetches.
    SemaphoreError(AcquireError),
    /// Async task join error.
    JoinError(tokio::task::JoinError),
    /// One or more requested labels are not present in the class table.
    MissingLabel(String),
    /// Unknown dataset split name.
    InvalidSplit(String),
    /// Invalid parameters provided to an operation.
    InvalidParameters(String),
    /// Polars dataframe operation error (only with "polars" feature).
    #[cfg(feature = "polars")]
    PolarsError(polars::error::PolarsError),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::HttpError(err)
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::CsvError(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::UrlParseError(err)
    }
}

impl From<AcquireError> for Error {
    fn from(err: AcquireError) -> Self {
        Error::SemaphoreError(err)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::JoinError(err)
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::IoError(err.error)
    }
}

#[cfg(feature = "polars")]
impl From<polars::error::PolarsError> for Error {
    fn from(err: polars::error::PolarsError) -> Self {
        Error::PolarsError(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::HttpError(e) => write!(f, "HTTP error: {}", e),
            Error::FetchError { url, status } => {
                write!(f, "Fetch of {} failed with status {}", url, status)
            }
            Error::CsvError(e) => write!(f, "CSV error: {}", e),
            Error::UrlParseError(e) => write!(f, "URL parse error: {}", e),
            Error::SemaphoreError(e) => write!(f, "Semaphore error: {}", e),
            Error::JoinError(e) => write!(f, "Task join error: {}", e),
            Error::MissingLabel(s) => write!(f, "Missing label: {}", s),
            Error::InvalidSplit(s) => write!(f, "Invalid split: {}", s),
            Error::InvalidParameters(s) => write!(f, "Invalid parameters: {}", s),
            #[cfg(feature = "polars")]
            Error::PolarsError(e) => write!(f, "Polars error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            Error::HttpError(e) => Some(e),
            Error::CsvError(e) => Some(e),
            Error::UrlParseError(e) => Some(e),
            Error::SemaphoreError(e) => Some(e),
            Error::JoinError(e) => Some(e),
            #[cfg(feature = "polars")]
            Error::PolarsError(e) => Some(e),
            _ => None,
        }
    }
}
