// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Retry policy for the HTTP collaborators.
//!
//! The mirror itself never retries: a failed table fetch aborts the run and a
//! failed image fetch is reported and skipped. Transient transport failures
//! are instead absorbed by the reqwest client through the policy built here.
//!
//! Requests are classified by URL into two scopes:
//!
//! - **TableIO**: class-description and bounding-box CSV tables. These are
//!   few, large and required, so every transient failure is retried.
//! - **ImageIO**: individual image objects in the public bucket. The bucket
//!   answers 403 for keys that do not exist, so 403 and 404 are final.
//!
//! # Configuration
//!
//! - `OPENIMAGES_MAX_RETRIES`: Maximum retry attempts per request (default: 3)
//!
//! # Examples
//!
//! ```rust
//! use openimages_mirror::{RetryScope, classify_url};
//!
//! assert_eq!(
//!     classify_url("https://storage.googleapis.com/openimages/v5/class-descriptions-boxable.csv"),
//!     RetryScope::TableIO
//! );
//! assert_eq!(
//!     classify_url("https://open-images-dataset.s3.amazonaws.com/train/000002b66c9c498e.jpg"),
//!     RetryScope::ImageIO
//! );
//! ```

use url::Url;

/// Retry scope classification for URL-based retry policies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryScope {
    /// CSV annotation or class-description tables.
    TableIO,

    /// Image objects fetched from the dataset bucket.
    ImageIO,
}

/// Classifies a URL to determine which retry policy to apply.
///
/// Only the parsed URL path is inspected, so query strings and fragments do
/// not affect the result. Anything whose path does not end in `.csv`
/// (case-insensitive) is treated as an image object, including unparsable
/// URLs.
pub fn classify_url(url: &str) -> RetryScope {
    if let Ok(parsed) = Url::parse(url) {
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return RetryScope::ImageIO;
        }

        if parsed.path().to_ascii_lowercase().ends_with(".csv") {
            return RetryScope::TableIO;
        }
    }

    RetryScope::ImageIO
}

pub(crate) fn max_retries() -> u32 {
    std::env::var("OPENIMAGES_MAX_RETRIES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3)
}

/// Creates a retry policy with URL-based classification.
///
/// | Status | TableIO | ImageIO |
/// |--------|---------|---------|
/// | 401, 403, 404 | final | final |
/// | 408, 429 | retry | retry |
/// | 409, 423 | final | retry |
/// | 5xx | retry | retry |
/// | transport errors | retry | retry |
pub fn create_retry_policy() -> reqwest::retry::Builder {
    reqwest::retry::for_host("*")
        .max_retries_per_request(max_retries())
        .classify_fn(|req_rep| {
            let url = req_rep.uri().to_string();

            match classify_url(&url) {
                RetryScope::TableIO => match req_rep.status() {
                    Some(status) => match status.as_u16() {
                        408 | 429 | 500..=599 => req_rep.retryable(),
                        _ => req_rep.success(),
                    },
                    None if req_rep.error().is_some() => req_rep.retryable(),
                    None => req_rep.success(),
                },
                RetryScope::ImageIO => match req_rep.status() {
                    Some(status) => match status.as_u16() {
                        408 | 409 | 423 | 429 | 500..=599 => req_rep.retryable(),
                        _ => req_rep.success(),
                    },
                    None if req_rep.error().is_some() => req_rep.retryable(),
                    None => req_rep.success(),
                },
            }
        })
}

pub fn log_retry_configuration() {
    let max_retries =
        std::env::var("OPENIMAGES_MAX_RETRIES").unwrap_or_else(|_| "3".to_string());
    let timeout = std::env::var("OPENIMAGES_TIMEOUT").unwrap_or_else(|_| "300".to_string());
    log::debug!(
        "Retry configuration - max_retries={}, timeout={}s",
        max_retries,
        timeout
    );
}
