// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Resolution of human-readable class labels to dataset class codes.

use crate::{Error, cache::persist_atomic, source::TableSource};
use log::{debug, info, warn};
use serde::Deserialize;
use std::{collections::HashSet, io::Write as _, path::Path};

/// File name of the cached class-description table.
pub const CLASS_DESCRIPTIONS_FILE: &str = "class-descriptions-boxable.csv";

/// A row of the class-description table.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ClassDescription {
    /// Dataset class code, e.g. `/m/0zvk5`.
    pub code: String,
    /// Human-readable label, e.g. `Helmet`.
    pub label: String,
}

/// Mapping of requested labels to class codes.
///
/// Entries keep the row order of the class-description table, which is the
/// order labels are processed in by the downloader.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelCodes {
    entries: Vec<(String, String)>,
}

impl LabelCodes {
    /// Build from `(label, code)` pairs. Later duplicates of a label are
    /// ignored.
    pub fn from_pairs<I, L, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (L, C)>,
        L: Into<String>,
        C: Into<String>,
    {
        let mut codes = LabelCodes::default();
        for (label, code) in pairs {
            let label = label.into();
            if codes.code(&label).is_none() {
                codes.entries.push((label, code.into()));
            }
        }
        codes
    }

    /// Class code for `label`, if it was resolved.
    pub fn code(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, c)| c.as_str())
    }

    /// `(label, code)` pairs in resolution order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(l, c)| (l.as_str(), c.as_str()))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Requested labels that have no class code, in request order.
    pub fn missing<'a, S: AsRef<str>>(&self, requested: &'a [S]) -> Vec<&'a str> {
        requested
            .iter()
            .map(|s| s.as_ref())
            .filter(|label| self.code(label).is_none())
            .collect()
    }
}

/// Parse the header-less `code,label` class-description table.
pub fn parse_class_descriptions(data: &[u8]) -> Result<Vec<ClassDescription>, Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(data);

    let mut rows = Vec::new();
    for record in rdr.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

/// Load the class-description table from `cache_dir`, or fetch it from `url`
/// and store it there.
///
/// Without a `cache_dir` the working directory is used. A failure to write
/// the cache is logged and does not fail the load.
pub async fn load_class_descriptions(
    source: &dyn TableSource,
    url: &str,
    cache_dir: Option<&Path>,
) -> Result<Vec<ClassDescription>, Error> {
    load_class_descriptions_in(source, url, cache_dir, Path::new(".")).await
}

async fn load_class_descriptions_in(
    source: &dyn TableSource,
    url: &str,
    cache_dir: Option<&Path>,
    working_dir: &Path,
) -> Result<Vec<ClassDescription>, Error> {
    let path = cache_dir
        .unwrap_or(working_dir)
        .join(CLASS_DESCRIPTIONS_FILE);

    if path.exists() {
        debug!("Loading class descriptions from cache {:?}", path);
        let data = tokio::fs::read(&path).await?;
        return parse_class_descriptions(&data);
    }

    info!("Fetching class descriptions from {}", url);
    let data = source.fetch(url).await?;
    let classes = parse_class_descriptions(&data)?;

    if let Err(e) = persist_atomic(&path, |file| {
        file.write_all(&data)?;
        Ok(())
    }) {
        warn!("Failed to cache class descriptions at {:?}: {}", path, e);
    }

    Ok(classes)
}

/// Select the codes of the requested labels from a class table.
///
/// The result holds exactly the requested labels that appear in `classes`.
/// If a label appears more than once the first row wins.
pub fn select_codes<S: AsRef<str>>(classes: &[ClassDescription], requested: &[S]) -> LabelCodes {
    let wanted: HashSet<&str> = requested.iter().map(|s| s.as_ref()).collect();
    let mut pairs = Vec::new();
    let mut seen = HashSet::new();

    for class in classes {
        if !wanted.contains(class.label.as_str()) {
            continue;
        }
        if seen.insert(class.label.as_str()) {
            pairs.push((class.label.as_str(), class.code.as_str()));
        } else {
            warn!(
                "Class label {:?} listed more than once, ignoring code {}",
                class.label, class.code
            );
        }
    }

    LabelCodes::from_pairs(pairs)
}

/// Resolve `class_labels` to class codes.
#[cfg_attr(feature = "profiling", tracing::instrument(skip(source)))]
pub async fn resolve<S: AsRef<str> + std::fmt::Debug>(
    source: &dyn TableSource,
    url: &str,
    class_labels: &[S],
    cache_dir: Option<&Path>,
) -> Result<LabelCodes, Error> {
    let classes = load_class_descriptions(source, url, cache_dir).await?;
    let codes = select_codes(&classes, class_labels);
    debug!("Resolved {} of {} labels", codes.len(), class_labels.len());
    Ok(codes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const CLASSES: &str = "\
/m/011k07,Tortoise
/m/abc,Helmet
/m/0zvk5,Helmet
/m/01g317,Person
/m/0k4j,\"Car, sedan\"
";

    struct StaticSource {
        body: Result<&'static str, u16>,
        calls: AtomicUsize,
    }

    impl StaticSource {
        fn ok(body: &'static str) -> Self {
            Self {
                body: Ok(body),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TableSource for StaticSource {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.body {
                Ok(body) => Ok(body.as_bytes().to_vec()),
                Err(status) => Err(Error::FetchError {
                    url: url.to_string(),
                    status,
                }),
            }
        }
    }

    fn classes() -> Vec<ClassDescription> {
        parse_class_descriptions(CLASSES.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_class_descriptions() {
        let classes = classes();
        assert_eq!(classes.len(), 5);
        assert_eq!(classes[0].code, "/m/011k07");
        assert_eq!(classes[0].label, "Tortoise");
        assert_eq!(classes[4].label, "Car, sedan");
    }

    #[test]
    fn test_select_codes_single_label() {
        let codes = select_codes(&classes(), &["Tortoise"]);
        assert_eq!(codes, LabelCodes::from_pairs([("Tortoise", "/m/011k07")]));
    }

    #[test]
    fn test_select_codes_is_intersection() {
        let requested = ["Person", "Unicorn", "Tortoise"];
        let codes = select_codes(&classes(), &requested);

        // Table order, not request order
        assert_eq!(codes.labels().collect::<Vec<_>>(), ["Tortoise", "Person"]);
        assert_eq!(codes.code("Person"), Some("/m/01g317"));
        assert_eq!(codes.code("Unicorn"), None);
        assert_eq!(codes.missing(&requested), ["Unicorn"]);
    }

    #[test]
    fn test_select_codes_duplicate_label_first_wins() {
        let codes = select_codes(&classes(), &["Helmet"]);
        assert_eq!(codes.len(), 1);
        assert_eq!(codes.code("Helmet"), Some("/m/abc"));
    }

    #[test]
    fn test_select_codes_is_case_sensitive() {
        let codes = select_codes(&classes(), &["helmet"]);
        assert!(codes.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_caches_table() {
        let dir = TempDir::new().unwrap();
        let source = StaticSource::ok("/m/abc,Helmet\n");

        let codes = resolve(&source, "http://host/classes.csv", &["Helmet"], Some(dir.path()))
            .await
            .unwrap();
        assert_eq!(codes, LabelCodes::from_pairs([("Helmet", "/m/abc")]));
        assert_eq!(
            std::fs::read_to_string(dir.path().join(CLASS_DESCRIPTIONS_FILE)).unwrap(),
            "/m/abc,Helmet\n"
        );

        let again = resolve(&source, "http://host/classes.csv", &["Helmet"], Some(dir.path()))
            .await
            .unwrap();
        assert_eq!(again, codes);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolve_fetch_failure() {
        let dir = TempDir::new().unwrap();
        let source = StaticSource {
            body: Err(404),
            calls: AtomicUsize::new(0),
        };

        let result = resolve(&source, "http://host/classes.csv", &["Helmet"], Some(dir.path())).await;
        assert!(matches!(result, Err(Error::FetchError { status: 404, .. })));
        assert!(!dir.path().join(CLASS_DESCRIPTIONS_FILE).exists());
    }

    #[tokio::test]
    async fn test_class_table_defaults_to_working_dir() {
        let working = TempDir::new().unwrap();
        let source = StaticSource::ok("/m/abc,Helmet\n");

        let first = load_class_descriptions_in(&source, "http://host/classes.csv", None, working.path())
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(working.path().join(CLASS_DESCRIPTIONS_FILE)).unwrap(),
            "/m/abc,Helmet\n"
        );

        let second = load_class_descriptions_in(&source, "http://host/classes.csv", None, working.path())
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_dir_overrides_working_dir() {
        let working = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        let source = StaticSource::ok("/m/abc,Helmet\n");

        load_class_descriptions_in(
            &source,
            "http://host/classes.csv",
            Some(cache.path()),
            working.path(),
        )
        .await
        .unwrap();

        assert!(cache.path().join(CLASS_DESCRIPTIONS_FILE).exists());
        assert!(!working.path().join(CLASS_DESCRIPTIONS_FILE).exists());
    }
}
