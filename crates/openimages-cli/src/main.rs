// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use log::debug;
use openimages_mirror::{ClassDescription, Client, Error, Progress};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory for the cached class and annotation tables.  Defaults to the
    /// user cache directory.
    #[clap(long, env = "OPENIMAGES_CACHE_DIR", global = true)]
    cache_dir: Option<PathBuf>,

    /// Do not cache tables; every run fetches them again.
    #[clap(long, global = true, conflicts_with = "cache_dir")]
    no_cache: bool,

    /// Mirror Command
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// Download the images of the given class labels from the train,
    /// validation and test splits into OUTPUT/<label>/images.
    Download {
        /// Destination directory
        #[clap(long, short)]
        output: PathBuf,

        /// Comma-separated class labels, for example "Helmet,Person"
        #[clap(long, short, value_delimiter = ',', required = true)]
        labels: Vec<String>,

        /// Maximum number of images per label across all splits
        #[clap(long)]
        limit: Option<usize>,
    },
    /// List the class labels available in the dataset.
    Labels {
        /// Filter labels by name
        #[clap(long)]
        name: Option<String>,
    },
}

fn default_cache_dir() -> Result<PathBuf, Error> {
    let dir = ProjectDirs::from("ai", "EdgeFirst", "OpenImages Mirror")
        .ok_or_else(|| {
            Error::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine user cache directory",
            ))
        })?
        .cache_dir()
        .to_path_buf();
    Ok(dir)
}

/// Keep descriptions whose label contains `filter` (case-insensitive), exact
/// matches first then shorter labels.
fn filter_and_sort_by_label(
    classes: Vec<ClassDescription>,
    filter: &str,
) -> Vec<ClassDescription> {
    let filter_lower = filter.to_lowercase();
    let mut filtered: Vec<ClassDescription> = classes
        .into_iter()
        .filter(|c| c.label.to_lowercase().contains(&filter_lower))
        .collect();

    filtered.sort_by(|a, b| {
        let exact_a = a.label == filter;
        let exact_b = b.label == filter;
        if exact_a != exact_b {
            return exact_b.cmp(&exact_a);
        }

        let exact_ci_a = a.label.to_lowercase() == filter_lower;
        let exact_ci_b = b.label.to_lowercase() == filter_lower;
        if exact_ci_a != exact_ci_b {
            return exact_ci_b.cmp(&exact_ci_a);
        }

        a.label
            .len()
            .cmp(&b.label.len())
            .then_with(|| a.label.cmp(&b.label))
    });

    filtered
}

async fn handle_download(
    client: &Client,
    output: PathBuf,
    labels: Vec<String>,
    cache_dir: Option<PathBuf>,
    limit: Option<usize>,
) -> Result<(), Error> {
    use indicatif::{ProgressBar, ProgressStyle};
    use tokio::sync::mpsc;

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise} ETA: {eta}] {msg}: {wide_bar:.yellow} {human_pos}/{human_len}",
        )
        .unwrap()
        .progress_chars("█▇▆▅▄▃▂▁  "),
    );
    bar.set_message("Downloading images");

    let (tx, mut rx) = mpsc::channel::<Progress>(1);

    let progress = tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            if progress.total > 0 {
                bar.set_length(progress.total as u64);
                bar.set_position(progress.current as u64);
            }
        }
        bar.finish_and_clear();
    });

    let report = client
        .mirror(&output, &labels, cache_dir.as_deref(), limit, Some(tx))
        .await?;
    progress.await?;

    for (label, dir) in &report.directories {
        println!(
            "{}: {} downloaded, {} failed, {}",
            label,
            report.downloaded(label),
            report.failed(label),
            dir.display()
        );
    }
    Ok(())
}

async fn handle_labels(
    client: &Client,
    cache_dir: Option<PathBuf>,
    name: Option<String>,
) -> Result<(), Error> {
    let classes = client.class_descriptions(cache_dir.as_deref()).await?;
    let classes = match name {
        Some(name) => filter_and_sort_by_label(classes, &name),
        None => classes,
    };

    for class in classes {
        println!("{} {}", class.code, class.label);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let client = Client::new()?;

    let cache_dir = match (args.no_cache, args.cache_dir) {
        (true, _) => None,
        (false, Some(dir)) => Some(dir),
        (false, None) => Some(default_cache_dir()?),
    };
    debug!("Table cache: {:?}", cache_dir);

    match args.cmd {
        Command::Download {
            output,
            labels,
            limit,
        } => handle_download(&client, output, labels, cache_dir, limit).await,
        Command::Labels { name } => handle_labels(&client, cache_dir, name).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(code: &str, label: &str) -> ClassDescription {
        ClassDescription {
            code: code.to_string(),
            label: label.to_string(),
        }
    }

    fn labels(classes: &[ClassDescription]) -> Vec<&str> {
        classes.iter().map(|c| c.label.as_str()).collect()
    }

    #[test]
    fn test_filter_and_sort_by_label() {
        let classes = vec![
            class("/m/1", "Bicycle helmet"),
            class("/m/2", "Person"),
            class("/m/3", "Football helmet"),
            class("/m/4", "helmet"),
            class("/m/5", "Helmet"),
        ];

        let filtered = filter_and_sort_by_label(classes, "Helmet");
        assert_eq!(
            labels(&filtered),
            ["Helmet", "helmet", "Bicycle helmet", "Football helmet"]
        );
    }

    #[test]
    fn test_filter_and_sort_by_label_no_match() {
        let classes = vec![class("/m/2", "Person")];
        assert!(filter_and_sort_by_label(classes, "tortoise").is_empty());
    }

    #[test]
    fn test_args_download() {
        let args = Args::parse_from([
            "openimages-mirror",
            "download",
            "--output",
            "/tmp/mirror",
            "--labels",
            "Helmet,Traffic light",
            "--limit",
            "10",
        ]);

        assert!(!args.no_cache);
        assert_eq!(
            args.cmd,
            Command::Download {
                output: PathBuf::from("/tmp/mirror"),
                labels: vec!["Helmet".to_string(), "Traffic light".to_string()],
                limit: Some(10),
            }
        );
    }

    #[test]
    fn test_args_cache_conflict() {
        let result = Args::try_parse_from([
            "openimages-mirror",
            "labels",
            "--cache-dir",
            "/tmp/cache",
            "--no-cache",
        ]);
        assert!(result.is_err());
    }
}
