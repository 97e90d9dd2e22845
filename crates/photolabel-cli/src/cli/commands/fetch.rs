//! Download photos for a search without labeling them.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use photolabel::config::Settings;
use photolabel::models::{normalize_query, Cursor, Search};
use photolabel::services::labeling::PhotoStream;
use photolabel::services::ImageDownloader;
use photolabel::source::{FlickrClient, ImageSource};
use photolabel::storage::LocalMirror;

/// Walk the first `count` results of `query` and save them under `output`.
///
/// Nothing is recorded in the database: the walk always starts at the
/// first page and no cursor moves.
pub async fn cmd_fetch(
    settings: &Settings,
    query: &str,
    count: usize,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let text = normalize_query(query);
    if text.is_empty() {
        return Err(anyhow::anyhow!("Search text is empty"));
    }

    let output = output.unwrap_or_else(|| settings.images_dir.clone());
    tokio::fs::create_dir_all(&output).await?;

    let source: Arc<dyn ImageSource> = Arc::new(FlickrClient::from_settings(settings)?);
    let downloader = ImageDownloader::new(
        source.clone(),
        Arc::new(LocalMirror::new(&output)),
        None,
        settings.labeling.preferred_size.clone(),
    );

    let now = Utc::now();
    let search = Search {
        id: 0,
        query: text,
        page_size: settings.labeling.page_size,
        recency_bound: settings.labeling.recency_bound(now),
        cursor: Cursor::START,
        first_search_time: now,
        last_search_time: now,
    };
    let mut stream = PhotoStream::new(source, &search);

    let pb = ProgressBar::new(count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len}")?
            .progress_chars("█▓░"),
    );
    pb.set_message(search.query.clone());

    let mut saved = 0usize;
    let mut failed = 0usize;
    while saved < count {
        let Some(photo) = stream.next().await? else {
            break;
        };
        match downloader.fetch(&photo, &search.session_dir()).await {
            Ok(candidate) => {
                saved += 1;
                pb.inc(1);
                pb.set_message(candidate.photo_id);
            }
            Err(e) => {
                failed += 1;
                pb.println(format!(
                    "  {} {} at {}: {}",
                    style("✗").red(),
                    photo.photo_id,
                    photo.position,
                    e
                ));
            }
        }
    }
    pb.finish_and_clear();

    println!(
        "{} Saved {} photos for '{}' to {}",
        style("✓").green(),
        saved,
        search.query,
        output.join(search.session_dir()).display()
    );
    if failed > 0 {
        println!("  {} {} downloads failed", style("!").yellow(), failed);
    }
    if saved < count && stream.is_exhausted() {
        println!("  {} The search has no more results", style("!").yellow());
    }

    Ok(())
}
