//! Label export command.

use std::path::Path;

use chrono::Utc;
use console::style;

use photolabel::config::Settings;
use photolabel::services::LabelExporter;
use photolabel::storage::mirrors_from_settings;

/// Write the label CSV to a file or stdout, and optionally back it up remotely.
pub async fn cmd_export(
    settings: &Settings,
    search_id: Option<i32>,
    output: Option<&Path>,
    backup: bool,
) -> anyhow::Result<()> {
    let repos = settings.repositories()?;
    let exporter = LabelExporter::new(repos.labels.clone());

    let (csv, rows) = exporter.render_csv(search_id).await?;
    match output {
        Some(path) => {
            tokio::fs::write(path, csv.as_bytes()).await?;
            eprintln!(
                "{} Exported {} labels to {}",
                style("✓").green(),
                rows,
                path.display()
            );
        }
        None => print!("{}", csv),
    }

    if backup {
        let (_, remote) = mirrors_from_settings(settings)?;
        let Some(remote) = remote else {
            return Err(anyhow::anyhow!(
                "No remote mirror configured (set [mirror.gcs] or GCP_BUCKET)"
            ));
        };
        let refs = exporter.backup(remote.as_ref(), Utc::now()).await?;
        eprintln!(
            "{} Backed up {} labels to {}",
            style("✓").green(),
            refs.rows,
            refs.snapshot
        );
    }

    Ok(())
}
