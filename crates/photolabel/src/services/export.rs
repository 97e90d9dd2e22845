//! CSV export of label records, with timestamped backups to a mirror.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::models::LabelRecord;
use crate::repository::{DieselError, DieselLabelRepository};
use crate::storage::{FileMirror, StorageError};

pub const CSV_HEADER: &str =
    "flickr_id,image_path,label,user_id,search_id,page_idx,image_idx,collected_at";

/// Logical path of the rolling export.
pub const LATEST_EXPORT_PATH: &str = "labels/images.csv";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("database error: {0}")]
    Database(#[from] DieselError),

    #[error("mirror error: {0}")]
    Storage(#[from] StorageError),
}

/// Where a backup landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRefs {
    pub latest: String,
    pub snapshot: String,
    pub rows: usize,
}

pub struct LabelExporter {
    labels: DieselLabelRepository,
}

impl LabelExporter {
    pub fn new(labels: DieselLabelRepository) -> Self {
        Self { labels }
    }

    /// Render label records as CSV, optionally limited to one search.
    pub async fn render_csv(&self, search_id: Option<i32>) -> Result<(String, usize), ExportError> {
        let records = self.labels.list_labels(search_id).await?;
        Ok((to_csv(&records), records.len()))
    }

    /// Store the full export at the rolling path and at a dated snapshot path.
    pub async fn backup(
        &self,
        mirror: &dyn FileMirror,
        now: DateTime<Utc>,
    ) -> Result<BackupRefs, ExportError> {
        let (csv, rows) = self.render_csv(None).await?;
        let latest = mirror.store(csv.as_bytes(), LATEST_EXPORT_PATH).await?;
        let snapshot = mirror.store(csv.as_bytes(), &snapshot_path(now)).await?;

        info!("Backed up {} labels to {} ({})", rows, mirror.name(), snapshot);
        Ok(BackupRefs {
            latest,
            snapshot,
            rows,
        })
    }
}

/// `labels/{Y}/{M}/{D}/{YYYYmmddTHHMMSS}_images.csv`
pub fn snapshot_path(now: DateTime<Utc>) -> String {
    format!(
        "labels/{}/{}_images.csv",
        now.format("%Y/%m/%d"),
        now.format("%Y%m%dT%H%M%S")
    )
}

fn to_csv(records: &[LabelRecord]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for r in records {
        let row = [
            escape_csv(&r.photo_id),
            escape_csv(&r.image_path),
            r.label.to_string(),
            r.user_id.to_string(),
            r.search_id.to_string(),
            r.position.page_idx.to_string(),
            r.position.image_idx.to_string(),
            r.collected_at.to_rfc3339(),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::Cursor;
    use crate::repository::{run_migrations, DbContext};
    use crate::testing::MemoryMirror;

    async fn setup() -> (DbContext, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("export.db").display());
        run_migrations(&url).await.unwrap();
        (DbContext::from_url(&url).unwrap(), dir)
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_snapshot_path() {
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(
            snapshot_path(now),
            "labels/2024/03/07/20240307T090501_images.csv"
        );
    }

    #[tokio::test]
    async fn test_render_and_backup() {
        let (ctx, _dir) = setup().await;
        let progress = ctx.progress();
        let cats = progress.resolve_or_create_search("cats", 2, 0).await.unwrap();
        let dogs = progress.resolve_or_create_search("dogs", 2, 0).await.unwrap();
        progress
            .commit_label(1, "A", "cats/images/A,1.jpg", 1, &cats, Cursor::START)
            .await
            .unwrap();
        progress
            .commit_label(2, "Z", "dogs/images/Z.jpg", 0, &dogs, Cursor::new(0, 1))
            .await
            .unwrap();

        let exporter = LabelExporter::new(ctx.labels());
        let (csv, rows) = exporter.render_csv(Some(cats.id)).await.unwrap();
        assert_eq!(rows, 1);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].starts_with(&format!("A,\"cats/images/A,1.jpg\",1,1,{},0,0,", cats.id)));

        let mirror = MemoryMirror::new("gcs");
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        let refs = exporter.backup(&mirror, now).await.unwrap();

        assert_eq!(refs.rows, 2);
        assert_eq!(
            mirror.paths(),
            vec![
                "labels/2024/03/07/20240307T090501_images.csv".to_string(),
                LATEST_EXPORT_PATH.to_string(),
            ]
        );
        let stored = mirror.retrieve(LATEST_EXPORT_PATH).await.unwrap();
        assert_eq!(String::from_utf8(stored).unwrap().lines().count(), 3);
    }
}
