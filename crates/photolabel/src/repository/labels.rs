//! Read access to collected labels.

use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::ImageRecord;
use super::parse_datetime;
use super::pool::{DbPool, DieselError};
use crate::models::{Cursor, LabelCount, LabelRecord};
use crate::schema::images;
use crate::with_conn;

impl From<ImageRecord> for LabelRecord {
    fn from(record: ImageRecord) -> Self {
        LabelRecord {
            photo_id: record.flickr_id,
            image_path: record.image_path,
            label: record.label,
            user_id: record.user_id,
            search_id: record.search_id,
            position: Cursor::new(
                u32::try_from(record.page_idx).unwrap_or(0),
                u32::try_from(record.image_idx).unwrap_or(0),
            ),
            collected_at: parse_datetime(&record.collected_at),
        }
    }
}

fn to_counts(rows: Vec<(i64, i64)>) -> Vec<LabelCount> {
    rows.into_iter()
        .map(|(key, count)| LabelCount { key, count })
        .collect()
}

/// Queries over the `images` table. Writes go through
/// [`DieselProgressRepository::commit_label`](super::DieselProgressRepository::commit_label).
#[derive(Clone)]
pub struct DieselLabelRepository {
    pool: DbPool,
}

impl DieselLabelRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Total number of labeled photos.
    pub async fn count_labels(&self) -> Result<i64, DieselError> {
        with_conn!(self.pool, conn, {
            images::table.count().get_result(&mut conn).await
        })
    }

    /// Get the label for one photo.
    pub async fn get(&self, photo_id: &str) -> Result<Option<LabelRecord>, DieselError> {
        with_conn!(self.pool, conn, {
            images::table
                .find(photo_id)
                .first::<ImageRecord>(&mut conn)
                .await
                .optional()
                .map(|record| record.map(LabelRecord::from))
        })
    }

    /// Label counts keyed by label value.
    pub async fn label_counts(&self) -> Result<Vec<LabelCount>, DieselError> {
        with_conn!(self.pool, conn, {
            images::table
                .group_by(images::label)
                .select((images::label, count_star()))
                .order(images::label)
                .load::<(i64, i64)>(&mut conn)
                .await
                .map(to_counts)
        })
    }

    /// Label counts keyed by user id.
    pub async fn user_counts(&self) -> Result<Vec<LabelCount>, DieselError> {
        with_conn!(self.pool, conn, {
            images::table
                .group_by(images::user_id)
                .select((images::user_id, count_star()))
                .order(images::user_id)
                .load::<(i64, i64)>(&mut conn)
                .await
                .map(to_counts)
        })
    }

    /// Labels in collection order, optionally restricted to one search.
    pub async fn list_labels(&self, search_id: Option<i32>) -> Result<Vec<LabelRecord>, DieselError> {
        with_conn!(self.pool, conn, {
            let mut query = images::table.into_boxed();
            if let Some(id) = search_id {
                query = query.filter(images::search_id.eq(id));
            }
            query
                .order((images::collected_at.asc(), images::flickr_id.asc()))
                .load::<ImageRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(LabelRecord::from).collect())
        })
    }
}
