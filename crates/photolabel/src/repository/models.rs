//! Diesel ORM models for database tables.

use diesel::prelude::*;

use crate::schema;

/// Search record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::searches)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SearchRecord {
    pub id: i32,
    pub query: String,
    pub per_page: i32,
    pub recency_bound: i64,
    pub last_page_idx: i32,
    pub last_image_idx: i32,
    pub first_search_time: String,
    pub last_search_time: String,
}

/// New search for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::searches)]
pub struct NewSearch<'a> {
    pub query: &'a str,
    pub per_page: i32,
    pub recency_bound: i64,
    pub last_page_idx: i32,
    pub last_image_idx: i32,
    pub first_search_time: &'a str,
    pub last_search_time: &'a str,
}

/// Labeled image record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::images)]
#[diesel(primary_key(flickr_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ImageRecord {
    pub flickr_id: String,
    pub image_path: String,
    pub label: i64,
    pub user_id: i64,
    pub search_id: i32,
    pub page_idx: i32,
    pub image_idx: i32,
    pub collected_at: String,
}

/// New labeled image for insertion.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = schema::images)]
pub struct NewImage {
    pub flickr_id: String,
    pub image_path: String,
    pub label: i64,
    pub user_id: i64,
    pub search_id: i32,
    pub page_idx: i32,
    pub image_idx: i32,
    pub collected_at: String,
}
