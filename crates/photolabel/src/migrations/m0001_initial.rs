use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0001_initial_schema")
        // searches - backend-specific due to SERIAL vs AUTOINCREMENT
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    r#"CREATE TABLE IF NOT EXISTS searches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query TEXT NOT NULL UNIQUE,
    per_page INTEGER NOT NULL,
    recency_bound INTEGER NOT NULL,
    last_page_idx INTEGER NOT NULL DEFAULT 0,
    last_image_idx INTEGER NOT NULL DEFAULT 0,
    first_search_time TEXT NOT NULL,
    last_search_time TEXT NOT NULL
)"#,
                )
                .for_backend(
                    "postgres",
                    r#"CREATE TABLE IF NOT EXISTS searches (
    id SERIAL PRIMARY KEY,
    query TEXT NOT NULL UNIQUE,
    per_page INTEGER NOT NULL,
    recency_bound BIGINT NOT NULL,
    last_page_idx INTEGER NOT NULL DEFAULT 0,
    last_image_idx INTEGER NOT NULL DEFAULT 0,
    first_search_time TEXT NOT NULL,
    last_search_time TEXT NOT NULL
)"#,
                ),
        )
        // images - one row per labeled photo, keyed by the upstream photo id
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    r#"CREATE TABLE IF NOT EXISTS images (
    flickr_id TEXT PRIMARY KEY NOT NULL,
    image_path TEXT NOT NULL,
    label INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    search_id INTEGER NOT NULL,
    page_idx INTEGER NOT NULL,
    image_idx INTEGER NOT NULL,
    collected_at TEXT NOT NULL,
    FOREIGN KEY (search_id) REFERENCES searches(id)
)"#,
                )
                .for_backend(
                    "postgres",
                    r#"CREATE TABLE IF NOT EXISTS images (
    flickr_id TEXT PRIMARY KEY NOT NULL,
    image_path TEXT NOT NULL,
    label BIGINT NOT NULL,
    user_id BIGINT NOT NULL,
    search_id INTEGER NOT NULL REFERENCES searches(id),
    page_idx INTEGER NOT NULL,
    image_idx INTEGER NOT NULL,
    collected_at TEXT NOT NULL
)"#,
                ),
        )
        // Indexes
        .operation(AddIndex::new(
            "images",
            Index::new("idx_images_position")
                .column("page_idx")
                .column("image_idx"),
        ))
        .operation(AddIndex::new(
            "images",
            Index::new("idx_images_label").column("label"),
        ))
        .operation(AddIndex::new(
            "images",
            Index::new("idx_images_user_id").column("user_id"),
        ))
        .operation(AddIndex::new(
            "images",
            Index::new("idx_images_search_id").column("search_id"),
        ))
}
