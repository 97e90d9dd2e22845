//! Database context: owns the pool and hands out repositories.

use std::path::Path;

use super::labels::DieselLabelRepository;
use super::pool::{DbPool, DieselError};
use super::progress::DieselProgressRepository;
use crate::with_conn_split;

/// Entry point for database access. Create one per command or server and
/// clone it freely; clones share the pool.
///
/// ```ignore
/// let ctx = DbContext::from_url("sqlite:photolabel.db")?;
/// let search = ctx.progress().resolve_or_create_search("owls", 50, bound).await?;
/// ```
#[derive(Clone)]
pub struct DbContext {
    pool: DbPool,
}

impl DbContext {
    /// Create a context from a database URL.
    ///
    /// Supports `sqlite:path`, bare file paths and, with the `postgres`
    /// feature, `postgres://` URLs.
    pub fn from_url(database_url: &str) -> Result<Self, DieselError> {
        let pool = DbPool::from_url(database_url)?;
        Ok(Self { pool })
    }

    pub fn from_sqlite_path(db_path: &Path) -> Result<Self, DieselError> {
        let url = format!("sqlite:{}", db_path.display());
        Self::from_url(&url)
    }

    pub fn with_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn is_sqlite(&self) -> bool {
        self.pool.is_sqlite()
    }

    /// Search cursors and label commits.
    pub fn progress(&self) -> DieselProgressRepository {
        DieselProgressRepository::new(self.pool.clone())
    }

    /// Label queries.
    pub fn labels(&self) -> DieselLabelRepository {
        DieselLabelRepository::new(self.pool.clone())
    }

    /// Open one connection to fail fast on a bad URL or unreachable server.
    ///
    /// For SQLite this also creates the database file.
    pub async fn test_connection(&self) -> Result<(), DieselError> {
        crate::with_conn!(self.pool, _conn, Ok(()))
    }

    /// Names of all user tables.
    pub async fn list_tables(&self) -> Result<Vec<String>, DieselError> {
        with_conn_split!(self.pool,
            sqlite: conn => {
                use diesel_async::RunQueryDsl;
                let rows: Vec<TableName> = diesel::sql_query(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                )
                .load(&mut conn)
                .await?;
                Ok(rows.into_iter().map(|r| r.name).collect())
            },
            postgres: conn => {
                use diesel_async::RunQueryDsl;
                let rows: Vec<TableName> = diesel::sql_query(
                    "SELECT tablename AS name FROM pg_tables WHERE schemaname = 'public' ORDER BY tablename",
                )
                .load(&mut conn)
                .await?;
                Ok(rows.into_iter().map(|r| r.name).collect())
            }
        )
    }
}

#[derive(diesel::QueryableByName)]
struct TableName {
    #[diesel(sql_type = diesel::sql_types::Text)]
    name: String,
}
