//! Persistence layer built on Diesel.
//!
//! SQLite is the default backend; PostgreSQL is available behind the
//! `postgres` feature. Schema changes are applied by [`run_migrations`].

mod context;
mod labels;
pub mod migrations;
pub mod models;
pub mod pool;
mod progress;
pub mod util;

use chrono::{DateTime, Utc};

pub use context::DbContext;
pub use labels::DieselLabelRepository;
pub use migrations::run_migrations;
pub use pool::{DbPool, DieselError};
pub use progress::{DieselProgressRepository, ProgressError};

/// Bundled repositories sharing one pool.
#[derive(Clone)]
pub struct Repositories {
    pub progress: DieselProgressRepository,
    pub labels: DieselLabelRepository,
    pool: DbPool,
}

impl Repositories {
    pub fn new(ctx: DbContext) -> Self {
        Self {
            progress: ctx.progress(),
            labels: ctx.labels(),
            pool: ctx.pool().clone(),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// Parse an RFC 3339 timestamp column, falling back to the epoch.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH)
}
