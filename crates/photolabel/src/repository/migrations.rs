//! Schema migrations using cetane.
//!
//! The migrator is synchronous, so SQLite runs on a blocking task and
//! PostgreSQL bridges back into the runtime per statement.

use tracing::info;

use super::pool::DieselError;

/// Run pending migrations for a database URL.
pub async fn run_migrations(database_url: &str) -> Result<(), DieselError> {
    if super::util::is_postgres_url(database_url) {
        #[cfg(feature = "postgres")]
        {
            run_postgres_migrations_async(database_url).await
        }
        #[cfg(not(feature = "postgres"))]
        {
            Err(DieselError::QueryBuilderError(
                "PostgreSQL support not compiled. Use --features postgres".into(),
            ))
        }
    } else {
        run_sqlite_migrations_async(database_url).await
    }
}

fn migration_error(msg: impl std::fmt::Display) -> DieselError {
    DieselError::QueryBuilderError(msg.to_string().into())
}

fn log_applied(applied: &[String]) {
    for name in applied {
        info!("Applied migration: {}", name);
    }

    if applied.is_empty() {
        info!("No pending migrations");
    }
}

async fn run_sqlite_migrations_async(database_url: &str) -> Result<(), DieselError> {
    use cetane::backend::Sqlite;
    use cetane::migrator::Migrator;

    let path = database_url
        .strip_prefix("sqlite:")
        .unwrap_or(database_url)
        .to_string();

    tokio::task::spawn_blocking(move || {
        let conn = rusqlite::Connection::open(&path).map_err(migration_error)?;
        let registry = crate::migrations::registry();
        let state = SqliteState::new(&conn)?;

        let mut migrator = Migrator::new(&registry, &Sqlite, state);
        let applied = migrator
            .migrate_forward(|sql| conn.execute_batch(sql).map_err(|e| e.to_string()))
            .map_err(migration_error)?;

        log_applied(&applied);
        Ok(())
    })
    .await
    .map_err(|e| DieselError::QueryBuilderError(Box::new(e)))?
}

#[cfg(feature = "postgres")]
async fn run_postgres_migrations_async(database_url: &str) -> Result<(), DieselError> {
    use cetane::backend::Postgres;
    use cetane::migrator::Migrator;

    let (client, connection) = tokio_postgres::connect(database_url, tokio_postgres::NoTls)
        .await
        .map_err(migration_error)?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::warn!("PostgreSQL migration connection closed: {}", e);
        }
    });

    let registry = crate::migrations::registry();
    let state = PostgresState::new(&client).await?;

    let mut migrator = Migrator::new(&registry, &Postgres, state);
    let applied = migrator
        .migrate_forward(|sql| block_on_client(|| async { client.batch_execute(sql).await }))
        .map_err(migration_error)?;

    log_applied(&applied);
    Ok(())
}

/// Drive a client future to completion from inside the synchronous migrator.
#[cfg(feature = "postgres")]
fn block_on_client<F, Fut>(f: F) -> Result<(), String>
where
    F: FnOnce() -> Fut + Send,
    Fut: std::future::Future<Output = Result<(), tokio_postgres::Error>>,
{
    let rt = tokio::runtime::Handle::current();
    std::thread::scope(|s| {
        s.spawn(|| rt.block_on(async { f().await.map_err(|e| e.to_string()) }))
            .join()
            .map_err(|_| "thread panicked".to_string())?
    })
}

// -- SQLite state store --

struct SqliteState<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> SqliteState<'a> {
    fn new(conn: &'a rusqlite::Connection) -> Result<Self, DieselError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS __cetane_migrations (
                name TEXT PRIMARY KEY NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .map_err(migration_error)?;

        Ok(Self { conn })
    }
}

impl cetane::migrator::MigrationStateStore for SqliteState<'_> {
    fn applied_migrations(&mut self) -> Result<Vec<String>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM __cetane_migrations ORDER BY name")
            .map_err(|e| e.to_string())?;

        let names = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| e.to_string())?
            .collect::<Result<Vec<String>, _>>()
            .map_err(|e| e.to_string())?;

        Ok(names)
    }

    fn mark_applied(&mut self, name: &str) -> Result<(), String> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO __cetane_migrations (name) VALUES (?1)",
                [name],
            )
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    fn mark_unapplied(&mut self, name: &str) -> Result<(), String> {
        self.conn
            .execute("DELETE FROM __cetane_migrations WHERE name = ?1", [name])
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

// -- PostgreSQL state store --

#[cfg(feature = "postgres")]
struct PostgresState<'a> {
    client: &'a tokio_postgres::Client,
    applied: Vec<String>,
}

#[cfg(feature = "postgres")]
impl<'a> PostgresState<'a> {
    async fn new(client: &'a tokio_postgres::Client) -> Result<Self, DieselError> {
        client
            .execute(
                "CREATE TABLE IF NOT EXISTS __cetane_migrations (
                    name TEXT PRIMARY KEY NOT NULL,
                    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )",
                &[],
            )
            .await
            .map_err(migration_error)?;

        let rows = client
            .query("SELECT name FROM __cetane_migrations ORDER BY name", &[])
            .await
            .map_err(migration_error)?;

        let applied = rows.iter().map(|r| r.get::<_, String>(0)).collect();

        Ok(Self { client, applied })
    }
}

#[cfg(feature = "postgres")]
impl cetane::migrator::MigrationStateStore for PostgresState<'_> {
    fn applied_migrations(&mut self) -> Result<Vec<String>, String> {
        Ok(self.applied.clone())
    }

    fn mark_applied(&mut self, name: &str) -> Result<(), String> {
        let client = self.client;
        block_on_client(|| async move {
            client
                .execute(
                    "INSERT INTO __cetane_migrations (name) VALUES ($1) ON CONFLICT DO NOTHING",
                    &[&name],
                )
                .await
                .map(|_| ())
        })?;

        if !self.applied.iter().any(|n| n == name) {
            self.applied.push(name.to_string());
        }
        Ok(())
    }

    fn mark_unapplied(&mut self, name: &str) -> Result<(), String> {
        let client = self.client;
        block_on_client(|| async move {
            client
                .execute("DELETE FROM __cetane_migrations WHERE name = $1", &[&name])
                .await
                .map(|_| ())
        })?;

        self.applied.retain(|n| n != name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::DbContext;

    #[tokio::test]
    async fn test_sqlite_migrations_create_tables() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("migrate.db");
        let url = format!("sqlite:{}", db_path.display());

        run_migrations(&url).await.unwrap();

        let ctx = DbContext::from_url(&url).unwrap();
        let tables = ctx.list_tables().await.unwrap();
        assert!(tables.contains(&"searches".to_string()));
        assert!(tables.contains(&"images".to_string()));
        assert!(tables.contains(&"__cetane_migrations".to_string()));
    }

    #[tokio::test]
    async fn test_sqlite_migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("twice.db").display());

        run_migrations(&url).await.unwrap();
        run_migrations(&url).await.unwrap();

        let conn = rusqlite::Connection::open(dir.path().join("twice.db")).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM __cetane_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[cfg(not(feature = "postgres"))]
    #[tokio::test]
    async fn test_postgres_url_without_feature_fails() {
        let err = run_migrations("postgres://localhost/labels")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("postgres"));
    }
}
