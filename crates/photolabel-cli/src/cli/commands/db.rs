//! Database management commands.

use console::style;

use photolabel::config::Settings;
use photolabel::repository::util::redact_url_password;
use photolabel::repository::{run_migrations, DbContext};

/// Run database migrations against `database_url` or the configured database.
pub async fn cmd_migrate(settings: &Settings, database_url: Option<&str>) -> anyhow::Result<()> {
    let url = database_url
        .map(str::to_string)
        .unwrap_or_else(|| settings.database_url());

    println!("{} Database migration", style("→").cyan());
    println!("  Database: {}", redact_url_password(&url));

    if database_url.is_none() {
        settings.ensure_directories()?;
    }

    match run_migrations(&url).await {
        Ok(()) => {
            println!("{} Migration complete!", style("✓").green());
        }
        Err(e) => {
            eprintln!("{} Migration failed: {}", style("✗").red(), e);
            return Err(anyhow::anyhow!("Migration failed: {}", e));
        }
    }

    let tables = DbContext::from_url(&url)?.list_tables().await?;
    println!("  Tables: {}", tables.join(", "));

    Ok(())
}
