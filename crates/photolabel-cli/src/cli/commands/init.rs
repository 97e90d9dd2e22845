//! Initialize command.

use console::style;

use photolabel::config::Settings;
use photolabel::repository::run_migrations;
use photolabel::repository::util::redact_url_password;

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let database_url = settings.database_url();
    run_migrations(&database_url).await?;
    println!(
        "  {} Database ready: {}",
        style("✓").green(),
        redact_url_password(&database_url)
    );

    if settings.flickr.api_key.is_none() {
        println!("{} No Flickr API key configured", style("!").yellow());
        println!("  Set FLICKR_API_KEY or add [flickr] api_key to photolabel.toml");
    }

    println!(
        "{} Initialized photolabel in {}",
        style("✓").green(),
        settings.data_dir.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_creates_database_under_target() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::with_data_dir(dir.path().join("target"));

        cmd_init(&settings).await.unwrap();

        assert!(settings.images_dir.is_dir());
        assert!(settings.database_path().exists());
        let tables = settings
            .create_db_context()
            .unwrap()
            .list_tables()
            .await
            .unwrap();
        assert!(tables.iter().any(|t| t == "searches"));
        assert!(tables.iter().any(|t| t == "images"));

        // Running it again is harmless.
        cmd_init(&settings).await.unwrap();
    }
}
