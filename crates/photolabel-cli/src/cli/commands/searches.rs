//! List searches.

use console::style;

use photolabel::config::Settings;

/// Print every known search with its cursor.
pub async fn cmd_searches(settings: &Settings) -> anyhow::Result<()> {
    let repos = settings.repositories()?;
    let searches = repos.progress.list_searches().await?;

    if searches.is_empty() {
        println!("{} No searches yet", style("!").yellow());
        return Ok(());
    }

    println!(
        "{:>5}  {:<32} {:>8} {:>12}  {}",
        style("ID").bold(),
        style("QUERY").bold(),
        style("PER PAGE").bold(),
        style("CURSOR").bold(),
        style("LAST USED").bold()
    );
    for search in searches {
        println!(
            "{:>5}  {:<32} {:>8} {:>12}  {}",
            search.id,
            search.query,
            search.page_size,
            search.cursor.to_string(),
            search.last_search_time.format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}
