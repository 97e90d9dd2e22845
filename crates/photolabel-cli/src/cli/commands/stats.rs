//! Label statistics.

use console::style;

use photolabel::config::Settings;

/// Print label counts by value and by user.
pub async fn cmd_stats(settings: &Settings) -> anyhow::Result<()> {
    let repos = settings.repositories()?;
    let total = repos.labels.count_labels().await?;

    println!("{} {} labels", style("→").cyan(), style(total).bold());
    if total == 0 {
        return Ok(());
    }

    println!("\n  {}", style("By label").bold());
    for count in repos.labels.label_counts().await? {
        println!("    {:>6}  {}", count.key, count.count);
    }

    println!("\n  {}", style("By user").bold());
    for count in repos.labels.user_counts().await? {
        println!("    {:>6}  {}", count.key, count.count);
    }

    Ok(())
}
