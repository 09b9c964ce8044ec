//! Offline view of the persisted queue.

use crate::output::{format_elapsed, paint_status, short_id};
use colored::Colorize;
use pq_core::config::loader::load_config;
use pq_core::queue::QueueStore;

pub async fn run(root: &std::path::Path) -> color_eyre::Result<()> {
    let config = load_config(root).await?;
    let snapshot = QueueStore::at(config.queue_path()).load();

    let state = if snapshot.paused {
        "paused".yellow().bold()
    } else {
        "active".green()
    };
    println!(
        "{} {} ({} entries)",
        "Queue".bold(),
        state,
        snapshot.entries.len()
    );
    if snapshot.entries.is_empty() {
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:<8}  {:<10}  {:<8}  {:<6}  {:>7}  {}",
            "ID", "STAGE", "STATUS", "SITE", "TIME", "FILE"
        )
        .dimmed()
    );
    for entry in &snapshot.entries {
        println!(
            "{:<8}  {:<10}  {}  {:<6}  {:>7}  {}",
            short_id(entry.id),
            entry.stage.as_str(),
            paint_status(entry.status),
            entry.stage.site().as_str(),
            format_elapsed(entry.start_time, entry.finish_time),
            entry.file,
        );
        if let Some(url) = &entry.product_url {
            println!("{:>44}{}", "", url.cyan());
        }
    }
    Ok(())
}
