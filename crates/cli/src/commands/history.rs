//! Offline view of the worker history ledger.

use crate::output::{format_elapsed, format_time, paint_status, short_id};
use color_eyre::eyre::eyre;
use colored::Colorize;
use pq_core::config::loader::load_config;
use pq_core::worker::HistoryLedger;
use std::path::Path;
use uuid::Uuid;

pub async fn run(root: &Path, id: Option<Uuid>) -> color_eyre::Result<()> {
    let config = load_config(root).await?;
    let ledger = HistoryLedger::load(config.history_path());

    let Some(id) = id else {
        list(&ledger);
        return Ok(());
    };
    let record = ledger
        .get(id)
        .ok_or_else(|| eyre!("no worker {id} in {}", config.history_path().display()))?;

    println!("{} {}", "Worker".bold(), record.id);
    println!("  status:   {}", paint_status(record.status));
    println!("  command:  {} {}", record.command, record.args.join(" "));
    if let Some(dir) = &record.working_directory {
        println!("  cwd:      {}", dir.display());
    }
    if let Some(tag) = &record.tag {
        println!("  tag:      {tag}");
    }
    println!("  started:  {}", format_time(Some(record.start_time)));
    println!("  finished: {}", format_time(record.finish_time));
    if let Some(code) = record.exit_code {
        println!("  exit:     {code}");
    }
    if let Some(path) = &record.result_path {
        println!("  result:   {path}");
    }
    if let Some(url) = &record.product_url {
        println!("  listing:  {}", url.cyan());
    }
    println!();
    print!("{}", record.log);
    if !record.log.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn list(ledger: &HistoryLedger) {
    let summaries = ledger.list();
    println!("{} ({} workers)", "History".bold(), summaries.len());
    if summaries.is_empty() {
        return;
    }

    println!(
        "{}",
        format!(
            "{:<8}  {:<8}  {:<19}  {:>7}  {:<24}  {}",
            "ID", "STATUS", "STARTED", "TIME", "TAG", "COMMAND"
        )
        .dimmed()
    );
    for summary in &summaries {
        let command = Path::new(&summary.command)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| summary.command.clone());
        println!(
            "{:<8}  {}  {:<19}  {:>7}  {:<24}  {}",
            short_id(summary.id),
            paint_status(summary.status),
            format_time(Some(summary.start_time)),
            format_elapsed(Some(summary.start_time), summary.finish_time),
            summary.tag.as_deref().unwrap_or("-"),
            command,
        );
    }
}
