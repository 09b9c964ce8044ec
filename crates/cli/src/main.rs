mod commands;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "pipeline-queue",
    version,
    about = "Run artifact pipeline workers one at a time from a persisted queue"
)]
struct Cli {
    /// Project root containing `.pipeline-queue/`
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a starter `.pipeline-queue/config.toml`
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
    /// Serve operations as JSON lines on stdin, replies and events on stdout
    Serve,
    /// Show the persisted queue
    Queue,
    /// Show the worker history ledger
    History {
        /// Print one worker record including its log
        #[arg(long)]
        id: Option<uuid::Uuid>,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    // stdout carries the serve protocol, so logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pq_core=info,pipeline_queue=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => commands::init::run(&cli.root, force).await,
        Command::Serve => commands::serve::run(&cli.root).await,
        Command::Queue => commands::queue::run(&cli.root).await,
        Command::History { id } => commands::history::run(&cli.root, id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_root_defaults_to_current_dir() {
        let cli = Cli::try_parse_from(["pipeline-queue", "queue"]).unwrap();
        assert_eq!(cli.root, PathBuf::from("."));
        assert!(matches!(cli.command, Command::Queue));
    }

    #[test]
    fn test_global_root_after_subcommand() {
        let cli = Cli::try_parse_from(["pipeline-queue", "init", "--force", "--root", "/srv/shop"])
            .unwrap();
        assert_eq!(cli.root, PathBuf::from("/srv/shop"));
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn test_history_id_must_be_uuid() {
        assert!(Cli::try_parse_from(["pipeline-queue", "history", "--id", "nope"]).is_err());

        let id = uuid::Uuid::new_v4().to_string();
        let cli = Cli::try_parse_from(["pipeline-queue", "history", "--id", &id]).unwrap();
        match cli.command {
            Command::History { id: Some(parsed) } => assert_eq!(parsed.to_string(), id),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["pipeline-queue"]).is_err());
    }
}
