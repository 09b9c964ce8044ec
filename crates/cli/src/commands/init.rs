use colored::Colorize;
use pq_core::init::{init_project, InitOptions};
use std::path::Path;

pub async fn run(root: &Path, force: bool) -> color_eyre::Result<()> {
    let config_path = init_project(InitOptions {
        target_dir: root.to_path_buf(),
        force,
    })
    .await?;

    println!("{} {}", "Created".green().bold(), config_path.display());
    println!("Point the [workers] entries at your stage executables, then run `pipeline-queue serve`.");
    Ok(())
}
