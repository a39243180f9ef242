#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use clap::Parser;
use postroom::Postroom;

/// Run the postroom mail processing engine
#[derive(Parser, Debug)]
#[command(name = "postroom")]
#[command(version)]
struct Cli {
    /// Configuration file, overriding the usual search locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Load and validate the configuration, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => find_config_file()?,
    };
    let postroom = Postroom::load(&config_path)?;

    if cli.check {
        let manager = postroom.engine()?;
        println!(
            "{}: OK ({} processors)",
            config_path.display(),
            manager.registry().len()
        );
        return Ok(());
    }

    postroom.run().await
}

/// Find the configuration file using the following precedence:
/// 1. `POSTROOM_CONFIG` environment variable
/// 2. ./postroom.config.ron (current working directory)
/// 3. /etc/postroom/postroom.config.ron (system-wide config)
fn find_config_file() -> anyhow::Result<PathBuf> {
    if let Ok(env_path) = std::env::var("POSTROOM_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "POSTROOM_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    let default_paths = [
        PathBuf::from("./postroom.config.ron"),
        PathBuf::from("/etc/postroom/postroom.config.ron"),
    ];

    if let Some(path) = default_paths.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - POSTROOM_CONFIG environment variable\n{paths_tried}"
    )
}
