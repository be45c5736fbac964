mod display;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use log::debug;
use samort::config::Config;
use samort::Samort;

const DEFAULT_LOGGING_LEVEL: &str = "info";

/// One full fetch-normalize-merge cycle over every configured country.
/// Individual country failures are logged and skipped; only process-level
/// errors (missing reference or target tables) fail the run.
#[derive(Parser, Debug)]
#[command(name = "samort")]
struct Cli {
    /// TOML config overriding the default reference and storage paths
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set RUST_LOG to `DEFAULT_LOGGING_LEVEL` if not set
    let _ =
        std::env::var("RUST_LOG").map_err(|_| std::env::set_var("RUST_LOG", DEFAULT_LOGGING_LEVEL));
    pretty_env_logger::init_timed();
    let args = Cli::parse();
    debug!("args: {args:?}");
    let config = read_config(args.config.as_deref());
    debug!("config: {config:?}");

    let samort = Samort::new_with_config(config)?;
    let summary = samort.run().await?;
    display::display_summary(&summary);
    Ok(())
}

fn read_config(path: Option<&Path>) -> Config {
    // macOS: ~/Library/Application Support/samort/config.toml
    let file_path = path.map(Path::to_path_buf).unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap()
            .join("samort")
            .join("config.toml")
    });
    match std::fs::read_to_string(file_path) {
        Ok(contents) => toml::from_str(&contents).expect("Invalid TOML in config file"),
        Err(e) => {
            if e.kind() == std::io::ErrorKind::NotFound {
                Config::default()
            } else {
                panic!("Error reading config file: {:#?}", e);
            }
        }
    }
}
