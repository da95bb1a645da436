// octodash command line.
// Runs the cache primer or renders a single dashboard view.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use octodash::cache::paths::views_dir;
use octodash::{Config, Dashboard, Primer, Result};

#[derive(Parser, Debug)]
#[command(name = "octodash")]
#[command(about = "GitHub aggregation and caching for team dashboards")]
#[command(version)]
struct Args {
    /// Path to config file (default: ./octodash.yaml, then the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Keep the configured views warm until interrupted
    Prime {
        /// Snapshot views to the platform cache dir when `cache.persist_dir` is unset
        #[arg(long)]
        persist: bool,
    },
    /// Print one view as JSON, e.g. `/milestones/current`
    Get {
        view: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    octodash::logging::init();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Command::Prime { persist: true } = args.command {
        if config.cache.persist_dir.is_none() {
            config.cache.persist_dir = views_dir();
        }
    }
    let dashboard = Arc::new(Dashboard::from_env(&config)?);

    match args.command {
        Command::Prime { .. } => {
            match dashboard.views().persist_dir() {
                Some(dir) => info!(dir = %dir.display(), "persisting view snapshots"),
                None => info!("view snapshots kept in memory only"),
            }
            let primer = Arc::new(Primer::from_config(dashboard, &config)?);
            let handle = primer.start();
            tokio::signal::ctrl_c().await?;
            info!("interrupted");
            handle.shutdown().await;
        }
        Command::Get { view } => {
            let value = dashboard.read(&view).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}
