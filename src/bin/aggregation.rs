//! Aggregation node binary

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weatherhub::common::parse_duration;
use weatherhub::{AggregationServer, Config};

#[derive(Parser)]
#[command(name = "weatherhub-aggregation")]
#[command(about = "weatherhub aggregation node")]
#[command(version)]
struct Cli {
    /// Config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the aggregation node
    Serve {
        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// Snapshot file
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Station TTL (e.g. "30s")
        #[arg(long)]
        ttl: Option<String>,

        /// Connection workers
        #[arg(long)]
        workers: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config from file, then override with CLI arguments
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve {
            bind,
            snapshot,
            ttl,
            workers,
        } => {
            let mut node = config.node;
            if let Some(bind) = bind {
                node.bind_addr = bind.parse()?;
            }
            if let Some(snapshot) = snapshot {
                node.snapshot_path = snapshot;
            }
            if let Some(ttl) = ttl {
                node.ttl_secs = parse_duration(&ttl)?.as_secs().max(1);
            }
            if let Some(workers) = workers {
                node.workers = workers;
            }

            let server = AggregationServer::open(node)?;
            let restored = server.restored();
            tracing::info!(
                stations = restored.stations,
                clock = restored.clock,
                cold_start = restored.cold_start,
                "state restored"
            );
            server.serve().await?;
        }
    }

    Ok(())
}
