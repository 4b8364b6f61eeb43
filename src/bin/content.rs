//! Content source binary

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weatherhub::content::{read_station_file, ContentSource};
use weatherhub::Config;

#[derive(Parser)]
#[command(name = "weatherhub-content")]
#[command(about = "Push a station file to a weatherhub aggregation node")]
#[command(version)]
struct Cli {
    /// Station file (`key: value` lines)
    #[arg(long)]
    file: PathBuf,

    /// Aggregation node address (host:port)
    #[arg(long)]
    server: Option<String>,

    /// Config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Push once and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut content = config.content;
    if let Some(server) = cli.server {
        content.server_addr = server;
    }
    content.validate()?;
    let period = Duration::from_secs(content.push_interval_secs);

    let mut source = ContentSource::from_file(&cli.file, content)?;
    tracing::info!(source = %source.id(), file = %cli.file.display(), "content source ready");

    let mut ticker = tokio::time::interval(period);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        // Pick up edits to the station file between pushes.
        match read_station_file(&cli.file).and_then(|doc| source.replace_document(doc)) {
            Ok(()) => {}
            Err(e) => tracing::warn!(error = %e, "keeping previous document"),
        }

        match source.push().await {
            Ok(outcome) => tracing::info!(
                status = outcome.status.as_u16(),
                lamport = outcome.lamport,
                "pushed"
            ),
            Err(e) => tracing::error!(error = %e, "push failed"),
        }

        if cli.once {
            break;
        }
    }

    Ok(())
}
