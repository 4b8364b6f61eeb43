//! Read client binary

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weatherhub::client::GetClient;
use weatherhub::Config;

#[derive(Parser)]
#[command(name = "weatherhub-client")]
#[command(about = "Fetch the latest reading for a station")]
#[command(version)]
struct Cli {
    /// Station id
    station_id: String,

    /// Aggregation node address (host:port)
    #[arg(long)]
    server: Option<String>,

    /// Config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
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
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut client_config = config.client;
    if let Some(server) = cli.server {
        client_config.server_addr = server;
    }
    client_config.validate()?;

    let client = GetClient::new(client_config)?;
    match client.fetch(&cli.station_id).await? {
        Some(doc) => {
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        None => {
            anyhow::bail!("no data for station {}", cli.station_id);
        }
    }

    Ok(())
}
