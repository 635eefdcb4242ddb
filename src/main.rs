use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use outreach_relay::{
    config::Config,
    database::Database,
    services::{JobProcessor, QueueSweeper},
    session::BridgeSessionClient,
    web::WebServer,
};

#[derive(Parser)]
#[command(name = "outreach-relay")]
#[command(version = "0.1.0")]
#[command(about = "Durable outreach job orchestrator with session-mediated delivery")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Session bridge base URL (overrides config file)
    #[arg(short = 'b', long, value_name = "URL")]
    bridge_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("outreach_relay={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Outreach Relay v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration from specified file
    std::env::set_var("CONFIG_FILE", &cli.config);
    let mut config = Config::load()?;
    info!("Configuration loaded from: {}", cli.config);

    // Override config with CLI arguments
    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }
    if let Some(bridge_url) = cli.bridge_url {
        config.bridge.base_url = bridge_url;
    }

    info!("Using database: {}", config.database.url);

    let database = Database::new(&config.database).await?;
    database.migrate().await?;
    info!("Database connection established and migrations applied");

    let session_client = Arc::new(BridgeSessionClient::new(&config.bridge)?);
    info!("Session bridge client targeting {}", config.bridge.base_url);

    let processor = JobProcessor::new(database.clone(), session_client, config.quota.clone());

    // Start the periodic sweeps
    let cancellation_token = CancellationToken::new();
    let sweeper = QueueSweeper::new(database.clone(), processor.clone(), config.queue.clone());
    let sweeper_token = cancellation_token.clone();
    let sweeper_handle = tokio::spawn(async move {
        sweeper.run(sweeper_token).await;
    });

    let web_server = WebServer::new(config, database, processor)?;
    web_server.serve().await?;

    // Web server exited on the shutdown signal; stop the sweeps too
    cancellation_token.cancel();
    let _ = sweeper_handle.await;

    info!("Outreach relay stopped");
    Ok(())
}
