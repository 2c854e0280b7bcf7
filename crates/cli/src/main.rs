//! CLI application for the stablewatch ETL service.

mod config;

use clap::{Parser, Subcommand};
use config::Settings;
use stablewatch_ingestion::networks::tokens_on;
use stablewatch_ingestion::{start, stablecoins, ChainClientRegistry, TopWalletAggregator};
use stablewatch_telemetry::{init_logging, AuditLog, LogFormat, Metrics};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "stablewatch")]
#[command(about = "Multi-chain stablecoin transfer, balance and whale tracker")]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the transfer, balance and top-wallet loops until Ctrl-C
    Run,
    /// Rebuild the top-wallet aggregate once and exit
    RefreshTopWallets,
    /// Show which networks and tokens would be polled
    Networks,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings;

    let format = if settings.pretty_logs {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    };
    init_logging(settings.log_level.as_deref(), format)?;

    match cli.command {
        Commands::Run => run(&settings).await,
        Commands::RefreshTopWallets => refresh_top_wallets(&settings).await,
        Commands::Networks => show_networks(&settings),
    }
}

async fn run(settings: &Settings) -> anyhow::Result<()> {
    info!("Starting stablewatch ETL service");

    let metrics = Metrics::new()?;
    let registry =
        ChainClientRegistry::from_rpc_urls(settings.rpc_urls(), settings.rpc_options(), &metrics)?;
    if registry.is_empty() {
        anyhow::bail!(
            "No RPC endpoint configured; set at least one of \
             RPC_ETHEREUM, RPC_POLYGON, RPC_BSC, RPC_ARBITRUM, RPC_AVALANCHE"
        );
    }

    let config = settings.etl_config()?;
    let sink = settings.open_sink().await?;
    let audit = AuditLog::new(settings.sample_output_path.as_deref());

    if let Some(addr) = &settings.metrics_bind_address {
        start_metrics_server(addr, metrics.clone()).await?;
    }

    info!(
        tracked_wallets = config.tracked_wallets.len(),
        window_blocks = config.window_blocks,
        audit_samples = audit.is_enabled(),
        "Configuration loaded"
    );

    let handle = start(Arc::new(registry), sink, config, metrics, audit);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, waiting for loops to finish their cycle");
    handle.shutdown().await;
    info!("Stopped");

    Ok(())
}

async fn refresh_top_wallets(settings: &Settings) -> anyhow::Result<()> {
    let metrics = Metrics::new()?;
    let sink = settings.open_sink().await?;

    let rows = TopWalletAggregator::new(sink, metrics).refresh().await?;
    info!("Wrote {} top-wallet rows", rows);
    Ok(())
}

fn show_networks(settings: &Settings) -> anyhow::Result<()> {
    let tokens = stablecoins();

    for (network, url) in settings.rpc_urls() {
        let status = if url.trim().is_empty() { "disabled" } else { "enabled" };
        let symbols: Vec<&str> = tokens_on(&tokens, network).map(|(symbol, _)| symbol).collect();
        println!("{:<10} {:<9} {}", network, status, symbols.join(","));
    }

    let wallets = settings.tracked_wallets()?;
    println!("tracked wallets: {}", wallets.len());
    Ok(())
}

async fn start_metrics_server(addr: &str, metrics: Metrics) -> anyhow::Result<()> {
    use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};

    let metrics = Arc::new(metrics);

    async fn metrics_handler(
        State(metrics): State<Arc<Metrics>>,
    ) -> Result<impl IntoResponse, StatusCode> {
        match metrics.gather() {
            Ok(body) => Ok((StatusCode::OK, body)),
            Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Metrics server listening on http://{}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}
