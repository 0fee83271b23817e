//! gachadex — the gachapon indexer daemon.
//!
//! Subscribes to the game and marketplace programs' logs, reconstructs the
//! relational view in SQLite, verifies play payments against the price
//! oracle, and publishes realtime play-status notifications.
//!
//! ```bash
//! gachadex run --config gachadex.yaml
//! gachadex info
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use gachadex_index::{
    EventDispatcher, HttpNotifier, Notifier, NullNotifier, Pipeline, PipelineConfig, Reconciler,
    RpcChainReader,
};
use gachadex_oracle::{HttpPriceOracle, PaymentVerifier, VerifierConfig};
use gachadex_rpc::{
    LogStreamClient, RpcClientConfig, SolanaRpcClient, StreamConfig, TransactionEnricher,
};
use gachadex_store::SqliteStore;

mod config;
mod telemetry;

use config::AppConfig;

#[derive(Parser)]
#[command(
    name = "gachadex",
    about = "Off-chain indexer for the gachapon game and marketplace programs",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the indexer daemon
    Run {
        /// Path to the YAML config file
        #[arg(short, long, default_value = "gachadex.yaml")]
        config: PathBuf,
        /// Override the SQLite database path
        #[arg(long)]
        db: Option<String>,
    },
    /// Print build and default-configuration info
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match Cli::parse().command {
        Commands::Run { config, db } => {
            let mut app_config = AppConfig::load(&config)?;
            if let Some(db) = db {
                app_config.store.db_path = db;
            }
            run(app_config).await
        }
        Commands::Info => {
            cmd_info();
            Ok(())
        }
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    telemetry::init_tracing(&config.log);
    info!(version = env!("CARGO_PKG_VERSION"), "gachadex starting");

    let store = SqliteStore::open(&config.store.db_path)
        .await
        .with_context(|| format!("opening database {}", config.store.db_path))?;

    let rpc_config = RpcClientConfig {
        request_timeout: Duration::from_secs(config.rpc.timeout_secs),
        commitment: config.stream.commitment.clone(),
        ..Default::default()
    };
    let enricher = TransactionEnricher::new(SolanaRpcClient::new(
        config.rpc.http_url.clone(),
        rpc_config.clone(),
    )?);
    let chain = RpcChainReader::new(
        SolanaRpcClient::new(config.rpc.http_url.clone(), rpc_config)?,
        config.programs.game.clone(),
    );

    let oracle = HttpPriceOracle::new(
        config.oracle.base_url.clone(),
        Duration::from_secs(config.oracle.timeout_secs),
    )?;
    let verifier = PaymentVerifier::new(
        oracle,
        VerifierConfig {
            tolerance_bp: config.oracle.tolerance_bp,
            staleness_secs: config.oracle.staleness_secs,
            min_market_cap_usd: config.oracle.min_market_cap_usd,
        },
    );

    let stream = LogStreamClient::new(StreamConfig {
        ws_url: config.rpc.ws_url.clone(),
        programs: vec![
            config.programs.game.clone(),
            config.programs.marketplace.clone(),
        ],
        commitment: config.stream.commitment.clone(),
        base_delay_ms: config.stream.base_delay_ms,
        max_attempts: config.stream.max_attempts,
    });
    let pipeline_config = PipelineConfig {
        queue_capacity: config.stream.queue_capacity,
    };

    match &config.notifier.endpoint {
        Some(endpoint) => {
            let notifier = HttpNotifier::new(
                endpoint.clone(),
                Duration::from_secs(config.notifier.timeout_secs),
            )?;
            launch(store, chain, verifier, notifier, stream, enricher, pipeline_config).await
        }
        None => {
            info!("no notifier endpoint configured; realtime notifications disabled");
            launch(store, chain, verifier, NullNotifier, stream, enricher, pipeline_config).await
        }
    }
}

async fn launch<N: Notifier + 'static>(
    store: SqliteStore,
    chain: RpcChainReader,
    verifier: PaymentVerifier<HttpPriceOracle>,
    notifier: N,
    stream: LogStreamClient,
    enricher: TransactionEnricher,
    pipeline_config: PipelineConfig,
) -> anyhow::Result<()> {
    let dispatcher = EventDispatcher::new(Reconciler::new(store, chain, verifier, notifier));
    let pipeline = Pipeline::new(stream, enricher, dispatcher, pipeline_config);

    tokio::select! {
        result = pipeline.run() => {
            result.context("ingestion pipeline terminated")
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        }
    }
}

fn cmd_info() {
    println!("gachadex {}", env!("CARGO_PKG_VERSION"));
    println!("  Watched programs: gachapon game + marketplace (configured per deployment)");
    println!("  Storage: SQLite (sqlx), WAL mode");
    println!("  Defaults: commitment=confirmed, queue=512, reconnect=500ms x attempt (max 10)");
}
