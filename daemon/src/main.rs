//! Tally daemon: entry point for running the vote service.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use tally_endpoint::HttpEndpoint;
use tally_node::{init_logging, ServiceConfig, ShutdownController, VoteService};
use tally_rpc::RpcServer;

/// Delay between initialization attempts while the ledger is unusable.
const INIT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "tally-daemon", about = "Dual-endpoint vote availability service")]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "TALLY_CONFIG")]
    config: Option<PathBuf>,

    /// Operator secret the ledger key is derived from.
    #[arg(long, env = "TALLY_LEDGER_SECRET", hide_env_values = true)]
    ledger_secret: Option<String>,

    /// Directory holding the encrypted ledger and its backup.
    #[arg(long, env = "TALLY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Primary endpoint URL.
    #[arg(long, env = "TALLY_PRIMARY_URL")]
    primary_url: Option<String>,

    /// Secondary endpoint URL.
    #[arg(long, env = "TALLY_SECONDARY_URL")]
    secondary_url: Option<String>,

    /// Contract address used by endpoints that do not name their own.
    #[arg(long, env = "TALLY_CONTRACT_ADDRESS")]
    contract_address: Option<String>,

    /// HTTP API port.
    #[arg(long, env = "TALLY_RPC_PORT")]
    rpc_port: Option<u16>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "TALLY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "TALLY_LOG_FORMAT")]
    log_format: Option<String>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => ServiceConfig::from_toml_file(&path.to_string_lossy())?,
            None => ServiceConfig::default(),
        };
        if let Some(secret) = self.ledger_secret {
            config.encryption_secret = Some(secret);
        }
        if let Some(dir) = self.data_dir {
            config.ledger.data_dir = dir;
        }
        if let Some(url) = self.primary_url {
            config.primary.url = url;
        }
        if let Some(url) = self.secondary_url {
            config.secondary.url = url;
        }
        if let Some(address) = self.contract_address {
            config.fallback_contract_address = Some(address);
        }
        if let Some(port) = self.rpc_port {
            config.rpc_port = port;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_config()?;
    init_logging(config.log_format()?, &config.log_level)?;
    config.validate()?;

    let primary = HttpEndpoint::new(
        config.primary.name.clone(),
        config.primary.url.clone(),
        config.request_timeout(),
    )?;
    let secondary = HttpEndpoint::new(
        config.secondary.name.clone(),
        config.secondary.url.clone(),
        config.request_timeout(),
    )?;

    tracing::info!(
        primary = %config.primary.url,
        secondary = %config.secondary.url,
        ledger = %config.ledger.primary_path().display(),
        rpc_port = config.rpc_port,
        "starting tally daemon"
    );

    let rpc_port = config.rpc_port;
    let service = VoteService::new(config, primary, secondary)?;
    let shutdown = Arc::new(ShutdownController::new());

    let rpc_service = Arc::clone(&service);
    let rpc_shutdown = shutdown.subscribe();
    let rpc_handle = tokio::spawn(async move {
        if let Err(e) = RpcServer::new(rpc_port).start(rpc_service, rpc_shutdown).await {
            tracing::error!(error = %e, "RPC server failed");
        }
    });

    // Keep retrying init until it succeeds or shutdown is requested.
    let mut init_shutdown = shutdown.subscribe();
    let signals = Arc::clone(&shutdown);
    let signal_handle = tokio::spawn(async move { signals.wait_for_signal().await });

    loop {
        match service.init().await {
            Ok(()) => break,
            Err(e) => {
                tracing::error!(error = %e, retry_in_secs = INIT_RETRY_DELAY.as_secs(), "initialization failed");
            }
        }
        tokio::select! {
            _ = init_shutdown.recv() => break,
            _ = tokio::time::sleep(INIT_RETRY_DELAY) => {}
        }
    }

    let _ = signal_handle.await;
    shutdown.drain(&service).await;
    let _ = rpc_handle.await;

    tracing::info!("tally daemon exited cleanly");
    Ok(())
}
