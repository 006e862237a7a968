//! Clearline command-line tool.
//!
//! `clearline node` serves a mock clearing node over TCP. `clearline demo`
//! runs a scripted session (connect, open a channel, transfer, close)
//! against a node at the configured endpoint, or against an in-process mock.

mod demo;

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand, ValueEnum};
use clearline_client::{ClientConfig, ClientError, ConfigError};
use clearline_harness::{MockClearingNode, serve_tcp};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// State-channel client tooling.
#[derive(Parser, Debug)]
#[command(name = "clearline", version, about)]
struct Args {
    /// Client configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve a mock clearing node over TCP
    Node {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:7824")]
        listen: String,

        /// Seed for challenges, latencies and the node key
        #[arg(long, default_value = "0")]
        seed: u64,
    },
    /// Run a scripted session: connect, open, transfer, close
    Demo {
        /// Clearing node endpoint; overrides the configuration file
        #[arg(short, long)]
        endpoint: Option<String>,

        /// Run against an in-process mock node instead of the network
        #[arg(long)]
        mock: bool,

        /// Wallet private key as 64 hex characters; random when omitted
        #[arg(long, env = "CLEARLINE_WALLET_KEY")]
        wallet_key: Option<String>,

        /// Channel allocation
        #[arg(long, default_value = "1000000")]
        allocation: u128,

        /// Amount to transfer
        #[arg(long, default_value = "250000")]
        amount: u128,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    /// Human-readable multi-line output
    Pretty,
    /// One JSON object per event
    Json,
}

/// Failures that end the process.
#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("invalid wallet key: {0}")]
    WalletKey(String),

    #[error("invalid amount: {0}")]
    Amount(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_writer(std::io::stderr)).init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty().with_writer(std::io::stderr)).init(),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<ClientConfig, CliError> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            Ok(ClientConfig::load(path)?)
        },
        None => Ok(ClientConfig::default()),
    }
}

async fn run(args: Args) -> Result<(), CliError> {
    let config = load_config(args.config.as_ref())?;
    match args.command {
        Command::Node { listen, seed } => {
            let listener = tokio::net::TcpListener::bind(&listen).await?;
            let node = MockClearingNode::with_seed(seed);
            info!(node = %node.address(), "mock clearing node ready");
            tokio::select! {
                served = serve_tcp(node, listener) => served?,
                _ = tokio::signal::ctrl_c() => info!("shutting down"),
            }
            Ok(())
        },
        Command::Demo { endpoint, mock, wallet_key, allocation, amount } => {
            let mut config = config;
            if let Some(endpoint) = endpoint {
                config.endpoint = endpoint;
            }
            let options = demo::DemoOptions {
                mock,
                wallet_key,
                allocation: allocation.into(),
                amount: amount.into(),
            };
            demo::run(config, options).await
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_format);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "clearline failed");
            ExitCode::FAILURE
        },
    }
}
