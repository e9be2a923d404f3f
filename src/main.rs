//! WolfRing - Ring Coordinator Election
//!
//! Runs either the membership registry or a cluster node.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfring::api::{NodeServer, RegistryServer};
use wolfring::config::WolfRingConfig;
use wolfring::election::{ElectionEngine, ElectionTimings, NodeStatus};
use wolfring::error::{Error, Result};
use wolfring::id::NodeId;
use wolfring::network::{AddressBook, HttpClient, HttpNotifier, HttpPeerTransport, RegistryClient};
use wolfring::node::NodeRuntime;
use wolfring::registry::{Registry, RegistryTimings};

/// WolfRing - Ring Coordinator Election
#[derive(Parser)]
#[command(name = "wolfring")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wolfring.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the membership registry
    Registry,

    /// Run a cluster node
    Node,

    /// Show a node's status
    Status {
        /// Node address to query
        #[arg(short, long, default_value = "localhost:8081")]
        address: String,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolfring.toml")]
        output: PathBuf,

        /// Node ID
        #[arg(long, default_value_t = 1)]
        node_id: u64,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = cli.log_level.as_deref();

    match cli.command {
        Commands::Registry => {
            let config = load_config(&cli.config, log_level)?;
            run_registry(config).await
        }
        Commands::Node => {
            let config = load_config(&cli.config, log_level)?;
            run_node(config).await
        }
        Commands::Status { address } => {
            init_logging(log_level.unwrap_or("warn"), "pretty");
            run_status(address).await
        }
        Commands::Init { output, node_id } => {
            init_logging(log_level.unwrap_or("info"), "pretty");
            run_init(output, node_id)
        }
        Commands::Validate => {
            init_logging(log_level.unwrap_or("warn"), "pretty");
            run_validate(&cli.config)
        }
    }
}

/// Initialize logging. `RUST_LOG` wins over `level`.
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Load configuration and start logging with its settings
fn load_config(path: &Path, log_level: Option<&str>) -> Result<WolfRingConfig> {
    match WolfRingConfig::load(path) {
        Ok(config) => {
            init_logging(
                log_level.unwrap_or(&config.logging.level),
                &config.logging.format,
            );
            Ok(config)
        }
        Err(e) => {
            init_logging(log_level.unwrap_or("info"), "pretty");
            tracing::error!("Failed to load configuration from {:?}: {}", path, e);
            Err(e)
        }
    }
}

/// Start the membership registry
async fn run_registry(config: WolfRingConfig) -> Result<()> {
    tracing::info!("Starting WolfRing registry...");

    let http = HttpClient::new(config.connect_timeout(), config.request_timeout())?;
    let registry = Arc::new(Registry::new(
        Arc::new(HttpNotifier::new(http)),
        RegistryTimings::from_config(&config),
    ));

    let cancel = CancellationToken::new();
    let sweeper = registry.spawn(cancel.clone());

    let server = RegistryServer::new(config.registry.bind_address.clone(), registry);
    let server_cancel = cancel.clone();
    let server_task = tokio::spawn(async move { server.start(server_cancel).await });

    supervise(cancel, server_task, vec![sweeper]).await
}

/// Start a cluster node
async fn run_node(config: WolfRingConfig) -> Result<()> {
    tracing::info!("Starting WolfRing node {}...", config.node.id);

    let http = HttpClient::new(config.connect_timeout(), config.request_timeout())?;
    let addresses = Arc::new(AddressBook::new(config.node.peer_address_template.clone()));
    let transport = Arc::new(HttpPeerTransport::new(http.clone(), Arc::clone(&addresses)));
    let engine = Arc::new(ElectionEngine::new(
        config.node.id,
        transport,
        ElectionTimings::from_config(&config),
    ));
    let registry = Arc::new(RegistryClient::new(http, config.registry.url.clone()));

    let runtime = Arc::new(NodeRuntime::new(
        engine,
        registry,
        addresses,
        config.advertise_address().to_string(),
        config.heartbeat_interval(),
    ));

    let cancel = CancellationToken::new();

    // Listen before registering so peers can reach us once we are announced
    let server = NodeServer::new(config.node.bind_address.clone(), Arc::clone(&runtime));
    let server_cancel = cancel.clone();
    let server_task = tokio::spawn(async move { server.start(server_cancel).await });

    let heartbeat = runtime.spawn(cancel.clone());

    supervise(cancel, server_task, vec![heartbeat]).await
}

/// Wait for Ctrl-C or a server exit, then stop every task
async fn supervise(
    cancel: CancellationToken,
    mut server: JoinHandle<Result<()>>,
    workers: Vec<JoinHandle<()>>,
) -> Result<()> {
    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            cancel.cancel();
            (&mut server).await
        }
        result = &mut server => {
            cancel.cancel();
            result
        }
    };

    for worker in workers {
        if let Err(e) = worker.await {
            tracing::warn!("Background task ended abnormally: {}", e);
        }
    }

    tracing::info!("Shutdown complete");
    result.map_err(|e| Error::Internal(format!("server task failed: {}", e)))?
}

/// Show a node's status
async fn run_status(address: String) -> Result<()> {
    let http = HttpClient::new(Duration::from_secs(5), Duration::from_secs(10))?;

    match http.get_json::<NodeStatus>(&address, "/status").await {
        Ok(status) => {
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("Failed to get status: {}", e);
            Err(e)
        }
    }
}

/// Initialize configuration file
fn run_init(output: PathBuf, node_id: u64) -> Result<()> {
    let mut config = WolfRingConfig::default();
    config.node.id = NodeId::new(node_id)?;

    let content = format!(
        "# WolfRing Configuration\n# Generated configuration file\n\n{}",
        config.to_toml()?
    );
    std::fs::write(&output, content)?;

    println!("Configuration file created: {}", output.display());
    println!("Start the registry with: wolfring --config {} registry", output.display());
    println!("Start a node with:       wolfring --config {} node", output.display());
    Ok(())
}

/// Validate configuration
fn run_validate(config_path: &Path) -> Result<()> {
    match WolfRingConfig::load(config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Node ID:          {}", config.node.id);
            println!("  Bind Address:     {}", config.node.bind_address);
            println!("  Advertise:        {}", config.advertise_address());
            println!("  Registry URL:     {}", config.registry.url);
            println!("  Heartbeat:        {} s", config.election.heartbeat_interval_secs);
            println!("  Liveness Timeout: {} s", config.registry.liveness_timeout_secs);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}
