//! homegrowd - Main entry point
//!
//! Bootstraps the automation engine: load config, connect the MQTT
//! transport, wire the stores, and run until SIGINT/SIGTERM.

use clap::{Parser, Subcommand};
use homegrowd::config::EngineConfig;
use homegrowd::engine::{run_event_logger, AutomationEngine, SystemClock};
use homegrowd::observability::init_default_logging;
use homegrowd::store::{
    MemoryDeviceStore, MemoryExecutionLog, MemoryProgramStore, MemoryRuleStore, MemorySensorStore,
};
use homegrowd::transport::mqtt::MqttClient;
use homegrowd::transport::TransportEvent;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info};

/// MQTT-driven hydroponics automation engine
#[derive(Parser)]
#[command(name = "homegrowd")]
#[command(about = "MQTT-driven hydroponics automation engine")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the automation engine
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting homegrowd v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_engine(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(EngineConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = vec!["homegrowd.toml", "config/homegrowd.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(EngineConfig::load_from_file(&path)?);
                }
            }

            error!(
                "No configuration file found. Please provide one with -c/--config or create homegrowd.toml"
            );
            process::exit(1);
        }
    }
}

async fn run_engine(config: EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(broker = %config.mqtt.broker_url, "Connecting MQTT transport");

    let (transport_tx, transport_rx) = mpsc::channel::<TransportEvent>(256);
    let mut transport = MqttClient::new(config.mqtt.clone())?;
    transport.set_event_sender(transport_tx).await;
    transport.connect().await?;
    let transport = Arc::new(transport);

    let (engine, events_rx) = AutomationEngine::new(
        config,
        Arc::new(MemoryRuleStore::new()),
        Arc::new(MemoryProgramStore::new()),
        Arc::new(MemorySensorStore::new()),
        Arc::new(MemoryDeviceStore::new()),
        Arc::new(MemoryExecutionLog::new()),
        transport.clone(),
        Arc::new(SystemClock),
    );

    tokio::spawn(run_event_logger(events_rx));

    engine.start(transport_rx).await?;

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!("Automation engine running, waiting for device traffic...");

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }

    engine.stop().await;
    transport.disconnect().await;
    Ok(())
}

fn handle_config_command(
    config: EngineConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    info!("Configuration is valid");
    if show {
        println!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}
