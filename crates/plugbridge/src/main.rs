//! plugbridge - web backend for eWeLink smart plugs
//!
//! Logs in to the eWeLink cloud and exposes device listing and switching to
//! a browser frontend.

mod config;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use config::{ConfigLoader, PlugbridgeConfig};
use plugbridge_cloud::CloudClient;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "plugbridge")]
#[command(version)]
#[command(about = "Web backend for eWeLink smart plugs", long_about = None)]
struct Cli {
    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format
    #[arg(short, long, value_enum, default_value_t = LogFormat::Text, global = true)]
    format: LogFormat,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "PLUGBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Host to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to bind
        #[arg(short, long)]
        port: Option<u16>,

        /// Serve the frontend from this directory
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config {
        /// Write a default configuration file to this path instead
        #[arg(long)]
        init: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = ConfigLoader::new().with_cli_path(cli.config.clone()).load();

    // CLI verbose flag takes precedence, then config, then default
    let configured_level = loaded
        .as_ref()
        .map(|c| c.server.log_level.as_str())
        .unwrap_or("info");
    init_logging(log_level(cli.verbose, configured_level), cli.format)?;

    let config = loaded.context("Failed to load configuration")?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            static_dir,
        } => {
            let mut config = config;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if static_dir.is_some() {
                config.server.static_dir = static_dir;
            }
            serve_command(config).await
        }
        Commands::Config { init } => config_command(config, init),
    }
}

fn log_level(verbose: u8, configured: &str) -> Level {
    match verbose {
        0 => match configured.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn init_logging(level: Level, format: LogFormat) -> anyhow::Result<()> {
    match format {
        LogFormat::Text => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Json => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .json()
                .with_current_span(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

async fn serve_command(config: PlugbridgeConfig) -> anyhow::Result<()> {
    info!("plugbridge v{}", env!("CARGO_PKG_VERSION"));

    if !config.cloud.has_app_credentials() {
        error!("EWELINK_APP_ID and EWELINK_APP_SECRET are not set; login requests will fail");
    }
    if config.cloud.redirect_url.is_none() {
        warn!("EWELINK_REDIRECT_URL is not set; OAuth login is disabled");
    }
    info!(
        "Default region: {}, {} device override(s)",
        config.cloud.region,
        config.cloud.overrides.len()
    );

    let web_config = config.server.web_config();
    let cloud = Arc::new(CloudClient::new(config.cloud).context("Failed to create cloud client")?);

    plugbridge_web::start_server(web_config, cloud).await
}

fn config_command(config: PlugbridgeConfig, init: Option<PathBuf>) -> anyhow::Result<()> {
    let loader = ConfigLoader::new();

    if let Some(path) = init {
        if path.exists() {
            anyhow::bail!("{} already exists", path.display());
        }
        loader.save(&PlugbridgeConfig::default(), &path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let mut shown = config;
    if shown.cloud.app_secret.is_some() {
        shown.cloud.app_secret = Some("<redacted>".to_string());
    }

    if let Some(path) = ConfigLoader::default_config_path() {
        println!("# user config path: {}", path.display());
    }
    print!(
        "{}",
        toml::to_string_pretty(&shown).context("Failed to render configuration")?
    );
    Ok(())
}
